//! Geometry-stage uid: primitive expansion and stereo state.

use super::{UidData, UidReader, UidWriter};
use crate::driver::ShaderStage;
use crate::state::{PrimitiveType, RenderState, VertexComponents};

/// Fields that fully determine the geometry-stage source.
///
/// Layout: `primitive: u8`, `num_texgens: u8`, one flag byte
/// (`bit0` stereo, `bit1` wireframe).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryUidData {
    /// Raw [`PrimitiveType`] selector.
    pub primitive: u8,
    /// Number of texcoord varyings passed through (clamped to 8).
    pub num_texgens: u8,
    pub stereo: bool,
    pub wireframe: bool,
}

impl Default for GeometryUidData {
    fn default() -> Self {
        Self {
            primitive: PrimitiveType::Triangles.raw(),
            num_texgens: 0,
            stereo: false,
            wireframe: false,
        }
    }
}

impl GeometryUidData {
    #[must_use]
    pub fn from_state(state: &RenderState) -> Self {
        Self {
            primitive: state.raster.primitive,
            num_texgens: state.vertex.num_texgens.min(VertexComponents::MAX_TEXCOORDS),
            stereo: state.raster.stereo,
            wireframe: state.raster.wireframe,
        }
    }

    /// Whether this state needs a geometry stage at all.
    ///
    /// Plain triangles without stereo or wireframe pass straight from the
    /// vertex to the pixel stage; every such uid denotes "no geometry stage"
    /// whatever its remaining fields hold.
    #[must_use]
    pub fn needs_stage(&self) -> bool {
        self.primitive != PrimitiveType::Triangles.raw() || self.stereo || self.wireframe
    }
}

impl UidData for GeometryUidData {
    const STAGE: ShaderStage = ShaderStage::Geometry;

    fn write(&self, w: &mut UidWriter) {
        w.u8(self.primitive);
        w.u8(self.num_texgens);
        w.flags(&[self.stereo, self.wireframe]);
    }

    fn read(r: &mut UidReader<'_>) -> Option<Self> {
        let primitive = r.u8()?;
        let num_texgens = r.u8()?;
        if num_texgens > VertexComponents::MAX_TEXCOORDS {
            return None;
        }
        let [stereo, wireframe] = r.flags::<2>()?;
        Some(Self {
            primitive,
            num_texgens,
            stereo,
            wireframe,
        })
    }
}
