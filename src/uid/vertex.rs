//! Vertex-stage uid: vertex format and transform state.

use super::{UidData, UidReader, UidWriter};
use crate::driver::ShaderStage;
use crate::state::{VertexComponents, VertexState};

/// Fields that fully determine the vertex-stage source.
///
/// Layout: `components: u16` (only declared [`VertexComponents`] bits),
/// `num_texgens: u8`, one flag byte (`bit0` lighting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexUidData {
    pub components: VertexComponents,
    /// Raw texgen count; values above 8 reach the generator untouched.
    pub num_texgens: u8,
    pub lighting: bool,
}

impl Default for VertexUidData {
    fn default() -> Self {
        Self {
            components: VertexComponents::POSITION,
            num_texgens: 0,
            lighting: false,
        }
    }
}

impl VertexUidData {
    /// Canonical uid data for a vertex state. Undeclared component bits have
    /// no effect on the generated source and are dropped.
    #[must_use]
    pub fn from_state(state: &VertexState) -> Self {
        Self {
            components: VertexComponents::from_bits_truncate(state.components),
            num_texgens: state.num_texgens,
            lighting: state.lighting,
        }
    }
}

impl UidData for VertexUidData {
    const STAGE: ShaderStage = ShaderStage::Vertex;

    fn write(&self, w: &mut UidWriter) {
        // All declared bits live below bit 12.
        w.u16(self.components.bits() as u16);
        w.u8(self.num_texgens);
        w.flags(&[self.lighting]);
    }

    fn read(r: &mut UidReader<'_>) -> Option<Self> {
        let components = VertexComponents::from_bits(u32::from(r.u16()?))?;
        let num_texgens = r.u8()?;
        let [lighting] = r.flags::<1>()?;
        Some(Self {
            components,
            num_texgens,
            lighting,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uid::VertexShaderUid;

    #[test]
    fn test_undeclared_component_bits_are_dropped() {
        let base = VertexState {
            components: (VertexComponents::POSITION | VertexComponents::NORMAL).bits(),
            num_texgens: 1,
            lighting: true,
        };
        let noisy = VertexState {
            components: base.components | 0x8000_0000,
            ..base
        };
        assert_eq!(
            VertexShaderUid::new(VertexUidData::from_state(&base)),
            VertexShaderUid::new(VertexUidData::from_state(&noisy)),
        );
    }

    #[test]
    fn test_rejects_undeclared_bits_on_decode() {
        // components = 0x1001 has bit 12 set, which is not a declared component
        assert!(VertexShaderUid::from_bytes(&[0x01, 0x10, 0, 0]).is_none());
        assert!(VertexShaderUid::from_bytes(&[0x01, 0x00, 0, 0]).is_some());
    }
}
