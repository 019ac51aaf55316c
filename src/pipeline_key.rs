//! Composite pipeline key.
//!
//! Identifies one draw configuration as the triple of stage uids that feed
//! it. Field order is significant: the derived `Ord` compares the pixel uid
//! first, then the vertex uid, then the geometry uid, which fixes the
//! canonical traversal order of the program map.

use crate::errors::{Result, VestaError};
use crate::state::RenderState;
use crate::uid::{
    GeometryShaderUid, GeometryUidData, PixelShaderUid, PixelUidData, VertexShaderUid,
    VertexUidData,
};

/// Cache key for one linked program.
///
/// A missing geometry stage is always stored as `None`, so two keys that
/// both mean "no geometry stage" compare equal regardless of how the caller
/// spelled it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PipelineKey {
    pixel: PixelShaderUid,
    vertex: VertexShaderUid,
    geometry: Option<GeometryShaderUid>,
}

impl Default for PipelineKey {
    /// The key of [`RenderState::default`].
    fn default() -> Self {
        Self::from_state(&RenderState::default())
    }
}

impl PipelineKey {
    /// Builds a key, dropping a geometry uid that needs no stage.
    #[must_use]
    pub fn new(
        pixel: PixelShaderUid,
        vertex: VertexShaderUid,
        geometry: Option<GeometryShaderUid>,
    ) -> Self {
        Self {
            pixel,
            vertex,
            geometry: geometry.filter(|g| g.data().needs_stage()),
        }
    }

    /// Derives the key for the current render state.
    #[must_use]
    pub fn from_state(state: &RenderState) -> Self {
        Self::new(
            PixelShaderUid::new(PixelUidData::from_state(&state.copy)),
            VertexShaderUid::new(VertexUidData::from_state(&state.vertex)),
            Some(GeometryShaderUid::new(GeometryUidData::from_state(state))),
        )
    }

    #[inline]
    #[must_use]
    pub fn pixel(&self) -> &PixelShaderUid {
        &self.pixel
    }

    #[inline]
    #[must_use]
    pub fn vertex(&self) -> &VertexShaderUid {
        &self.vertex
    }

    #[inline]
    #[must_use]
    pub fn geometry(&self) -> Option<&GeometryShaderUid> {
        self.geometry.as_ref()
    }

    // ─── Disk Encoding ───────────────────────────────────────────────────────

    /// Serializes the key for a disk-cache record.
    ///
    /// `[pixel_len][pixel][vertex_len][vertex][geometry_len][geometry]`, with
    /// `geometry_len == 0` meaning no geometry stage.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            3 + self.pixel.num_values()
                + self.vertex.num_values()
                + self.geometry.as_ref().map_or(0, GeometryShaderUid::num_values),
        );
        push_section(&mut out, self.pixel.as_bytes());
        push_section(&mut out, self.vertex.as_bytes());
        push_section(
            &mut out,
            self.geometry.as_ref().map_or(&[][..], GeometryShaderUid::as_bytes),
        );
        out
    }

    /// Inverse of [`to_bytes`](Self::to_bytes).
    ///
    /// Rejects anything that is not the canonical encoding of a key, including
    /// a stored geometry uid that needs no stage.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut rest = bytes;
        let pixel = take_section(&mut rest)
            .and_then(PixelShaderUid::from_bytes)
            .ok_or_else(|| VestaError::InvalidKey("bad pixel uid".into()))?;
        let vertex = take_section(&mut rest)
            .and_then(VertexShaderUid::from_bytes)
            .ok_or_else(|| VestaError::InvalidKey("bad vertex uid".into()))?;
        let geometry_bytes = take_section(&mut rest)
            .ok_or_else(|| VestaError::InvalidKey("missing geometry section".into()))?;
        let geometry = if geometry_bytes.is_empty() {
            None
        } else {
            let uid = GeometryShaderUid::from_bytes(geometry_bytes)
                .filter(|g| g.data().needs_stage())
                .ok_or_else(|| VestaError::InvalidKey("bad geometry uid".into()))?;
            Some(uid)
        };
        if !rest.is_empty() {
            return Err(VestaError::InvalidKey(format!(
                "{} trailing bytes",
                rest.len()
            )));
        }
        Ok(Self {
            pixel,
            vertex,
            geometry,
        })
    }
}

fn push_section(out: &mut Vec<u8>, bytes: &[u8]) {
    // Uids are a handful of bytes; a one-byte length is plenty.
    debug_assert!(bytes.len() <= usize::from(u8::MAX));
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
}

fn take_section<'a>(rest: &mut &'a [u8]) -> Option<&'a [u8]> {
    let (&len, tail) = rest.split_first()?;
    let len = usize::from(len);
    if tail.len() < len {
        return None;
    }
    let (section, tail) = tail.split_at(len);
    *rest = tail;
    Some(section)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CopyState, PrimitiveType, RasterState};

    fn lines_state() -> RenderState {
        RenderState {
            copy: CopyState {
                format: 6,
                ..CopyState::default()
            },
            raster: RasterState {
                primitive: PrimitiveType::Lines.raw(),
                ..RasterState::default()
            },
            ..RenderState::default()
        }
    }

    #[test]
    fn test_bytes_round_trip() {
        for state in [RenderState::default(), lines_state()] {
            let key = PipelineKey::from_state(&state);
            let decoded = PipelineKey::from_bytes(&key.to_bytes()).unwrap();
            assert_eq!(decoded, key);
        }
    }

    #[test]
    fn test_passthrough_geometry_is_none() {
        let key = PipelineKey::from_state(&RenderState::default());
        assert!(key.geometry().is_none());
        assert!(PipelineKey::from_state(&lines_state()).geometry().is_some());
    }

    #[test]
    fn test_from_bytes_rejects_trailing_garbage() {
        let mut bytes = PipelineKey::from_state(&lines_state()).to_bytes();
        bytes.push(7);
        assert!(matches!(
            PipelineKey::from_bytes(&bytes),
            Err(VestaError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_from_bytes_rejects_stored_passthrough_geometry() {
        let key = PipelineKey::from_state(&RenderState::default());
        let mut bytes = key.to_bytes();
        // Replace the empty geometry section with an explicit passthrough uid.
        bytes.pop();
        bytes.extend_from_slice(&[3, PrimitiveType::Triangles.raw(), 0, 0]);
        assert!(PipelineKey::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_order_compares_pixel_first() {
        let low_pixel = PipelineKey::from_state(&RenderState {
            copy: CopyState {
                format: 0,
                ..CopyState::default()
            },
            raster: RasterState {
                primitive: PrimitiveType::Points.raw(),
                ..RasterState::default()
            },
            ..RenderState::default()
        });
        let high_pixel = PipelineKey::from_state(&RenderState {
            copy: CopyState {
                format: 1,
                ..CopyState::default()
            },
            ..RenderState::default()
        });
        assert!(low_pixel < high_pixel);
    }
}
