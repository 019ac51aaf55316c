//! Render-state snapshot.
//!
//! The slice of render state the program cache cares about, captured
//! synchronously at program-request time. Format selectors stay raw (`u8` /
//! `u32`) so that values outside the known enumerations survive into the
//! state keys; the source generators decide what to do with them.

use bitflags::bitflags;

// ─── Typed Views ─────────────────────────────────────────────────────────────

/// Pixel formats a color framebuffer copy can be converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CopyFormat {
    R4 = 0,
    /// Single-channel copy that the hardware encodes like `R8`.
    R8Alt = 1,
    RA4 = 2,
    RA8 = 3,
    Rgb565 = 4,
    Rgb5A3 = 5,
    Rgba8 = 6,
    A8 = 7,
    R8 = 8,
    G8 = 9,
    B8 = 10,
    Rg8 = 11,
    Gb8 = 12,
}

impl CopyFormat {
    pub const ALL: [CopyFormat; 13] = [
        Self::R4,
        Self::R8Alt,
        Self::RA4,
        Self::RA8,
        Self::Rgb565,
        Self::Rgb5A3,
        Self::Rgba8,
        Self::A8,
        Self::R8,
        Self::G8,
        Self::B8,
        Self::Rg8,
        Self::Gb8,
    ];

    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.get(usize::from(raw)).copied()
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u8 {
        self as u8
    }
}

/// Formats a depth buffer copy can be converted into.
///
/// The selector space is shared with [`CopyFormat`]; only these values are
/// meaningful for a depth copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DepthCopyFormat {
    Z4 = 0,
    /// Upper depth byte, encoded like `Z8`.
    Z8Alt = 1,
    Z16 = 3,
    Z24X8 = 6,
    Z8 = 8,
    /// Middle depth byte.
    Z8M = 9,
    /// Lower depth byte.
    Z8L = 10,
    /// Upper 16 bits with the bytes swapped.
    Z16R = 11,
    /// Lower 16 bits.
    Z16L = 12,
}

impl DepthCopyFormat {
    pub const ALL: [DepthCopyFormat; 9] = [
        Self::Z4,
        Self::Z8Alt,
        Self::Z16,
        Self::Z24X8,
        Self::Z8,
        Self::Z8M,
        Self::Z8L,
        Self::Z16R,
        Self::Z16L,
    ];

    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.raw() == raw)
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u8 {
        self as u8
    }
}

/// Formats an intensity (luma) copy can be converted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IntensityFormat {
    I4 = 0,
    /// Intensity byte, encoded like `I8`.
    I8Alt = 1,
    IA4 = 2,
    IA8 = 3,
    I8 = 8,
}

impl IntensityFormat {
    pub const ALL: [IntensityFormat; 5] = [Self::I4, Self::I8Alt, Self::IA4, Self::IA8, Self::I8];

    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|format| format.raw() == raw)
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u8 {
        self as u8
    }
}

/// Primitive class submitted to the rasterizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PrimitiveType {
    Points = 0,
    Lines = 1,
    Triangles = 2,
}

impl PrimitiveType {
    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Points),
            1 => Some(Self::Lines),
            2 => Some(Self::Triangles),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u8 {
        self as u8
    }
}

bitflags! {
    /// Vertex attributes present in the current vertex format.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VertexComponents: u32 {
        const POSITION  = 1 << 0;
        const NORMAL    = 1 << 1;
        const COLOR0    = 1 << 2;
        const COLOR1    = 1 << 3;
        const TEXCOORD0 = 1 << 4;
        const TEXCOORD1 = 1 << 5;
        const TEXCOORD2 = 1 << 6;
        const TEXCOORD3 = 1 << 7;
        const TEXCOORD4 = 1 << 8;
        const TEXCOORD5 = 1 << 9;
        const TEXCOORD6 = 1 << 10;
        const TEXCOORD7 = 1 << 11;
    }
}

impl VertexComponents {
    /// Maximum number of texture coordinate sets / texgens.
    pub const MAX_TEXCOORDS: u8 = 8;

    /// Whether texture coordinate set `index` is present.
    #[must_use]
    pub fn has_texcoord(self, index: u8) -> bool {
        index < Self::MAX_TEXCOORDS
            && self.contains(VertexComponents::from_bits_retain(
                VertexComponents::TEXCOORD0.bits() << index,
            ))
    }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Framebuffer copy state consumed by the pixel stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CopyState {
    /// Raw format selector: [`CopyFormat`], [`DepthCopyFormat`] or
    /// [`IntensityFormat`] depending on the copy mode.
    pub format: u8,
    pub is_depth_copy: bool,
    pub is_intensity: bool,
    pub scale_by_half: bool,
    /// The source framebuffer stores alpha. Without it, formats that read
    /// alpha see it as fully opaque.
    pub efb_has_alpha: bool,
}

/// Vertex format and transform state consumed by the vertex stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexState {
    /// Raw [`VertexComponents`] bits.
    pub components: u32,
    /// Number of texture coordinate generators (valid range `0..=8`).
    pub num_texgens: u8,
    pub lighting: bool,
}

impl Default for VertexState {
    fn default() -> Self {
        Self {
            components: VertexComponents::POSITION.bits(),
            num_texgens: 0,
            lighting: false,
        }
    }
}

/// Rasterizer state consumed by the geometry stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    /// Raw [`PrimitiveType`] selector.
    pub primitive: u8,
    pub stereo: bool,
    pub wireframe: bool,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            primitive: PrimitiveType::Triangles.raw(),
            stereo: false,
            wireframe: false,
        }
    }
}

/// Everything a [`PipelineKey`](crate::pipeline_key::PipelineKey) is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RenderState {
    pub copy: CopyState,
    pub vertex: VertexState,
    pub raster: RasterState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_format_raw_round_trip() {
        for format in CopyFormat::ALL {
            assert_eq!(CopyFormat::from_raw(format.raw()), Some(format));
        }
        assert_eq!(CopyFormat::from_raw(13), None);
        assert_eq!(CopyFormat::from_raw(0xFF), None);
    }

    #[test]
    fn test_mode_formats_from_raw() {
        assert_eq!(DepthCopyFormat::from_raw(8), Some(DepthCopyFormat::Z8));
        assert_eq!(DepthCopyFormat::from_raw(2), None);
        assert_eq!(DepthCopyFormat::from_raw(4), None);
        assert_eq!(IntensityFormat::from_raw(8), Some(IntensityFormat::I8));
        assert_eq!(IntensityFormat::from_raw(4), None);
        for format in DepthCopyFormat::ALL {
            assert_eq!(DepthCopyFormat::from_raw(format.raw()), Some(format));
        }
    }

    #[test]
    fn test_primitive_from_raw() {
        assert_eq!(PrimitiveType::from_raw(1), Some(PrimitiveType::Lines));
        assert_eq!(PrimitiveType::from_raw(3), None);
    }

    #[test]
    fn test_has_texcoord() {
        let comps = VertexComponents::POSITION | VertexComponents::TEXCOORD0 | VertexComponents::TEXCOORD3;
        assert!(comps.has_texcoord(0));
        assert!(!comps.has_texcoord(1));
        assert!(comps.has_texcoord(3));
        assert!(!comps.has_texcoord(8));
    }
}
