//! Pixel stage: framebuffer copy conversion.
//!
//! The copy mode picks the format table: depth copies split the 24-bit depth
//! value into bytes, intensity copies convert to luma first, color copies
//! swizzle the sampled color. Each table has its own fallback for selectors
//! it does not know.

use serde::Serialize;

use super::{render, report_unrecognized};
use crate::errors::Result;
use crate::state::{CopyFormat, DepthCopyFormat, IntensityFormat};
use crate::uid::PixelUidData;

/// Output swizzle and per-component quantization of one copy format.
struct CopyDerivation {
    name: &'static str,
    /// GLSL `vec4` expression over the sampled color `c` (or the depth bytes
    /// `z` for depth copies).
    swizzle: &'static str,
    /// Bits kept per output component (`r`, `g`, `b`, `a`); `0` leaves the
    /// component untouched.
    bits: [u8; 4],
    /// The output depends on the source alpha.
    reads_alpha: bool,
}

impl CopyDerivation {
    const fn new(name: &'static str, swizzle: &'static str, bits: u8, reads_alpha: bool) -> Self {
        Self {
            name,
            swizzle,
            bits: [bits; 4],
            reads_alpha,
        }
    }
}

// ─── Color Copies ────────────────────────────────────────────────────────────

/// Full-channel identity, used for unrecognized color formats.
const COLOR_FALLBACK: CopyDerivation = CopyDerivation::new("fallback_rgba8", "c", 8, true);

fn derive_color(format: CopyFormat) -> CopyDerivation {
    match format {
        CopyFormat::R4 => CopyDerivation::new("r4", "c.rrrr", 4, false),
        CopyFormat::R8Alt => CopyDerivation::new("r8_alt", "c.rrrr", 8, false),
        CopyFormat::RA4 => CopyDerivation::new("ra4", "c.rrra", 4, true),
        CopyFormat::RA8 => CopyDerivation::new("ra8", "c.rrra", 8, true),
        CopyFormat::Rgb565 => CopyDerivation {
            name: "rgb565",
            swizzle: "vec4(c.rgb, 1.0)",
            bits: [5, 6, 5, 0],
            reads_alpha: false,
        },
        CopyFormat::Rgb5A3 => CopyDerivation {
            name: "rgb5a3",
            swizzle: "c",
            bits: [5, 5, 5, 3],
            reads_alpha: true,
        },
        CopyFormat::Rgba8 => CopyDerivation::new("rgba8", "c", 8, true),
        CopyFormat::A8 => CopyDerivation::new("a8", "c.aaaa", 8, true),
        CopyFormat::R8 => CopyDerivation::new("r8", "c.rrrr", 8, false),
        CopyFormat::G8 => CopyDerivation::new("g8", "c.gggg", 8, false),
        CopyFormat::B8 => CopyDerivation::new("b8", "c.bbbb", 8, false),
        CopyFormat::Rg8 => CopyDerivation::new("rg8", "c.rrrg", 8, false),
        CopyFormat::Gb8 => CopyDerivation::new("gb8", "c.gggb", 8, false),
    }
}

// ─── Depth Copies ────────────────────────────────────────────────────────────

/// All three depth bytes, used for unrecognized depth formats.
const DEPTH_FALLBACK: CopyDerivation =
    CopyDerivation::new("fallback_z24x8", "vec4(z.rgb, 1.0)", 0, false);

/// `z.r`, `z.g` and `z.b` hold the upper, middle and lower depth byte.
fn derive_depth(format: DepthCopyFormat) -> CopyDerivation {
    match format {
        DepthCopyFormat::Z4 => CopyDerivation::new("z4", "z.rrrr", 4, false),
        DepthCopyFormat::Z8Alt => CopyDerivation::new("z8_alt", "z.rrrr", 0, false),
        DepthCopyFormat::Z8 => CopyDerivation::new("z8", "z.rrrr", 0, false),
        DepthCopyFormat::Z16 => CopyDerivation::new("z16", "z.rgrg", 0, false),
        DepthCopyFormat::Z24X8 => CopyDerivation::new("z24x8", "vec4(z.rgb, 1.0)", 0, false),
        DepthCopyFormat::Z8M => CopyDerivation::new("z8m", "z.gggg", 0, false),
        DepthCopyFormat::Z8L => CopyDerivation::new("z8l", "z.bbbb", 0, false),
        DepthCopyFormat::Z16R => CopyDerivation::new("z16r", "z.grgr", 0, false),
        DepthCopyFormat::Z16L => CopyDerivation::new("z16l", "z.gbgb", 0, false),
    }
}

// ─── Intensity Copies ────────────────────────────────────────────────────────

/// Luma with the source alpha, used for unrecognized intensity formats.
const INTENSITY_FALLBACK: CopyDerivation = CopyDerivation::new("fallback_ia8", "c", 8, true);

fn derive_intensity(format: IntensityFormat) -> CopyDerivation {
    match format {
        IntensityFormat::I4 => CopyDerivation::new("i4", "c.rrrr", 4, false),
        IntensityFormat::I8Alt => CopyDerivation::new("i8_alt", "c.rrrr", 8, false),
        IntensityFormat::I8 => CopyDerivation::new("i8", "c.rrrr", 8, false),
        IntensityFormat::IA4 => CopyDerivation::new("ia4", "c.rrra", 4, true),
        IntensityFormat::IA8 => CopyDerivation::new("ia8", "c.rrra", 8, true),
    }
}

fn derive(uid: &PixelUidData) -> CopyDerivation {
    let raw = uid.copy_format;
    let (field, derived, fallback) = if uid.is_depth_copy {
        (
            "depth copy format",
            DepthCopyFormat::from_raw(raw).map(derive_depth),
            DEPTH_FALLBACK,
        )
    } else if uid.is_intensity {
        (
            "intensity copy format",
            IntensityFormat::from_raw(raw).map(derive_intensity),
            INTENSITY_FALLBACK,
        )
    } else {
        (
            "copy format",
            CopyFormat::from_raw(raw).map(derive_color),
            COLOR_FALLBACK,
        )
    };

    derived.unwrap_or_else(|| {
        report_unrecognized(field, u32::from(raw));
        fallback
    })
}

// ─── Generation ──────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Quantize {
    component: &'static str,
    levels: String,
}

#[derive(Serialize)]
struct PixelContext {
    stage: &'static str,
    format_name: &'static str,
    swizzle: &'static str,
    quantize: Vec<Quantize>,
    is_depth_copy: bool,
    is_intensity: bool,
    scale_by_half: bool,
    force_opaque: bool,
}

/// Generates the pixel-stage source for a copy uid.
///
/// An unrecognized format selector is logged and converted with the copy
/// mode's full-channel identity.
pub fn generate_pixel_source(uid: &PixelUidData) -> Result<String> {
    let derivation = derive(uid);

    let quantize = ["r", "g", "b", "a"]
        .into_iter()
        .zip(derivation.bits)
        .filter(|&(_, bits)| bits != 0)
        .map(|(component, bits)| Quantize {
            component,
            levels: format!("{}.0", (1u32 << bits) - 1),
        })
        .collect();

    let ctx = PixelContext {
        stage: "pixel",
        format_name: derivation.name,
        swizzle: derivation.swizzle,
        quantize,
        is_depth_copy: uid.is_depth_copy,
        is_intensity: uid.is_intensity,
        scale_by_half: uid.scale_by_half,
        force_opaque: derivation.reads_alpha && !uid.efb_has_alpha,
    };

    render("pixel", &ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uid(format: u8) -> PixelUidData {
        PixelUidData {
            copy_format: format,
            ..PixelUidData::default()
        }
    }

    fn depth(format: u8) -> PixelUidData {
        PixelUidData {
            is_depth_copy: true,
            ..uid(format)
        }
    }

    fn intensity(format: u8) -> PixelUidData {
        PixelUidData {
            is_intensity: true,
            ..uid(format)
        }
    }

    #[test]
    fn test_every_known_format_generates() {
        for format in CopyFormat::ALL {
            let source = generate_pixel_source(&uid(format.raw())).unwrap();
            assert!(source.contains(derive_color(format).name), "{source}");
        }
        for format in DepthCopyFormat::ALL {
            let source = generate_pixel_source(&depth(format.raw())).unwrap();
            assert!(source.contains(derive_depth(format).name), "{source}");
        }
        for format in IntensityFormat::ALL {
            let source = generate_pixel_source(&intensity(format.raw())).unwrap();
            assert!(source.contains(derive_intensity(format).name), "{source}");
        }
    }

    #[test]
    fn test_unrecognized_format_falls_back() {
        let source = generate_pixel_source(&uid(200)).unwrap();
        assert!(!source.is_empty());
        assert!(source.contains(COLOR_FALLBACK.name));

        let rgba8 = generate_pixel_source(&uid(CopyFormat::Rgba8.raw())).unwrap();
        let strip = |s: &str| s.replace(COLOR_FALLBACK.name, "").replace("rgba8", "");
        assert_eq!(strip(&source), strip(&rgba8));
    }

    #[test]
    fn test_each_mode_has_its_own_format_table() {
        // RA4 is a color format but not a depth one.
        let source = generate_pixel_source(&depth(CopyFormat::RA4.raw())).unwrap();
        assert!(source.contains(DEPTH_FALLBACK.name), "{source}");

        // RGB565 is a color format but not an intensity one.
        let source = generate_pixel_source(&intensity(CopyFormat::Rgb565.raw())).unwrap();
        assert!(source.contains(INTENSITY_FALLBACK.name), "{source}");

        // Selector 9 is G8 for color and Z8M for depth.
        assert!(generate_pixel_source(&uid(9)).unwrap().contains("// copy format: g8"));
        assert!(generate_pixel_source(&depth(9)).unwrap().contains("// copy format: z8m"));
    }

    #[test]
    fn test_depth_fallback_matches_z24x8() {
        let fallback = generate_pixel_source(&depth(2)).unwrap();
        let z24x8 = generate_pixel_source(&depth(DepthCopyFormat::Z24X8.raw())).unwrap();
        let strip = |s: &str| s.replace(DEPTH_FALLBACK.name, "").replace("z24x8", "");
        assert_eq!(strip(&fallback), strip(&z24x8));
    }

    #[test]
    fn test_alpha_forced_opaque_without_framebuffer_alpha() {
        let opaque = generate_pixel_source(&uid(CopyFormat::Rgba8.raw())).unwrap();
        assert!(opaque.contains("c.a = 1.0;"));

        let with_alpha = generate_pixel_source(&PixelUidData {
            efb_has_alpha: true,
            ..uid(CopyFormat::Rgba8.raw())
        })
        .unwrap();
        assert!(!with_alpha.contains("c.a = 1.0;"));

        let rgb565 = generate_pixel_source(&uid(CopyFormat::Rgb565.raw())).unwrap();
        assert!(!rgb565.contains("c.a = 1.0;"));

        let ia8 = generate_pixel_source(&intensity(IntensityFormat::IA8.raw())).unwrap();
        assert!(ia8.contains("c.a = 1.0;"));
    }

    #[test]
    fn test_rgb565_quantization_levels() {
        let source = generate_pixel_source(&uid(CopyFormat::Rgb565.raw())).unwrap();
        assert!(source.contains("ocol0.r = round(ocol0.r * 31.0) / 31.0;"));
        assert!(source.contains("ocol0.g = round(ocol0.g * 63.0) / 63.0;"));
        assert!(!source.contains("ocol0.a = round"));
    }

    #[test]
    fn test_flags_change_source() {
        let base = generate_pixel_source(&uid(3)).unwrap();
        let half = generate_pixel_source(&PixelUidData {
            scale_by_half: true,
            ..uid(3)
        })
        .unwrap();
        let luma = generate_pixel_source(&intensity(3)).unwrap();
        assert_ne!(base, half);
        assert_ne!(base, luma);
        assert_ne!(half, luma);
    }
}
