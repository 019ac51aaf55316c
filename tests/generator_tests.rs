//! Source Generator Tests
//!
//! Tests for:
//! - Determinism: equal keys generate byte-identical source
//! - Fallback derivations for unrecognized state values
//! - Stage interface between vertex, geometry and pixel sources
//! - Generated text pinned to GENERATOR_VERSION

mod common;

use std::env;
use std::fmt::Write as _;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use vesta::generator::{
    GENERATOR_VERSION, ProgramGenerator, ShaderGenerator, generate_geometry_source,
    generate_pixel_source, generate_vertex_source,
};
use vesta::pipeline_key::PipelineKey;
use vesta::state::{CopyFormat, CopyState, PrimitiveType, RasterState, RenderState, VertexState};
use vesta::uid::{GeometryUidData, PixelUidData, VertexUidData};

fn state_grid() -> Vec<RenderState> {
    let mut states = Vec::new();
    for format in CopyFormat::ALL {
        for primitive in [PrimitiveType::Points, PrimitiveType::Lines, PrimitiveType::Triangles] {
            for flags in 0u8..4 {
                states.push(RenderState {
                    copy: CopyState {
                        format: format.raw(),
                        is_depth_copy: flags & 1 != 0,
                        is_intensity: flags & 2 != 0,
                        scale_by_half: flags == 3,
                        efb_has_alpha: flags & 1 == 0,
                    },
                    vertex: VertexState {
                        components: 0b1 | (u32::from(flags) << 1) | (0b1_0000 << flags),
                        num_texgens: flags * 2,
                        lighting: flags & 1 == 0,
                    },
                    raster: RasterState {
                        primitive: primitive.raw(),
                        stereo: flags & 2 != 0,
                        wireframe: flags & 1 != 0,
                    },
                });
            }
        }
    }
    states
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn equal_keys_generate_identical_source() {
    let generator = ShaderGenerator;
    for state in state_grid() {
        let key = PipelineKey::from_state(&state);
        let decoded = PipelineKey::from_bytes(&key.to_bytes()).unwrap();

        let first = generator.sources(&key).unwrap();
        let second = generator.sources(&decoded).unwrap();
        assert_eq!(first, second, "{key:?}");
    }
}

#[test]
fn fresh_generator_matches_previous_one() {
    let key = PipelineKey::from_state(&state_grid()[17]);
    let a = ShaderGenerator.sources(&key).unwrap();
    let b = ShaderGenerator::default().sources(&key).unwrap();
    assert_eq!(a, b);
}

// ============================================================================
// Fallbacks
// ============================================================================

#[test]
fn unrecognized_copy_format_still_generates() {
    common::init_logger();
    for format in [13u8, 64, 255] {
        let source = generate_pixel_source(&PixelUidData {
            copy_format: format,
            ..PixelUidData::default()
        })
        .unwrap();
        assert!(!source.is_empty());
        assert!(source.contains("ocol0"));
    }
}

#[test]
fn depth_and_intensity_copies_use_their_own_formats() {
    common::init_logger();
    // Valid color selectors that neither mode recognizes.
    let depth = generate_pixel_source(&PixelUidData {
        copy_format: 2,
        is_depth_copy: true,
        ..PixelUidData::default()
    })
    .unwrap();
    assert!(depth.contains("// copy format: fallback_z24x8"), "{depth}");

    let intensity = generate_pixel_source(&PixelUidData {
        copy_format: 4,
        is_intensity: true,
        ..PixelUidData::default()
    })
    .unwrap();
    assert!(intensity.contains("// copy format: fallback_ia8"), "{intensity}");

    let z16 = generate_pixel_source(&PixelUidData {
        copy_format: 3,
        is_depth_copy: true,
        ..PixelUidData::default()
    })
    .unwrap();
    assert!(z16.contains("// copy format: z16"), "{z16}");
}

#[test]
fn unrecognized_primitive_still_generates() {
    common::init_logger();
    let source = generate_geometry_source(&GeometryUidData {
        primitive: 99,
        num_texgens: 0,
        stereo: true,
        wireframe: false,
    })
    .unwrap();
    assert!(source.contains("layout(triangles) in;"));
}

#[test]
fn oversized_texgen_count_still_generates() {
    common::init_logger();
    let source = generate_vertex_source(&VertexUidData {
        num_texgens: 200,
        ..VertexUidData::default()
    })
    .unwrap();
    assert!(source.contains("vec3 tex[8];"));
}

// ============================================================================
// Stage interface
// ============================================================================

#[test]
fn vertex_and_geometry_agree_on_varyings() {
    let key = PipelineKey::from_state(&RenderState {
        vertex: VertexState {
            components: 0b1_0001,
            num_texgens: 2,
            lighting: false,
        },
        raster: RasterState {
            primitive: PrimitiveType::Lines.raw(),
            stereo: false,
            wireframe: false,
        },
        ..RenderState::default()
    });
    let sources = ShaderGenerator.sources(&key).unwrap();
    let geometry = sources.geometry.unwrap();

    assert!(sources.vertex.contains("out VertexData"));
    assert!(geometry.contains("} gs_in[];"));
    assert!(sources.vertex.contains("vec3 tex[2];"));
    assert!(geometry.contains("vec3 tex[2];"));
}

#[test]
fn every_stage_declares_glsl_330() {
    for state in state_grid() {
        let sources = ShaderGenerator.sources(&PipelineKey::from_state(&state)).unwrap();
        assert!(sources.vertex.starts_with("#version 330 core"));
        assert!(sources.pixel.starts_with("#version 330 core"));
        if let Some(geometry) = &sources.geometry {
            assert!(geometry.starts_with("#version 330 core"));
        }
    }
}

// ============================================================================
// Version pinning
// ============================================================================

/// One line per key: key bytes, then the xxh3 of every stage's text.
fn source_digest() -> String {
    let generator = ShaderGenerator;
    let mut digest = String::new();
    for state in state_grid() {
        let key = PipelineKey::from_state(&state);
        let sources = generator.sources(&key).unwrap();
        let text = [
            sources.vertex.as_str(),
            sources.geometry.as_deref().unwrap_or(""),
            sources.pixel.as_str(),
        ]
        .join("\0");

        let key_hex: String = key.to_bytes().iter().map(|b| format!("{b:02x}")).collect();
        let hash = xxhash_rust::xxh3::xxh3_64(text.as_bytes());
        writeln!(digest, "{key_hex} {hash:016x}").unwrap();
    }
    digest
}

/// The digest for the current version is recorded in `tests/golden` the first
/// time it is missing; set `VESTA_BLESS=1` to re-record it deliberately.
#[test]
fn generated_sources_match_pinned_version() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/golden")
        .join(format!("sources.v{GENERATOR_VERSION}.txt"));
    let digest = source_digest();

    match fs::read_to_string(&path) {
        Ok(pinned) if env::var_os("VESTA_BLESS").is_none() => {
            assert!(
                pinned == digest,
                "generated source differs from {}; bump GENERATOR_VERSION",
                path.display()
            );
        }
        Err(err) if err.kind() != ErrorKind::NotFound => panic!("{}: {err}", path.display()),
        _ => {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, &digest).unwrap();
        }
    }
}
