//! Program Source Generator
//!
//! Turns stage uids into GLSL. Each stage family decodes its uid into a
//! template context (every enumerated format value is handled explicitly in
//! Rust) and renders an embedded minijinja template with it.
//!
//! Generation is a pure function of the uid: the template environment is
//! built once and never mutated, contexts contain no maps with unstable
//! iteration order, and nothing is read from the outside world. Identical
//! uids therefore produce byte-identical source across calls and across
//! process runs, which is what makes persisted programs valid after a
//! restart.
//!
//! ## Versioning
//!
//! [`GENERATOR_VERSION`] is written into the disk-cache header. Bump it
//! whenever a template or a derivation changes the text produced for an
//! existing uid; the next start then discards the stale store wholesale.

mod geometry;
mod pixel;
mod vertex;

use std::borrow::Cow;
use std::sync::OnceLock;

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, Error, UndefinedBehavior};
use rust_embed::RustEmbed;
use serde::Serialize;

use crate::errors::{Result, VestaError};
use crate::pipeline_key::PipelineKey;
use crate::uid::{GeometryShaderUid, PixelShaderUid, VertexShaderUid};

pub use geometry::generate_geometry_source;
pub use pixel::generate_pixel_source;
pub use vertex::generate_vertex_source;

/// Version of the generation logic. Part of the disk-cache header.
pub const GENERATOR_VERSION: u32 = 2;

// ─── Sources ─────────────────────────────────────────────────────────────────

/// Source text of every stage of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSources {
    pub vertex: String,
    pub geometry: Option<String>,
    pub pixel: String,
}

// ─── Generator Trait ─────────────────────────────────────────────────────────

/// Source generators for all stage families.
///
/// Implementations must be deterministic: equal uids in, equal text out.
pub trait ProgramGenerator {
    /// Version of the generation logic; see [`GENERATOR_VERSION`].
    fn version(&self) -> u32;

    fn vertex_source(&self, uid: &VertexShaderUid) -> Result<String>;

    fn pixel_source(&self, uid: &PixelShaderUid) -> Result<String>;

    fn geometry_source(&self, uid: &GeometryShaderUid) -> Result<String>;

    /// Generates every stage a key needs.
    fn sources(&self, key: &PipelineKey) -> Result<ProgramSources> {
        Ok(ProgramSources {
            vertex: self.vertex_source(key.vertex())?,
            geometry: key
                .geometry()
                .map(|uid| self.geometry_source(uid))
                .transpose()?,
            pixel: self.pixel_source(key.pixel())?,
        })
    }
}

/// The built-in GLSL generators.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShaderGenerator;

impl ProgramGenerator for ShaderGenerator {
    fn version(&self) -> u32 {
        GENERATOR_VERSION
    }

    fn vertex_source(&self, uid: &VertexShaderUid) -> Result<String> {
        generate_vertex_source(uid.data())
    }

    fn pixel_source(&self, uid: &PixelShaderUid) -> Result<String> {
        generate_pixel_source(uid.data())
    }

    fn geometry_source(&self, uid: &GeometryShaderUid) -> Result<String> {
        generate_geometry_source(uid.data())
    }
}

// ─── Template Environment ────────────────────────────────────────────────────

static SHADER_ENV: OnceLock<Environment<'static>> = OnceLock::new();

#[derive(RustEmbed)]
#[folder = "src/generator/shaders"]
struct ShaderAssets;

fn get_env() -> &'static Environment<'static> {
    SHADER_ENV.get_or_init(|| {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()
            .expect("Failed to configure template syntax");

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(UndefinedBehavior::SemiStrict);

        env.set_loader(shader_loader);

        env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

        env
    })
}

fn shader_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = if std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("glsl"))
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.glsl"))
    };

    if let Some(file) = ShaderAssets::get(&filename)
        && let Ok(source) = std::str::from_utf8(file.data.as_ref())
    {
        return Ok(Some(source.to_string()));
    }

    Ok(None)
}

/// Renders one of the embedded stage templates.
fn render<S: Serialize>(template_name: &str, ctx: &S) -> Result<String> {
    let template = get_env().get_template(template_name)?;
    let source = template.render(ctx)?;
    if source.trim().is_empty() {
        return Err(VestaError::Template(format!(
            "template {template_name} rendered empty source"
        )));
    }
    Ok(source)
}

/// Logs an out-of-range state value before the caller applies its fallback.
fn report_unrecognized(field: &'static str, value: u32) {
    log::warn!(
        "{}; using fallback derivation",
        VestaError::UnrecognizedFormat { field, value }
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{CopyState, PrimitiveType, RasterState, RenderState, VertexState};

    fn sample_states() -> Vec<RenderState> {
        vec![
            RenderState::default(),
            RenderState {
                copy: CopyState {
                    format: 3,
                    is_depth_copy: false,
                    is_intensity: true,
                    scale_by_half: true,
                    efb_has_alpha: true,
                },
                vertex: VertexState {
                    components: 0b1111_0111,
                    num_texgens: 3,
                    lighting: true,
                },
                raster: RasterState {
                    primitive: PrimitiveType::Lines.raw(),
                    stereo: true,
                    wireframe: false,
                },
            },
        ]
    }

    #[test]
    fn test_sources_are_deterministic() {
        let generator = ShaderGenerator;
        for state in sample_states() {
            let key = PipelineKey::from_state(&state);
            let first = generator.sources(&key).unwrap();
            let second = generator.sources(&key).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_geometry_source_only_when_needed() {
        let generator = ShaderGenerator;
        let states = sample_states();

        let plain = generator.sources(&PipelineKey::from_state(&states[0])).unwrap();
        assert!(plain.geometry.is_none());

        let lines = generator.sources(&PipelineKey::from_state(&states[1])).unwrap();
        assert!(lines.geometry.is_some());
    }

    #[test]
    fn test_every_stage_starts_with_version_directive() {
        let generator = ShaderGenerator;
        let sources = generator
            .sources(&PipelineKey::from_state(&sample_states()[1]))
            .unwrap();
        for text in [&sources.vertex, sources.geometry.as_ref().unwrap(), &sources.pixel] {
            assert!(text.starts_with("#version 330 core"), "{text}");
        }
    }
}
