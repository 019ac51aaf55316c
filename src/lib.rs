#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

//! Runtime graphics-program cache.
//!
//! A [`PipelineKey`] is derived from a [`RenderState`] snapshot, GLSL is
//! generated for it deterministically, and the linked program is memoized in
//! a [`ProgramCache`] that persists every new build to an append-only
//! [`DiskCache`] and replays it on the next start.

pub mod cache;
pub mod checker;
pub mod checksum;
pub mod disk_cache;
pub mod driver;
pub mod errors;
pub mod generator;
pub mod pipeline_key;
pub mod prewarm;
pub mod program;
pub mod settings;
pub mod state;
pub mod uid;

pub use cache::{CacheStats, ProgramCache};
pub use disk_cache::{CacheHeader, DiskCache, ReadSummary};
pub use driver::{DriverError, ProgramBinary, ProgramDriver, ShaderStage};
pub use errors::{Result, VestaError};
pub use generator::{GENERATOR_VERSION, ProgramGenerator, ProgramSources, ShaderGenerator};
pub use pipeline_key::PipelineKey;
pub use prewarm::{PrewarmReport, PrewarmedProgram, Prewarmer};
pub use program::{CacheEntry, CompiledProgram};
pub use settings::{CacheSettings, ReplayMode};
pub use state::RenderState;
pub use uid::{GeometryShaderUid, PixelShaderUid, ShaderUid, VertexShaderUid};

#[cfg(feature = "gl")]
pub use driver::gl::GlDriver;
