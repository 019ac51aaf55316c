//! Graphics driver boundary.
//!
//! The cache only ever asks a driver to compile a stage, link stages into a
//! program, hand out or accept a precompiled program binary, and destroy what
//! it created. Handles are opaque: the cache compares them and passes them
//! back, nothing more.
//!
//! Every method is called from the thread that owns the graphics context.

#[cfg(feature = "gl")]
pub mod gl;

use std::fmt;

use thiserror::Error;

/// One independently generated unit of a graphics pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Pixel,
}

impl ShaderStage {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Geometry => "geometry",
            Self::Pixel => "pixel",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Failure reported by a driver adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("{stage} stage rejected: {log}")]
    Compile { stage: ShaderStage, log: String },

    #[error("link rejected: {0}")]
    Link(String),

    /// A stored program binary was not accepted (driver update, format change).
    #[error("program binary rejected: {0}")]
    BinaryRejected(String),

    #[error("program binaries are not supported by this driver")]
    BinaryUnsupported,

    /// The driver could not allocate an object.
    #[error("driver resource error: {0}")]
    Resource(String),
}

/// Driver-specific precompiled program, as persisted in the disk cache.
///
/// Encoded as `format: u32 LE` followed by the raw binary. An empty disk
/// value means no binary was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramBinary {
    pub format: u32,
    pub data: Vec<u8>,
}

impl ProgramBinary {
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.data.len());
        out.extend_from_slice(&self.format.to_le_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    /// Decodes a disk value. `None` for an empty or malformed value.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (format, data) = bytes.split_first_chunk::<4>()?;
        if data.is_empty() {
            return None;
        }
        Some(Self {
            format: u32::from_le_bytes(*format),
            data: data.to_vec(),
        })
    }
}

/// Adapter around a graphics API's program objects.
pub trait ProgramDriver {
    /// Compiled, not yet linked, stage object.
    type Stage;

    /// Linked program handle.
    type Program: Copy + Eq + fmt::Debug;

    /// Identifies the driver build. Persisted programs are only replayed
    /// under the fingerprint they were written with.
    fn fingerprint(&self) -> String;

    fn compile_stage(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<Self::Stage, DriverError>;

    fn link(&mut self, stages: &[Self::Stage]) -> Result<Self::Program, DriverError>;

    fn destroy_stage(&mut self, stage: Self::Stage);

    fn destroy(&mut self, program: Self::Program);

    fn supports_binaries(&self) -> bool {
        false
    }

    fn program_binary(&mut self, _program: Self::Program) -> Option<ProgramBinary> {
        None
    }

    fn load_binary(&mut self, _binary: &ProgramBinary) -> Result<Self::Program, DriverError> {
        Err(DriverError::BinaryUnsupported)
    }
}
