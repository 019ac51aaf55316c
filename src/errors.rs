//! Error Types
//!
//! This module defines the error types used throughout the program cache.
//!
//! # Overview
//!
//! The main error type [`VestaError`] covers every failure mode of the cache:
//! - Unrecognized render-state values seen by a source generator
//! - Driver compile and link failures
//! - Corrupt or stale disk-cache records
//! - Determinism violations caught by the debug collision checker
//!
//! Only compile and link failures ever reach a caller of
//! [`ProgramCache::get_or_create`](crate::cache::ProgramCache::get_or_create);
//! the remaining kinds are recovered locally and reported through `log`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use vesta::errors::{VestaError, Result};
//!
//! fn open_store() -> Result<()> {
//!     Ok(())
//! }
//! ```

use thiserror::Error;

use crate::driver::{DriverError, ShaderStage};

/// The main error type for the program cache.
#[derive(Error, Debug)]
pub enum VestaError {
    // ========================================================================
    // Source Generation
    // ========================================================================
    /// A generator received a state value outside its known enumeration.
    ///
    /// Never fatal: the generator logs this and falls back to its documented
    /// default derivation.
    #[error("Unrecognized {field} value: {value}")]
    UnrecognizedFormat {
        /// Name of the state field that carried the value
        field: &'static str,
        /// The raw value
        value: u32,
    },

    /// A shader template failed to render.
    #[error("Shader template error: {0}")]
    Template(String),

    // ========================================================================
    // Driver Errors
    // ========================================================================
    /// The driver rejected the generated source of one stage.
    #[error("Failed to compile {stage} stage: {log}")]
    CompileFailure {
        /// Stage that failed to compile
        stage: ShaderStage,
        /// Driver info log
        log: String,
    },

    /// The driver failed to link the compiled stages into a program.
    #[error("Failed to link program: {0}")]
    LinkFailure(String),

    // ========================================================================
    // Disk Cache Errors
    // ========================================================================
    /// A persisted record failed validation.
    #[error("Corrupt disk cache record at offset {offset}: {reason}")]
    CorruptRecord {
        /// Byte offset of the record inside the store file
        offset: u64,
        /// What check failed
        reason: &'static str,
    },

    /// The store was written by a different generator or driver.
    #[error("Disk cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Header description of the running process
        expected: String,
        /// Header description found in the file
        found: String,
    },

    /// Key bytes that do not decode to a canonical pipeline key.
    #[error("Invalid pipeline key: {0}")]
    InvalidKey(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // ========================================================================
    // Debug Instrumentation
    // ========================================================================
    /// The same uid regenerated different source text.
    #[error("Determinism violation in {stage} generator for uid {uid}")]
    DeterminismViolation {
        /// Stage family whose generator misbehaved
        stage: ShaderStage,
        /// Debug rendering of the offending uid
        uid: String,
    },
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<minijinja::Error> for VestaError {
    fn from(err: minijinja::Error) -> Self {
        VestaError::Template(err.to_string())
    }
}

impl From<DriverError> for VestaError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Compile { stage, log } => VestaError::CompileFailure { stage, log },
            DriverError::Link(log) => VestaError::LinkFailure(log),
            other => VestaError::LinkFailure(other.to_string()),
        }
    }
}

/// Alias for `Result<T, VestaError>`.
pub type Result<T> = std::result::Result<T, VestaError>;
