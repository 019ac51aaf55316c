//! Shared test driver.

#![allow(dead_code)]

use vesta::driver::{DriverError, ProgramBinary, ProgramDriver, ShaderStage};

/// In-memory driver that records every call.
///
/// With `binaries` set, a program's "binary" is its id in a private format
/// that `load_binary` accepts unless `reject_binaries` is set.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    pub fingerprint: String,
    pub binaries: bool,
    pub reject_binaries: bool,
    /// Source substring that makes `compile_stage` fail.
    pub poison: Option<String>,

    pub compile_calls: usize,
    pub link_calls: usize,
    pub binary_loads: usize,
    pub live_stages: usize,
    pub live_programs: usize,

    next_id: u32,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self {
            fingerprint: "recording-driver 1.0".into(),
            ..Self::default()
        }
    }

    pub fn with_binaries() -> Self {
        Self {
            binaries: true,
            ..Self::new()
        }
    }

    /// Fails every stage whose source contains `needle`.
    pub fn with_poison(mut self, needle: &str) -> Self {
        self.poison = Some(needle.to_owned());
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: &str) -> Self {
        self.fingerprint = fingerprint.to_owned();
        self
    }

    pub fn rejecting_binaries(mut self) -> Self {
        self.reject_binaries = true;
        self
    }

    pub fn driver_calls(&self) -> usize {
        self.compile_calls + self.link_calls + self.binary_loads
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }
}

impl ProgramDriver for RecordingDriver {
    type Stage = u32;
    type Program = u32;

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }

    fn compile_stage(&mut self, stage: ShaderStage, source: &str) -> Result<u32, DriverError> {
        self.compile_calls += 1;
        if let Some(poison) = &self.poison
            && source.contains(poison.as_str())
        {
            return Err(DriverError::Compile {
                stage,
                log: format!("0:1: error: '{poison}' : undeclared identifier"),
            });
        }
        self.live_stages += 1;
        Ok(self.next())
    }

    fn link(&mut self, stages: &[u32]) -> Result<u32, DriverError> {
        self.link_calls += 1;
        if stages.is_empty() {
            return Err(DriverError::Link("no stages attached".into()));
        }
        self.live_programs += 1;
        Ok(self.next())
    }

    fn destroy_stage(&mut self, _stage: u32) {
        self.live_stages -= 1;
    }

    fn destroy(&mut self, _program: u32) {
        self.live_programs -= 1;
    }

    fn supports_binaries(&self) -> bool {
        self.binaries
    }

    fn program_binary(&mut self, program: u32) -> Option<ProgramBinary> {
        self.binaries.then(|| ProgramBinary {
            format: 0xB1,
            data: program.to_le_bytes().to_vec(),
        })
    }

    fn load_binary(&mut self, binary: &ProgramBinary) -> Result<u32, DriverError> {
        if self.reject_binaries || binary.format != 0xB1 {
            return Err(DriverError::BinaryRejected("driver updated".into()));
        }
        self.binary_loads += 1;
        self.live_programs += 1;
        Ok(self.next())
    }
}

/// Installs a test logger once per binary.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
