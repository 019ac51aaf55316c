//! OpenGL driver over [`glow`].
//!
//! # Safety
//!
//! Every method issues raw GL calls. [`GlDriver::new`] is `unsafe` because
//! the caller has to guarantee what the trait methods cannot check: the
//! context stays current on the calling thread for as long as the driver is
//! used.

use glow::HasContext;

use super::{DriverError, ProgramBinary, ProgramDriver, ShaderStage};

/// [`ProgramDriver`] for a desktop GL 3.3+ context.
pub struct GlDriver {
    gl: glow::Context,
    binary_formats: i32,
}

impl GlDriver {
    /// Wraps a context.
    ///
    /// # Safety
    ///
    /// `gl` must be current on this thread whenever a driver method runs.
    pub unsafe fn new(gl: glow::Context) -> Self {
        // SAFETY: the context is current per the caller's contract.
        let binary_formats = unsafe { gl.get_parameter_i32(glow::NUM_PROGRAM_BINARY_FORMATS) };
        log::debug!("GL driver: {binary_formats} program binary formats");
        Self { gl, binary_formats }
    }

    #[must_use]
    pub fn context(&self) -> &glow::Context {
        &self.gl
    }

    pub fn into_context(self) -> glow::Context {
        self.gl
    }
}

fn shader_type(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Geometry => glow::GEOMETRY_SHADER,
        ShaderStage::Pixel => glow::FRAGMENT_SHADER,
    }
}

impl ProgramDriver for GlDriver {
    type Stage = glow::NativeShader;
    type Program = glow::NativeProgram;

    fn fingerprint(&self) -> String {
        // SAFETY: context current (see `GlDriver::new`).
        unsafe {
            format!(
                "{}|{}|{}",
                self.gl.get_parameter_string(glow::VENDOR),
                self.gl.get_parameter_string(glow::RENDERER),
                self.gl.get_parameter_string(glow::VERSION),
            )
        }
    }

    fn compile_stage(
        &mut self,
        stage: ShaderStage,
        source: &str,
    ) -> Result<Self::Stage, DriverError> {
        // SAFETY: context current (see `GlDriver::new`).
        unsafe {
            let shader = self
                .gl
                .create_shader(shader_type(stage))
                .map_err(DriverError::Resource)?;
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            if self.gl.get_shader_compile_status(shader) {
                return Ok(shader);
            }
            let log = self.gl.get_shader_info_log(shader);
            self.gl.delete_shader(shader);
            Err(DriverError::Compile { stage, log })
        }
    }

    fn link(&mut self, stages: &[Self::Stage]) -> Result<Self::Program, DriverError> {
        // SAFETY: context current (see `GlDriver::new`).
        unsafe {
            let program = self.gl.create_program().map_err(DriverError::Resource)?;
            if self.binary_formats > 0 {
                self.gl.program_parameter_i32(
                    program,
                    glow::PROGRAM_BINARY_RETRIEVABLE_HINT,
                    glow::TRUE as i32,
                );
            }
            for &shader in stages {
                self.gl.attach_shader(program, shader);
            }
            self.gl.link_program(program);
            for &shader in stages {
                self.gl.detach_shader(program, shader);
            }
            if self.gl.get_program_link_status(program) {
                return Ok(program);
            }
            let log = self.gl.get_program_info_log(program);
            self.gl.delete_program(program);
            Err(DriverError::Link(log))
        }
    }

    fn destroy_stage(&mut self, stage: Self::Stage) {
        // SAFETY: context current (see `GlDriver::new`).
        unsafe { self.gl.delete_shader(stage) }
    }

    fn destroy(&mut self, program: Self::Program) {
        // SAFETY: context current (see `GlDriver::new`).
        unsafe { self.gl.delete_program(program) }
    }

    fn supports_binaries(&self) -> bool {
        self.binary_formats > 0
    }

    fn program_binary(&mut self, program: Self::Program) -> Option<ProgramBinary> {
        // SAFETY: context current (see `GlDriver::new`).
        let binary = unsafe { self.gl.get_program_binary(program) }?;
        if binary.buffer.is_empty() {
            return None;
        }
        Some(ProgramBinary {
            format: binary.format,
            data: binary.buffer,
        })
    }

    fn load_binary(&mut self, binary: &ProgramBinary) -> Result<Self::Program, DriverError> {
        let native = glow::ProgramBinary {
            buffer: binary.data.clone(),
            format: binary.format,
        };
        // SAFETY: context current (see `GlDriver::new`).
        unsafe {
            let program = self.gl.create_program().map_err(DriverError::Resource)?;
            self.gl.program_binary(program, &native);
            if self.gl.get_program_link_status(program) {
                return Ok(program);
            }
            let log = self.gl.get_program_info_log(program);
            self.gl.delete_program(program);
            Err(DriverError::BinaryRejected(log))
        }
    }
}
