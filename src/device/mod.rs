//! Device collaborator.
//!
//! The harness never talks to a graphics API directly. Everything it needs
//! from a GPU (compile, link, scalar storage, dispatch, barrier, readback)
//! goes through [`Device`]. [`crate::gpu::WgpuDevice`] is the real implementation.

#[cfg(test)]
pub(crate) mod fake;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("no GPU adapter available for backends '{0}'")]
    NoAdapter(String),

    #[error("GPU device request failed: {0}")]
    RequestDevice(String),

    #[error("GPU readback failed: {0}")]
    Readback(String),

    #[error("readback returned {got} bytes, expected {expected}")]
    SizeMismatch { expected: usize, got: usize },
}

/// Low-level compute operations consumed by the harness.
///
/// Object lifetimes are explicit: every `create_*` is paired with a
/// `destroy_*` by the RAII wrappers in [`crate::kernel::compile`].
pub trait Device {
    type Shader;
    type Program;
    type Buffer;

    /// Submit one kernel body for compilation. Always returns an object;
    /// failure is reported by [`Device::shader_log`].
    fn create_shader(&self, label: &str, source: &str) -> Self::Shader;
    /// `None` when the shader compiled, otherwise the compiler log.
    fn shader_log(&self, shader: &Self::Shader) -> Option<String>;
    fn destroy_shader(&self, shader: Self::Shader);

    /// Attach `shaders` to a new program and link it.
    fn create_program(&self, label: &str, shaders: &[&Self::Shader]) -> Self::Program;
    /// `None` when the program linked, otherwise the linker log.
    fn program_log(&self, program: &Self::Program) -> Option<String>;
    fn destroy_program(&self, program: Self::Program);

    /// Allocate `size` bytes of device storage visible to kernels at `slot`.
    fn allocate(&self, label: &str, size: u64, slot: u32) -> Self::Buffer;
    fn upload(&self, buffer: &Self::Buffer, bytes: &[u8]);
    /// Run `program` once over the storage bound at `buffer`'s slot.
    fn dispatch(&self, program: &Self::Program, buffer: &Self::Buffer);
    /// Make every memory effect of earlier dispatches visible to later ones.
    fn barrier(&self);
    fn download(&self, buffer: &Self::Buffer) -> Result<Vec<u8>, DeviceError>;
}
