//! Kernel sources: splitting a multiplexed file, compiling, linking.

pub mod compile;
pub mod source;

pub use compile::{compile, compile_all, link, CompiledUnit, ProgramHandle};
pub use source::{lint, split, KernelUnit, SourceError, SourceFormat};

/// The precision kernels shipped with the crate (`kernels/precision.glsl`).
pub const BUNDLED_KERNELS: &str = include_str!("../../kernels/precision.glsl");
