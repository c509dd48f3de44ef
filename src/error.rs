//! Error taxonomy for a harness run.
//!
//! Every variant is fatal: it propagates to `main`, is rendered once, and
//! ends the process with a non-zero status.

use std::path::PathBuf;

use thiserror::Error;

use crate::channel::ChannelError;
use crate::config::ConfigError;
use crate::device::DeviceError;
use crate::kernel::source::SourceError;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("could not open kernel file '{}': {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A kernel unit was rejected by the device compiler. `log` is verbatim.
    #[error("kernel '{name}' failed to compile:\n{log}")]
    Compile { name: String, log: String },

    /// A program was rejected by the device linker. `log` is verbatim.
    #[error("program '{name}' failed to link:\n{log}")]
    Link { name: String, log: String },

    #[error("test index {index} is out of range (tests run from 1 to {available})")]
    CaseIndex { index: u32, available: usize },

    #[error(
        "test {index} needs kernel unit #{position} but the source holds only {count} units"
    )]
    UnitIndex {
        index: u32,
        position: usize,
        count: usize,
    },

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("cannot serialize report: {0}")]
    Report(#[from] serde_json::Error),
}

impl HarnessError {
    /// Name of the kernel or program a compile/link failure belongs to.
    pub fn kernel_name(&self) -> Option<&str> {
        match self {
            HarnessError::Compile { name, .. } | HarnessError::Link { name, .. } => Some(name),
            _ => None,
        }
    }
}
