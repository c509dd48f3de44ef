pub mod case;
pub mod channel;
pub mod config;
pub mod device;
pub mod diagnostic;
pub mod error;
pub mod gpu;
pub mod harness;
pub mod kernel;
pub mod oracle;
pub mod report;
pub mod scalar;
pub mod span;

// Re-exports used by the CLI and integration tests
pub use case::{lookup, TestCase, CASES};
pub use config::HarnessConfig;
pub use device::{Device, DeviceError};
pub use error::HarnessError;
pub use harness::{run, run_source};
pub use kernel::{split, KernelUnit, SourceFormat, BUNDLED_KERNELS};
pub use report::RunReport;
pub use scalar::{Precision, Scalar};
