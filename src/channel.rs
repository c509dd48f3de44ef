//! A single device-resident scalar driven through repeated dispatches.
//!
//! Lifecycle: `Idle -> Written -> Readable -> Spent`. `run_iterations`
//! performs every (dispatch, barrier) pair in one call, with no readback in
//! between, so the scalar accumulates entirely on the device.

use std::fmt;
use std::marker::PhantomData;

use thiserror::Error;
use tracing::debug;

use crate::device::Device;
use crate::error::HarnessError;
use crate::kernel::ProgramHandle;
use crate::scalar::Scalar;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Written,
    Readable { iterations: u32 },
    Spent,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelState::Idle => f.write_str("idle"),
            ChannelState::Written => f.write_str("written"),
            ChannelState::Readable { iterations } => {
                write!(f, "readable after {} iterations", iterations)
            }
            ChannelState::Spent => f.write_str("spent"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("cannot {operation} scalar channel '{label}' while it is {state}")]
pub struct ChannelError {
    pub label: String,
    pub operation: &'static str,
    pub state: ChannelState,
}

pub struct ScalarChannel<'d, D: Device, T: Scalar> {
    device: &'d D,
    label: String,
    buffer: D::Buffer,
    state: ChannelState,
    _scalar: PhantomData<T>,
}

impl<'d, D: Device, T: Scalar> ScalarChannel<'d, D, T> {
    /// Allocate storage for one `T` bound at the slot of `T`'s precision.
    pub fn new(device: &'d D, label: &str) -> Self {
        let size = std::mem::size_of::<T>() as u64;
        let buffer = device.allocate(label, size, T::PRECISION.slot());
        Self {
            device,
            label: label.to_string(),
            buffer,
            state: ChannelState::Idle,
            _scalar: PhantomData,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    fn expect_state(&self, operation: &'static str, ok: bool) -> Result<(), ChannelError> {
        if ok {
            Ok(())
        } else {
            Err(ChannelError {
                label: self.label.clone(),
                operation,
                state: self.state,
            })
        }
    }

    /// Copy the starting value to the device.
    pub fn write(&mut self, value: T) -> Result<(), ChannelError> {
        self.expect_state("write", self.state == ChannelState::Idle)?;
        self.device.upload(&self.buffer, bytemuck::bytes_of(&value));
        self.state = ChannelState::Written;
        Ok(())
    }

    /// Run `program` `n` times, each dispatch followed by a full barrier.
    pub fn run_iterations(
        &mut self,
        program: &ProgramHandle<'d, D>,
        n: u32,
    ) -> Result<(), ChannelError> {
        self.expect_state("run", self.state == ChannelState::Written)?;
        debug!(channel = %self.label, program = %program.name(), iterations = n, "dispatching");
        for _ in 0..n {
            self.device.dispatch(program.raw(), &self.buffer);
            self.device.barrier();
        }
        self.state = ChannelState::Readable { iterations: n };
        Ok(())
    }

    /// Copy the scalar back to the host. Only valid once, after all
    /// iterations have run.
    pub fn read(&mut self) -> Result<T, HarnessError> {
        self.expect_state(
            "read",
            matches!(self.state, ChannelState::Readable { .. }),
        )?;
        let bytes = self.device.download(&self.buffer)?;
        let width = std::mem::size_of::<T>();
        if bytes.len() < width {
            return Err(crate::device::DeviceError::SizeMismatch {
                expected: width,
                got: bytes.len(),
            }
            .into());
        }
        self.state = ChannelState::Spent;
        Ok(bytemuck::pod_read_unaligned(&bytes[..width]))
    }
}
