//! Scripted in-memory device for tests.
//!
//! Kernels are host closures registered against their exact source text.
//! Dispatches queue up and only touch storage at the next barrier, so a
//! missing barrier shows up as a stale readback. Every call is recorded and
//! live shader/program counts are tracked for leak checks.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::{Device, DeviceError};

pub(crate) type FakeKernel = Rc<dyn Fn(&mut [u8])>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    CreateShader(String),
    DestroyShader(String),
    CreateProgram(String),
    DestroyProgram(String),
    Allocate { label: String, size: u64, slot: u32 },
    Upload(usize),
    Dispatch(String),
    Barrier,
    Download(usize),
}

pub(crate) struct FakeShader {
    label: String,
    kernel: Option<FakeKernel>,
    log: Option<String>,
}

pub(crate) struct FakeProgram {
    label: String,
    kernel: Option<FakeKernel>,
    log: Option<String>,
}

pub(crate) struct FakeBuffer {
    index: usize,
}

#[derive(Default)]
pub(crate) struct FakeDevice {
    kernels: HashMap<String, FakeKernel>,
    link_failures: HashSet<String>,
    live_shaders: Cell<usize>,
    live_programs: Cell<usize>,
    buffers: RefCell<Vec<Vec<u8>>>,
    pending: RefCell<Vec<(FakeKernel, usize)>>,
    calls: RefCell<Vec<Call>>,
}

impl FakeDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_kernel(mut self, source: &str, kernel: FakeKernel) -> Self {
        self.kernels.insert(source.to_string(), kernel);
        self
    }

    pub(crate) fn with_wide_kernel(self, source: &str, step: impl Fn(f64) -> f64 + 'static) -> Self {
        self.with_kernel(
            source,
            Rc::new(move |bytes: &mut [u8]| {
                let value: f64 = bytemuck::pod_read_unaligned(&bytes[..8]);
                bytes[..8].copy_from_slice(bytemuck::bytes_of(&step(value)));
            }),
        )
    }

    pub(crate) fn with_narrow_kernel(
        self,
        source: &str,
        step: impl Fn(f32) -> f32 + 'static,
    ) -> Self {
        self.with_kernel(
            source,
            Rc::new(move |bytes: &mut [u8]| {
                let value: f32 = bytemuck::pod_read_unaligned(&bytes[..4]);
                bytes[..4].copy_from_slice(bytemuck::bytes_of(&step(value)));
            }),
        )
    }

    /// Programs created under `label` fail to link.
    pub(crate) fn failing_link(mut self, label: &str) -> Self {
        self.link_failures.insert(label.to_string());
        self
    }

    pub(crate) fn live_shaders(&self) -> usize {
        self.live_shaders.get()
    }

    pub(crate) fn live_programs(&self) -> usize {
        self.live_programs.get()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub(crate) fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl Device for FakeDevice {
    type Shader = FakeShader;
    type Program = FakeProgram;
    type Buffer = FakeBuffer;

    fn create_shader(&self, label: &str, source: &str) -> FakeShader {
        self.record(Call::CreateShader(label.to_string()));
        self.live_shaders.set(self.live_shaders.get() + 1);
        let kernel = self.kernels.get(source).cloned();
        let log = match kernel {
            Some(_) => None,
            None => Some(format!("ERROR: 0:1: '{}' : syntax error\n", label)),
        };
        FakeShader {
            label: label.to_string(),
            kernel,
            log,
        }
    }

    fn shader_log(&self, shader: &FakeShader) -> Option<String> {
        shader.log.clone()
    }

    fn destroy_shader(&self, shader: FakeShader) {
        self.record(Call::DestroyShader(shader.label));
        self.live_shaders.set(self.live_shaders.get() - 1);
    }

    fn create_program(&self, label: &str, shaders: &[&FakeShader]) -> FakeProgram {
        self.record(Call::CreateProgram(label.to_string()));
        self.live_programs.set(self.live_programs.get() + 1);
        let (kernel, log) = match shaders {
            _ if self.link_failures.contains(label) => (
                None,
                Some("ERROR: Linking compute stage: missing entry point 'main'\n".to_string()),
            ),
            [shader] if shader.log.is_none() => (shader.kernel.clone(), None),
            [shader] => (None, Some(format!("shader '{}' is not compiled\n", shader.label))),
            _ => (
                None,
                Some(format!("expected one compute shader, got {}\n", shaders.len())),
            ),
        };
        FakeProgram {
            label: label.to_string(),
            kernel,
            log,
        }
    }

    fn program_log(&self, program: &FakeProgram) -> Option<String> {
        program.log.clone()
    }

    fn destroy_program(&self, program: FakeProgram) {
        self.record(Call::DestroyProgram(program.label));
        self.live_programs.set(self.live_programs.get() - 1);
    }

    fn allocate(&self, label: &str, size: u64, slot: u32) -> FakeBuffer {
        self.record(Call::Allocate {
            label: label.to_string(),
            size,
            slot,
        });
        let mut buffers = self.buffers.borrow_mut();
        buffers.push(vec![0; size as usize]);
        FakeBuffer {
            index: buffers.len() - 1,
        }
    }

    fn upload(&self, buffer: &FakeBuffer, bytes: &[u8]) {
        self.record(Call::Upload(buffer.index));
        self.buffers.borrow_mut()[buffer.index][..bytes.len()].copy_from_slice(bytes);
    }

    fn dispatch(&self, program: &FakeProgram, buffer: &FakeBuffer) {
        self.record(Call::Dispatch(program.label.clone()));
        if let Some(kernel) = &program.kernel {
            self.pending
                .borrow_mut()
                .push((Rc::clone(kernel), buffer.index));
        }
    }

    fn barrier(&self) {
        self.record(Call::Barrier);
        let queued: Vec<_> = self.pending.borrow_mut().drain(..).collect();
        let mut buffers = self.buffers.borrow_mut();
        for (kernel, index) in queued {
            kernel(&mut buffers[index]);
        }
    }

    fn download(&self, buffer: &FakeBuffer) -> Result<Vec<u8>, DeviceError> {
        self.record(Call::Download(buffer.index));
        Ok(self.buffers.borrow()[buffer.index].clone())
    }
}
