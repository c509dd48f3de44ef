//! GPU compute through wgpu.
//!
//! Uses wgpu for cross-platform GPU access (Vulkan, Metal, DX12, GL).
//! GLSL compute kernels are translated by naga. Compile and link failures
//! are captured with validation error scopes so they come back as logs
//! instead of hitting the uncaptured-error handler.

use std::cell::{Cell, RefCell};

use tracing::{debug, info};

use crate::config::{BackendChoice, DeviceConfig, PowerChoice};
use crate::device::{Device, DeviceError};

/// Entry point every GLSL compute kernel declares.
const ENTRY_POINT: &str = "main";

pub struct WgpuShader {
    module: wgpu::ShaderModule,
    log: Option<String>,
}

pub struct WgpuProgram {
    id: u64,
    label: String,
    pipeline: wgpu::ComputePipeline,
    /// `None` only when linking failed.
    layout: Option<wgpu::BindGroupLayout>,
    log: Option<String>,
}

pub struct WgpuBuffer {
    storage: wgpu::Buffer,
    staging: wgpu::Buffer,
    size: u64,
    slot: u32,
    /// Bind group for the last program dispatched over this buffer.
    bind_group: RefCell<Option<(u64, wgpu::BindGroup)>>,
}

/// The process-wide device context.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    /// Passes recorded since the last barrier.
    pending: RefCell<Option<wgpu::CommandEncoder>>,
    next_program: Cell<u64>,
}

fn backends(choice: BackendChoice) -> wgpu::Backends {
    match choice {
        BackendChoice::All => wgpu::Backends::all(),
        BackendChoice::Vulkan => wgpu::Backends::VULKAN,
        BackendChoice::Metal => wgpu::Backends::METAL,
        BackendChoice::Dx12 => wgpu::Backends::DX12,
        BackendChoice::Gl => wgpu::Backends::GL,
    }
}

impl WgpuDevice {
    /// Create the device. `SHADER_F64` is requested whenever the adapter
    /// offers it; without it double kernels fail to compile.
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: backends(config.backend),
            ..Default::default()
        });
        let power_preference = match config.power_preference {
            PowerChoice::High => wgpu::PowerPreference::HighPerformance,
            PowerChoice::Low => wgpu::PowerPreference::LowPower,
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DeviceError::NoAdapter(config.backend.to_string()))?;

        let required_features = adapter.features() & wgpu::Features::SHADER_F64;
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("fpprobe-gpu"),
                required_features,
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| DeviceError::RequestDevice(e.to_string()))?;

        let adapter_info = adapter.get_info();
        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            shader_f64 = !required_features.is_empty(),
            "GPU device ready"
        );
        Ok(Self {
            device,
            queue,
            adapter_info,
            pending: RefCell::new(None),
            next_program: Cell::new(0),
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    /// Run `f` inside a validation error scope and return its result with
    /// the captured error text, if any.
    fn scoped<T>(&self, f: impl FnOnce() -> T) -> (T, Option<String>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        let error = pollster::block_on(self.device.pop_error_scope());
        (value, error.map(|e| e.to_string()))
    }

    fn program_id(&self) -> u64 {
        let id = self.next_program.get();
        self.next_program.set(id + 1);
        id
    }
}

impl Device for WgpuDevice {
    type Shader = WgpuShader;
    type Program = WgpuProgram;
    type Buffer = WgpuBuffer;

    fn create_shader(&self, label: &str, source: &str) -> WgpuShader {
        let (module, log) = self.scoped(|| {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(label),
                    source: wgpu::ShaderSource::Glsl {
                        shader: source.into(),
                        stage: naga::ShaderStage::Compute,
                        defines: Default::default(),
                    },
                })
        });
        WgpuShader { module, log }
    }

    fn shader_log(&self, shader: &WgpuShader) -> Option<String> {
        shader.log.clone()
    }

    fn destroy_shader(&self, shader: WgpuShader) {
        drop(shader.module);
    }

    fn create_program(&self, label: &str, shaders: &[&WgpuShader]) -> WgpuProgram {
        let module = match shaders {
            [shader] => &shader.module,
            _ => {
                // A compute pipeline has exactly one stage; build an inert
                // placeholder so the failure is reported as a link log.
                let (pipeline, _) = self.scoped(|| self.placeholder_pipeline(label));
                return WgpuProgram {
                    id: self.program_id(),
                    label: label.to_string(),
                    pipeline,
                    layout: None,
                    log: Some(format!(
                        "a compute program takes exactly one compute unit, got {}",
                        shaders.len()
                    )),
                };
            }
        };
        let (pipeline, log) = self.scoped(|| {
            self.device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(label),
                    layout: None,
                    module,
                    entry_point: Some(ENTRY_POINT),
                    compilation_options: Default::default(),
                    cache: None,
                })
        });
        let layout = match log {
            None => Some(pipeline.get_bind_group_layout(0)),
            Some(_) => None,
        };
        WgpuProgram {
            id: self.program_id(),
            label: label.to_string(),
            pipeline,
            layout,
            log,
        }
    }

    fn program_log(&self, program: &WgpuProgram) -> Option<String> {
        program.log.clone()
    }

    fn destroy_program(&self, program: WgpuProgram) {
        drop(program.layout);
        drop(program.pipeline);
    }

    fn allocate(&self, label: &str, size: u64, slot: u32) -> WgpuBuffer {
        let size = size.max(wgpu::COPY_BUFFER_ALIGNMENT);
        let storage = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{}_staging", label)),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        debug!(buffer = %label, size, slot, "allocated");
        WgpuBuffer {
            storage,
            staging,
            size,
            slot,
            bind_group: RefCell::new(None),
        }
    }

    fn upload(&self, buffer: &WgpuBuffer, bytes: &[u8]) {
        self.queue.write_buffer(&buffer.storage, 0, bytes);
    }

    fn dispatch(&self, program: &WgpuProgram, buffer: &WgpuBuffer) {
        let Some(layout) = &program.layout else {
            unreachable!("dispatch on program '{}' that failed to link", program.label);
        };
        let mut cached = buffer.bind_group.borrow_mut();
        if !matches!(&*cached, Some((id, _)) if *id == program.id) {
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("scalar_bind_group"),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: buffer.slot,
                    resource: buffer.storage.as_entire_binding(),
                }],
            });
            *cached = Some((program.id, bind_group));
        }
        let Some((_, bind_group)) = &*cached else {
            unreachable!("bind group cached above");
        };
        let mut pending = self.pending.borrow_mut();
        let encoder = pending.get_or_insert_with(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("scalar_encoder"),
                })
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("scalar_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&program.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(1, 1, 1);
    }

    fn barrier(&self) {
        // Submissions execute in order and each sees every write of the
        // ones before it.
        if let Some(encoder) = self.pending.borrow_mut().take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn download(&self, buffer: &WgpuBuffer) -> Result<Vec<u8>, DeviceError> {
        self.barrier();
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback_encoder"),
            });
        encoder.copy_buffer_to_buffer(&buffer.storage, 0, &buffer.staging, 0, buffer.size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| DeviceError::Readback("readback channel closed".to_string()))?
            .map_err(|e| DeviceError::Readback(e.to_string()))?;

        let bytes = slice.get_mapped_range().to_vec();
        buffer.staging.unmap();
        Ok(bytes)
    }
}

impl WgpuDevice {
    fn placeholder_pipeline(&self, label: &str) -> wgpu::ComputePipeline {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(PLACEHOLDER_KERNEL.into()),
            });
        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &module,
                entry_point: Some(ENTRY_POINT),
                compilation_options: Default::default(),
                cache: None,
            })
    }
}

const PLACEHOLDER_KERNEL: &str = "@compute @workgroup_size(1) fn main() {}";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{compile, link, KernelUnit};

    const HALVE: &str = "#version 450
layout(local_size_x = 1, local_size_y = 1, local_size_z = 1) in;
layout(std430, binding = 1) buffer Accumulator {
    float value;
} acc;
void main() {
    acc.value = acc.value * 0.5;
}";

    const DOUBLE: &str = "#version 450
layout(local_size_x = 1, local_size_y = 1, local_size_z = 1) in;
layout(std430, binding = 1) buffer Accumulator {
    float value;
} acc;
void main() {
    acc.value = acc.value * 2.0;
}";

    fn device() -> Option<WgpuDevice> {
        match WgpuDevice::new(&DeviceConfig::default()) {
            Ok(dev) => Some(dev),
            Err(e) => {
                eprintln!("No GPU available, skipping test: {}", e);
                None
            }
        }
    }

    fn cached_program(buffer: &WgpuBuffer) -> Option<u64> {
        buffer.bind_group.borrow().as_ref().map(|(id, _)| *id)
    }

    #[test]
    fn test_bind_group_reused_across_dispatches() {
        let Some(dev) = device() else { return };
        let unit = compile(&dev, &KernelUnit::new("halve_float", HALVE)).unwrap();
        let program = link(&dev, "halve_float", &[&unit]).unwrap();
        let buffer = dev.allocate("narrow", 4, 1);
        dev.upload(&buffer, bytemuck::bytes_of(&64.0f32));
        assert_eq!(cached_program(&buffer), None);
        for _ in 0..3 {
            dev.dispatch(program.raw(), &buffer);
            assert_eq!(cached_program(&buffer), Some(program.raw().id));
            dev.barrier();
        }
        let bytes = dev.download(&buffer).unwrap();
        assert_eq!(bytemuck::pod_read_unaligned::<f32>(&bytes[..4]), 8.0);
    }

    #[test]
    fn test_bind_group_rebuilt_for_other_program() {
        let Some(dev) = device() else { return };
        let halve = compile(&dev, &KernelUnit::new("halve_float", HALVE)).unwrap();
        let double = compile(&dev, &KernelUnit::new("double_float", DOUBLE)).unwrap();
        let halve = link(&dev, "halve_float", &[&halve]).unwrap();
        let double = link(&dev, "double_float", &[&double]).unwrap();
        assert_ne!(halve.raw().id, double.raw().id);

        let buffer = dev.allocate("narrow", 4, 1);
        dev.upload(&buffer, bytemuck::bytes_of(&3.0f32));
        dev.dispatch(halve.raw(), &buffer);
        dev.barrier();
        dev.dispatch(double.raw(), &buffer);
        dev.barrier();
        assert_eq!(cached_program(&buffer), Some(double.raw().id));
        let bytes = dev.download(&buffer).unwrap();
        assert_eq!(bytemuck::pod_read_unaligned::<f32>(&bytes[..4]), 3.0);
    }

    #[test]
    fn test_dispatch_on_unlinked_program_is_loud() {
        let Some(dev) = device() else { return };
        let program = dev.create_program("empty", &[]);
        assert!(dev.program_log(&program).is_some());
        let buffer = dev.allocate("narrow", 4, 1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            dev.dispatch(&program, &buffer)
        }));
        assert!(result.is_err());
        dev.destroy_program(program);
    }
}
