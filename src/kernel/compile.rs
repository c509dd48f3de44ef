//! Compile and link stages.
//!
//! Device objects are wrapped in RAII handles. A failed compile or link
//! releases its object before the error is returned, so the caller only
//! ever holds live, valid handles.

use tracing::{debug, info};

use super::source::KernelUnit;
use crate::device::Device;
use crate::error::HarnessError;

/// A successfully compiled kernel unit.
pub struct CompiledUnit<'d, D: Device> {
    device: &'d D,
    name: String,
    shader: Option<D::Shader>,
}

impl<'d, D: Device> CompiledUnit<'d, D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn shader(&self) -> &D::Shader {
        self.shader
            .as_ref()
            .unwrap_or_else(|| unreachable!("shader taken before drop"))
    }
}

impl<D: Device> Drop for CompiledUnit<'_, D> {
    fn drop(&mut self) {
        if let Some(shader) = self.shader.take() {
            self.device.destroy_shader(shader);
        }
    }
}

/// A linked program ready for dispatch.
pub struct ProgramHandle<'d, D: Device> {
    device: &'d D,
    name: String,
    program: Option<D::Program>,
}

impl<'d, D: Device> ProgramHandle<'d, D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn raw(&self) -> &D::Program {
        self.program
            .as_ref()
            .unwrap_or_else(|| unreachable!("program taken before drop"))
    }
}

impl<D: Device> Drop for ProgramHandle<'_, D> {
    fn drop(&mut self) {
        if let Some(program) = self.program.take() {
            self.device.destroy_program(program);
        }
    }
}

/// Compile one kernel unit.
pub fn compile<'d, D: Device>(
    device: &'d D,
    unit: &KernelUnit,
) -> Result<CompiledUnit<'d, D>, HarnessError> {
    let shader = device.create_shader(&unit.name, &unit.body);
    if let Some(log) = device.shader_log(&shader) {
        device.destroy_shader(shader);
        return Err(HarnessError::Compile {
            name: unit.name.clone(),
            log,
        });
    }
    debug!(kernel = %unit.name, "compiled");
    Ok(CompiledUnit {
        device,
        name: unit.name.clone(),
        shader: Some(shader),
    })
}

/// Compile every unit in order, stopping at the first failure. Units that
/// compiled before the failure are released on the way out.
pub fn compile_all<'d, D: Device>(
    device: &'d D,
    units: &[KernelUnit],
) -> Result<Vec<CompiledUnit<'d, D>>, HarnessError> {
    let compiled = units
        .iter()
        .map(|unit| compile(device, unit))
        .collect::<Result<Vec<_>, _>>()?;
    info!(count = compiled.len(), "all kernel units compiled");
    Ok(compiled)
}

/// Link compiled units into one program. The units stay owned by the caller
/// whether or not the link succeeds.
pub fn link<'d, D: Device>(
    device: &'d D,
    name: &str,
    units: &[&CompiledUnit<'d, D>],
) -> Result<ProgramHandle<'d, D>, HarnessError> {
    let shaders: Vec<&D::Shader> = units.iter().map(|u| u.shader()).collect();
    let program = device.create_program(name, &shaders);
    if let Some(log) = device.program_log(&program) {
        device.destroy_program(program);
        return Err(HarnessError::Link {
            name: name.to_string(),
            log,
        });
    }
    info!(program = %name, units = units.len(), "linked");
    Ok(ProgramHandle {
        device,
        name: name.to_string(),
        program: Some(program),
    })
}
