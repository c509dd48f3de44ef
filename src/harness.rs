//! One end-to-end precision run.
//!
//! Every kernel unit is compiled and both programs are linked before the
//! first dispatch; any failure aborts the run with no device work done.

use tracing::{info, warn};

use crate::case::{self, TestCase, CASES};
use crate::channel::ScalarChannel;
use crate::device::Device;
use crate::error::HarnessError;
use crate::kernel::{self, KernelUnit, ProgramHandle, SourceFormat};
use crate::oracle;
use crate::report::{self, ComparisonResult, RunReport};
use crate::scalar::{Precision, Scalar};

/// Positions of the `(wide, narrow)` kernel units for `index`, checked
/// against the number of units available.
///
/// Selection is purely positional. Unit names are not checked against the
/// test, only reported.
pub fn select_pair(index: u32, unit_count: usize) -> Result<(usize, usize), HarnessError> {
    if index == 0 {
        return Err(HarnessError::CaseIndex {
            index,
            available: CASES.len(),
        });
    }
    let wide = 2 * (index as usize - 1);
    let narrow = wide + 1;
    if narrow >= unit_count {
        return Err(HarnessError::UnitIndex {
            index,
            position: if wide >= unit_count { wide } else { narrow },
            count: unit_count,
        });
    }
    Ok((wide, narrow))
}

pub fn find_case(index: u32) -> Result<&'static TestCase, HarnessError> {
    case::lookup(index).ok_or(HarnessError::CaseIndex {
        index,
        available: CASES.len(),
    })
}

/// Drive one channel through its plan and compare against the oracle.
fn measure<'d, D: Device, T: Scalar>(
    device: &'d D,
    program: &ProgramHandle<'d, D>,
    case: &TestCase,
) -> Result<ComparisonResult, HarnessError> {
    let precision = T::PRECISION;
    let plan = case.plan(precision);
    let mut channel: ScalarChannel<'d, D, T> =
        ScalarChannel::new(device, &format!("{}_{}", program.name(), precision));
    channel.write(T::from_f64(plan.start))?;
    channel.run_iterations(program, plan.iterations)?;
    let device_value = channel.read()?.to_f64();

    let reference = oracle::reference(case, precision);
    info!(
        kernel = %program.name(),
        %precision,
        iterations = plan.iterations,
        device_value,
        host_value = reference.host_value,
        "channel finished"
    );
    Ok(report::build(
        precision,
        plan.iterations,
        device_value,
        reference.closed_form,
        reference.host_value,
    ))
}

/// Compile `units`, link the pair for `case`, and measure both precisions.
pub fn run<D: Device>(
    device: &D,
    units: &[KernelUnit],
    case: &TestCase,
    decimals: Option<usize>,
) -> Result<RunReport, HarnessError> {
    let (wide_at, narrow_at) = select_pair(case.index, units.len())?;
    let compiled = kernel::compile_all(device, units)?;

    let (wide_name, narrow_name) = (&units[wide_at].name, &units[narrow_at].name);
    for (name, precision) in [(wide_name, Precision::Wide), (narrow_name, Precision::Narrow)] {
        if !name.contains(precision.type_name()) {
            warn!(kernel = %name, %precision, "kernel name does not mention its precision");
        }
    }

    let wide_program = kernel::link(device, wide_name, &[&compiled[wide_at]])?;
    let narrow_program = kernel::link(device, narrow_name, &[&compiled[narrow_at]])?;
    drop(compiled);

    info!(test = case.index, name = case.name, "running");
    let wide = measure::<D, f64>(device, &wide_program, case)?;
    let narrow = measure::<D, f32>(device, &narrow_program, case)?;

    Ok(RunReport {
        case: *case,
        wide_kernel: wide_name.clone(),
        narrow_kernel: narrow_name.clone(),
        decimals: decimals.unwrap_or(case.decimals),
        wide,
        narrow,
    })
}

/// Split `text` and run test `index` against it.
pub fn run_source<D: Device>(
    device: &D,
    text: &str,
    format: &SourceFormat,
    index: u32,
    decimals: Option<usize>,
) -> Result<RunReport, HarnessError> {
    let case = find_case(index)?;
    let units = kernel::split(text, format)?;
    info!(units = units.len(), "kernel source split");
    run(device, &units, case, decimals)
}
