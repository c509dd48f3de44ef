//! Error figures and the printed report.

use std::fmt;

use serde::Serialize;

use crate::case::{ClosedForm, TestCase};
use crate::scalar::Precision;

/// Distance between a computed value and the closed form.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorFigure {
    Relative { absolute: f64, percent: f64 },
    /// Exact integer distance for integer ground truths.
    Exact { difference: u64 },
}

impl ErrorFigure {
    pub fn measure(value: f64, closed_form: ClosedForm) -> Self {
        match closed_form {
            ClosedForm::Float(truth) => {
                let absolute = (truth - value).abs();
                ErrorFigure::Relative {
                    absolute,
                    percent: absolute / truth.abs() * 100.0,
                }
            }
            ClosedForm::Integer(truth) => ErrorFigure::Exact {
                // `as` saturates, so the difference never overflows.
                difference: (truth as i128 - value as i64 as i128).unsigned_abs() as u64,
            },
        }
    }
}

/// One precision's outcome.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub precision: Precision,
    pub iterations: u32,
    pub device_value: f64,
    pub closed_form: ClosedForm,
    pub host_value: f64,
    pub device_error: ErrorFigure,
    pub host_error: ErrorFigure,
}

/// Compare a device result and a host result against the closed form.
pub fn build(
    precision: Precision,
    iterations: u32,
    device_value: f64,
    closed_form: ClosedForm,
    host_value: f64,
) -> ComparisonResult {
    ComparisonResult {
        precision,
        iterations,
        device_value,
        closed_form,
        host_value,
        device_error: ErrorFigure::measure(device_value, closed_form),
        host_error: ErrorFigure::measure(host_value, closed_form),
    }
}

/// Both precisions of one test.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunReport {
    pub case: TestCase,
    pub wide_kernel: String,
    pub narrow_kernel: String,
    pub decimals: usize,
    pub wide: ComparisonResult,
    pub narrow: ComparisonResult,
}

impl RunReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn write_section(
        &self,
        f: &mut fmt::Formatter<'_>,
        kernel: &str,
        result: &ComparisonResult,
    ) -> fmt::Result {
        let d = self.decimals;
        writeln!(f, "Running test: {} ({})", kernel, result.precision)?;
        writeln!(f, "Iterations:        {}", result.iterations)?;
        writeln!(f, "GPU result:        {:.*}", d, result.device_value)?;
        match result.closed_form {
            ClosedForm::Float(truth) => writeln!(f, "Correct answer:    {:.*}", d, truth)?,
            ClosedForm::Integer(truth) => writeln!(f, "Correct answer:    {}.0", truth)?,
        }
        write_error(f, "Error:            ", result.device_error)?;
        writeln!(f, "CPU answer:        {:.*}", d, result.host_value)?;
        write_error(f, "CPU error:        ", result.host_error)
    }
}

fn write_error(f: &mut fmt::Formatter<'_>, label: &str, figure: ErrorFigure) -> fmt::Result {
    match figure {
        ErrorFigure::Relative { percent, .. } => writeln!(f, "{} {:.9} %", label, percent),
        ErrorFigure::Exact { difference } => writeln!(f, "{} {}.0 (difference)", label, difference),
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Test {}: {} [{}]",
            self.case.index, self.case.name, self.case.description
        )?;
        writeln!(f)?;
        self.write_section(f, &self.wide_kernel, &self.wide)?;
        writeln!(f)?;
        self.write_section(f, &self.narrow_kernel, &self.narrow)
    }
}
