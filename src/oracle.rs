//! Host-side reference values.
//!
//! The host replays the exact recurrence a kernel performs, in the same
//! width, from the same start, for the same number of steps. Terms are
//! evaluated at the width the kernel evaluates them. Comparing the
//! device against both this value and the closed form separates
//! device-vs-host rounding from device-vs-truth error.

use serde::Serialize;

use crate::case::{ChannelPlan, ClosedForm, TestCase};
use crate::scalar::{Precision, Scalar};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Reference {
    pub closed_form: ClosedForm,
    /// Host-accumulated value, widened to `f64` for reporting.
    pub host_value: f64,
}

/// Replay `plan` in the arithmetic of `T`.
pub fn accumulate<T: Scalar>(plan: &ChannelPlan) -> T {
    let mut acc = T::from_f64(plan.start);
    for _ in 0..plan.iterations {
        acc = plan.step(acc);
    }
    acc
}

pub fn reference(case: &TestCase, precision: Precision) -> Reference {
    let plan = case.plan(precision);
    let host_value = match precision {
        Precision::Wide => accumulate::<f64>(plan),
        Precision::Narrow => accumulate::<f32>(plan).to_f64(),
    };
    Reference {
        closed_form: plan.closed_form,
        host_value,
    }
}
