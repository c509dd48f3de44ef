//! The experiment table.
//!
//! Each row describes one test: what the wide and narrow kernels compute,
//! how many times they are dispatched, where they start, and the
//! closed-form value they should reach. Closed forms were derived offline
//! at high precision and are treated as ground truth.

use serde::Serialize;

use crate::scalar::{Precision, Scalar};

/// Per-dispatch increment of an accumulating recurrence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    /// `sin(1)`
    SinOne,
    /// `cos(1)`
    CosOne,
    /// `exp(exp(1))`
    ExpE,
    /// `ln(base^exponent)`
    LnPow { base: f64, exponent: f64 },
    /// `sqrt(sqrt(sqrt(sqrt(base^exponent))))`
    QuarticRootPow { base: f64, exponent: f64 },
}

impl Term {
    /// Evaluate the term in the arithmetic of `T`.
    pub fn eval<T: Scalar>(self) -> T {
        let one = T::from_f64(1.0);
        match self {
            Term::SinOne => one.sin(),
            Term::CosOne => one.cos(),
            Term::ExpE => one.exp().exp(),
            Term::LnPow { base, exponent } => {
                T::from_f64(base).powf(T::from_f64(exponent)).ln()
            }
            Term::QuarticRootPow { base, exponent } => T::from_f64(base)
                .powf(T::from_f64(exponent))
                .sqrt()
                .sqrt()
                .sqrt()
                .sqrt(),
        }
    }

    /// Evaluate the term at `precision`, then convert it to `T`.
    pub fn eval_at<T: Scalar>(self, precision: Precision) -> T {
        match precision {
            Precision::Narrow => T::from_f64(self.eval::<f32>().to_f64()),
            Precision::Wide => T::from_f64(self.eval::<f64>()),
        }
    }
}

/// What one dispatch does to the device scalar.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    /// `acc = term + acc`
    Accumulate(Term),
    /// `acc = acc * factor`
    Multiply(f64),
    /// `acc = pow(acc, exponent)`
    Power(f64),
}

impl Recurrence {
    /// One dispatch in the arithmetic of `T`, with any term evaluated at
    /// `term_precision` first.
    pub fn step<T: Scalar>(self, acc: T, term_precision: Precision) -> T {
        match self {
            Recurrence::Accumulate(term) => term.eval_at::<T>(term_precision) + acc,
            Recurrence::Multiply(factor) => acc * T::from_f64(factor),
            Recurrence::Power(exponent) => acc.powf(T::from_f64(exponent)),
        }
    }
}

/// Ground truth for one channel.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosedForm {
    Float(f64),
    /// Exact integer result, compared without a percentage.
    Integer(i64),
}

impl ClosedForm {
    pub fn as_f64(self) -> f64 {
        match self {
            ClosedForm::Float(v) => v,
            ClosedForm::Integer(v) => v as f64,
        }
    }
}

/// How one precision of a test is driven.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ChannelPlan {
    pub iterations: u32,
    pub start: f64,
    pub recurrence: Recurrence,
    /// Width the kernel evaluates its term at. GLSL has no double
    /// transcendentals, so double kernels compute the term in float and
    /// only accumulate in double.
    pub term_precision: Precision,
    pub closed_form: ClosedForm,
}

impl ChannelPlan {
    pub fn step<T: Scalar>(&self, acc: T) -> T {
        self.recurrence.step(acc, self.term_precision)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseKind {
    SinAdd,
    CosAdd,
    ExpAdd,
    LargeInteger,
    LogPowAdd,
    SqrtPowAdd,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct TestCase {
    /// 1-based, as given on the command line.
    pub index: u32,
    pub kind: CaseKind,
    pub name: &'static str,
    pub description: &'static str,
    /// Decimal places used when printing values.
    pub decimals: usize,
    pub wide: ChannelPlan,
    pub narrow: ChannelPlan,
}

impl TestCase {
    pub fn plan(&self, precision: Precision) -> &ChannelPlan {
        match precision {
            Precision::Wide => &self.wide,
            Precision::Narrow => &self.narrow,
        }
    }

    /// Kernel unit positions `(wide, narrow)` in the multiplexed source.
    pub fn unit_positions(&self) -> (usize, usize) {
        let wide = 2 * (self.index as usize - 1);
        (wide, wide + 1)
    }
}

const ACCUMULATIONS: u32 = 10_000;
const DECIMALS: usize = 19;

const fn accumulate(term: Term, closed_form: f64) -> ChannelPlan {
    ChannelPlan {
        iterations: ACCUMULATIONS,
        start: 1.0,
        recurrence: Recurrence::Accumulate(term),
        term_precision: Precision::Narrow,
        closed_form: ClosedForm::Float(closed_form),
    }
}

const fn symmetric(
    index: u32,
    kind: CaseKind,
    name: &'static str,
    description: &'static str,
    plan: ChannelPlan,
) -> TestCase {
    TestCase {
        index,
        kind,
        name,
        description,
        decimals: DECIMALS,
        wide: plan,
        narrow: plan,
    }
}

#[allow(clippy::excessive_precision)]
pub static CASES: [TestCase; 6] = [
    symmetric(
        1,
        CaseKind::SinAdd,
        "sin add",
        "10000 * sin(1) + 1",
        accumulate(Term::SinOne, 8415.709848078965066525),
    ),
    symmetric(
        2,
        CaseKind::CosAdd,
        "cos add",
        "10000 * cos(1) + 1",
        accumulate(Term::CosOne, 5404.023058681397174009),
    ),
    symmetric(
        3,
        CaseKind::ExpAdd,
        "exp add",
        "10000 * exp(e) + 1",
        accumulate(Term::ExpE, 151543.622414792641897604),
    ),
    TestCase {
        index: 4,
        kind: CaseKind::LargeInteger,
        name: "large integer representation",
        description: "3^35 by repeated multiplication (double), 3^16 by pow (float)",
        decimals: 1,
        wide: ChannelPlan {
            iterations: 35,
            start: 1.0,
            recurrence: Recurrence::Multiply(3.0),
            term_precision: Precision::Wide,
            closed_form: ClosedForm::Integer(50_031_545_098_999_707),
        },
        narrow: ChannelPlan {
            iterations: 1,
            start: 3.0,
            recurrence: Recurrence::Power(16.0),
            term_precision: Precision::Narrow,
            closed_form: ClosedForm::Float(43_046_721.0),
        },
    },
    symmetric(
        5,
        CaseKind::LogPowAdd,
        "log pow add",
        "10000 * ln(3^80) + 1",
        accumulate(
            Term::LnPow {
                base: 3.0,
                exponent: 80.0,
            },
            878890.830934487753116196,
        ),
    ),
    symmetric(
        6,
        CaseKind::SqrtPowAdd,
        "compound sqrt pow add",
        "10000 * sqrt(sqrt(sqrt(sqrt(3^79)))) + 1",
        accumulate(
            Term::QuarticRootPow {
                base: 3.0,
                exponent: 79.0,
            },
            2268748.663823218581241414,
        ),
    ),
];

/// Look up a test by its 1-based index.
pub fn lookup(index: u32) -> Option<&'static TestCase> {
    CASES.iter().find(|case| case.index == index)
}
