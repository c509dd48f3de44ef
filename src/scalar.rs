//! Narrow/wide scalar types shared by the device channels and the host oracle.

use std::fmt;
use std::ops::{Add, Mul};

use serde::Serialize;

/// Numeric width of one side of a test.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    /// 32-bit float.
    Narrow,
    /// 64-bit float.
    Wide,
}

impl Precision {
    /// Binding slot the kernels of this precision read and write.
    pub fn slot(self) -> u32 {
        match self {
            Precision::Wide => 0,
            Precision::Narrow => 1,
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            Precision::Wide => "double",
            Precision::Narrow => "float",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A float the harness can store on the device and replay on the host.
pub trait Scalar:
    bytemuck::Pod + Add<Output = Self> + Mul<Output = Self> + PartialEq + fmt::Debug
{
    const PRECISION: Precision;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn exp(self) -> Self;
    fn ln(self) -> Self;
    fn sqrt(self) -> Self;
    fn powf(self, exponent: Self) -> Self;
}

macro_rules! impl_scalar {
    ($ty:ty, $precision:expr) => {
        impl Scalar for $ty {
            const PRECISION: Precision = $precision;

            fn from_f64(value: f64) -> Self {
                value as $ty
            }
            fn to_f64(self) -> f64 {
                self as f64
            }
            fn sin(self) -> Self {
                <$ty>::sin(self)
            }
            fn cos(self) -> Self {
                <$ty>::cos(self)
            }
            fn exp(self) -> Self {
                <$ty>::exp(self)
            }
            fn ln(self) -> Self {
                <$ty>::ln(self)
            }
            fn sqrt(self) -> Self {
                <$ty>::sqrt(self)
            }
            fn powf(self, exponent: Self) -> Self {
                <$ty>::powf(self, exponent)
            }
        }
    };
}

impl_scalar!(f32, Precision::Narrow);
impl_scalar!(f64, Precision::Wide);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_distinct() {
        assert_eq!(Precision::Wide.slot(), 0);
        assert_eq!(Precision::Narrow.slot(), 1);
    }

    #[test]
    fn test_narrow_math_stays_narrow() {
        let x = <f32 as Scalar>::from_f64(1.0);
        assert_eq!(Scalar::sin(x), 1.0f32.sin());
        assert_ne!(Scalar::sin(x).to_f64(), 1.0f64.sin());
        assert_eq!(f32::PRECISION, Precision::Narrow);
        assert_eq!(f64::PRECISION, Precision::Wide);
    }
}
