//! Element types that can flow through a batched GEMM.

use bytemuck::Pod;
use nalgebra::RealField;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};

/// Floating-point precision of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Precision {
    /// 32-bit floats (`Sgemm`).
    #[default]
    #[serde(rename = "f32")]
    Single,
    /// 64-bit floats (`Dgemm`).
    #[serde(rename = "f64")]
    Double,
}

impl Precision {
    /// Size of one element in bytes.
    pub fn element_size(self) -> usize {
        match self {
            Precision::Single => std::mem::size_of::<f32>(),
            Precision::Double => std::mem::size_of::<f64>(),
        }
    }
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precision::Single => write!(f, "f32"),
            Precision::Double => write!(f, "f64"),
        }
    }
}

/// A real scalar usable both on the device (plain bytes) and in nalgebra.
pub trait Scalar: RealField + Copy + Pod + Debug + Display + Send + Sync + 'static {
    /// Precision tag passed to the device.
    const PRECISION: Precision;

    /// Convert from `f64`, rounding if needed.
    fn of(value: f64) -> Self;

    /// Widen to `f64`.
    fn as_f64(self) -> f64;
}

impl Scalar for f32 {
    const PRECISION: Precision = Precision::Single;

    fn of(value: f64) -> Self {
        value as f32
    }

    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl Scalar for f64 {
    const PRECISION: Precision = Precision::Double;

    fn of(value: f64) -> Self {
        value
    }

    fn as_f64(self) -> f64 {
        self
    }
}
