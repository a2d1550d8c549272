//! Running a configured evaluation and printing its results.

use crate::config::EvalConfig;
use crate::error::{EvalError, Result};
use crate::evaluator::BatchEvaluator;
use crate::reference::reference_products;
use batchmv_core::{HostBatch, Precision, Scalar};
use batchmv_device::Device;
use serde::Serialize;
use std::fmt::Display;
use std::io::{self, Write};

/// Result scalars at their native precision.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResultValues {
    F32(Vec<f32>),
    F64(Vec<f64>),
}

impl ResultValues {
    /// Number of scalars.
    pub fn len(&self) -> usize {
        match self {
            ResultValues::F32(v) => v.len(),
            ResultValues::F64(v) => v.len(),
        }
    }

    /// Whether there are no scalars.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Values widened to `f64`.
    pub fn to_f64(&self) -> Vec<f64> {
        match self {
            ResultValues::F32(v) => v.iter().map(|&x| x as f64).collect(),
            ResultValues::F64(v) => v.clone(),
        }
    }
}

/// Outcome of [`run`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub size: usize,
    pub num: usize,
    pub precision: Precision,
    pub backend: String,
    /// Max absolute error against the host reference, when verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_error: Option<f64>,
    pub results: ResultValues,
}

impl RunReport {
    /// Write one result per line, in batch order.
    pub fn write_lines<W: Write>(&self, out: &mut W) -> io::Result<()> {
        match &self.results {
            ResultValues::F32(v) => write_values(out, v),
            ResultValues::F64(v) => write_values(out, v),
        }
    }

    /// Write the report as pretty JSON.
    pub fn write_json<W: Write>(&self, out: &mut W) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, self)?;
        writeln!(out)
    }
}

fn write_values<W: Write, T: Display>(out: &mut W, values: &[T]) -> io::Result<()> {
    for v in values {
        writeln!(out, "{}", v)?;
    }
    Ok(())
}

/// Validate `config`, build its uniform batch and evaluate it on `device`.
///
/// Nothing is printed here; a failed run produces no results at all.
pub fn run(config: &EvalConfig, device: &dyn Device) -> Result<RunReport> {
    config.validate()?;
    match config.precision {
        Precision::Single => {
            let (values, max_error) = run_typed::<f32>(config, device)?;
            Ok(report(config, device, ResultValues::F32(values), max_error))
        }
        Precision::Double => {
            let (values, max_error) = run_typed::<f64>(config, device)?;
            Ok(report(config, device, ResultValues::F64(values), max_error))
        }
    }
}

fn run_typed<T: Scalar>(config: &EvalConfig, device: &dyn Device) -> Result<(Vec<T>, Option<f64>)> {
    let batch = HostBatch::uniform(config.size, config.num, T::of(config.a), T::of(config.b))?;
    let evaluation = BatchEvaluator::new(device).evaluate(&batch)?;

    let max_error = if config.verify {
        let reference = reference_products(&batch);
        let max_error = evaluation.max_abs_error(&reference);
        if max_error > config.tolerance {
            return Err(EvalError::Verification {
                max_error,
                tolerance: config.tolerance,
            });
        }
        log::info!("Verified against host reference (max error {:e})", max_error);
        Some(max_error)
    } else {
        None
    };

    Ok((evaluation.results, max_error))
}

fn report(
    config: &EvalConfig,
    device: &dyn Device,
    results: ResultValues,
    max_error: Option<f64>,
) -> RunReport {
    RunReport {
        size: config.size,
        num: config.num,
        precision: config.precision,
        backend: device.backend_type().to_string(),
        max_error,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchmv_device::HostDevice;

    #[test]
    fn test_default_run_prints_six() {
        let device = HostDevice::new();
        let report = run(&EvalConfig::default(), &device).unwrap();

        let mut out = Vec::new();
        report.write_lines(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "6\n");
    }

    #[test]
    fn test_double_precision_lines() {
        let device = HostDevice::new();
        let config = EvalConfig {
            size: 2,
            num: 2,
            a: 0.25,
            b: 3.0,
            precision: Precision::Double,
            ..EvalConfig::default()
        };
        let report = run(&config, &device).unwrap();

        let mut out = Vec::new();
        report.write_lines(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "1.5\n1.5\n1.5\n1.5\n");
    }

    #[test]
    fn test_json_report() {
        let device = HostDevice::new();
        let config = EvalConfig {
            num: 2,
            verify: true,
            ..EvalConfig::default()
        };
        let report = run(&config, &device).unwrap();

        let mut out = Vec::new();
        report.write_json(&mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["size"], 1);
        assert_eq!(value["num"], 2);
        assert_eq!(value["precision"], "f32");
        assert_eq!(value["backend"], "Host");
        assert_eq!(value["max_error"], 0.0);
        assert_eq!(value["results"], serde_json::json!([6.0, 6.0]));
    }

    #[test]
    fn test_invalid_config_touches_no_device() {
        let device = HostDevice::new();
        let config = EvalConfig {
            size: 0,
            ..EvalConfig::default()
        };
        assert!(matches!(
            run(&config, &device),
            Err(EvalError::InvalidConfig(_))
        ));
        assert_eq!(device.bytes_in_use(), 0);
    }
}
