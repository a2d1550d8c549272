//! The batched matrix-vector evaluation flow.
//!
//! host buffers -> pitched device buffers -> pointer tables -> device pointer
//! tables -> batched multiply -> pitched copy back to host.

use crate::error::{AtStage, EvalError, Result, Stage};
use batchmv_core::{
    BatchedGemm, HostBatch, OperandTables, PitchedLayout, PointerTable, Scalar, try_alloc,
};
use batchmv_device::{BackendType, Copy2d, Device, DeviceBuffer};

/// Row pitches the device chose, in elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pitches {
    pub matrices: usize,
    pub vectors: usize,
    pub results: usize,
}

/// Output of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation<T> {
    /// `num * size` results, problem-major.
    pub results: Vec<T>,
    /// Vector length.
    pub size: usize,
    /// Number of problems.
    pub num: usize,
    /// Backend that computed the results.
    pub backend: BackendType,
    /// Pitches used on the device.
    pub pitches: Pitches,
}

impl<T: Scalar> Evaluation<T> {
    /// Result vector of problem `index`.
    pub fn result(&self, index: usize) -> Option<&[T]> {
        if index >= self.num {
            return None;
        }
        let start = index * self.size;
        Some(&self.results[start..start + self.size])
    }

    /// Largest absolute difference from `reference`.
    pub fn max_abs_error(&self, reference: &[T]) -> f64 {
        if reference.len() != self.results.len() {
            return f64::INFINITY;
        }
        self.results
            .iter()
            .zip(reference)
            .map(|(&got, &want)| {
                let diff = (got.as_f64() - want.as_f64()).abs();
                if diff.is_nan() {
                    f64::INFINITY
                } else {
                    diff
                }
            })
            .fold(0.0, f64::max)
    }
}

/// Runs batched matrix-vector products on a device.
pub struct BatchEvaluator<'d> {
    device: &'d dyn Device,
}

impl<'d> BatchEvaluator<'d> {
    /// Create an evaluator bound to `device`.
    pub fn new(device: &'d dyn Device) -> Self {
        Self { device }
    }

    /// The device in use.
    pub fn device(&self) -> &'d dyn Device {
        self.device
    }

    /// Compute `C_i = A_i * B_i` for every problem in `batch`.
    ///
    /// Every device allocation is released before this returns, whether it
    /// succeeds or fails.
    pub fn evaluate<T: Scalar>(&self, batch: &HostBatch<T>) -> Result<Evaluation<T>> {
        let device = self.device;
        let size = batch.size();
        let num = batch.num();
        let elem = std::mem::size_of::<T>();
        let row_bytes = size
            .checked_mul(elem)
            .ok_or_else(|| EvalError::InvalidConfig(format!("size {} overflows", size)))?;
        let matrix_rows = size
            .checked_mul(num)
            .ok_or_else(|| EvalError::InvalidConfig(format!("batch of {} overflows", num)))?;

        // Device buffers: one row per matrix column, one row per vector.
        let matrices =
            DeviceBuffer::pitched(device, row_bytes, matrix_rows, elem).at(Stage::DeviceAlloc)?;
        let vectors = DeviceBuffer::pitched(device, row_bytes, num, elem).at(Stage::DeviceAlloc)?;
        let results = DeviceBuffer::pitched(device, row_bytes, num, elem).at(Stage::DeviceAlloc)?;

        device
            .copy_htod_2d(
                matrices.ptr(),
                bytemuck::cast_slice(batch.matrices()),
                &Copy2d {
                    width_bytes: row_bytes,
                    height: matrix_rows,
                    src_pitch: row_bytes,
                    dst_pitch: matrices.pitch_bytes(),
                },
            )
            .at(Stage::Upload)?;
        device
            .copy_htod_2d(
                vectors.ptr(),
                bytemuck::cast_slice(batch.vectors()),
                &Copy2d {
                    width_bytes: row_bytes,
                    height: num,
                    src_pitch: row_bytes,
                    dst_pitch: vectors.pitch_bytes(),
                },
            )
            .at(Stage::Upload)?;

        let a_layout =
            PitchedLayout::from_byte_pitch(size, matrix_rows, matrices.pitch_bytes(), elem)?;
        let b_layout = PitchedLayout::from_byte_pitch(size, num, vectors.pitch_bytes(), elem)?;
        let c_layout = PitchedLayout::from_byte_pitch(size, num, results.pitch_bytes(), elem)?;

        let a_table = PointerTable::build(matrices.ptr(), &a_layout, elem, size, num)?;
        let b_table = PointerTable::build(vectors.ptr(), &b_layout, elem, 1, num)?;
        let c_table = PointerTable::build(results.ptr(), &c_layout, elem, 1, num)?;

        let a_dev = DeviceBuffer::from_bytes(device, a_table.as_bytes()).at(Stage::Upload)?;
        let b_dev = DeviceBuffer::from_bytes(device, b_table.as_bytes()).at(Stage::Upload)?;
        let c_dev = DeviceBuffer::from_bytes(device, c_table.as_bytes()).at(Stage::Upload)?;

        let gemm = BatchedGemm::matvec(
            T::PRECISION,
            size,
            OperandTables {
                host: &a_table,
                device: a_dev.ptr(),
            },
            OperandTables {
                host: &b_table,
                device: b_dev.ptr(),
            },
            OperandTables {
                host: &c_table,
                device: c_dev.ptr(),
            },
        );
        log::debug!(
            "{}: gemm_batched m={} n={} k={} lda={} ldb={} ldc={} count={}",
            device.name(),
            gemm.m,
            gemm.n,
            gemm.k,
            gemm.lda,
            gemm.ldb,
            gemm.ldc,
            gemm.batch_count
        );
        device.gemm_batched(&gemm).at(Stage::Compute)?;
        device.synchronize().at(Stage::Compute)?;

        let mut out = try_alloc(matrix_rows, T::of(0.0))?;
        device
            .copy_dtoh_2d(
                bytemuck::cast_slice_mut(&mut out),
                results.ptr(),
                &Copy2d {
                    width_bytes: row_bytes,
                    height: num,
                    src_pitch: results.pitch_bytes(),
                    dst_pitch: row_bytes,
                },
            )
            .at(Stage::Download)?;

        log::info!(
            "Evaluated {} products of size {} on {}",
            num,
            size,
            device.name()
        );

        Ok(Evaluation {
            results: out,
            size,
            num,
            backend: device.backend_type(),
            pitches: Pitches {
                matrices: a_layout.pitch(),
                vectors: b_layout.pitch(),
                results: c_layout.pitch(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchmv_device::{BlasStatus, HostDevice, HostDeviceConfig};

    #[test]
    fn test_scalar_product() {
        let device = HostDevice::new();
        let batch = HostBatch::uniform(1, 1, 3.0f32, 2.0).unwrap();
        let eval = BatchEvaluator::new(&device).evaluate(&batch).unwrap();

        assert_eq!(eval.results, vec![6.0]);
        assert_eq!(eval.backend, BackendType::Host);
        assert_eq!(device.live_allocations(), 0);
    }

    #[test]
    fn test_pitches_reported_in_elements() {
        let device = HostDevice::with_config(HostDeviceConfig {
            pitch_alignment: 64,
            memory_limit: None,
        });
        let batch = HostBatch::uniform(3, 2, 1.0f64, 1.0).unwrap();
        let eval = BatchEvaluator::new(&device).evaluate(&batch).unwrap();

        assert_eq!(
            eval.pitches,
            Pitches {
                matrices: 8,
                vectors: 8,
                results: 8
            }
        );
        assert_eq!(eval.results, vec![3.0; 6]);
    }

    #[test]
    fn test_result_accessor() {
        let device = HostDevice::new();
        let batch = HostBatch::from_fn(2, 3, |_, _, _| 1.0f32, |i, _| i as f32).unwrap();
        let eval = BatchEvaluator::new(&device).evaluate(&batch).unwrap();

        assert_eq!(eval.result(0), Some(&[0.0f32, 0.0][..]));
        assert_eq!(eval.result(2), Some(&[4.0f32, 4.0][..]));
        assert_eq!(eval.result(3), None);
    }

    #[test]
    fn test_compute_failure_releases_buffers() {
        let device = HostDevice::new();
        device.fail_next_gemm(BlasStatus::ExecutionFailed);
        let batch = HostBatch::uniform(4, 4, 1.0f32, 1.0).unwrap();
        let err = BatchEvaluator::new(&device).evaluate(&batch).unwrap_err();

        assert_eq!(err.stage(), Some(Stage::Compute));
        assert_eq!(device.live_allocations(), 0);
        assert_eq!(device.bytes_in_use(), 0);
    }

    #[test]
    fn test_max_abs_error() {
        let eval = Evaluation {
            results: vec![1.0f64, 2.0, 3.5],
            size: 3,
            num: 1,
            backend: BackendType::Host,
            pitches: Pitches {
                matrices: 3,
                vectors: 3,
                results: 3,
            },
        };
        assert_eq!(eval.max_abs_error(&[1.0, 2.0, 3.0]), 0.5);
        assert_eq!(eval.max_abs_error(&[1.0]), f64::INFINITY);
        assert_eq!(eval.max_abs_error(&[f64::NAN, 2.0, 3.5]), f64::INFINITY);
    }
}
