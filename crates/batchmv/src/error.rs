//! Error types for batched evaluation.

use batchmv_core::{BatchError, LayoutError};
use batchmv_device::{BlasStatus, DeviceError};
use thiserror::Error;

/// Step of the evaluation a device error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Allocating device memory.
    DeviceAlloc,
    /// Copying inputs or pointer tables to the device.
    Upload,
    /// The batched multiply.
    Compute,
    /// Copying results back.
    Download,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::DeviceAlloc => write!(f, "device allocation"),
            Stage::Upload => write!(f, "upload"),
            Stage::Compute => write!(f, "batched multiply"),
            Stage::Download => write!(f, "download"),
        }
    }
}

/// Errors that can occur during evaluation.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Configuration rejected before any work started.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Host batch construction failed.
    #[error("Host batch error: {0}")]
    Batch(#[from] BatchError),

    /// Pointer table or layout validation failed.
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    /// A device call failed.
    #[error("{stage} failed: {source}")]
    Device {
        stage: Stage,
        #[source]
        source: DeviceError,
    },

    /// Device results disagree with the host reference.
    #[error("Verification failed: max error {max_error:e} exceeds tolerance {tolerance:e}")]
    Verification { max_error: f64, tolerance: f64 },
}

/// Result type for evaluation.
pub type Result<T> = std::result::Result<T, EvalError>;

/// What the process should do about a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalAction {
    /// Exit with the given code.
    Exit(u8),
    /// Abort the process.
    Abort,
}

impl EvalError {
    /// Stage of a device failure.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            EvalError::Device { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// BLAS status of a failed batched multiply.
    pub fn blas_status(&self) -> Option<BlasStatus> {
        match self {
            EvalError::Device {
                stage: Stage::Compute,
                source: DeviceError::Blas(status),
            } => Some(*status),
            _ => None,
        }
    }

    /// Exit code 1 for a failed multiply, 2 for usage errors, abort for
    /// everything else.
    pub fn fatal_action(&self) -> FatalAction {
        match self {
            EvalError::Device {
                stage: Stage::Compute,
                ..
            } => FatalAction::Exit(1),
            EvalError::InvalidConfig(_)
            | EvalError::Verification { .. }
            | EvalError::Batch(BatchError::InvalidDimension(_)) => FatalAction::Exit(2),
            _ => FatalAction::Abort,
        }
    }
}

/// Attach a [`Stage`] to device results.
pub(crate) trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T>;
}

impl<T> AtStage<T> for batchmv_device::Result<T> {
    fn at(self, stage: Stage) -> Result<T> {
        self.map_err(|source| EvalError::Device { stage, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_failure_exits_with_one() {
        let err = EvalError::Device {
            stage: Stage::Compute,
            source: DeviceError::Blas(BlasStatus::ExecutionFailed),
        };
        assert_eq!(err.fatal_action(), FatalAction::Exit(1));
        assert_eq!(err.blas_status(), Some(BlasStatus::ExecutionFailed));
        assert_eq!(
            err.to_string(),
            "batched multiply failed: Batched GEMM failed: execution failed"
        );
    }

    #[test]
    fn test_other_device_failures_abort() {
        let err = EvalError::Device {
            stage: Stage::DeviceAlloc,
            source: DeviceError::Alloc {
                bytes: 16,
                reason: "out of memory".to_string(),
            },
        };
        assert_eq!(err.fatal_action(), FatalAction::Abort);
        assert_eq!(err.stage(), Some(Stage::DeviceAlloc));
        assert_eq!(err.blas_status(), None);

        let host = EvalError::Batch(BatchError::HostAlloc { elements: 4 });
        assert_eq!(host.fatal_action(), FatalAction::Abort);
    }

    #[test]
    fn test_usage_errors_exit_with_two() {
        assert_eq!(
            EvalError::InvalidConfig("size".into()).fatal_action(),
            FatalAction::Exit(2)
        );
        assert_eq!(
            EvalError::Verification {
                max_error: 1.0,
                tolerance: 0.1
            }
            .fatal_action(),
            FatalAction::Exit(2)
        );
    }
}
