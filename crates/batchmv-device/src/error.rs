//! Error types for device operations.

use batchmv_core::LayoutError;
use thiserror::Error;

/// Non-success status of a BLAS call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlasStatus {
    #[error("library not initialized")]
    NotInitialized,
    #[error("resource allocation failed")]
    AllocFailed,
    #[error("invalid value")]
    InvalidValue,
    #[error("architecture mismatch")]
    ArchMismatch,
    #[error("memory mapping error")]
    MappingError,
    #[error("execution failed")]
    ExecutionFailed,
    #[error("internal error")]
    InternalError,
    #[error("not supported")]
    NotSupported,
    #[error("license error")]
    LicenseError,
}

/// Errors that can occur while driving a device.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The backend could not be initialized.
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    /// Memory allocation failed.
    #[error("Allocation of {bytes} bytes failed: {reason}")]
    Alloc { bytes: usize, reason: String },

    /// Data transfer failed.
    #[error("Data transfer failed: {0}")]
    Transfer(String),

    /// An address does not belong to any live allocation.
    #[error("Invalid device address {addr:#x}")]
    InvalidAddress { addr: u64 },

    /// The batched multiply returned a non-success status.
    #[error("Batched GEMM failed: {0}")]
    Blas(BlasStatus),

    /// Layout or argument validation failed.
    #[error("Layout error: {0}")]
    Layout(#[from] LayoutError),

    /// Driver-level failure.
    #[error("Driver error: {0}")]
    Driver(String),
}

/// Result type for device operations.
pub type Result<T> = std::result::Result<T, DeviceError>;
