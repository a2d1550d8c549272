//! Error types for layouts, pointer tables and host batches.

use thiserror::Error;

/// Errors raised while describing pitched memory or building pointer tables.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// A dimension that must be at least one was zero.
    #[error("{what} must be at least 1")]
    ZeroDimension { what: &'static str },

    /// The row pitch is narrower than the logical row.
    #[error("Pitch of {pitch} elements is smaller than row width {width}")]
    PitchTooSmall { pitch: usize, width: usize },

    /// The byte pitch does not hold a whole number of elements.
    #[error("Pitch of {pitch_bytes} bytes is not a multiple of element size {element_size}")]
    MisalignedPitch {
        pitch_bytes: usize,
        element_size: usize,
    },

    /// An instance block falls outside its allocation.
    #[error("Instance {index} covers rows {first_row}..{end_row} but the allocation has {height} rows")]
    OutOfBounds {
        index: usize,
        first_row: usize,
        end_row: usize,
        height: usize,
    },

    /// A leading dimension is smaller than the operand's row count.
    #[error("Leading dimension of {operand} is {ld}, expected at least {min}")]
    LeadingDimension {
        operand: char,
        ld: usize,
        min: usize,
    },

    /// Size arithmetic overflowed.
    #[error("Size overflow computing {0}")]
    Overflow(&'static str),
}

/// Errors raised while building a host-side batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// Invalid dimensions provided.
    #[error("Invalid dimensions: {0}")]
    InvalidDimension(String),

    /// Host memory could not be reserved.
    #[error("Host allocation of {elements} elements failed")]
    HostAlloc { elements: usize },
}
