//! Core types for batched matrix-vector evaluation.
//!
//! Pitched layouts, validated pointer tables, batched GEMM arguments and the
//! host-side batch. Nothing here talks to a device.

pub mod batch;
pub mod error;
pub mod gemm;
pub mod layout;
pub mod pointer_table;
pub mod scalar;

pub use batch::{HostBatch, try_alloc};
pub use error::{BatchError, LayoutError};
pub use gemm::{BatchedGemm, OperandTables, Transpose, operand_extent};
pub use layout::PitchedLayout;
pub use pointer_table::{DeviceAddress, PointerTable};
pub use scalar::{Precision, Scalar};
