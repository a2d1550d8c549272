//! Batched matrix-vector evaluation.
//!
//! Computes `num` independent products `C_i = A_i * B_i` (each `A_i` is
//! `size x size`, each `B_i` has `size` elements) with a single batched GEMM
//! call on a [`Device`](batchmv_device::Device): CUDA/cuBLAS when the `cuda`
//! feature is enabled and a GPU is present, otherwise the host-emulated
//! device.
//!
//! # Example
//!
//! ```
//! use batchmv::{BatchEvaluator, HostBatch};
//! use batchmv_device::HostDevice;
//!
//! let device = HostDevice::new();
//! let batch = HostBatch::uniform(4, 8, 1.5f32, 2.0).unwrap();
//! let eval = BatchEvaluator::new(&device).evaluate(&batch).unwrap();
//! assert!(eval.results.iter().all(|&c| c == 12.0));
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod reference;
pub mod report;

pub use backend::BackendSelector;
pub use batchmv_core::{HostBatch, Precision, Scalar};
pub use config::{BackendChoice, ConfigError, EvalConfig, MAX_PITCH_ALIGNMENT};
pub use error::{EvalError, FatalAction, Result, Stage};
pub use evaluator::{BatchEvaluator, Evaluation, Pitches};
pub use reference::reference_products;
pub use report::{ResultValues, RunReport, run};
