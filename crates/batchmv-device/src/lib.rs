//! Device backends for batchmv.
//!
//! The [`Device`] trait models the accelerator collaborator: pitched and
//! linear allocation, strided and linear copies, and batched GEMM. The
//! [`HostDevice`] is always available; [`cuda::CudaDevice`] needs the `cuda`
//! feature and a working CUDA installation.

pub mod buffer;
#[cfg(feature = "cuda")]
pub mod cuda;
pub mod device;
pub mod error;
pub mod host;

pub use buffer::DeviceBuffer;
#[cfg(feature = "cuda")]
pub use cuda::CudaDevice;
pub use device::{BackendType, Copy2d, Device, PitchedAllocation};
pub use error::{BlasStatus, DeviceError, Result};
pub use host::{DEFAULT_PITCH_ALIGNMENT, HostDevice, HostDeviceConfig};
