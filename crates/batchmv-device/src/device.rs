//! The device trait shared by all backends.

use crate::error::{DeviceError, Result};
use batchmv_core::{BatchedGemm, DeviceAddress};

/// Type of backend behind a [`Device`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    /// NVIDIA CUDA with cuBLAS.
    Cuda,
    /// Host-emulated device.
    Host,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Cuda => write!(f, "CUDA"),
            BackendType::Host => write!(f, "Host"),
        }
    }
}

/// Result of a pitched allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PitchedAllocation {
    /// Base device address.
    pub ptr: DeviceAddress,
    /// Row pitch in bytes, chosen by the device.
    pub pitch_bytes: usize,
}

/// Geometry of a strided 2-D copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Copy2d {
    /// Bytes copied per row.
    pub width_bytes: usize,
    /// Number of rows.
    pub height: usize,
    /// Source row pitch in bytes.
    pub src_pitch: usize,
    /// Destination row pitch in bytes.
    pub dst_pitch: usize,
}

impl Copy2d {
    /// Bytes spanned on a side with the given pitch: every row but the last
    /// is a full pitch, the last only `width_bytes`.
    pub fn span(&self, pitch: usize) -> Option<usize> {
        if self.height == 0 || self.width_bytes == 0 {
            return Some(0);
        }
        pitch
            .checked_mul(self.height - 1)?
            .checked_add(self.width_bytes)
    }

    /// Check the copy against its pitches and host buffer length.
    pub fn check(&self, host_len: usize, host_pitch: usize) -> Result<()> {
        if self.width_bytes > self.src_pitch || self.width_bytes > self.dst_pitch {
            return Err(DeviceError::Transfer(format!(
                "row width {} exceeds pitch (src {}, dst {})",
                self.width_bytes, self.src_pitch, self.dst_pitch
            )));
        }
        let span = self
            .span(host_pitch)
            .ok_or_else(|| DeviceError::Transfer("copy extent overflows".to_string()))?;
        if span > host_len {
            return Err(DeviceError::Transfer(format!(
                "host buffer holds {} bytes, copy needs {}",
                host_len, span
            )));
        }
        Ok(())
    }
}

/// An accelerator: pitched memory, copies and batched GEMM.
///
/// Methods take `&self` so that RAII buffers can hold a shared reference to
/// the device while other calls are made.
pub trait Device: Send + Sync {
    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Which backend this is.
    fn backend_type(&self) -> BackendType;

    /// Allocate `height` rows of `width_bytes` each; the device picks the
    /// pitch.
    fn alloc_pitched(
        &self,
        width_bytes: usize,
        height: usize,
        element_size: usize,
    ) -> Result<PitchedAllocation>;

    /// Allocate a linear region of `bytes`.
    fn alloc_linear(&self, bytes: usize) -> Result<DeviceAddress>;

    /// Strided host-to-device copy. `src` uses `copy.src_pitch`.
    fn copy_htod_2d(&self, dst: DeviceAddress, src: &[u8], copy: &Copy2d) -> Result<()>;

    /// Strided device-to-host copy. `dst` uses `copy.dst_pitch`.
    fn copy_dtoh_2d(&self, dst: &mut [u8], src: DeviceAddress, copy: &Copy2d) -> Result<()>;

    /// Linear host-to-device copy.
    fn copy_htod(&self, dst: DeviceAddress, src: &[u8]) -> Result<()>;

    /// Release an allocation made by this device.
    fn free(&self, ptr: DeviceAddress) -> Result<()>;

    /// Run a batched GEMM over device-resident pointer arrays.
    fn gemm_batched(&self, gemm: &BatchedGemm) -> Result<()>;

    /// Wait for all outstanding work.
    fn synchronize(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_span() {
        let copy = Copy2d {
            width_bytes: 12,
            height: 3,
            src_pitch: 12,
            dst_pitch: 512,
        };
        assert_eq!(copy.span(12), Some(36));
        assert_eq!(copy.span(512), Some(1036));
    }

    #[test]
    fn test_copy_check() {
        let copy = Copy2d {
            width_bytes: 8,
            height: 2,
            src_pitch: 8,
            dst_pitch: 64,
        };
        assert!(copy.check(16, 8).is_ok());
        assert!(copy.check(15, 8).is_err());

        let wide = Copy2d {
            width_bytes: 100,
            ..copy
        };
        assert!(matches!(wide.check(1000, 8), Err(DeviceError::Transfer(_))));
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(BackendType::Cuda.to_string(), "CUDA");
        assert_eq!(BackendType::Host.to_string(), "Host");
    }
}
