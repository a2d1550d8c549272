//! Owned device allocations that free themselves on drop.

use crate::device::Device;
use crate::error::Result;
use batchmv_core::DeviceAddress;

/// A device allocation tied to the lifetime of its device.
///
/// Dropping the buffer frees the allocation, so every exit path of a caller
/// (success or `?`) releases device memory.
pub struct DeviceBuffer<'d> {
    device: &'d dyn Device,
    ptr: DeviceAddress,
    pitch_bytes: usize,
    height: usize,
}

impl<'d> DeviceBuffer<'d> {
    /// Pitched allocation of `height` rows of `width_bytes`.
    pub fn pitched(
        device: &'d dyn Device,
        width_bytes: usize,
        height: usize,
        element_size: usize,
    ) -> Result<Self> {
        let alloc = device.alloc_pitched(width_bytes, height, element_size)?;
        log::debug!(
            "{}: pitched allocation {:#x} ({} rows x {} bytes, pitch {})",
            device.name(),
            alloc.ptr,
            height,
            width_bytes,
            alloc.pitch_bytes
        );
        Ok(Self {
            device,
            ptr: alloc.ptr,
            pitch_bytes: alloc.pitch_bytes,
            height,
        })
    }

    /// Linear allocation of `bytes`.
    pub fn linear(device: &'d dyn Device, bytes: usize) -> Result<Self> {
        let ptr = device.alloc_linear(bytes)?;
        Ok(Self {
            device,
            ptr,
            pitch_bytes: bytes,
            height: 1,
        })
    }

    /// Linear allocation initialized from `data`.
    pub fn from_bytes(device: &'d dyn Device, data: &[u8]) -> Result<Self> {
        let buffer = Self::linear(device, data.len())?;
        device.copy_htod(buffer.ptr, data)?;
        Ok(buffer)
    }

    /// Base device address.
    pub fn ptr(&self) -> DeviceAddress {
        self.ptr
    }

    /// Row pitch in bytes (the full length for linear buffers).
    pub fn pitch_bytes(&self) -> usize {
        self.pitch_bytes
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.height
    }
}

impl Drop for DeviceBuffer<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.device.free(self.ptr) {
            log::warn!(
                "{}: failed to free device buffer {:#x}: {}",
                self.device.name(),
                self.ptr,
                e
            );
        }
    }
}

impl std::fmt::Debug for DeviceBuffer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("device", &self.device.name())
            .field("ptr", &format_args!("{:#x}", self.ptr))
            .field("pitch_bytes", &self.pitch_bytes)
            .field("height", &self.height)
            .finish()
    }
}
