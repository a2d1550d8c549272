//! Device backend selection.

use crate::config::{BackendChoice, EvalConfig};
use crate::error::Result;
use batchmv_device::{BackendType, Device, HostDevice, HostDeviceConfig};

/// Selector for choosing the device to evaluate on.
#[derive(Debug, Clone, Default)]
pub struct BackendSelector {
    /// Preferred backend type.
    pub preferred: Option<BackendType>,
    /// Configuration for the host device.
    pub host_config: HostDeviceConfig,
}

impl BackendSelector {
    /// Create a new backend selector with automatic detection.
    pub fn auto() -> Self {
        Self::default()
    }

    /// Create a selector that prefers CUDA.
    pub fn prefer_cuda() -> Self {
        Self {
            preferred: Some(BackendType::Cuda),
            ..Self::default()
        }
    }

    /// Create a selector that forces the host device.
    pub fn host_only() -> Self {
        Self {
            preferred: Some(BackendType::Host),
            ..Self::default()
        }
    }

    /// Build a selector from an evaluation config.
    pub fn from_config(config: &EvalConfig) -> Self {
        let selector = match config.backend {
            BackendChoice::Auto => Self::auto(),
            BackendChoice::Host => Self::host_only(),
            BackendChoice::Cuda => Self::prefer_cuda(),
        };
        selector.with_host_config(HostDeviceConfig {
            pitch_alignment: config.pitch_alignment,
            ..HostDeviceConfig::default()
        })
    }

    /// Set custom host device configuration.
    pub fn with_host_config(mut self, host_config: HostDeviceConfig) -> Self {
        self.host_config = host_config;
        self
    }

    /// Open the selected device.
    pub fn create_device(&self) -> Result<Box<dyn Device>> {
        if self.preferred == Some(BackendType::Host) {
            return Ok(Box::new(HostDevice::with_config(self.host_config.clone())));
        }

        // Try preferred backend first
        if let Some(preferred) = self.preferred {
            if let Some(device) = self.try_create_backend(preferred) {
                return Ok(device);
            }
        }

        // Auto-detect
        #[cfg(feature = "cuda")]
        if let Some(device) = self.try_create_backend(BackendType::Cuda) {
            return Ok(device);
        }

        // Fall back to the host device
        Ok(Box::new(HostDevice::with_config(self.host_config.clone())))
    }

    fn try_create_backend(&self, backend: BackendType) -> Option<Box<dyn Device>> {
        match backend {
            #[cfg(feature = "cuda")]
            BackendType::Cuda => match batchmv_device::CudaDevice::new(0) {
                Ok(device) => Some(Box::new(device)),
                Err(e) => {
                    log::debug!("CUDA backend unavailable: {}", e);
                    None
                }
            },
            #[cfg(not(feature = "cuda"))]
            BackendType::Cuda => {
                log::debug!("CUDA support not compiled in");
                None
            }

            BackendType::Host => Some(Box::new(HostDevice::with_config(
                self.host_config.clone(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_selector_host() {
        let device = BackendSelector::host_only().create_device().unwrap();
        assert_eq!(device.backend_type(), BackendType::Host);
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_falls_back_to_host() {
        let device = BackendSelector::prefer_cuda().create_device().unwrap();
        assert_eq!(device.backend_type(), BackendType::Host);
    }

    #[test]
    fn test_from_config_carries_pitch_alignment() {
        let config = EvalConfig {
            backend: BackendChoice::Host,
            pitch_alignment: 32,
            ..EvalConfig::default()
        };
        let selector = BackendSelector::from_config(&config);
        assert_eq!(selector.preferred, Some(BackendType::Host));
        assert_eq!(selector.host_config.pitch_alignment, 32);
    }
}
