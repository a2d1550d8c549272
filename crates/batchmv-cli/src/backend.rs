//! Device detection and selection.

use batchmv::{BackendChoice, BackendSelector, EvalConfig, EvalError};
use batchmv_device::{BackendType, BlasStatus, Device, HostDevice, HostDeviceConfig};

/// Fault injection for the host device.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostOverrides {
    /// First batched multiply reports `ExecutionFailed`.
    pub fail_gemm: bool,
    /// Device memory cap in bytes.
    pub memory_limit: Option<usize>,
}

impl HostOverrides {
    fn is_set(&self) -> bool {
        self.fail_gemm || self.memory_limit.is_some()
    }
}

/// Open the device requested by `config`.
///
/// Any host override forces the host device.
pub fn open_device(
    config: &EvalConfig,
    overrides: &HostOverrides,
) -> Result<Box<dyn Device>, EvalError> {
    if overrides.is_set() {
        if config.backend == BackendChoice::Cuda {
            eprintln!("Warning: fault injection only applies to the host backend, using host");
        }
        let device = HostDevice::with_config(HostDeviceConfig {
            pitch_alignment: config.pitch_alignment,
            memory_limit: overrides.memory_limit,
        });
        if overrides.fail_gemm {
            device.fail_next_gemm(BlasStatus::ExecutionFailed);
        }
        return Ok(Box::new(device));
    }

    let device = BackendSelector::from_config(config).create_device()?;
    if config.backend == BackendChoice::Cuda && device.backend_type() == BackendType::Host {
        eprintln!("Warning: CUDA requested but not available, falling back to host");
    }
    Ok(device)
}
