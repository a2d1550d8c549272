//! Evaluation configuration.

use crate::error::EvalError;
use batchmv_core::Precision;
use batchmv_device::DEFAULT_PITCH_ALIGNMENT;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default tolerance when verifying against the host reference.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Largest accepted host pitch alignment, in bytes.
pub const MAX_PITCH_ALIGNMENT: usize = 1 << 20;

/// Which device to run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// CUDA if compiled in and present, else the host device.
    #[default]
    Auto,
    /// The host-emulated device.
    Host,
    /// CUDA, falling back to the host device when unavailable.
    Cuda,
}

/// Errors loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Everything needed to run one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvalConfig {
    /// Matrix dimension.
    pub size: usize,
    /// Number of problems.
    pub num: usize,
    /// Value of every matrix element.
    pub a: f64,
    /// Value of every vector element.
    pub b: f64,
    /// Element precision.
    pub precision: Precision,
    /// Device selection.
    pub backend: BackendChoice,
    /// Row pitch alignment of the host device, in bytes.
    pub pitch_alignment: usize,
    /// Compare against the nalgebra reference.
    pub verify: bool,
    /// Maximum absolute error accepted by `verify`.
    pub tolerance: f64,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            size: 1,
            num: 1,
            a: 3.0,
            b: 2.0,
            precision: Precision::Single,
            backend: BackendChoice::Auto,
            pitch_alignment: DEFAULT_PITCH_ALIGNMENT,
            verify: false,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl EvalConfig {
    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Reject configurations that cannot be evaluated.
    pub fn validate(&self) -> Result<(), EvalError> {
        if self.size == 0 {
            return Err(EvalError::InvalidConfig("size must be at least 1".into()));
        }
        if self.num == 0 {
            return Err(EvalError::InvalidConfig("num must be at least 1".into()));
        }
        let elements = self
            .size
            .checked_mul(self.size)
            .and_then(|sq| sq.checked_mul(self.num))
            .and_then(|n| n.checked_mul(self.precision.element_size()));
        if elements.is_none() {
            return Err(EvalError::InvalidConfig(format!(
                "batch of {} matrices of size {} is too large",
                self.num, self.size
            )));
        }
        if !self.a.is_finite() || !self.b.is_finite() {
            return Err(EvalError::InvalidConfig(
                "matrix and vector values must be finite".into(),
            ));
        }
        if self.pitch_alignment == 0 || self.pitch_alignment > MAX_PITCH_ALIGNMENT {
            return Err(EvalError::InvalidConfig(format!(
                "pitch_alignment must be between 1 and {}",
                MAX_PITCH_ALIGNMENT
            )));
        }
        if self.tolerance.is_nan() || self.tolerance < 0.0 {
            return Err(EvalError::InvalidConfig(
                "tolerance must be non-negative".into(),
            ));
        }
        Ok(())
    }
}
