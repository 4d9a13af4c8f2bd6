//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{Strategy, WindowSize};

/// Main configuration: the limiter under test and the load driven through it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Load driver configuration
    #[serde(default)]
    pub driver: DriverConfig,
}

/// Construction-time limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Admission algorithm
    #[serde(default)]
    pub strategy: Strategy,

    /// Maximum admissions per window
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Window length
    #[serde(default)]
    pub window: WindowSize,

    /// Hand the lock to the longest waiter on release
    #[serde(default = "default_true")]
    pub fair: bool,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            capacity: default_capacity(),
            window: WindowSize::default(),
            fair: default_true(),
        }
    }
}

fn default_capacity() -> usize {
    10
}

fn default_true() -> bool {
    true
}

/// Load driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Number of concurrent caller threads
    #[serde(default = "default_callers")]
    pub callers: usize,

    /// Acquisitions each caller performs
    #[serde(default = "default_acquisitions")]
    pub acquisitions_per_caller: usize,

    /// Simulated work after each admission, in milliseconds
    #[serde(default)]
    pub work_ms: u64,

    /// Extra random work of up to this many milliseconds
    #[serde(default)]
    pub jitter_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            callers: default_callers(),
            acquisitions_per_caller: default_acquisitions(),
            work_ms: 0,
            jitter_ms: 0,
        }
    }
}

fn default_callers() -> usize {
    4
}

fn default_acquisitions() -> usize {
    1
}

impl TurnstileConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no limiter or driver can run with.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.capacity == 0 {
            return Err(TurnstileError::Config(
                "limiter.capacity must be greater than 0".to_string(),
            ));
        }
        self.limiter.window.to_duration()?;

        if self.driver.callers == 0 {
            return Err(TurnstileError::Config(
                "driver.callers must be greater than 0".to_string(),
            ));
        }
        if self
            .driver
            .callers
            .checked_mul(self.driver.acquisitions_per_caller)
            .is_none()
        {
            return Err(TurnstileError::Config(format!(
                "driver.callers ({}) times driver.acquisitions_per_caller ({}) is too large",
                self.driver.callers, self.driver.acquisitions_per_caller
            )));
        }
        Ok(())
    }
}
