//! Engine configuration via `stm.toml`
//!
//! Controls how the top-level retry loop reacts to conflicts. Restarts are
//! transparent by default: the budget is unlimited and no delay is inserted
//! between attempts. Blocking retry waits are never affected by backoff.
//!
//! # Example
//!
//! ```toml
//! # Give up after this many conflict restarts (omit for unlimited)
//! max_restarts = 64
//!
//! # Exponential backoff between conflict restarts, in milliseconds
//! backoff_base_ms = 1
//! backoff_max_ms = 50
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "stm.toml";

/// Configuration for top-level transaction attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StmConfig {
    /// Maximum number of conflict restarts before giving up (`None` = unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_restarts: Option<usize>,
    /// Base delay between restarts in milliseconds (0 = restart immediately)
    #[serde(default)]
    pub backoff_base_ms: u64,
    /// Upper bound on the delay between restarts in milliseconds
    #[serde(default)]
    pub backoff_max_ms: u64,
}

impl StmConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the restart budget
    pub fn with_max_restarts(mut self, max_restarts: usize) -> Self {
        self.max_restarts = Some(max_restarts);
        self
    }

    /// Set base delay for exponential backoff
    pub fn with_backoff_base_ms(mut self, backoff_base_ms: u64) -> Self {
        self.backoff_base_ms = backoff_base_ms;
        self
    }

    /// Set maximum delay between restarts
    pub fn with_backoff_max_ms(mut self, backoff_max_ms: u64) -> Self {
        self.backoff_max_ms = backoff_max_ms;
        self
    }

    /// Check option combinations.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a non-zero base delay exceeds the maximum.
    pub fn validate(&self) -> Result<()> {
        if self.backoff_base_ms > 0 && self.backoff_base_ms > self.backoff_max_ms {
            return Err(Error::invalid_config(format!(
                "backoff_base_ms ({}) exceeds backoff_max_ms ({})",
                self.backoff_base_ms, self.backoff_max_ms
            )));
        }
        Ok(())
    }

    /// Whether another restart is allowed after `restarts` have happened
    pub fn allows_restart(&self, restarts: usize) -> bool {
        self.max_restarts.map_or(true, |max| restarts < max)
    }

    /// Delay before the restart following attempt number `attempt` (capped exponential)
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        if self.backoff_base_ms == 0 {
            return Duration::ZERO;
        }
        // Cap the shift to prevent overflow (1 << 63 is the max for u64)
        let shift = attempt.min(63);
        let multiplier = 1u64 << shift;
        let delay_ms = self.backoff_base_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(self.backoff_max_ms))
    }

    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StmConfig = toml::from_str(content)
            .map_err(|e| Error::invalid_config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::invalid_config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::internal(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::internal(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
