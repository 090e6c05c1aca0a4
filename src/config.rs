//! Queue and driver tuning.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to load a [`SyncConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid config JSON.
    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Tuning for [`crate::core::queue::SyncQueue`] and its driver.
///
/// Missing fields in a config file take their default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on a single remote call.
    pub remote_timeout_ms: u64,
    /// Permanent failures tolerated before an entry is dead-lettered. 0 retries forever.
    pub max_permanent_attempts: u32,
    /// Skip sync passes while no user is signed in.
    pub require_auth: bool,
    /// Period of driver-initiated retry passes. 0 disables the timer.
    pub retry_interval_ms: u64,
    /// Capacity of the [`crate::runtime::events::SyncEvent`] broadcast channel.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: 15_000,
            max_permanent_attempts: 3,
            require_auth: true,
            retry_interval_ms: 0,
            event_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// Parses a JSON config document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Reads and parses a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// [`Self::remote_timeout_ms`] as a [`Duration`].
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }
}
