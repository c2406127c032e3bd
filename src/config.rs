//! Configuration for the router: buffer size and the fixed durations of every timer.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Tunables for a level. Durations are stored in milliseconds so the TOML stays readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Number of overflow slots in the buffer.
    pub buffer_slots: usize,
    /// How long a full bin drains before it is retired.
    pub drain_ms: u64,
    /// How long a single item spends in flight.
    pub transfer_ms: u64,
    /// How long to wait for a demand forecast before planning as if demand were zero.
    pub demand_timeout_ms: u64,
    /// Grace period once the buffer is full. Cancelled when a slot frees up.
    pub buffer_full_countdown_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            buffer_slots: 5,
            drain_ms: 600,
            transfer_ms: 400,
            demand_timeout_ms: 1_000,
            buffer_full_countdown_ms: 10_000,
        }
    }
}

impl RouterConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or the values are unusable.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the router cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_slots == 0 {
            return Err(Error::Config("buffer_slots must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn drain_duration(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    pub fn transfer_duration(&self) -> Duration {
        Duration::from_millis(self.transfer_ms)
    }

    pub fn demand_timeout(&self) -> Duration {
        Duration::from_millis(self.demand_timeout_ms)
    }

    pub fn buffer_full_countdown(&self) -> Duration {
        Duration::from_millis(self.buffer_full_countdown_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = RouterConfig::parse("buffer_slots = 7\ndrain_ms = 250\n").expect("valid config");
        assert_eq!(config.buffer_slots, 7);
        assert_eq!(config.drain_duration(), Duration::from_millis(250));
        assert_eq!(config.transfer_ms, RouterConfig::default().transfer_ms);
    }

    #[test]
    fn zero_buffer_is_rejected() {
        let err = RouterConfig::parse("buffer_slots = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = RouterConfig::parse("buffer_slots = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
