//! Channel configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, Result};

const DEFAULT_TRANSPORT_CAPACITY: usize = 256;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Per-subscriber buffer of the broadcast transport. A subscriber that
    /// falls further behind than this loses the oldest frames.
    pub transport_capacity: usize,
    /// Default window for `request()` when the caller does not pass one.
    pub request_timeout_ms: u64,
    /// Announce presence (hello) immediately on open. Disable for channels
    /// that only observe.
    pub auto_hello: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            transport_capacity: DEFAULT_TRANSPORT_CAPACITY,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            auto_hello: true,
        }
    }
}

impl ChannelConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validate configuration values for consistency and safety.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.transport_capacity == 0 {
            errors.push("transport_capacity must be greater than 0");
        }
        if self.request_timeout_ms == 0 {
            errors.push("request_timeout_ms must be greater than 0");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ChannelError::Config(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ChannelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert!(config.auto_hello);
    }

    #[test]
    fn test_validate_collects_errors() {
        let config = ChannelConfig {
            transport_capacity: 0,
            request_timeout_ms: 0,
            auto_hello: false,
        };
        let err = config.validate().unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("transport_capacity"));
        assert!(rendered.contains("request_timeout_ms"));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ChannelConfig = serde_json::from_str(r#"{"request_timeout_ms": 500}"#).unwrap();
        assert_eq!(config.request_timeout_ms, 500);
        assert_eq!(config.transport_capacity, DEFAULT_TRANSPORT_CAPACITY);
    }
}
