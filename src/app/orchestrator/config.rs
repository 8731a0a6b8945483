//! Download configuration management
//!
//! Tunables for the download pipeline: retry policy, stall monitor cadence,
//! caching behavior and chunk sizing. Everything is settable before use and
//! otherwise defaulted from `constants.rs`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{events, monitor, retry, stream, transfer};
use crate::errors::{DownloadError, DownloadResult};

/// Configuration for one product downloader
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum retry attempts after a retryable failed attempt
    pub max_retry_attempts: u32,
    /// Delay between retry attempts
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
    /// Interval between stall monitor checks
    #[serde(with = "humantime_serde")]
    pub monitor_period: Duration,
    /// Delay before the first stall monitor check
    #[serde(with = "humantime_serde")]
    pub monitor_initial_delay: Duration,
    /// Whether to tee the transfer into the cache store
    pub cache_enabled: bool,
    /// Whether the worker keeps filling the cache after the client closes
    pub continue_caching_on_cancel: bool,
    /// Chunk size for the transfer worker
    pub chunk_size: usize,
    /// Bytes the spool buffer holds in memory before spilling to disk
    pub spool_memory_limit: usize,
    /// How long `download()` waits for the first chunk before returning
    #[serde(with = "humantime_serde")]
    pub start_wait_timeout: Duration,
    /// Sleep between client stream polls while waiting for bytes
    #[serde(with = "humantime_serde")]
    pub stream_poll_interval: Duration,
    /// Buffer size for the download event channel
    pub event_buffer_size: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_retry_attempts: retry::MAX_RETRY_ATTEMPTS,
            retry_delay: retry::DELAY_BETWEEN_ATTEMPTS,
            monitor_period: monitor::PERIOD,
            monitor_initial_delay: monitor::INITIAL_DELAY,
            cache_enabled: false,
            continue_caching_on_cancel: false,
            chunk_size: transfer::DEFAULT_CHUNK_SIZE,
            spool_memory_limit: transfer::SPOOL_MEMORY_LIMIT,
            start_wait_timeout: stream::START_WAIT_TIMEOUT,
            stream_poll_interval: stream::POLL_INTERVAL,
            event_buffer_size: events::CHANNEL_BUFFER_SIZE,
        }
    }
}

impl DownloadConfig {
    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> DownloadResult<()> {
        if self.chunk_size == 0 {
            return Err(DownloadError::Configuration {
                message: "Chunk size must be greater than zero".to_string(),
            });
        }
        if self.chunk_size > transfer::MAX_CHUNK_SIZE {
            return Err(DownloadError::Configuration {
                message: format!(
                    "Chunk size ({}) exceeds maximum ({})",
                    self.chunk_size,
                    transfer::MAX_CHUNK_SIZE
                ),
            });
        }
        if self.monitor_period.is_zero() {
            return Err(DownloadError::Configuration {
                message: "Monitor period must be greater than zero".to_string(),
            });
        }
        if self.stream_poll_interval.is_zero() {
            return Err(DownloadError::Configuration {
                message: "Stream poll interval must be greater than zero".to_string(),
            });
        }
        if self.spool_memory_limit == 0 {
            return Err(DownloadError::Configuration {
                message: "Spool memory limit must be greater than zero".to_string(),
            });
        }
        if self.event_buffer_size == 0 {
            return Err(DownloadError::Configuration {
                message: "Event buffer size must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Builder for DownloadConfig following the established pattern
#[derive(Debug, Default)]
pub struct DownloadConfigBuilder {
    config: DownloadConfig,
}

impl DownloadConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: DownloadConfig::default(),
        }
    }

    /// Set maximum retry attempts
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.max_retry_attempts = attempts;
        self
    }

    /// Set delay between retry attempts
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Set stall monitor period
    pub fn monitor_period(mut self, period: Duration) -> Self {
        self.config.monitor_period = period;
        self
    }

    /// Set stall monitor initial delay
    pub fn monitor_initial_delay(mut self, delay: Duration) -> Self {
        self.config.monitor_initial_delay = delay;
        self
    }

    /// Enable or disable caching
    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.cache_enabled = enabled;
        self
    }

    /// Keep filling the cache after the client closes
    pub fn continue_caching_on_cancel(mut self, enabled: bool) -> Self {
        self.config.continue_caching_on_cancel = enabled;
        self
    }

    /// Set transfer chunk size
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set spool in-memory threshold
    pub fn spool_memory_limit(mut self, limit: usize) -> Self {
        self.config.spool_memory_limit = limit;
        self
    }

    /// Set the started-handshake timeout
    pub fn start_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.start_wait_timeout = timeout;
        self
    }

    /// Set the client stream poll interval
    pub fn stream_poll_interval(mut self, interval: Duration) -> Self {
        self.config.stream_poll_interval = interval;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> DownloadResult<DownloadConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// Build without validation (for testing)
    pub fn build_unchecked(self) -> DownloadConfig {
        self.config
    }
}

/// Configuration presets for different deployment scenarios
pub struct ConfigPresets;

impl ConfigPresets {
    /// Production configuration with conservative defaults
    pub fn production() -> DownloadConfig {
        DownloadConfig::default()
    }

    /// Development configuration with a tighter watchdog
    pub fn development() -> DownloadConfig {
        DownloadConfig {
            max_retry_attempts: 2,
            retry_delay: Duration::from_secs(1),
            monitor_period: Duration::from_secs(2),
            monitor_initial_delay: Duration::from_millis(500),
            ..Default::default()
        }
    }

    /// Testing configuration with fast timeouts and small buffers
    pub fn testing() -> DownloadConfig {
        DownloadConfig {
            max_retry_attempts: 1,
            retry_delay: Duration::from_millis(10),
            monitor_period: Duration::from_millis(50),
            monitor_initial_delay: Duration::from_millis(20),
            chunk_size: 4 * 1024,
            spool_memory_limit: 64 * 1024,
            start_wait_timeout: Duration::from_millis(200),
            stream_poll_interval: Duration::from_millis(2),
            event_buffer_size: 16,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test DownloadConfig defaults match the documented contract
    #[test]
    fn test_config_defaults() {
        let config = DownloadConfig::default();
        assert_eq!(config.max_retry_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(10));
        assert_eq!(config.monitor_period, Duration::from_secs(5));
        assert_eq!(config.monitor_initial_delay, Duration::from_secs(1));
        assert!(!config.cache_enabled);
        assert!(!config.continue_caching_on_cancel);
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    /// Test configuration validation catches invalid values
    #[test]
    fn test_config_validation() {
        let config = DownloadConfig {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DownloadConfig {
            chunk_size: transfer::MAX_CHUNK_SIZE + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DownloadConfig {
            monitor_period: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DownloadConfig {
            spool_memory_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    /// Test DownloadConfigBuilder fluent API
    #[test]
    fn test_config_builder() {
        let config = DownloadConfigBuilder::new()
            .max_retry_attempts(5)
            .retry_delay(Duration::from_secs(2))
            .cache_enabled(true)
            .chunk_size(8192)
            .build()
            .unwrap();

        assert_eq!(config.max_retry_attempts, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert!(config.cache_enabled);
        assert_eq!(config.chunk_size, 8192);
    }

    /// Test configuration presets are all valid
    #[test]
    fn test_config_presets() {
        assert!(ConfigPresets::production().validate().is_ok());
        assert!(ConfigPresets::development().validate().is_ok());
        assert!(ConfigPresets::testing().validate().is_ok());

        let test = ConfigPresets::testing();
        assert!(test.monitor_period < ConfigPresets::production().monitor_period);
    }

    /// Test round trip through serde with humantime durations
    #[test]
    fn test_config_serialization() {
        let config = ConfigPresets::development();
        let json = serde_json::to_string(&config).unwrap();
        let back: DownloadConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_retry_attempts, config.max_retry_attempts);
        assert_eq!(back.monitor_period, config.monitor_period);
    }
}
