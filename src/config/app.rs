//! Application configuration structures.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::DEFAULT_COMMAND_TIMEOUT;
use crate::scheduler::{RetryPolicy, DEFAULT_INTERVAL};

use super::validation::ConfigError;

/// Minimum allowed collection interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_command_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

fn default_output_dir() -> String {
    ".".to_string()
}

/// Top-level application configuration.
///
/// Every field has a default, so a missing or empty config file yields the
/// stock behavior: 5s interval, 30s command timeout, fixed 15s reconnect
/// delay, snapshots under the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Collection interval for continuous mode (default: 5s).
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Per remote command timeout (default: 30s).
    #[serde(with = "humantime_serde")]
    pub command_timeout: Duration,

    /// Reconnect policy after a connection or cycle failure.
    pub retry: RetryPolicy,

    /// Base directory for the `timeSeries/` and `collections/` trees.
    pub output_dir: String,

    /// Path to the collectors YAML file.
    pub collectors_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            retry: RetryPolicy::default(),
            output_dir: default_output_dir(),
            collectors_file: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval < MIN_INTERVAL {
            return Err(ConfigError::ValidationError(format!(
                "interval must be at least {:?}",
                MIN_INTERVAL
            )));
        }

        if self.command_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "command_timeout must be non-zero".to_string(),
            ));
        }

        if self.retry.initial_delay.is_zero() {
            return Err(ConfigError::ValidationError(
                "retry initial_delay must be non-zero".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "retry multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.retry.max_delay < self.retry.initial_delay {
            return Err(ConfigError::ValidationError(
                "retry max_delay must not be below initial_delay".to_string(),
            ));
        }

        if self.output_dir.is_empty() {
            return Err(ConfigError::ValidationError(
                "output_dir cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.command_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.initial_delay, Duration::from_secs(15));
        assert_eq!(config.output_dir, ".");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_parse_yaml() {
        let yaml = "\
interval: 10s
command_timeout: 1m
retry:
  initial_delay: 5s
  multiplier: 2.0
  max_delay: 2m
output_dir: /var/lib/periscope
collectors_file: collectors.yaml
";

        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.interval, Duration::from_secs(10));
        assert_eq!(config.command_timeout, Duration::from_secs(60));
        assert_eq!(config.retry.initial_delay, Duration::from_secs(5));
        assert_eq!(config.retry.multiplier, 2.0);
        assert_eq!(config.output_dir, "/var/lib/periscope");
        assert_eq!(config.collectors_file.as_deref(), Some("collectors.yaml"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_validation_interval_minimum() {
        let config = AppConfig {
            interval: Duration::from_millis(100),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_app_config_validation_retry() {
        let config = AppConfig {
            retry: RetryPolicy {
                initial_delay: Duration::from_secs(30),
                multiplier: 2.0,
                max_delay: Duration::from_secs(10),
            },
            ..Default::default()
        };

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_delay"));

        let config = AppConfig {
            retry: RetryPolicy {
                multiplier: 0.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
