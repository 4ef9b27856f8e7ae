//! Relay configuration.
//!
//! Loaded from YAML; durations are written in human form (`"1s"`, `"45s"`).
//!
//! ```yaml
//! model: gemini-2.5-flash-preview-09-2025
//! request_timeout: 30s
//! deadline: 45s
//! retry:
//!   max_attempts: 3
//!   base_delay: 1s
//! ```

use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default model; must support structured JSON output and system instructions.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-09-2025";

/// Default generative-language API root.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

mod human_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Exponential backoff for transient upstream failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles after each failure
    #[serde(with = "human_duration")]
    pub base_delay: Duration,

    /// Upper bound for any single delay
    #[serde(with = "human_duration")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Backoff schedule for `backon`, without jitter.
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(self.max_attempts.saturating_sub(1) as usize)
    }
}

/// Configuration for the relay and its upstream provider.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelayConfig {
    /// Model to request completions from
    pub model: String,

    /// API root, without trailing `/models`
    pub base_url: String,

    /// API key; falls back to `GEMINI_API_KEY` when absent
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Overrides the per-operation sampling temperature
    pub temperature: Option<f32>,

    /// Timeout for a single HTTP attempt
    #[serde(with = "human_duration")]
    pub request_timeout: Duration,

    /// Bound on the whole attempt sequence, backoff included
    #[serde(with = "human_duration")]
    pub deadline: Duration,

    pub retry: RetryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            temperature: None,
            request_timeout: Duration::from_secs(30),
            deadline: Duration::from_secs(45),
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("temperature", &self.temperature)
            .field("request_timeout", &self.request_timeout)
            .field("deadline", &self.deadline)
            .field("retry", &self.retry)
            .finish()
    }
}

impl RelayConfig {
    /// Parse and validate YAML configuration.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model must not be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ConfigError::Invalid(
                "base_url must start with http:// or https://".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(ConfigError::Invalid(
                "retry.max_delay must not be shorter than retry.base_delay".to_string(),
            ));
        }
        if self.deadline < self.retry.base_delay {
            return Err(ConfigError::Invalid(format!(
                "deadline ({}) is shorter than retry.base_delay ({})",
                humantime::format_duration(self.deadline),
                humantime::format_duration(self.retry.base_delay),
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backon::BackoffBuilder;

    #[test]
    fn test_default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.retry.max_attempts, 3);
    }

    fn schedule(policy: &RetryPolicy) -> Vec<Duration> {
        policy.backoff().build().collect()
    }

    #[test]
    fn test_delays_double_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(
            schedule(&policy),
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn test_delays_are_capped() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(
            schedule(&policy),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ]
        );
    }

    #[test]
    fn test_backoff_schedule_follows_attempt_budget() {
        let four = RetryPolicy {
            max_attempts: 4,
            ..Default::default()
        };
        assert_eq!(
            schedule(&four),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ]
        );

        let single = RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        };
        assert!(schedule(&single).is_empty());

        let fast = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
        };
        assert_eq!(
            schedule(&fast),
            vec![Duration::from_millis(250), Duration::from_millis(500)]
        );
    }

    #[test]
    fn test_parse_yaml_with_human_durations() {
        let config = RelayConfig::from_yaml_str(
            r#"
model: gemini-2.0-flash
request_timeout: 10s
deadline: 1m
retry:
  max_attempts: 5
  base_delay: 500ms
"#,
        )
        .unwrap();

        assert_eq!(config.model, "gemini-2.0-flash");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.deadline, Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(500));
        assert_eq!(config.retry.max_delay, Duration::from_secs(8));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let result = RelayConfig::from_yaml_str("retry:\n  max_attempts: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let result = RelayConfig::from_yaml_str("base_url: generativelanguage.googleapis.com\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let result = RelayConfig::from_yaml_str("modle: typo\n");
        assert!(matches!(result, Err(ConfigError::YamlError(_))));
    }

    #[test]
    fn test_rejects_unparseable_duration() {
        let result = RelayConfig::from_yaml_str("deadline: soon\n");
        assert!(matches!(result, Err(ConfigError::YamlError(_))));
    }

    #[test]
    fn test_api_key_redacted_in_debug() {
        let config = RelayConfig {
            api_key: Some("AIza-secret-value".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("AIza-secret-value"));
        assert!(debug.contains("[REDACTED]"));
    }
}
