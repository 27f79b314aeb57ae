//! Configuration types and validation

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A field holds a value outside its allowed range.
    #[error("invalid `{field}`: {message}")]
    Validation {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },

    /// The configuration document could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Shorthand for a validation failure.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Retry behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// When false every call is a single attempt.
    pub enabled: bool,
    /// Retries used by `execute_with_retry` when the caller does not choose.
    pub max_retries: u32,
    /// Retries used by `safe_execute`.
    pub safe_max_retries: u32,
    /// First backoff delay.
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Backoff ceiling.
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: constants::DEFAULT_MAX_RETRIES,
            safe_max_retries: constants::SAFE_MAX_RETRIES,
            base_delay: constants::BASE_DELAY,
            max_delay: constants::MAX_DELAY,
        }
    }
}

/// User-facing notification behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// When false failures are still reported but never shown.
    pub enabled: bool,
    /// Lifetime of ordinary notices.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Lifetime of notices for high and critical failures.
    #[serde(with = "humantime_serde")]
    pub elevated_ttl: Duration,
    /// Lifetime of the "connection restored" notice.
    #[serde(with = "humantime_serde")]
    pub reconnected_ttl: Duration,
    /// Whether connectivity transitions raise notices.
    pub offline_notices: bool,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: constants::DEFAULT_TTL,
            elevated_ttl: constants::ELEVATED_TTL,
            reconnected_ttl: constants::RECONNECTED_TTL,
            offline_notices: true,
        }
    }
}

/// Identity stamped into every error context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Identifier of this client build or installation.
    pub client_id: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: "tether-client".to_owned(),
        }
    }
}

/// In-memory error history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Most recent errors kept.
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 100 }
    }
}

/// Last-known-good data served while offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries older than this are dropped instead of served.
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
    /// Keys kept before the oldest entry is evicted.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: constants::CACHE_MAX_AGE,
            capacity: constants::CACHE_CAPACITY,
        }
    }
}

/// Top-level configuration for the resilience subsystem.
///
/// Every section falls back to its defaults, so `{}` is a valid document:
///
/// ```rust
/// use tether_resilience::ResilienceConfig;
///
/// let config = ResilienceConfig::from_json_str(r#"{ "retry": { "max_retries": 5 } }"#)?;
/// assert_eq!(config.retry.max_retries, 5);
/// assert_eq!(config.retry.safe_max_retries, 2);
/// # Ok::<(), tether_resilience::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Retry behaviour.
    pub retry: RetryConfig,
    /// Notification behaviour.
    pub notifications: NotificationConfig,
    /// Client identity.
    pub client: ClientConfig,
    /// Error history.
    pub history: HistoryConfig,
    /// Offline data cache.
    pub cache: CacheConfig,
}

impl ResilienceConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.retry.base_delay.is_zero() {
            return Err(ConfigError::validation(
                "retry.base_delay",
                "must be greater than 0",
            ));
        }
        if self.retry.max_delay < self.retry.base_delay {
            return Err(ConfigError::validation(
                "retry.max_delay",
                format!(
                    "must be at least retry.base_delay ({:?})",
                    self.retry.base_delay
                ),
            ));
        }

        let ttls = [
            ("notifications.default_ttl", self.notifications.default_ttl),
            ("notifications.elevated_ttl", self.notifications.elevated_ttl),
            (
                "notifications.reconnected_ttl",
                self.notifications.reconnected_ttl,
            ),
        ];
        for (field, ttl) in ttls {
            if ttl.is_zero() {
                return Err(ConfigError::validation(field, "must be greater than 0"));
            }
        }

        if self.client.client_id.trim().is_empty() {
            return Err(ConfigError::validation(
                "client.client_id",
                "cannot be empty",
            ));
        }
        if self.client.client_id.len() > 256 {
            return Err(ConfigError::validation(
                "client.client_id",
                "too long (max 256 chars)",
            ));
        }

        if self.history.capacity == 0 {
            return Err(ConfigError::validation(
                "history.capacity",
                "must be greater than 0",
            ));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::validation(
                "cache.capacity",
                "must be greater than 0",
            ));
        }
        if self.cache.max_age.is_zero() {
            return Err(ConfigError::validation(
                "cache.max_age",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}
