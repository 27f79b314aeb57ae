//! Core types for the resilience library
//!
//! Classified errors and their context, the raw failure shape the classifier
//! consumes, and the configuration model shared by every component.

pub mod config;
mod error;
mod failure;

pub use config::{
    CacheConfig, ClientConfig, ConfigError, ConfigResult, HistoryConfig, NotificationConfig,
    ResilienceConfig, RetryConfig,
};
pub use error::{ClassifiedError, ErrorContext, ErrorKind, Severity, SuggestedAction};
pub use failure::{FailureShape, RawFailure};

/// Core constants
pub mod constants {
    use std::time::Duration;

    /// Retries performed by `with_retry` when the caller does not choose.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Retry bound used by the facade's `safe_execute`.
    pub const SAFE_MAX_RETRIES: u32 = 2;

    /// First backoff delay.
    pub const BASE_DELAY: Duration = Duration::from_millis(1000);

    /// Backoff ceiling.
    pub const MAX_DELAY: Duration = Duration::from_millis(8000);

    /// Lifetime of a notification when none is given.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

    /// Lifetime of notifications raised for high and critical failures.
    pub const ELEVATED_TTL: Duration = Duration::from_secs(10);

    /// Lifetime of the "connection restored" notice.
    pub const RECONNECTED_TTL: Duration = Duration::from_secs(3);

    /// Age after which cached data is no longer served.
    pub const CACHE_MAX_AGE: Duration = Duration::from_secs(5 * 60);

    /// Keys kept by the offline cache before the oldest is evicted.
    pub const CACHE_CAPACITY: usize = 256;

    /// Raw message used when a failure carries no message at all.
    pub const UNKNOWN_FAILURE_MESSAGE: &str = "Unknown error occurred";

    /// Placeholder written over sensitive context values.
    pub const REDACTED: &str = "[redacted]";
}
