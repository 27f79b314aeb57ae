//! Subscriber bootstrap for binaries and examples
//!
//! Libraries embedding tether should install their own subscriber and leave
//! this alone; every component only emits `tracing` events.

use std::env;
use std::str::FromStr;

use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The level directive could not be parsed.
    #[error("invalid log filter `{directive}`: {reason}")]
    Filter {
        /// The rejected directive.
        directive: String,
        /// Parser message.
        reason: String,
    },

    /// Another global subscriber is already installed.
    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human oriented.
    Pretty,
    /// Single line per event.
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `tether_resilience=debug`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
    /// Colored output (ignored for JSON).
    pub ansi: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Compact,
            ansi: true,
        }
    }
}

impl LogConfig {
    /// Read `TETHER_LOG` (falling back to `RUST_LOG`) and `TETHER_LOG_FORMAT`.
    ///
    /// Unknown formats keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(level) = env::var("TETHER_LOG") {
            config.level = level;
        } else if let Ok(level) = env::var("RUST_LOG") {
            config.level = level;
        }

        if let Some(format) = env::var("TETHER_LOG_FORMAT")
            .ok()
            .and_then(|f| f.parse().ok())
        {
            config.format = format;
        }

        config
    }

    /// Pretty output at debug level.
    pub fn development() -> Self {
        Self {
            level: "debug".to_owned(),
            format: LogFormat::Pretty,
            ansi: true,
        }
    }

    /// JSON output at info level.
    pub fn production() -> Self {
        Self {
            level: "info".to_owned(),
            format: LogFormat::Json,
            ansi: false,
        }
    }

    /// Parse the level directive.
    pub fn filter(&self) -> Result<EnvFilter, LogError> {
        EnvFilter::try_new(&self.level).map_err(|e| LogError::Filter {
            directive: self.level.clone(),
            reason: e.to_string(),
        })
    }
}

/// Install a global subscriber for `config`.
pub fn init(config: &LogConfig) -> Result<(), LogError> {
    let filter = config.filter()?;
    let registry = Registry::default().with(filter);

    let installed = match config.format {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_ansi(config.ansi))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_ansi(config.ansi))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_ansi(false))
            .try_init(),
    };
    installed.map_err(|_| LogError::AlreadyInitialized)
}
