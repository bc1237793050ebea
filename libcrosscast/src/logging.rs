//! Logging setup shared by the Crosscast binaries
//!
//! Diagnostics always go to stderr so stdout stays reserved for results.
//! `RUST_LOG` takes precedence over the configured level.
//!
//! # Examples
//!
//! ```no_run
//! use libcrosscast::logging::{LoggingConfig, LogFormat};
//!
//! LoggingConfig::new(LogFormat::Json, "info", false)
//!     .init()
//!     .expect("logging already initialized");
//!
//! // Or honour CROSSCAST_LOG_FORMAT / CROSSCAST_LOG_LEVEL
//! libcrosscast::logging::init_default();
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

pub const FORMAT_ENV: &str = "CROSSCAST_LOG_FORMAT";
pub const LEVEL_ENV: &str = "CROSSCAST_LOG_LEVEL";

type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain lines, no colors
    #[default]
    Text,
    /// One JSON object per line
    Json,
    /// Multi-line, colored
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                s
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Pretty => write!(f, "pretty"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
    /// Forces `debug` unless `RUST_LOG` is set
    pub verbose: bool,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: impl Into<String>, verbose: bool) -> Self {
        Self {
            format,
            level: level.into(),
            verbose,
        }
    }

    /// Read format and level from the environment
    ///
    /// Unset or unparseable values fall back to text at `info`.
    pub fn from_env() -> Self {
        let format = std::env::var(FORMAT_ENV)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let level = std::env::var(LEVEL_ENV).unwrap_or_else(|_| "info".to_string());
        Self::new(format, level, false)
    }

    /// The directive used when `RUST_LOG` is not set
    pub fn directive(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()))
    }

    /// Install the global subscriber
    ///
    /// # Errors
    ///
    /// Fails if a global subscriber is already installed.
    pub fn init(&self) -> Result<(), InitError> {
        let filter = self.filter();

        match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .with_span_list(true)
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(false)
                .with_level(true)
                .try_init(),
        }
    }
}

/// Initialize logging from `CROSSCAST_LOG_FORMAT` and `CROSSCAST_LOG_LEVEL`
///
/// A second call is a no-op.
pub fn init_default() {
    let _ = LoggingConfig::from_env().init();
}
