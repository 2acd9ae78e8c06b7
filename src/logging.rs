//! Structured logging setup.
//!
//! Diagnostics go to stderr so plan output on stdout stays machine-readable.

use std::env;
use std::fmt;
use std::io;
use tracing_subscriber::{fmt as tfmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-friendly multi-line output
    Pretty,
    /// One line per event
    Compact,
    /// JSON lines for log collectors
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error, or `target=level` lists)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include source file and line numbers
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: LogFormat::Compact,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Read `RUST_LOG`, `LARDER_LOG_FORMAT`, and `LARDER_LOG_LOCATION`.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let level = env::var("RUST_LOG").unwrap_or(defaults.level);
        let format = env::var("LARDER_LOG_FORMAT")
            .ok()
            .and_then(|v| parse_format(&v))
            .unwrap_or(defaults.format);
        Self {
            level,
            format,
            include_location: env::var("LARDER_LOG_LOCATION").is_ok_and(|v| v != "0" && v != "false"),
        }
    }

    /// Raise the level to `debug` unless an explicit filter was given.
    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose && env::var("RUST_LOG").is_err() {
            self.level = "debug".into();
        }
        self
    }

    /// Install the global subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is malformed or a subscriber is
    /// already installed.
    pub fn init(&self) -> Result<(), String> {
        let filter = EnvFilter::try_new(&self.level)
            .map_err(|e| format!("invalid log filter '{}': {}", self.level, e))?;
        let registry = tracing_subscriber::registry().with(filter);

        let result = match self.format {
            LogFormat::Json => registry
                .with(
                    tfmt::layer()
                        .json()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_target(true)
                        .with_writer(io::stderr),
                )
                .try_init(),
            LogFormat::Pretty => registry
                .with(
                    tfmt::layer()
                        .pretty()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_target(true)
                        .with_writer(io::stderr),
                )
                .try_init(),
            LogFormat::Compact => registry
                .with(
                    tfmt::layer()
                        .compact()
                        .with_file(self.include_location)
                        .with_line_number(self.include_location)
                        .with_target(false)
                        .with_writer(io::stderr),
                )
                .try_init(),
        };
        result.map_err(|e| format!("cannot install logger: {}", e))?;

        tracing::debug!(level = %self.level, format = %self.format, "logging initialized");
        Ok(())
    }
}

fn parse_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        "compact" => Some(LogFormat::Compact),
        _ => None,
    }
}
