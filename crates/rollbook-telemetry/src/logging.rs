//! Structured logging for Rollbook.
//!
//! Production writes one JSON object per line. Development writes multi-line
//! pretty records. The level is an `EnvFilter` directive, so per-crate levels
//! such as `"info,rollbook_authz=debug"` work.
//!
//! # Example
//!
//! ```rust,ignore
//! use rollbook_telemetry::logging::{LogConfig, init_logging};
//!
//! init_logging(&LogConfig::default())?;
//!
//! tracing::info!(course_id = 12, student_id = 34, "Grade submitted");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// How log records are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    /// One JSON object per record.
    #[default]
    Json,
    /// Indented, human-readable records.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Install a subscriber at all.
    pub enabled: bool,

    /// Filter directive, e.g. `"info,rollbook_tasks=debug"`.
    pub level: String,

    /// Record format.
    pub output: LogOutput,

    /// Emit span open and close events. Useful for following one request
    /// or one grade sync job.
    pub span_events: bool,

    /// Attach source file and line to each record.
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Pretty output at debug level with span events.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            output: LogOutput::Pretty,
            span_events: true,
            include_location: true,
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            output: LogOutput::Json,
            span_events: false,
            include_location: false,
        }
    }

    /// The filter to install. `RUST_LOG` wins over `level` when set.
    fn filter(&self) -> TelemetryResult<EnvFilter> {
        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directives) if !directives.trim().is_empty() => parse_filter(&directives),
            _ => parse_filter(&self.level),
        }
    }
}

/// Installs the global `tracing` subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` if the filter is invalid or a global
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = config.filter()?;
    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let layer = tracing_subscriber::fmt::layer()
        .with_span_events(span_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_target(true);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.output {
        LogOutput::Json => layer.json().boxed(),
        LogOutput::Pretty => layer.pretty().boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Parses an `EnvFilter` directive string.
///
/// # Errors
///
/// Returns `TelemetryError::LoggingInit` naming the bad directive.
pub fn parse_filter(directives: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| TelemetryError::LoggingInit(format!("invalid log filter '{directives}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_production_json() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert_eq!(config.output, LogOutput::Json);
        assert_eq!(config.level, "info");
        assert!(!config.include_location);
    }

    #[test]
    fn test_development_is_pretty_and_verbose() {
        let config = LogConfig::development();
        assert_eq!(config.output, LogOutput::Pretty);
        assert!(config.span_events);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_parse_filter() {
        assert!(parse_filter("info").is_ok());
        assert!(parse_filter("warn,rollbook_tasks=debug").is_ok());

        let err = parse_filter("rollbook=notalevel").unwrap_err();
        assert!(err.to_string().contains("rollbook=notalevel"));
    }

    #[test]
    fn test_disabled_installs_nothing() {
        let config = LogConfig {
            enabled: false,
            ..LogConfig::development()
        };
        assert!(init_logging(&config).is_ok());
    }
}
