//! Observability for Rollbook.
//!
//! This crate provides the observability stack shared by every Rollbook crate:
//!
//! - **Logging**: structured JSON (or pretty, in development) logs via `tracing-subscriber`
//! - **Metrics**: Prometheus-format metrics via the `metrics` crate
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `rollbook_requests_total` | Counter | `route`, `status` | HTTP requests handled |
//! | `rollbook_request_duration_seconds` | Histogram | `route` | Request latency |
//! | `rollbook_authz_checks_total` | Counter | `kind`, `result` | Authorization decisions |
//! | `rollbook_resource_cache_total` | Counter | `bucket`, `result` | LMS resource cache lookups |
//! | `rollbook_grade_submissions_total` | Counter | `outcome` | Grade sync job outcomes |
//! | `rollbook_grade_lock_contention_total` | Counter | - | Grade lock acquisition timeouts |
//! | `rollbook_grade_jobs_in_flight` | Gauge | - | Grade sync jobs currently running |
//!
//! # Example
//!
//! ```rust,ignore
//! use rollbook_telemetry::{TelemetryConfig, init_telemetry};
//!
//! let config = TelemetryConfig::new("rollbook").with_environment("production");
//!
//! init_telemetry(&config)?;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use error::TelemetryError;
pub use logging::{init_logging, LogConfig, LogOutput};
pub use metrics::{init_metrics, MetricsConfig};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Initializes logging and metrics.
///
/// # Errors
///
/// Returns `TelemetryError` if any subsystem fails to initialize.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<()> {
    init_logging(&config.logging)?;
    init_metrics(&config.metrics)?;

    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_identity() {
        let config = TelemetryConfig::new("test-service").with_environment("test");

        assert_eq!(config.service_name, "test-service");
        assert_eq!(config.environment, "test");
    }

    #[test]
    fn test_init_with_everything_disabled() {
        let config = TelemetryConfig::default()
            .with_logging(LogConfig {
                enabled: false,
                ..LogConfig::default()
            })
            .with_metrics(MetricsConfig::disabled());

        assert!(init_telemetry(&config).is_ok());
    }
}
