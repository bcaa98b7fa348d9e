//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use serde::{Deserialize, Serialize};

/// Server configuration section.
///
/// Controls the HTTP listener and browser sessions.
///
/// # Example
///
/// ```
/// use rollbook_config::ServerConfig;
///
/// let config = ServerConfig {
///     http_addr: "127.0.0.1:3001".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.session_idle_timeout_secs, 3600);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// HTTP server bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Request timeout in milliseconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Sessions unused for this long are dropped.
    #[serde(default = "default_session_idle_timeout")]
    pub session_idle_timeout_secs: u64,

    /// Set the `Secure` attribute on the session cookie.
    #[serde(default = "default_true")]
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_connections: default_max_connections(),
            request_timeout_ms: default_request_timeout(),
            session_idle_timeout_secs: default_session_idle_timeout(),
            secure_cookies: true,
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_connections() -> u32 {
    10000
}

fn default_request_timeout() -> u64 {
    30000
}

fn default_session_idle_timeout() -> u64 {
    3600
}

/// An LMS installation Rollbook accepts launches from.
///
/// Stored tokens for the instance are only ever sent to `base_url`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LmsInstanceConfig {
    /// `tool_consumer_instance_guid` the LMS sends on launch.
    pub tool_consumer_instance_guid: String,

    /// API root, e.g. `https://canvas.example.edu`.
    pub base_url: String,
}

/// A stored LMS API token.
///
/// Tokens are normally obtained through the LMS OAuth flow; this lets a
/// deployment seed them instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AccessTokenConfig {
    /// LMS instance the token belongs to.
    pub tool_consumer_instance_guid: String,

    /// LMS user the token acts as.
    pub user_id: u64,

    /// Bearer token.
    pub token: String,
}

/// LMS client configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LmsConfig {
    /// Timeout for each LMS API request, in milliseconds.
    #[serde(default = "default_lms_timeout")]
    pub request_timeout_ms: u64,

    /// URL fetched by the readiness check. Unset skips the LMS check.
    #[serde(default)]
    pub health_check_url: Option<String>,

    /// Known LMS installations.
    #[serde(default)]
    pub instances: Vec<LmsInstanceConfig>,

    /// Seeded API tokens. Each must belong to a listed instance.
    #[serde(default)]
    pub access_tokens: Vec<AccessTokenConfig>,
}

impl Default for LmsConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_lms_timeout(),
            health_check_url: None,
            instances: Vec::new(),
            access_tokens: Vec::new(),
        }
    }
}

fn default_lms_timeout() -> u64 {
    10000
}

/// Per-session LMS resource cache section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    /// Maximum cached payloads per session. Zero disables the cache.
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,

    /// Seconds a cached payload stays fresh.
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: default_cache_entries(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

fn default_cache_entries() -> usize {
    256
}

fn default_cache_ttl() -> u64 {
    300
}

/// Grade sync job configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct GradeSyncConfig {
    /// Maximum grade sync jobs running at once.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Deadline for a whole job, retries included, in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// Seconds a grade lock is held before it expires.
    #[serde(default = "default_lock_ttl")]
    pub lock_ttl_secs: u64,

    /// Acquisition attempts before a lock counts as contended.
    #[serde(default = "default_lock_retry_count")]
    pub lock_retry_count: u32,

    /// Pause between lock acquisition attempts, in milliseconds.
    #[serde(default = "default_lock_retry_delay")]
    pub lock_retry_delay_ms: u64,

    /// Job reruns after lock contention.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Pause before a job rerun, in seconds.
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for GradeSyncConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            job_timeout_secs: default_job_timeout(),
            lock_ttl_secs: default_lock_ttl(),
            lock_retry_count: default_lock_retry_count(),
            lock_retry_delay_ms: default_lock_retry_delay(),
            retry_limit: default_retry_limit(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    64
}

fn default_job_timeout() -> u64 {
    300
}

fn default_lock_ttl() -> u64 {
    60
}

fn default_lock_retry_count() -> u32 {
    3
}

fn default_lock_retry_delay() -> u64 {
    200
}

fn default_retry_limit() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    5
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Enable metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Histogram bucket boundaries for request duration.
    #[serde(default = "default_histogram_buckets")]
    pub histogram_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            histogram_buckets: default_histogram_buckets(),
        }
    }
}

fn default_histogram_buckets() -> Vec<f64> {
    vec![
        0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ]
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON structured logging (for production).
    #[default]
    Json,
    /// Human-readable format (for development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g., "info" or "info,rollbook_tasks=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include file and line in log records.
    #[serde(default)]
    pub include_location: bool,

    /// Log span open and close events.
    #[serde(default)]
    pub span_events: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::Json,
            include_location: false,
            span_events: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Service name reported in logs.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Deployment environment (development, staging, production).
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for TelemetryConfigSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl TelemetryConfigSection {
    /// Converts the section into the telemetry crate's configuration.
    pub fn to_telemetry_config(&self) -> rollbook_telemetry::TelemetryConfig {
        let logging = rollbook_telemetry::LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            output: match self.logging.format {
                LogFormat::Json => rollbook_telemetry::LogOutput::Json,
                LogFormat::Pretty => rollbook_telemetry::LogOutput::Pretty,
            },
            span_events: self.logging.span_events,
            include_location: self.logging.include_location,
        };
        let metrics = rollbook_telemetry::MetricsConfig {
            enabled: self.metrics.enabled,
            duration_buckets: self.metrics.histogram_buckets.clone(),
        };

        rollbook_telemetry::TelemetryConfig::new(self.service_name.as_str())
            .with_environment(self.environment.as_str())
            .with_logging(logging)
            .with_metrics(metrics)
    }
}

fn default_service_name() -> String {
    "rollbook".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_true() -> bool {
    true
}
