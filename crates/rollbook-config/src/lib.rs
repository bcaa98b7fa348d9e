//! Typed configuration for Rollbook.
//!
//! Configuration is loaded in layers (defaults, then a TOML or JSON file,
//! then environment variables) into a [`RollbookConfig`]. Unknown fields are
//! rejected so typos in a config file fail startup instead of being ignored.
//!
//! - [`ServerConfig`] - listener address, timeouts, session cookies
//! - [`LmsConfig`] - LMS request timeout, health check URL, seeded access tokens
//! - [`CacheSection`] - per-session resource cache sizing
//! - [`GradeSyncConfig`] - grade sync jobs, locks and retries
//! - [`TelemetryConfigSection`] - metrics and logging
//!
//! # Example
//!
//! ```no_run
//! use rollbook_config::ConfigLoader;
//!
//! # fn main() -> Result<(), rollbook_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("rollbook.toml")?
//!     .with_env_prefix("ROLLBOOK")
//!     .load()?;
//!
//! println!("listening on {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! http_addr = "0.0.0.0:8080"
//! session_idle_timeout_secs = 3600
//!
//! [lms]
//! request_timeout_ms = 10000
//!
//! [[lms.instances]]
//! tool_consumer_instance_guid = "abc123"
//! base_url = "https://canvas.example.edu"
//!
//! [[lms.access_tokens]]
//! tool_consumer_instance_guid = "abc123"
//! user_id = 42
//! token = "..."
//!
//! [cache]
//! max_entries = 256
//! ttl_secs = 300
//!
//! [grade_sync]
//! lock_ttl_secs = 60
//! retry_limit = 5
//! retry_delay_secs = 5
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Values can be overridden with `PREFIX__SECTION__KEY` variables:
//!
//! - `ROLLBOOK__SERVER__HTTP_ADDR=0.0.0.0:9000`
//! - `ROLLBOOK__GRADE_SYNC__RETRY_LIMIT=3`
//! - `ROLLBOOK__LMS__INSTANCES=abc123=https://canvas.example.edu`
//! - `ROLLBOOK__LMS__ACCESS_TOKENS=abc123:42:token`

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
