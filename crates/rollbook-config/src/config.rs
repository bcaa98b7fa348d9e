//! Main configuration types.
//!
//! This module provides the top-level [`RollbookConfig`] struct and its builder.

use serde::{Deserialize, Serialize};

use crate::{
    CacheSection, ConfigError, GradeSyncConfig, LmsConfig, LogFormat, ServerConfig,
    TelemetryConfigSection,
};

/// Complete Rollbook configuration.
///
/// This is the root configuration type that contains all configuration sections.
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use rollbook_config::RollbookConfig;
///
/// let config = RollbookConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.grade_sync.lock_ttl_secs, 60);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct RollbookConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// LMS client configuration.
    #[serde(default)]
    pub lms: LmsConfig,

    /// Per-session resource cache configuration.
    #[serde(default)]
    pub cache: CacheSection,

    /// Grade sync job configuration.
    #[serde(default)]
    pub grade_sync: GradeSyncConfig,

    /// Telemetry configuration (metrics, logging).
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,
}

impl RollbookConfig {
    /// Create a new configuration builder.
    ///
    /// # Example
    ///
    /// ```
    /// use rollbook_config::{RollbookConfig, ServerConfig};
    ///
    /// let config = RollbookConfig::builder()
    ///     .server(ServerConfig {
    ///         http_addr: "127.0.0.1:3001".to_string(),
    ///         ..Default::default()
    ///     })
    ///     .build();
    ///
    /// assert_eq!(config.server.http_addr, "127.0.0.1:3001");
    /// ```
    #[must_use]
    pub fn builder() -> RollbookConfigBuilder {
        RollbookConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSetting` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self
            .server
            .http_addr
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::invalid_setting(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            ));
        }

        if self.server.session_idle_timeout_secs == 0 {
            return Err(ConfigError::invalid_setting(
                "server.session_idle_timeout_secs",
                "must be greater than 0",
            ));
        }

        if let Some(url) = &self.lms.health_check_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::invalid_setting(
                    "lms.health_check_url",
                    format!("expected an http(s) url, got {url}"),
                ));
            }
        }

        for (index, instance) in self.lms.instances.iter().enumerate() {
            let url = &instance.base_url;
            if instance.tool_consumer_instance_guid.is_empty()
                || !(url.starts_with("http://") || url.starts_with("https://"))
            {
                return Err(ConfigError::invalid_setting(
                    format!("lms.instances[{index}]"),
                    "expected a tool_consumer_instance_guid and an http(s) base_url",
                ));
            }
        }

        for (index, token) in self.lms.access_tokens.iter().enumerate() {
            if token.token.is_empty() || token.tool_consumer_instance_guid.is_empty() {
                return Err(ConfigError::invalid_setting(
                    format!("lms.access_tokens[{index}]"),
                    "token and tool_consumer_instance_guid must not be empty",
                ));
            }
            if !self
                .lms
                .instances
                .iter()
                .any(|i| i.tool_consumer_instance_guid == token.tool_consumer_instance_guid)
            {
                return Err(ConfigError::invalid_setting(
                    format!("lms.access_tokens[{index}]"),
                    format!(
                        "no lms.instances entry for {}",
                        token.tool_consumer_instance_guid
                    ),
                ));
            }
        }

        if self.grade_sync.max_concurrent_jobs == 0 {
            return Err(ConfigError::invalid_setting(
                "grade_sync.max_concurrent_jobs",
                "must be greater than 0",
            ));
        }

        if self.grade_sync.lock_ttl_secs == 0 {
            return Err(ConfigError::invalid_setting(
                "grade_sync.lock_ttl_secs",
                "must be greater than 0",
            ));
        }

        if self.grade_sync.lock_retry_count == 0 {
            return Err(ConfigError::invalid_setting(
                "grade_sync.lock_retry_count",
                "must be at least 1",
            ));
        }

        if self.telemetry.logging.enabled && self.telemetry.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_setting(
                "telemetry.logging.level",
                "must not be empty",
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// - Pretty log formatting with source locations
    /// - Debug log level
    /// - Session cookies without the `Secure` flag
    /// - Short resource cache lifetime
    ///
    /// # Example
    ///
    /// ```
    /// use rollbook_config::RollbookConfig;
    ///
    /// let config = RollbookConfig::development();
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.include_location = true;
        config.telemetry.environment = "development".to_string();

        config.server.http_addr = "127.0.0.1:3001".to_string();
        config.server.secure_cookies = false;

        config.cache.ttl_secs = 30;
        config.grade_sync.max_concurrent_jobs = 8;

        config
    }

    /// Create a production configuration preset.
    ///
    /// - JSON log formatting
    /// - Info log level
    /// - Secure session cookies
    ///
    /// # Example
    ///
    /// ```
    /// use rollbook_config::RollbookConfig;
    ///
    /// let config = RollbookConfig::production();
    /// assert_eq!(config.telemetry.logging.format, rollbook_config::LogFormat::Json);
    /// ```
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.environment = "production".to_string();

        config.server.secure_cookies = true;
        config.cache.ttl_secs = 60;

        config
    }
}

/// Builder for [`RollbookConfig`].
#[derive(Debug, Default)]
pub struct RollbookConfigBuilder {
    server: Option<ServerConfig>,
    lms: Option<LmsConfig>,
    cache: Option<CacheSection>,
    grade_sync: Option<GradeSyncConfig>,
    telemetry: Option<TelemetryConfigSection>,
}

impl RollbookConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server configuration.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the LMS configuration.
    #[must_use]
    pub fn lms(mut self, lms: LmsConfig) -> Self {
        self.lms = Some(lms);
        self
    }

    /// Set the cache configuration.
    #[must_use]
    pub fn cache(mut self, cache: CacheSection) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the grade sync configuration.
    #[must_use]
    pub fn grade_sync(mut self, grade_sync: GradeSyncConfig) -> Self {
        self.grade_sync = Some(grade_sync);
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration.
    ///
    /// Any unset sections will use their default values.
    #[must_use]
    pub fn build(self) -> RollbookConfig {
        RollbookConfig {
            server: self.server.unwrap_or_default(),
            lms: self.lms.unwrap_or_default(),
            cache: self.cache.unwrap_or_default(),
            grade_sync: self.grade_sync.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<RollbookConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccessTokenConfig, LmsInstanceConfig};

    #[test]
    fn test_default_config() {
        let config = RollbookConfig::default();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
        assert_eq!(config.telemetry.service_name, "rollbook");
        assert_eq!(config.cache.max_entries, 256);
        assert!(config.lms.access_tokens.is_empty());
    }

    #[test]
    fn test_builder_sections() {
        let config = RollbookConfig::builder()
            .cache(CacheSection {
                max_entries: 0,
                ttl_secs: 0,
            })
            .grade_sync(GradeSyncConfig {
                retry_limit: 2,
                ..Default::default()
            })
            .build();

        assert_eq!(config.cache.max_entries, 0);
        assert_eq!(config.grade_sync.retry_limit, 2);
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(RollbookConfig::default().validate().is_ok());
        assert!(RollbookConfig::development().validate().is_ok());
        assert!(RollbookConfig::production().validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_server_addr() {
        let result = RollbookConfig::builder()
            .server(ServerConfig {
                http_addr: "not-an-address".to_string(),
                ..Default::default()
            })
            .build_validated();

        assert!(result.unwrap_err().to_string().contains("http_addr"));
    }

    #[test]
    fn test_validate_health_check_url() {
        let result = RollbookConfig::builder()
            .lms(LmsConfig {
                health_check_url: Some("lms.example".to_string()),
                ..Default::default()
            })
            .build_validated();

        assert!(result.unwrap_err().to_string().contains("health_check_url"));
    }

    #[test]
    fn test_validate_empty_token() {
        let result = RollbookConfig::builder()
            .lms(LmsConfig {
                access_tokens: vec![AccessTokenConfig {
                    tool_consumer_instance_guid: "abc123".to_string(),
                    user_id: 1,
                    token: String::new(),
                }],
                ..Default::default()
            })
            .build_validated();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("lms.access_tokens[0]"));
    }

    #[test]
    fn test_validate_token_needs_instance() {
        let token = AccessTokenConfig {
            tool_consumer_instance_guid: "abc123".to_string(),
            user_id: 1,
            token: "secret".to_string(),
        };
        let result = RollbookConfig::builder()
            .lms(LmsConfig {
                access_tokens: vec![token.clone()],
                ..Default::default()
            })
            .build_validated();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("no lms.instances entry for abc123"));

        let result = RollbookConfig::builder()
            .lms(LmsConfig {
                instances: vec![LmsInstanceConfig {
                    tool_consumer_instance_guid: "abc123".to_string(),
                    base_url: "https://canvas.example.edu".to_string(),
                }],
                access_tokens: vec![token],
                ..Default::default()
            })
            .build_validated();
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_grade_sync_limits() {
        let result = RollbookConfig::builder()
            .grade_sync(GradeSyncConfig {
                lock_ttl_secs: 0,
                ..Default::default()
            })
            .build_validated();
        assert!(result.unwrap_err().to_string().contains("lock_ttl_secs"));

        let result = RollbookConfig::builder()
            .grade_sync(GradeSyncConfig {
                lock_retry_count: 0,
                ..Default::default()
            })
            .build_validated();
        assert!(result.unwrap_err().to_string().contains("lock_retry_count"));
    }

    #[test]
    fn test_development_preset() {
        let config = RollbookConfig::development();
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
        assert!(!config.server.secure_cookies);
        assert_eq!(config.cache.ttl_secs, 30);
    }

    #[test]
    fn test_production_preset() {
        let config = RollbookConfig::production();
        assert_eq!(config.telemetry.logging.level, "info");
        assert_eq!(config.telemetry.environment, "production");
        assert!(config.server.secure_cookies);
    }

    #[test]
    fn test_toml_serialization() {
        let toml_str = toml::to_string_pretty(&RollbookConfig::default()).unwrap();
        assert!(toml_str.contains("[server]"));
        assert!(toml_str.contains("[grade_sync]"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let toml_str = r#"
            [server]
            http_addr = "127.0.0.1:8000"
            unknown_field = "value"
        "#;

        let result: Result<RollbookConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_section_rejected() {
        let result: Result<RollbookConfig, _> = toml::from_str("[authorization]\nenabled = true");
        assert!(result.is_err());
    }
}
