//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::{AccessTokenConfig, ConfigError, LmsInstanceConfig, LogFormat, RollbookConfig};

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. Default values (built into the code)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use rollbook_config::ConfigLoader;
///
/// # fn main() -> Result<(), rollbook_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("rollbook.toml")?
///     .with_env_prefix("ROLLBOOK")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: RollbookConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader starting from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RollbookConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = RollbookConfig::default();
        self
    }

    /// Start with the development preset.
    ///
    /// # Example
    ///
    /// ```
    /// use rollbook_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_development()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = RollbookConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = RollbookConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format (TOML or JSON) is chosen by file extension. Sections the
    /// file omits take their defaults, not the values of an earlier preset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed, or
    /// contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::missing_file(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::unreadable(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use rollbook_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     [grade_sync]
    ///     retry_limit = 2
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.grade_sync.retry_limit, 2);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::UnsupportedFormat(format.to_string()))
            }
        };
        Ok(self)
    }

    /// Set the environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, for example
    /// `ROLLBOOK__SERVER__HTTP_ADDR=0.0.0.0:9000`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file from the working directory, if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::Dotenv(e.to_string())),
        }
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or the final
    /// configuration is invalid.
    pub fn load(mut self) -> Result<RollbookConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without applying environment overrides or validating.
    #[must_use]
    pub fn load_unvalidated(self) -> RollbookConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<RollbookConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let env_vars: HashMap<String, String> =
            env::vars().filter(|(k, _)| k.starts_with(prefix)).collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::bad_override(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "MAX_CONNECTIONS"] => {
                config.server.max_connections = parse_number(key, value)?;
            }
            ["SERVER", "REQUEST_TIMEOUT_MS"] => {
                config.server.request_timeout_ms = parse_number(key, value)?;
            }
            ["SERVER", "SESSION_IDLE_TIMEOUT_SECS"] => {
                config.server.session_idle_timeout_secs = parse_number(key, value)?;
            }
            ["SERVER", "SECURE_COOKIES"] => {
                config.server.secure_cookies = parse_flag(key, value)?;
            }

            ["LMS", "REQUEST_TIMEOUT_MS"] => {
                config.lms.request_timeout_ms = parse_number(key, value)?;
            }
            ["LMS", "HEALTH_CHECK_URL"] => {
                config.lms.health_check_url = non_empty(value);
            }
            ["LMS", "INSTANCES"] => {
                config.lms.instances = parse_instances(key, value)?;
            }
            ["LMS", "ACCESS_TOKENS"] => {
                config.lms.access_tokens = parse_access_tokens(key, value)?;
            }

            ["CACHE", "MAX_ENTRIES"] => config.cache.max_entries = parse_number(key, value)?,
            ["CACHE", "TTL_SECS"] => config.cache.ttl_secs = parse_number(key, value)?,

            ["GRADE_SYNC", "MAX_CONCURRENT_JOBS"] => {
                config.grade_sync.max_concurrent_jobs = parse_number(key, value)?;
            }
            ["GRADE_SYNC", "JOB_TIMEOUT_SECS"] => {
                config.grade_sync.job_timeout_secs = parse_number(key, value)?;
            }
            ["GRADE_SYNC", "LOCK_TTL_SECS"] => {
                config.grade_sync.lock_ttl_secs = parse_number(key, value)?;
            }
            ["GRADE_SYNC", "LOCK_RETRY_COUNT"] => {
                config.grade_sync.lock_retry_count = parse_number(key, value)?;
            }
            ["GRADE_SYNC", "LOCK_RETRY_DELAY_MS"] => {
                config.grade_sync.lock_retry_delay_ms = parse_number(key, value)?;
            }
            ["GRADE_SYNC", "RETRY_LIMIT"] => {
                config.grade_sync.retry_limit = parse_number(key, value)?;
            }
            ["GRADE_SYNC", "RETRY_DELAY_SECS"] => {
                config.grade_sync.retry_delay_secs = parse_number(key, value)?;
            }

            ["TELEMETRY", "SERVICE_NAME"] => config.telemetry.service_name = value.to_string(),
            ["TELEMETRY", "ENVIRONMENT"] => config.telemetry.environment = value.to_string(),
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                config.telemetry.metrics.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                config.telemetry.logging.enabled = parse_flag(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::bad_override(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "LOGGING", "INCLUDE_LOCATION"] => {
                config.telemetry.logging.include_location = parse_flag(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "SPAN_EVENTS"] => {
                config.telemetry.logging.span_events = parse_flag(key, value)?;
            }

            // Unknown keys are ignored so unrelated variables sharing the prefix don't fail startup.
            _ => {}
        }

        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::bad_override(key, "expected integer"))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::bad_override(key, "expected boolean"))
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `guid=base_url` entries separated by commas.
fn parse_instances(key: &str, value: &str) -> Result<Vec<LmsInstanceConfig>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((guid, base_url)) if !guid.is_empty() && !base_url.is_empty() => {
                Ok(LmsInstanceConfig {
                    tool_consumer_instance_guid: guid.to_string(),
                    base_url: base_url.to_string(),
                })
            }
            _ => Err(ConfigError::bad_override(
                key,
                "expected entries of the form guid=base_url",
            )),
        })
        .collect()
}

/// Parse `guid:user_id:token` entries separated by commas.
fn parse_access_tokens(key: &str, value: &str) -> Result<Vec<AccessTokenConfig>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut fields = entry.splitn(3, ':');
            match (fields.next(), fields.next(), fields.next()) {
                (Some(guid), Some(user_id), Some(token)) => Ok(AccessTokenConfig {
                    tool_consumer_instance_guid: guid.to_string(),
                    user_id: parse_number(key, user_id)?,
                    token: token.to_string(),
                }),
                _ => Err(ConfigError::bad_override(
                    key,
                    "expected entries of the form guid:user_id:token",
                )),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_new() {
        let config = ConfigLoader::new().load().unwrap();
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_loader_with_development() {
        let config = ConfigLoader::new().with_development().load().unwrap();
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
        assert!(!config.server.secure_cookies);
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.telemetry.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_loader_with_string_json() {
        let json = r#"{"cache": {"max_entries": 16, "ttl_secs": 10}}"#;

        let config = ConfigLoader::new()
            .with_string(json, "json")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.cache.max_entries, 16);
        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_loader_with_string_unsupported_format() {
        let result = ConfigLoader::new().with_string("", "yaml");
        assert!(result.unwrap_err().to_string().contains("yaml"));
    }

    #[test]
    fn test_loader_with_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [lms]
            health_check_url = "https://lms.example/health"

            [[lms.instances]]
            tool_consumer_instance_guid = "abc123"
            base_url = "https://lms.example"

            [[lms.access_tokens]]
            tool_consumer_instance_guid = "abc123"
            user_id = 42
            token = "secret"
            "#
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_file(file.path())
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(
            config.lms.health_check_url.as_deref(),
            Some("https://lms.example/health")
        );
        assert_eq!(config.lms.access_tokens[0].token, "secret");
    }

    #[test]
    fn test_loader_rejects_unknown_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let result = ConfigLoader::new().with_file(file.path());
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/rollbook.toml");
        assert!(matches!(result, Err(ConfigError::MissingFile { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/rollbook.toml")
            .unwrap()
            .load()
            .unwrap();

        assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_load_validates() {
        let toml = r#"
            [grade_sync]
            lock_ttl_secs = 0
        "#;
        let result = ConfigLoader::new().with_string(toml, "toml").unwrap().load();
        assert!(matches!(result, Err(ConfigError::InvalidSetting { .. })));
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    // Overrides are exercised through apply_env_var; set_var needs unsafe,
    // which this workspace forbids.

    #[test]
    fn test_apply_env_var_server() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__SERVER__HTTP_ADDR", "192.168.1.1:9000", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__SERVER__SECURE_COOKIES", "no", "TEST")
            .unwrap();
        assert_eq!(loader.config.server.http_addr, "192.168.1.1:9000");
        assert!(!loader.config.server.secure_cookies);
    }

    #[test]
    fn test_apply_env_var_grade_sync() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__GRADE_SYNC__RETRY_LIMIT", "7", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__GRADE_SYNC__LOCK_TTL_SECS", "90", "TEST")
            .unwrap();
        assert_eq!(loader.config.grade_sync.retry_limit, 7);
        assert_eq!(loader.config.grade_sync.lock_ttl_secs, 90);
    }

    #[test]
    fn test_apply_env_var_telemetry() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__TELEMETRY__LOGGING__FORMAT", "pretty", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__TELEMETRY__METRICS__ENABLED", "false", "TEST")
            .unwrap();
        assert_eq!(loader.config.telemetry.logging.format, LogFormat::Pretty);
        assert!(!loader.config.telemetry.metrics.enabled);
    }

    #[test]
    fn test_apply_env_var_invalid_integer() {
        let mut loader = ConfigLoader::new();
        let result = loader.apply_env_var("TEST__CACHE__TTL_SECS", "soon", "TEST");
        assert!(matches!(result, Err(ConfigError::BadOverride { .. })));
    }

    #[test]
    fn test_apply_env_var_health_check_url_cleared() {
        let mut loader = ConfigLoader::new();
        loader.config.lms.health_check_url = Some("https://lms.example".to_string());
        loader
            .apply_env_var("TEST__LMS__HEALTH_CHECK_URL", "", "TEST")
            .unwrap();
        assert_eq!(loader.config.lms.health_check_url, None);
    }

    #[test]
    fn test_apply_env_var_access_tokens() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var(
                "TEST__LMS__ACCESS_TOKENS",
                "abc123:42:tok:en, def456:7:other",
                "TEST",
            )
            .unwrap();

        let tokens = &loader.config.lms.access_tokens;
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].user_id, 42);
        assert_eq!(tokens[0].token, "tok:en");
        assert_eq!(tokens[1].tool_consumer_instance_guid, "def456");
    }

    #[test]
    fn test_apply_env_var_instances() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var(
                "TEST__LMS__INSTANCES",
                "abc123=https://canvas.example.edu, def456=http://localhost:3000",
                "TEST",
            )
            .unwrap();

        let instances = &loader.config.lms.instances;
        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].base_url, "https://canvas.example.edu");
        assert_eq!(instances[1].tool_consumer_instance_guid, "def456");

        assert!(loader
            .apply_env_var("TEST__LMS__INSTANCES", "abc123", "TEST")
            .is_err());
    }

    #[test]
    fn test_apply_env_var_malformed_access_tokens() {
        let mut loader = ConfigLoader::new();
        assert!(loader
            .apply_env_var("TEST__LMS__ACCESS_TOKENS", "abc123:42", "TEST")
            .is_err());
        assert!(loader
            .apply_env_var("TEST__LMS__ACCESS_TOKENS", "abc123:x:token", "TEST")
            .is_err());
    }

    #[test]
    fn test_apply_env_var_unknown_key_ignored() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__AUTHORIZATION__MODE", "opa", "TEST")
            .unwrap();
        assert_eq!(loader.config, RollbookConfig::default());
    }
}
