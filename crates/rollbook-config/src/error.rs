//! Errors raised while assembling a [`RollbookConfig`](crate::RollbookConfig).

use std::path::PathBuf;
use thiserror::Error;

/// Why Rollbook could not build its configuration.
///
/// Settings are named by their dotted path from the file root, e.g.
/// `grade_sync.lock_ttl_secs` or `lms.access_tokens[2]`.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file passed with `--config` does not exist.
    #[error("config file {} does not exist", path.display())]
    MissingFile {
        /// Path as given.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("cannot read config file {}", path.display())]
    Unreadable {
        /// Path as given.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// Only `toml` and `json` sources are understood.
    #[error("unsupported config format '{0}', expected toml or json")]
    UnsupportedFormat(String),

    /// The source did not deserialize into the Rollbook schema, including
    /// unknown sections or keys.
    #[error("malformed {format} config: {message}")]
    Malformed {
        /// `TOML` or `JSON`.
        format: &'static str,
        /// Parser message, with position when the parser reports one.
        message: String,
    },

    /// A setting parsed but is out of range or inconsistent with another.
    #[error("{setting}: {reason}")]
    InvalidSetting {
        /// Dotted path of the setting.
        setting: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A `ROLLBOOK__SECTION__KEY` variable could not be applied.
    #[error("environment override {var}: {reason}")]
    BadOverride {
        /// Variable name.
        var: String,
        /// What is wrong with its value.
        reason: String,
    },

    /// A `.env` file exists but is not valid.
    #[error("cannot load .env file: {0}")]
    Dotenv(String),
}

impl ConfigError {
    /// The named config file does not exist.
    pub fn missing_file(path: impl Into<PathBuf>) -> Self {
        Self::MissingFile { path: path.into() }
    }

    /// The named config file could not be read.
    pub fn unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }

    /// `setting` failed validation.
    pub fn invalid_setting(setting: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            setting: setting.into(),
            reason: reason.into(),
        }
    }

    /// The override variable `var` has an unusable value.
    pub fn bad_override(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadOverride {
            var: var.into(),
            reason: reason.into(),
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Malformed {
            format: "TOML",
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed {
            format: "JSON",
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_setting_names_the_path() {
        let err = ConfigError::invalid_setting("grade_sync.lock_ttl_secs", "must be greater than 0");
        assert_eq!(err.to_string(), "grade_sync.lock_ttl_secs: must be greater than 0");
    }

    #[test]
    fn test_bad_override_names_the_variable() {
        let err = ConfigError::bad_override("ROLLBOOK__CACHE__TTL_SECS", "expected integer");
        assert!(err.to_string().contains("ROLLBOOK__CACHE__TTL_SECS"));
    }

    #[test]
    fn test_unknown_section_is_malformed_toml() {
        let err: ConfigError = toml::from_str::<crate::RollbookConfig>("[authorization]\nmode = \"opa\"")
            .unwrap_err()
            .into();
        assert!(matches!(err, ConfigError::Malformed { format: "TOML", .. }));
        assert!(err.to_string().contains("authorization"));
    }

    #[test]
    fn test_missing_file_shows_path() {
        let err = ConfigError::missing_file("/etc/rollbook/rollbook.toml");
        assert!(err.to_string().contains("/etc/rollbook/rollbook.toml"));
    }
}
