//! Error types for Rollbook.
//!
//! [`LmsError`] is returned by every [`LmsClient`](crate::LmsClient) call and is
//! propagated untouched through the authorization layer. [`ValidationError`]
//! collects per-field problems found while building domain objects or saving
//! course configuration.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type alias using [`LmsError`].
pub type LmsResult<T> = Result<T, LmsError>;

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid input or payload.
    Validation,
    /// The acting LMS user may not access the resource.
    Unauthorized,
    /// Resource not found.
    NotFound,
    /// The LMS failed or could not be reached.
    External,
    /// Waiting on a shared resource timed out.
    Timeout,
    /// Internal errors.
    Internal,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::External => StatusCode::BAD_GATEWAY,
            Self::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Errors reported by the LMS REST API.
///
/// The error is `Clone` and `PartialEq` so callers can assert that what they
/// received is exactly what the client raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LmsError {
    /// The acting user lacks permission for the requested resource.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Message returned by the LMS.
        message: String,
    },

    /// The requested resource does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// Description of the missing resource.
        resource: String,
    },

    /// The LMS answered with an unexpected status.
    #[error("LMS returned {status}: {message}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// The request never completed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The LMS answered with a body that could not be decoded.
    #[error("invalid LMS payload: {0}")]
    InvalidPayload(String),
}

impl LmsError {
    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates a remote failure error.
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Check if this is an authorization failure.
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Check if this is a not found error.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized { .. } => ErrorCategory::Unauthorized,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Remote { .. } | Self::Transport(_) | Self::InvalidPayload(_) => {
                ErrorCategory::External
            }
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }
}

impl From<reqwest::Error> for LmsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::InvalidPayload(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Field-specific validation errors.
///
/// Every problem found is recorded, keyed by field name, so a caller can
/// report all of them at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// Map of field name to list of error messages.
    pub fields: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    /// Creates a new empty `ValidationError`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an error for a single missing field.
    #[must_use]
    pub fn missing(field: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, "can't be blank");
        errors
    }

    /// Adds an error for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Returns true if no errors were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns true if the given field has at least one error.
    #[must_use]
    pub fn has_error(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Returns `Ok(())` when empty, otherwise the collected errors.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("validation failed")?;
        let mut sep = ": ";
        for (field, messages) in &self.fields {
            for message in messages {
                write!(f, "{sep}{field} {message}")?;
                sep = ", ";
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}
