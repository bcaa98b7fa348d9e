//! Error types for the authorization crate.

use http::StatusCode;
use rollbook_core::{ErrorCategory, LmsError, ResourceKind, ValidationError};
use thiserror::Error;

/// Result type for authorization operations.
pub type AuthzResult<T> = Result<T, AuthzError>;

/// Errors that can occur while authorizing and loading resources.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthzError {
    /// The LMS refused or failed a call. Carried through unchanged.
    #[error(transparent)]
    Lms(#[from] LmsError),

    /// The LMS returned a payload missing required fields.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        /// Kind of resource being loaded.
        kind: ResourceKind,
        /// Fields that failed validation.
        #[source]
        source: ValidationError,
    },

    /// A resource expected in a listing was absent.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Kind of resource.
        kind: ResourceKind,
        /// Resource id.
        id: u64,
    },
}

impl AuthzError {
    /// Create an invalid payload error.
    pub fn invalid_payload(kind: ResourceKind, source: ValidationError) -> Self {
        Self::InvalidPayload { kind, source }
    }

    /// Create a not found error.
    pub fn not_found(kind: ResourceKind, id: impl Into<u64>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Check if the LMS denied access.
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Lms(err) if err.is_unauthorized())
    }

    /// Returns the underlying LMS error, if any.
    pub const fn lms_error(&self) -> Option<&LmsError> {
        match self {
            Self::Lms(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the error category.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Lms(err) => err.category(),
            Self::InvalidPayload { .. } => ErrorCategory::External,
            Self::NotFound { .. } => ErrorCategory::NotFound,
        }
    }

    /// Returns the HTTP status code for this error.
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }
}
