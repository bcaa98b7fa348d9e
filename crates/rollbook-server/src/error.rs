//! Error types for the Rollbook server.

use std::fmt;

use http::StatusCode;
use rollbook_authz::AuthzError;
use rollbook_core::{ErrorCategory, LmsError, ValidationError};
use rollbook_tasks::TaskError;
use thiserror::Error;

/// Errors a request handler can fail with.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Loading or authorizing an LMS resource failed.
    #[error(transparent)]
    Authz(#[from] AuthzError),

    /// The LMS refused or failed a call made outside a loader.
    #[error(transparent)]
    Lms(#[from] LmsError),

    /// Submitted data was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Grade sync jobs could not be queued.
    #[error("failed to queue grade sync: {0}")]
    Queue(#[from] TaskError),

    /// The request has no live session.
    #[error("no active session; launch the tool from the LMS")]
    NoSession,

    /// The request was malformed.
    #[error("bad request: {message}")]
    BadRequest {
        /// What was wrong with the request.
        message: String,
    },

    /// No route matches the request path.
    #[error("no route for {path}")]
    NotFound {
        /// Requested path.
        path: String,
    },

    /// The route exists but not for this method.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Server startup error.
    #[error("server error: {message}")]
    Server {
        /// Error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create a server error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Check if the LMS denied access or there is no session to act for.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Authz(err) => err.is_unauthorized(),
            Self::Lms(err) => err.is_unauthorized(),
            Self::NoSession => true,
            _ => false,
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Authz(err) => err.status_code(),
            Self::Lms(err) => err.status_code(),
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Queue(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NoSession => StatusCode::UNAUTHORIZED,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Server { .. } | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error category for logs and response bodies.
    pub fn category(&self) -> &'static str {
        let category = match self {
            Self::Authz(err) => err.category(),
            Self::Lms(err) => err.category(),
            Self::Validation(_) | Self::BadRequest { .. } | Self::MethodNotAllowed => {
                ErrorCategory::Validation
            }
            Self::Queue(_) => ErrorCategory::Timeout,
            Self::NoSession => ErrorCategory::Unauthorized,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Server { .. } | Self::Io(_) => ErrorCategory::Internal,
        };
        category_name(category)
    }
}

fn category_name(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Validation => "validation",
        ErrorCategory::Unauthorized => "unauthorized",
        ErrorCategory::NotFound => "not_found",
        ErrorCategory::External => "lms",
        ErrorCategory::Timeout => "unavailable",
        ErrorCategory::Internal => "internal",
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// JSON error body.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    /// Error category.
    pub error: String,
    /// Human-readable message.
    pub message: String,
    /// Request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Per-field validation messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            request_id: None,
            details: None,
        }
    }

    /// Set the request ID.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Set additional details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<&ServerError> for ErrorResponse {
    fn from(err: &ServerError) -> Self {
        let response = Self::new(err.category(), err.to_string());
        match err {
            ServerError::Validation(validation) => match serde_json::to_value(&validation.fields) {
                Ok(details) => response.with_details(details),
                Err(_) => response,
            },
            _ => response,
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollbook_core::ResourceKind;

    #[test]
    fn test_lms_status_mapping() {
        let err = ServerError::from(AuthzError::from(LmsError::unauthorized("denied")));
        assert!(err.is_unauthorized());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);

        let err = ServerError::from(LmsError::not_found("course 9"));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = ServerError::from(LmsError::remote(500, "boom"));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.category(), "lms");
    }

    #[test]
    fn test_authz_not_found() {
        let err = ServerError::from(AuthzError::not_found(ResourceKind::Section, 4_u64));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_validation_is_unprocessable() {
        let err = ServerError::from(ValidationError::missing("course_id"));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = ErrorResponse::from(&err);
        assert_eq!(body.error, "validation");
        assert_eq!(
            body.details,
            Some(serde_json::json!({"course_id": ["can't be blank"]}))
        );
    }

    #[test]
    fn test_local_errors() {
        assert!(ServerError::NoSession.is_unauthorized());
        assert_eq!(
            ServerError::bad_request("missing course_id").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServerError::not_found("/nope").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::from(TaskError::registry_full(10)).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_error_response_display() {
        let resp = ErrorResponse::new("validation", "invalid input").with_request_id("req-123");
        assert_eq!(resp.to_string(), "[validation] invalid input");
        assert_eq!(resp.request_id.as_deref(), Some("req-123"));
    }
}
