//! Error types for background jobs, locks and grade synchronization.

use std::time::Duration;

use rollbook_core::LmsError;
use thiserror::Error;

/// Result type for job spawner operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Result type for grade sync operations.
pub type GradeSyncResult<T> = Result<T, GradeSyncError>;

/// Errors from running jobs on the [`JobSpawner`](crate::JobSpawner).
#[derive(Debug, Error)]
pub enum TaskError {
    /// The runtime dropped the job before it finished.
    #[error("job cancelled: {0}")]
    Cancelled(String),

    /// Job ran past its deadline.
    #[error("job timed out after {0:?}")]
    Timeout(Duration),

    /// Job panicked during execution.
    #[error("job panicked: {0}")]
    Panicked(String),

    /// Job ran to completion and reported an error.
    #[error("job failed: {0}")]
    Failed(String),

    /// The spawner refused the job.
    #[error("failed to spawn job: {0}")]
    SpawnFailed(String),

    /// Job registry is full.
    #[error("job registry full, maximum {0} jobs")]
    RegistryFull(usize),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Create a cancelled error.
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled(reason.into())
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout(duration)
    }

    /// Create a panicked error.
    pub fn panicked(reason: impl Into<String>) -> Self {
        Self::Panicked(reason.into())
    }

    /// Create a failed error.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Create a spawn failed error.
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed(reason.into())
    }

    /// Create a registry full error.
    pub fn registry_full(max: usize) -> Self {
        Self::RegistryFull(max)
    }

    /// Create an internal error.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}

/// Errors from the distributed lock service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The lock stayed held by someone else for every acquisition attempt.
    #[error("timed out acquiring lock {key} after {attempts} attempts")]
    Timeout {
        /// The contended key.
        key: String,
        /// Attempts made.
        attempts: u32,
    },

    /// The lock backend could not be reached.
    #[error("lock service unavailable: {0}")]
    Unavailable(String),
}

impl LockError {
    /// Create a timeout error.
    pub fn timeout(key: impl Into<String>, attempts: u32) -> Self {
        Self::Timeout {
            key: key.into(),
            attempts,
        }
    }

    /// Check if this is lock contention.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors from a grade sync job.
#[derive(Debug, Clone, Error)]
pub enum GradeSyncError {
    /// Acquiring or talking to the lock service failed.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// The LMS rejected or failed a request.
    #[error(transparent)]
    Lms(#[from] LmsError),

    /// Lock contention outlasted the retry policy.
    #[error("giving up after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// The last lock error.
        #[source]
        source: LockError,
    },
}

impl GradeSyncError {
    /// Create a retries exhausted error.
    pub fn retries_exhausted(attempts: u32, source: LockError) -> Self {
        Self::RetriesExhausted { attempts, source }
    }

    /// Check if the job should be run again.
    ///
    /// Only lock contention is retried. Everything else is surfaced as is.
    pub fn should_retry(&self) -> bool {
        matches!(self, Self::Lock(err) if err.is_timeout())
    }

    /// Check if the LMS denied access.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Lms(err) if err.is_unauthorized())
    }

    /// Returns the underlying LMS error, if any.
    pub fn lms_error(&self) -> Option<&LmsError> {
        match self {
            Self::Lms(err) => Some(err),
            _ => None,
        }
    }
}
