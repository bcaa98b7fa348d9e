//! # Rollbook Tasks
//!
//! Background grade synchronization for Rollbook.
//!
//! When attendance or a course's grading config changes, the affected
//! students' grades are pushed to the LMS gradebook by background jobs:
//!
//! 1. **Job spawner**: tracked execution of jobs on the tokio runtime, queued behind a fixed number of worker slots
//! 2. **Lock service**: serializes submissions of the same grade for the same student
//! 3. **Grade updater**: computes and posts one student's grade, retrying lock contention
//! 4. **Grade sync queue**: queues updater runs on the spawner
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rollbook_tasks::{GradeSyncQueue, GradeUpdater, InMemoryLockService, JobSpawner};
//!
//! let updater = GradeUpdater::new(connector, attendance, configs, Arc::new(InMemoryLockService::new()));
//! let queue = GradeSyncQueue::new(updater, Arc::new(JobSpawner::new()));
//!
//! // Regrade everyone in the course, acting as the launching user.
//! queue.enqueue_course(&launch, course_id, roster)?;
//! ```
//!
//! ## Lock keys
//!
//! ```text
//! grade_updater.guid_{guid}.assignment_id_{assignment}.student_id_{student}.grade_{grade}
//! ```
//!
//! Locks expire after 60 seconds. A job whose lock stays contended is rerun
//! up to 5 times, 5 seconds apart.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod grade_updater;
mod job;
mod lock;
mod queue;
mod retry;
mod spawner;

pub use error::{GradeSyncError, GradeSyncResult, LockError, TaskError, TaskResult};
pub use grade_updater::{GradeSyncParams, GradeUpdater, SubmitOutcome};
pub use job::{JobId, JobInfo, JobStatus, JobTarget};
pub use lock::{
    with_lock, InMemoryLockService, Lock, LockConfig, LockKey, LockService, DEFAULT_LOCK_TTL,
};
pub use queue::GradeSyncQueue;
pub use retry::RetryPolicy;
pub use spawner::{JobContext, JobHandle, JobSpawner, SpawnerConfig};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{GradeSyncError, LockError, TaskError, TaskResult};
    pub use crate::grade_updater::{GradeSyncParams, GradeUpdater, SubmitOutcome};
    pub use crate::job::{JobId, JobInfo, JobStatus};
    pub use crate::lock::{InMemoryLockService, LockKey, LockService};
    pub use crate::queue::GradeSyncQueue;
    pub use crate::retry::RetryPolicy;
    pub use crate::spawner::{JobSpawner, SpawnerConfig};
}
