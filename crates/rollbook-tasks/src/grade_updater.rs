//! Pushing attendance grades to the LMS gradebook.
//!
//! A grade sync job acts on behalf of the LMS user who triggered it. It finds
//! (or creates) the course's attendance assignment, computes the student's
//! grade from recorded attendance and posts it while holding the grade lock.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rollbook_core::{
    AssignmentId, AttendanceAssignment, AttendanceSource, CourseConfigStore, CourseId, Grade,
    LaunchContext, LmsConnector, StudentId, UserId,
};
use rollbook_telemetry::metrics::{record_grade_submission, JobInFlightGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{GradeSyncError, GradeSyncResult};
use crate::lock::{with_lock, LockKey, LockService, DEFAULT_LOCK_TTL};
use crate::retry::RetryPolicy;

/// Everything a grade sync job needs, fixed when the job is queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeSyncParams {
    /// Base url of the LMS.
    pub lms_url: String,
    /// LMS user the job acts as.
    pub user_id: UserId,
    /// LMS instance.
    pub tool_consumer_instance_guid: String,
    /// Course of the grade.
    pub course_id: CourseId,
    /// Tool launch url identifying the attendance assignment.
    pub tool_launch_url: String,
    /// Student whose grade is synced.
    pub student_id: StudentId,
}

impl GradeSyncParams {
    /// Parameters for syncing `student_id` in `course_id` as the launching user.
    pub fn from_launch(launch: &LaunchContext, course_id: CourseId, student_id: StudentId) -> Self {
        Self {
            lms_url: launch.lms_url.clone(),
            user_id: launch.user_id,
            tool_consumer_instance_guid: launch.tool_consumer_instance_guid.clone(),
            course_id,
            tool_launch_url: launch.tool_launch_url.clone(),
            student_id,
        }
    }
}

impl fmt::Display for GradeSyncParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{lms_url: {}, user_id: {}, tool_consumer_instance_guid: {}, course_id: {}, tool_launch_url: {}, student_id: {}}}",
            self.lms_url,
            self.user_id,
            self.tool_consumer_instance_guid,
            self.course_id,
            self.tool_launch_url,
            self.student_id
        )
    }
}

/// What a successful job did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A grade was posted.
    Submitted {
        /// The attendance assignment.
        assignment_id: AssignmentId,
        /// The posted grade.
        grade: Grade,
    },
    /// No attendance is recorded for the student, so nothing was posted.
    Skipped {
        /// The attendance assignment.
        assignment_id: AssignmentId,
    },
}

impl SubmitOutcome {
    /// Outcome label used in metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Runs grade sync jobs.
pub struct GradeUpdater<C, A, S, L> {
    connector: Arc<C>,
    attendance: Arc<A>,
    configs: Arc<S>,
    locks: Arc<L>,
    lock_ttl: Duration,
    retry: RetryPolicy,
}

impl<C, A, S, L> Clone for GradeUpdater<C, A, S, L> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            attendance: self.attendance.clone(),
            configs: self.configs.clone(),
            locks: self.locks.clone(),
            lock_ttl: self.lock_ttl,
            retry: self.retry,
        }
    }
}

impl<C, A, S, L> fmt::Debug for GradeUpdater<C, A, S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradeUpdater")
            .field("lock_ttl", &self.lock_ttl)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl<C, A, S, L> GradeUpdater<C, A, S, L>
where
    C: LmsConnector,
    A: AttendanceSource,
    S: CourseConfigStore,
    L: LockService,
{
    /// Create an updater with the default lock TTL and retry policy.
    pub fn new(connector: Arc<C>, attendance: Arc<A>, configs: Arc<S>, locks: Arc<L>) -> Self {
        Self {
            connector,
            attendance,
            configs,
            locks,
            lock_ttl: DEFAULT_LOCK_TTL,
            retry: RetryPolicy::default(),
        }
    }

    /// Set how long the grade lock may be held.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The connector jobs act through.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// The attendance source grades are computed from.
    pub fn attendance(&self) -> &A {
        &self.attendance
    }

    /// The course config store.
    pub fn configs(&self) -> &S {
        &self.configs
    }

    /// The lock backend.
    pub fn locks(&self) -> &L {
        &self.locks
    }

    /// The retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run one attempt of a job.
    ///
    /// Every error is logged together with the job parameters and returned.
    pub async fn perform(&self, params: &GradeSyncParams) -> GradeSyncResult<SubmitOutcome> {
        let result = self.submit(params).await;
        if let Err(e) = &result {
            error!(
                course_id = %params.course_id,
                student_id = %params.student_id,
                "Exception submitting grade: {e} with params:{params}"
            );
        }
        result
    }

    /// Run a job, retrying lock contention per the retry policy.
    ///
    /// `on_retry` is told about every retry, for job bookkeeping.
    pub async fn run_with_retry(
        &self,
        params: &GradeSyncParams,
        on_retry: impl FnMut(u32),
    ) -> GradeSyncResult<SubmitOutcome> {
        let _in_flight = JobInFlightGuard::new();

        let result = self
            .retry
            .run(
                |attempt| {
                    debug!(
                        course_id = %params.course_id,
                        student_id = %params.student_id,
                        attempt,
                        "Running grade sync"
                    );
                    self.perform(params)
                },
                on_retry,
            )
            .await;

        match &result {
            Ok(outcome) => record_grade_submission(outcome.as_str()),
            Err(e @ GradeSyncError::RetriesExhausted { .. }) => {
                error!(
                    course_id = %params.course_id,
                    student_id = %params.student_id,
                    error = %e,
                    "Grade sync abandoned"
                );
                record_grade_submission("exhausted");
            }
            Err(_) => record_grade_submission("failed"),
        }
        result
    }

    async fn submit(&self, params: &GradeSyncParams) -> GradeSyncResult<SubmitOutcome> {
        let guid = params.tool_consumer_instance_guid.as_str();
        let client = self.connector.connect(&params.lms_url, params.user_id, guid)?;
        let config = self
            .configs
            .find(params.course_id, guid)
            .await
            .unwrap_or_default();

        let assignment = AttendanceAssignment::new(
            &client,
            params.course_id,
            params.tool_launch_url.as_str(),
            guid,
        );
        let record = assignment
            .fetch_or_create(config.omit_from_final_grade)
            .await?;
        let assignment_id = AssignmentId::new(record.id);

        let Some(grade) = assignment
            .get_student_grade(self.attendance.as_ref(), config.tardy_weight, params.student_id)
            .await
        else {
            debug!(
                course_id = %params.course_id,
                student_id = %params.student_id,
                "No attendance recorded, skipping grade"
            );
            return Ok(SubmitOutcome::Skipped { assignment_id });
        };

        let key = LockKey::grade_update(guid, assignment_id, params.student_id, Some(grade));
        with_lock(self.locks.as_ref(), &key, self.lock_ttl, || async {
            assignment
                .submit_grade(assignment_id, params.student_id, Some(grade))
                .await
                .map_err(GradeSyncError::from)
        })
        .await?;

        info!(
            course_id = %params.course_id,
            student_id = %params.student_id,
            lock_key = %key,
            grade = %grade,
            "Grade submitted"
        );
        Ok(SubmitOutcome::Submitted {
            assignment_id,
            grade,
        })
    }
}
