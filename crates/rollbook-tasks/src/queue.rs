//! Queue of grade sync jobs.

use std::fmt;
use std::sync::Arc;

use rollbook_core::{
    AttendanceSource, CourseConfigStore, CourseId, LaunchContext, LmsConnector, StudentId,
};
use tracing::{info, warn};

use crate::error::TaskResult;
use crate::grade_updater::{GradeSyncParams, GradeUpdater};
use crate::job::{JobId, JobInfo, JobTarget};
use crate::lock::LockService;
use crate::spawner::{JobHandle, JobSpawner};

/// Runs grade sync jobs in the background.
///
/// Each job gets its own registry entry on the spawner, carrying its retry
/// count and final status.
pub struct GradeSyncQueue<C, A, S, L> {
    updater: GradeUpdater<C, A, S, L>,
    spawner: Arc<JobSpawner>,
}

impl<C, A, S, L> Clone for GradeSyncQueue<C, A, S, L> {
    fn clone(&self) -> Self {
        Self {
            updater: self.updater.clone(),
            spawner: self.spawner.clone(),
        }
    }
}

impl<C, A, S, L> fmt::Debug for GradeSyncQueue<C, A, S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradeSyncQueue")
            .field("updater", &self.updater)
            .field("spawner", &self.spawner)
            .finish()
    }
}

impl<C, A, S, L> GradeSyncQueue<C, A, S, L>
where
    C: LmsConnector,
    A: AttendanceSource + 'static,
    S: CourseConfigStore + 'static,
    L: LockService + 'static,
{
    /// Create a queue running `updater` on `spawner`.
    pub fn new(updater: GradeUpdater<C, A, S, L>, spawner: Arc<JobSpawner>) -> Self {
        Self { updater, spawner }
    }

    /// The underlying updater.
    pub fn updater(&self) -> &GradeUpdater<C, A, S, L> {
        &self.updater
    }

    /// The spawner jobs run on.
    pub fn spawner(&self) -> &JobSpawner {
        &self.spawner
    }

    /// Look up a job, for the job status endpoint.
    pub fn job(&self, id: JobId) -> Option<JobInfo> {
        self.spawner.get_job(id)
    }

    /// Queue a grade sync job.
    pub fn enqueue(&self, params: GradeSyncParams) -> TaskResult<JobHandle> {
        let target = JobTarget::new(params.course_id, params.student_id);
        let updater = self.updater.clone();

        self.spawner.spawn(target, move |ctx| async move {
            updater
                .run_with_retry(&params, |_| ctx.record_retry())
                .await
                .map(|_| ())
        })
    }

    /// Queue grade sync for every given student of a course, acting as the
    /// launching user.
    ///
    /// Every student is queued or none is: capacity is checked for the whole
    /// roster first. Jobs beyond the spawner's worker slots wait for a slot.
    pub fn enqueue_course(
        &self,
        launch: &LaunchContext,
        course_id: CourseId,
        students: impl IntoIterator<Item = StudentId>,
    ) -> TaskResult<Vec<JobHandle>> {
        let students: Vec<StudentId> = students.into_iter().collect();
        if let Err(e) = self.spawner.ensure_capacity(students.len()) {
            warn!(
                course_id = %course_id,
                students = students.len(),
                error = %e,
                "Could not queue course regrade"
            );
            return Err(e);
        }

        let handles = students
            .into_iter()
            .map(|student_id| {
                self.enqueue(GradeSyncParams::from_launch(launch, course_id, student_id))
            })
            .collect::<TaskResult<Vec<_>>>()?;

        info!(course_id = %course_id, jobs = handles.len(), "Queued course regrade");
        Ok(handles)
    }
}
