//! What the spawner records about each grade sync job.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rollbook_core::{CourseId, StudentId};
use serde::Serialize;
use uuid::Uuid;

/// Time-ordered job identifier, returned to the client that queued the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a new id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The gradebook cell a job writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct JobTarget {
    /// Course whose attendance assignment is graded.
    pub course_id: CourseId,
    /// Student whose grade is posted.
    pub student_id: StudentId,
}

impl JobTarget {
    /// Target one student's grade in a course.
    pub const fn new(course_id: CourseId, student_id: StudentId) -> Self {
        Self {
            course_id,
            student_id,
        }
    }
}

impl fmt::Display for JobTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "course {} student {}", self.course_id, self.student_id)
    }
}

/// Where a job is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, waiting for a free worker slot.
    Queued,
    /// Computing or posting the grade.
    Running,
    /// The grade was posted, or there was nothing to post.
    Completed,
    /// Gave up with an error.
    Failed,
    /// Ran past the job deadline.
    TimedOut,
}

impl JobStatus {
    /// The job will not change state again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

/// Snapshot of one job, as served by the job status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    /// Job id.
    pub id: JobId,
    /// Course and student the job grades.
    #[serde(flatten)]
    pub target: JobTarget,
    /// Current status.
    pub status: JobStatus,
    /// When the job was accepted.
    pub queued_at: DateTime<Utc>,
    /// When a worker slot picked it up.
    pub started_at: Option<DateTime<Utc>>,
    /// When it reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// Reruns after lock contention.
    pub retry_count: u32,
    /// Failure message.
    pub error: Option<String>,
}

impl JobInfo {
    pub(crate) fn queued(id: JobId, target: JobTarget) -> Self {
        Self {
            id,
            target,
            status: JobStatus::Queued,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            retry_count: 0,
            error: None,
        }
    }

    pub(crate) fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self, status: JobStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> JobTarget {
        JobTarget::new(CourseId::new(7), StudentId::new(3))
    }

    #[test]
    fn test_job_id_parses_its_display() {
        let id = JobId::new();
        assert_eq!(id.to_string().parse::<JobId>().unwrap(), id);
        assert!("not-a-job".parse::<JobId>().is_err());
    }

    #[test]
    fn test_lifecycle_timestamps() {
        let mut info = JobInfo::queued(JobId::new(), target());
        assert_eq!(info.status, JobStatus::Queued);
        assert!(!info.status.is_terminal());
        assert!(info.started_at.is_none());

        info.start();
        assert_eq!(info.status, JobStatus::Running);
        assert!(info.started_at.is_some());

        info.finish(JobStatus::Failed, Some("lms unavailable".to_string()));
        assert!(info.status.is_terminal());
        assert!(info.finished_at.is_some());
        assert_eq!(info.error.as_deref(), Some("lms unavailable"));
    }

    #[test]
    fn test_info_serializes_target_inline() {
        let info = JobInfo::queued(JobId::new(), target());
        let json = serde_json::to_value(&info).unwrap();

        assert_eq!(json["course_id"], 7);
        assert_eq!(json["student_id"], 3);
        assert_eq!(json["status"], "queued");
        assert!(json["started_at"].is_null());
    }

    #[test]
    fn test_target_display() {
        assert_eq!(target().to_string(), "course 7 student 3");
    }
}
