//! The attendance gradebook assignment.
//!
//! Each course has one LMS assignment that attendance grades are posted to.
//! It is identified by the tool launch url rather than by name, so renaming
//! it in the LMS does not create a duplicate.

use crate::attendance::{AttendanceSource, Grade};
use crate::error::LmsResult;
use crate::ids::{AssignmentId, CourseId, StudentId};
use crate::lms::{LmsClient, NewAssignment};
use crate::records::AssignmentRecord;
use tracing::{debug, info};

/// Name given to newly created attendance assignments.
pub const ASSIGNMENT_NAME: &str = "Roll Call Attendance";

/// Points possible on the attendance assignment.
pub const POINTS_POSSIBLE: f64 = 100.0;

/// The attendance assignment of one course, accessed through one client.
#[derive(Debug)]
pub struct AttendanceAssignment<'a, C> {
    client: &'a C,
    course_id: CourseId,
    tool_launch_url: String,
    tool_consumer_instance_guid: String,
}

impl<'a, C: LmsClient> AttendanceAssignment<'a, C> {
    /// Creates a handle for the course's attendance assignment.
    pub fn new(
        client: &'a C,
        course_id: CourseId,
        tool_launch_url: impl Into<String>,
        tool_consumer_instance_guid: impl Into<String>,
    ) -> Self {
        Self {
            client,
            course_id,
            tool_launch_url: tool_launch_url.into(),
            tool_consumer_instance_guid: tool_consumer_instance_guid.into(),
        }
    }

    /// Returns the course id.
    pub const fn course_id(&self) -> CourseId {
        self.course_id
    }

    /// Looks up the existing assignment.
    pub async fn fetch(&self) -> LmsResult<Option<AssignmentRecord>> {
        self.client
            .find_assignment(self.course_id, &self.tool_launch_url)
            .await
    }

    /// Looks up the assignment, creating it when the course has none.
    pub async fn fetch_or_create(&self, omit_from_final_grade: bool) -> LmsResult<AssignmentRecord> {
        if let Some(existing) = self.fetch().await? {
            debug!(
                course_id = %self.course_id,
                assignment_id = existing.id,
                "Found attendance assignment"
            );
            return Ok(existing);
        }

        let created = self
            .client
            .create_assignment(self.course_id, &self.new_assignment(omit_from_final_grade))
            .await?;
        info!(
            course_id = %self.course_id,
            assignment_id = created.id,
            "Created attendance assignment"
        );
        Ok(created)
    }

    /// Computes a student's current attendance grade.
    pub async fn get_student_grade<S: AttendanceSource>(
        &self,
        source: &S,
        tardy_weight: Option<f64>,
        student_id: StudentId,
    ) -> Option<Grade> {
        source
            .tally(&self.tool_consumer_instance_guid, self.course_id, student_id)
            .await
            .grade(tardy_weight)
    }

    /// Posts a grade. `None` clears any previously posted grade.
    pub async fn submit_grade(
        &self,
        assignment_id: AssignmentId,
        student_id: StudentId,
        grade: Option<Grade>,
    ) -> LmsResult<()> {
        let posted = grade.map(|g| g.posted_grade());
        self.client
            .submit_grade(self.course_id, assignment_id, student_id, posted.as_deref())
            .await
    }

    fn new_assignment(&self, omit_from_final_grade: bool) -> NewAssignment {
        NewAssignment {
            name: ASSIGNMENT_NAME.to_string(),
            points_possible: POINTS_POSSIBLE,
            grading_type: "percent".to_string(),
            submission_types: vec!["external_tool".to_string()],
            tool_launch_url: self.tool_launch_url.clone(),
            omit_from_final_grade,
            published: true,
        }
    }
}
