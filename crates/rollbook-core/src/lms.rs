//! LMS capability interface.
//!
//! Every call Rollbook makes against the LMS goes through [`LmsClient`]. A
//! client always acts as one LMS user; [`LmsConnector`] builds a client for a
//! given user on a given LMS instance.

use crate::error::LmsResult;
use crate::ids::{AccountId, AssignmentId, CourseId, SectionId, StudentId, UserId};
use crate::records::{
    AccountRecord, AssignmentRecord, CourseRecord, SectionRecord, SubmissionRecord,
};
use serde::Serialize;
use std::future::Future;

/// Authenticated access to the LMS REST API on behalf of one user.
///
/// Each method fails with [`LmsError::Unauthorized`](crate::LmsError::Unauthorized)
/// when the acting user may not see the resource, and with another
/// [`LmsError`](crate::LmsError) variant on any other failure.
///
/// # Example
///
/// ```rust,ignore
/// use rollbook_core::{CourseId, LmsClient, LmsResult};
/// use rollbook_core::records::CourseRecord;
///
/// async fn course_name(client: &impl LmsClient, id: CourseId) -> LmsResult<Option<String>> {
///     Ok(client.get_course(id).await?.name)
/// }
/// ```
pub trait LmsClient: Send + Sync {
    /// Fetches a course.
    fn get_course(&self, id: CourseId) -> impl Future<Output = LmsResult<CourseRecord>> + Send;

    /// Lists a course's sections with their student rosters, in LMS order.
    fn get_sections(
        &self,
        course_id: CourseId,
    ) -> impl Future<Output = LmsResult<Vec<SectionRecord>>> + Send;

    /// Fetches a single section without its roster.
    fn get_section(&self, id: SectionId)
        -> impl Future<Output = LmsResult<SectionRecord>> + Send;

    /// Fetches an account.
    fn get_account(&self, id: AccountId)
        -> impl Future<Output = LmsResult<AccountRecord>> + Send;

    /// Fetches a student's submission. Success means the acting user may view it.
    fn get_submission(
        &self,
        course_id: CourseId,
        assignment_id: AssignmentId,
        student_id: StudentId,
    ) -> impl Future<Output = LmsResult<SubmissionRecord>> + Send;

    /// Finds the course assignment that launches `tool_launch_url`, if any.
    fn find_assignment(
        &self,
        course_id: CourseId,
        tool_launch_url: &str,
    ) -> impl Future<Output = LmsResult<Option<AssignmentRecord>>> + Send;

    /// Creates a gradebook assignment.
    fn create_assignment(
        &self,
        course_id: CourseId,
        assignment: &NewAssignment,
    ) -> impl Future<Output = LmsResult<AssignmentRecord>> + Send;

    /// Posts a grade for a student. `None` clears the grade.
    fn submit_grade(
        &self,
        course_id: CourseId,
        assignment_id: AssignmentId,
        student_id: StudentId,
        posted_grade: Option<&str>,
    ) -> impl Future<Output = LmsResult<()>> + Send;
}

/// Builds [`LmsClient`]s acting as a particular LMS user.
pub trait LmsConnector: Send + Sync + 'static {
    /// The client type produced.
    type Client: LmsClient + 'static;

    /// Returns a client for `user_id` on the LMS at `lms_url`.
    fn connect(
        &self,
        lms_url: &str,
        user_id: UserId,
        tool_consumer_instance_guid: &str,
    ) -> LmsResult<Self::Client>;
}

/// Parameters for a new gradebook assignment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAssignment {
    /// Display name.
    pub name: String,
    /// Maximum points.
    pub points_possible: f64,
    /// How the LMS displays the grade.
    pub grading_type: String,
    /// Allowed submission types.
    pub submission_types: Vec<String>,
    /// Url the LMS launches for this assignment.
    pub tool_launch_url: String,
    /// Whether the assignment is excluded from the final grade.
    pub omit_from_final_grade: bool,
    /// Whether the assignment is visible to students.
    pub published: bool,
}
