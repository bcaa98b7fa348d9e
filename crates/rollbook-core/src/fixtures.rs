//! Test fixtures for Rollbook development and testing.
//!
//! [`MockLms`] is an in-memory [`LmsClient`] with canned resources, per-method
//! failure injection and call counting. Clones share state, so a test can keep
//! one handle for assertions while another is moved into the code under test.
//!
//! # Example
//!
//! ```
//! use rollbook_core::fixtures::MockLms;
//! use rollbook_core::{CourseId, LmsClient};
//!
//! # tokio_test::block_on(async {
//! let lms = MockLms::new().with_course(1);
//! let course = lms.get_course(CourseId::new(1)).await.unwrap();
//! assert_eq!(course.id, Some(1));
//! assert_eq!(lms.calls("get_course"), 1);
//! # });
//! ```

use crate::error::{LmsError, LmsResult};
use crate::ids::{AccountId, AssignmentId, CourseId, SectionId, StudentId, UserId};
use crate::lms::{LmsClient, LmsConnector, NewAssignment};
use crate::records::{
    AccountRecord, AssignmentRecord, CourseRecord, ExternalToolTag, SectionRecord, StudentRecord,
    SubmissionRecord,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockState {
    courses: HashMap<u64, CourseRecord>,
    course_sections: HashMap<u64, Vec<SectionRecord>>,
    sections: HashMap<u64, SectionRecord>,
    accounts: HashMap<u64, AccountRecord>,
    submissions: HashMap<(u64, u64, u64), SubmissionRecord>,
    assignments: Vec<(u64, AssignmentRecord)>,
    grades: HashMap<(u64, u64), Option<String>>,
    failures: HashMap<&'static str, LmsError>,
    calls: HashMap<&'static str, usize>,
    connections: Vec<(String, UserId, String)>,
    next_assignment_id: u64,
}

/// In-memory LMS for tests.
///
/// Unknown courses, sections and accounts answer `NotFound`. Submissions that
/// were not registered answer `Unauthorized`, the way the LMS denies a user
/// who may not view them.
#[derive(Debug, Clone)]
pub struct MockLms {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockLms {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLms {
    /// Creates an empty LMS.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_assignment_id: 1000,
                ..MockState::default()
            })),
        }
    }

    /// Add a course.
    pub fn with_course(self, id: u64) -> Self {
        self.state.lock().courses.insert(
            id,
            CourseRecord {
                id: Some(id),
                name: Some(format!("Course {id}")),
                ..CourseRecord::default()
            },
        );
        self
    }

    /// Add a single section, as returned when fetched on its own.
    pub fn with_section(self, id: u64, course_id: u64) -> Self {
        self.state.lock().sections.insert(
            id,
            SectionRecord {
                id: Some(id),
                course_id: Some(course_id),
                ..SectionRecord::default()
            },
        );
        self
    }

    /// Set a course's section listing.
    pub fn with_course_sections(self, course_id: u64, sections: Vec<SectionRecord>) -> Self {
        self.state.lock().course_sections.insert(course_id, sections);
        self
    }

    /// Add an account.
    pub fn with_account(self, id: u64) -> Self {
        self.state.lock().accounts.insert(
            id,
            AccountRecord {
                id: Some(id),
                name: Some(format!("Account {id}")),
                ..AccountRecord::default()
            },
        );
        self
    }

    /// Add an existing attendance assignment.
    pub fn with_assignment(self, course_id: u64, id: u64, tool_launch_url: &str) -> Self {
        self.state.lock().assignments.push((
            course_id,
            AssignmentRecord {
                id,
                name: Some("Roll Call Attendance".to_string()),
                points_possible: Some(100.0),
                omit_from_final_grade: false,
                external_tool_tag_attributes: Some(ExternalToolTag {
                    url: tool_launch_url.to_string(),
                }),
            },
        ));
        self
    }

    /// Make a submission viewable.
    pub fn with_submission(self, course_id: u64, assignment_id: u64, student_id: u64) -> Self {
        self.state.lock().submissions.insert(
            (course_id, assignment_id, student_id),
            SubmissionRecord {
                assignment_id: Some(assignment_id),
                user_id: Some(student_id),
                workflow_state: Some("unsubmitted".to_string()),
                ..SubmissionRecord::default()
            },
        );
        self
    }

    /// Make every call to `method` fail with `error`.
    pub fn failing(self, method: &'static str, error: LmsError) -> Self {
        self.state.lock().failures.insert(method, error);
        self
    }

    /// Number of times `method` was called.
    #[must_use]
    pub fn calls(&self, method: &str) -> usize {
        self.state.lock().calls.get(method).copied().unwrap_or(0)
    }

    /// Grade last posted for a student, `Some(None)` when it was cleared.
    #[must_use]
    pub fn posted_grade(
        &self,
        assignment_id: AssignmentId,
        student_id: StudentId,
    ) -> Option<Option<String>> {
        self.state
            .lock()
            .grades
            .get(&(assignment_id.get(), student_id.get()))
            .cloned()
    }

    /// Connections made through [`MockConnector`], as `(lms_url, user, guid)`.
    #[must_use]
    pub fn connections(&self) -> Vec<(String, UserId, String)> {
        self.state.lock().connections.clone()
    }

    /// Build a section record with a populated roster.
    #[must_use]
    pub fn roster_section(id: u64, course_id: u64, student_ids: &[u64]) -> SectionRecord {
        SectionRecord {
            id: Some(id),
            name: Some(format!("Section {id}")),
            course_id: Some(course_id),
            students: Some(
                student_ids
                    .iter()
                    .map(|&sid| StudentRecord {
                        id: Some(sid),
                        name: Some(format!("Student {sid}")),
                        sortable_name: None,
                    })
                    .collect(),
            ),
        }
    }

    fn enter(&self, method: &'static str) -> LmsResult<parking_lot::MutexGuard<'_, MockState>> {
        let mut state = self.state.lock();
        *state.calls.entry(method).or_default() += 1;
        match state.failures.get(method) {
            Some(err) => Err(err.clone()),
            None => Ok(state),
        }
    }
}

impl LmsClient for MockLms {
    async fn get_course(&self, id: CourseId) -> LmsResult<CourseRecord> {
        let state = self.enter("get_course")?;
        state
            .courses
            .get(&id.get())
            .cloned()
            .ok_or_else(|| LmsError::not_found(format!("course {id}")))
    }

    async fn get_sections(&self, course_id: CourseId) -> LmsResult<Vec<SectionRecord>> {
        let state = self.enter("get_sections")?;
        state
            .course_sections
            .get(&course_id.get())
            .cloned()
            .ok_or_else(|| LmsError::not_found(format!("sections of course {course_id}")))
    }

    async fn get_section(&self, id: SectionId) -> LmsResult<SectionRecord> {
        let state = self.enter("get_section")?;
        state
            .sections
            .get(&id.get())
            .cloned()
            .ok_or_else(|| LmsError::not_found(format!("section {id}")))
    }

    async fn get_account(&self, id: AccountId) -> LmsResult<AccountRecord> {
        let state = self.enter("get_account")?;
        state
            .accounts
            .get(&id.get())
            .cloned()
            .ok_or_else(|| LmsError::not_found(format!("account {id}")))
    }

    async fn get_submission(
        &self,
        course_id: CourseId,
        assignment_id: AssignmentId,
        student_id: StudentId,
    ) -> LmsResult<SubmissionRecord> {
        let state = self.enter("get_submission")?;
        state
            .submissions
            .get(&(course_id.get(), assignment_id.get(), student_id.get()))
            .cloned()
            .ok_or_else(|| LmsError::unauthorized("user not authorized to perform that action"))
    }

    async fn find_assignment(
        &self,
        course_id: CourseId,
        tool_launch_url: &str,
    ) -> LmsResult<Option<AssignmentRecord>> {
        let state = self.enter("find_assignment")?;
        Ok(state
            .assignments
            .iter()
            .find(|(cid, a)| *cid == course_id.get() && a.launches(tool_launch_url))
            .map(|(_, a)| a.clone()))
    }

    async fn create_assignment(
        &self,
        course_id: CourseId,
        assignment: &NewAssignment,
    ) -> LmsResult<AssignmentRecord> {
        let mut state = self.enter("create_assignment")?;
        let id = state.next_assignment_id;
        state.next_assignment_id += 1;
        let record = AssignmentRecord {
            id,
            name: Some(assignment.name.clone()),
            points_possible: Some(assignment.points_possible),
            omit_from_final_grade: assignment.omit_from_final_grade,
            external_tool_tag_attributes: Some(ExternalToolTag {
                url: assignment.tool_launch_url.clone(),
            }),
        };
        state.assignments.push((course_id.get(), record.clone()));
        Ok(record)
    }

    async fn submit_grade(
        &self,
        _course_id: CourseId,
        assignment_id: AssignmentId,
        student_id: StudentId,
        posted_grade: Option<&str>,
    ) -> LmsResult<()> {
        let mut state = self.enter("submit_grade")?;
        state.grades.insert(
            (assignment_id.get(), student_id.get()),
            posted_grade.map(str::to_string),
        );
        Ok(())
    }
}

/// [`LmsConnector`] handing out clones of one [`MockLms`].
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    lms: MockLms,
}

impl MockConnector {
    /// Creates a connector for `lms`.
    #[must_use]
    pub fn new(lms: MockLms) -> Self {
        Self { lms }
    }
}

impl LmsConnector for MockConnector {
    type Client = MockLms;

    fn connect(
        &self,
        lms_url: &str,
        user_id: UserId,
        tool_consumer_instance_guid: &str,
    ) -> LmsResult<MockLms> {
        let mut state = self.lms.enter("connect")?;
        state.connections.push((
            lms_url.to_string(),
            user_id,
            tool_consumer_instance_guid.to_string(),
        ));
        drop(state);
        Ok(self.lms.clone())
    }
}
