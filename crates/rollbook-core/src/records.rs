//! Wire records returned by the LMS REST API.
//!
//! Fields the LMS may omit are optional here. Required fields are enforced
//! when a record is turned into a domain object (see [`crate::Course`] and
//! friends), not at deserialization time, so a partial payload can still be
//! cached and reported with a precise validation error.

use serde::{Deserialize, Serialize};

/// A course as returned by `GET /api/v1/courses/:id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CourseRecord {
    /// Course id.
    pub id: Option<u64>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Short course code.
    #[serde(default)]
    pub course_code: Option<String>,
    /// Owning account.
    #[serde(default)]
    pub account_id: Option<u64>,
}

/// A section as returned by the section endpoints.
///
/// `students` is only populated when sections are listed under their course
/// with `include[]=students`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionRecord {
    /// Section id.
    pub id: Option<u64>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Course the section belongs to.
    #[serde(default)]
    pub course_id: Option<u64>,
    /// Enrolled students.
    #[serde(default)]
    pub students: Option<Vec<StudentRecord>>,
}

/// A student embedded in a section listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    /// User id.
    pub id: Option<u64>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Name suitable for sorting ("Last, First").
    #[serde(default)]
    pub sortable_name: Option<String>,
}

/// An account as returned by `GET /api/v1/accounts/:id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    /// Account id.
    pub id: Option<u64>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Parent account, if any.
    #[serde(default)]
    pub parent_account_id: Option<u64>,
}

/// A gradebook assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    /// Assignment id.
    pub id: u64,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Maximum points.
    #[serde(default)]
    pub points_possible: Option<f64>,
    /// Whether the assignment is excluded from the final grade.
    #[serde(default)]
    pub omit_from_final_grade: bool,
    /// External tool launch settings, present for tool-backed assignments.
    #[serde(default)]
    pub external_tool_tag_attributes: Option<ExternalToolTag>,
}

impl AssignmentRecord {
    /// Returns true if this assignment launches the given tool url.
    #[must_use]
    pub fn launches(&self, tool_launch_url: &str) -> bool {
        self.external_tool_tag_attributes
            .as_ref()
            .is_some_and(|tag| tag.url == tool_launch_url)
    }
}

/// External tool settings of an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalToolTag {
    /// Url the LMS launches when the assignment is opened.
    pub url: String,
}

/// A student's submission for an assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// Submission id.
    #[serde(default)]
    pub id: Option<u64>,
    /// Assignment id.
    #[serde(default)]
    pub assignment_id: Option<u64>,
    /// Student user id.
    #[serde(default)]
    pub user_id: Option<u64>,
    /// Currently posted grade.
    #[serde(default)]
    pub grade: Option<String>,
    /// Submission workflow state.
    #[serde(default)]
    pub workflow_state: Option<String>,
}
