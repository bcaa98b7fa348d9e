//! Validated domain objects built from LMS records.

use crate::error::ValidationError;
use crate::ids::{AccountId, CourseId, SectionId, StudentId};
use crate::records::{AccountRecord, CourseRecord, SectionRecord, StudentRecord};
use serde::{Deserialize, Serialize};

/// A course the current user may access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    /// Course id.
    pub id: CourseId,
    /// Display name.
    pub name: Option<String>,
    /// Short course code.
    pub course_code: Option<String>,
    /// Owning account.
    pub account_id: Option<AccountId>,
}

impl TryFrom<CourseRecord> for Course {
    type Error = ValidationError;

    fn try_from(record: CourseRecord) -> Result<Self, Self::Error> {
        let id = record.id.ok_or_else(|| ValidationError::missing("id"))?;
        Ok(Self {
            id: CourseId::new(id),
            name: record.name,
            course_code: record.course_code,
            account_id: record.account_id.map(AccountId::new),
        })
    }
}

/// A student enrolled in a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    /// Student user id.
    pub id: StudentId,
    /// Display name.
    pub name: Option<String>,
    /// Name suitable for sorting.
    pub sortable_name: Option<String>,
}

impl TryFrom<StudentRecord> for Student {
    type Error = ValidationError;

    fn try_from(record: StudentRecord) -> Result<Self, Self::Error> {
        let id = record.id.ok_or_else(|| ValidationError::missing("student.id"))?;
        Ok(Self {
            id: StudentId::new(id),
            name: record.name,
            sortable_name: record.sortable_name,
        })
    }
}

/// A course section.
///
/// A section fetched on its own carries no roster: `students` is `None`.
/// Sections listed under their course are fully populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Section id.
    pub id: SectionId,
    /// Display name.
    pub name: Option<String>,
    /// Course the section belongs to.
    pub course_id: Option<CourseId>,
    /// Enrolled students, when the roster was included.
    pub students: Option<Vec<Student>>,
}

impl Section {
    /// Creates a section without a roster.
    #[must_use]
    pub fn new(id: SectionId, course_id: Option<CourseId>) -> Self {
        Self {
            id,
            name: None,
            course_id,
            students: None,
        }
    }

    /// Attach a roster.
    pub fn with_students(mut self, students: Vec<Student>) -> Self {
        self.students = Some(students);
        self
    }

    /// Returns true if the roster was included.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        self.students.is_some()
    }

    /// Converts a section listed with `include[]=students`.
    ///
    /// Canvas sends `"students": null` for a section nobody is enrolled in,
    /// which is an empty roster rather than a missing one.
    ///
    /// # Errors
    ///
    /// Same as the `TryFrom<SectionRecord>` conversion.
    pub fn from_roster_record(record: SectionRecord) -> Result<Self, ValidationError> {
        let mut section = Self::try_from(record)?;
        section.students.get_or_insert_with(Vec::new);
        Ok(section)
    }
}

impl TryFrom<SectionRecord> for Section {
    type Error = ValidationError;

    fn try_from(record: SectionRecord) -> Result<Self, Self::Error> {
        let id = record.id.ok_or_else(|| ValidationError::missing("id"))?;
        let students = record
            .students
            .map(|students| {
                students
                    .into_iter()
                    .map(Student::try_from)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;
        Ok(Self {
            id: SectionId::new(id),
            name: record.name,
            course_id: record.course_id.map(CourseId::new),
            students,
        })
    }
}

/// An account the current user administers, scoped to one LMS instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccount {
    /// Account id.
    pub account_id: AccountId,
    /// LMS instance the account lives on.
    pub tool_consumer_instance_guid: String,
    /// Display name.
    pub name: Option<String>,
}

impl CachedAccount {
    /// Builds an account from its LMS record.
    ///
    /// The account id is taken from the request, not the payload, so a
    /// payload without an id is still accepted.
    pub fn from_record(
        account_id: AccountId,
        tool_consumer_instance_guid: impl Into<String>,
        record: AccountRecord,
    ) -> Result<Self, ValidationError> {
        if let Some(id) = record.id {
            if id != account_id.get() {
                let mut errors = ValidationError::new();
                errors.add("id", format!("expected {account_id}, got {id}"));
                return Err(errors);
            }
        }
        Ok(Self {
            account_id,
            tool_consumer_instance_guid: tool_consumer_instance_guid.into(),
            name: record.name,
        })
    }
}
