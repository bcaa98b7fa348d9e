//! Identifier types.
//!
//! LMS resources are addressed by numeric ids. Each kind of resource gets its
//! own newtype so a section id can never be passed where a course id is
//! expected. Browser sessions are addressed by a [`SessionId`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! lms_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw LMS id.
            #[must_use]
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the raw LMS id.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map(Self)
            }
        }
    };
}

lms_id!(
    /// LMS course id.
    CourseId
);
lms_id!(
    /// LMS course section id.
    SectionId
);
lms_id!(
    /// LMS account (sub-account) id.
    AccountId
);
lms_id!(
    /// LMS user id of an enrolled student.
    StudentId
);
lms_id!(
    /// LMS user id of the person who launched the tool.
    UserId
);
lms_id!(
    /// LMS gradebook assignment id.
    AssignmentId
);

/// The kinds of resource a session can be authorized to access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A course.
    Course,
    /// A course section.
    Section,
    /// An account.
    Account,
    /// A student's attendance record.
    Student,
}

impl ResourceKind {
    /// All resource kinds, in declaration order.
    pub const ALL: [Self; 4] = [Self::Course, Self::Section, Self::Account, Self::Student];

    /// Returns the lowercase name used in logs and serialized sessions.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Course => "course",
            Self::Section => "section",
            Self::Account => "account",
            Self::Student => "student",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unique identifier for each browser session, using UUID v7.
///
/// # Example
///
/// ```
/// use rollbook_core::SessionId;
///
/// let id = SessionId::new();
/// let parsed: SessionId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Creates a new unique session ID using UUID v7.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}
