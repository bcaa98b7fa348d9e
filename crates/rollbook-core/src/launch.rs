//! LTI launch context.
//!
//! A launch tells Rollbook who opened the tool, from which LMS instance and
//! from where inside the LMS. It is captured once when the session is created.

use crate::ids::{AccountId, CourseId, UserId};
use serde::{Deserialize, Serialize};

/// Where inside the LMS the tool was launched from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LaunchTarget {
    /// A student opened the tool from a course.
    Student {
        /// Course the launch came from.
        course_id: CourseId,
    },
    /// An instructor opened the tool from a course.
    Course {
        /// Course the launch came from.
        course_id: CourseId,
    },
    /// An administrator opened the tool from an account.
    Account {
        /// Account the launch came from.
        account_id: AccountId,
    },
    /// No usable launch information.
    Unknown,
}

/// Launch information carried by a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchContext {
    /// LMS user who launched the tool.
    pub user_id: UserId,
    /// Unique id of the LMS instance.
    pub tool_consumer_instance_guid: String,
    /// Base url of the LMS.
    pub lms_url: String,
    /// Url the LMS uses to launch the tool; identifies the attendance assignment.
    pub tool_launch_url: String,
    /// Where the launch came from.
    pub target: LaunchTarget,
}

impl LaunchContext {
    /// Creates a launch context.
    pub fn new(
        user_id: UserId,
        tool_consumer_instance_guid: impl Into<String>,
        lms_url: impl Into<String>,
        tool_launch_url: impl Into<String>,
        target: LaunchTarget,
    ) -> Self {
        Self {
            user_id,
            tool_consumer_instance_guid: tool_consumer_instance_guid.into(),
            lms_url: lms_url.into(),
            tool_launch_url: tool_launch_url.into(),
            target,
        }
    }

    /// Returns the course the tool was launched from, if any.
    #[must_use]
    pub const fn course_id(&self) -> Option<CourseId> {
        match self.target {
            LaunchTarget::Student { course_id } | LaunchTarget::Course { course_id } => {
                Some(course_id)
            }
            LaunchTarget::Account { .. } | LaunchTarget::Unknown => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_course_id_from_launch() {
        let launch = LaunchContext::new(
            UserId::new(5),
            "abc123",
            "https://lms.example",
            "https://rollbook.example/launch",
            LaunchTarget::Student {
                course_id: CourseId::new(1),
            },
        );
        assert_eq!(launch.course_id(), Some(CourseId::new(1)));

        let account = LaunchContext {
            target: LaunchTarget::Account {
                account_id: AccountId::new(3),
            },
            ..launch
        };
        assert_eq!(account.course_id(), None);
    }

    #[test]
    fn test_target_serialization() {
        let json = serde_json::to_value(LaunchTarget::Course {
            course_id: CourseId::new(2),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "course", "course_id": 2}));
    }
}
