//! LTI launch parameters.
//!
//! The LMS starts a session by POSTing a form to `/launch`. Only the fields
//! Rollbook needs are read; the launch signature is not checked here.

use rollbook_core::{
    AccountId, CourseId, LaunchContext, LaunchTarget, UserId, ValidationError,
};
use serde::Deserialize;

/// Role names that act on the course as a whole rather than as a student.
const STAFF_ROLES: [&str; 4] = [
    "Instructor",
    "TeachingAssistant",
    "ContentDeveloper",
    "Administrator",
];

/// Form fields of an LTI launch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LaunchParams {
    /// LMS user id of the launching user.
    pub custom_canvas_user_id: Option<String>,
    /// LMS instance the launch came from.
    pub tool_consumer_instance_guid: Option<String>,
    /// Host of the LMS API.
    pub custom_canvas_api_domain: Option<String>,
    /// Course the tool was launched from.
    pub custom_canvas_course_id: Option<String>,
    /// Account the tool was launched from.
    pub custom_canvas_account_id: Option<String>,
    /// Comma-separated LTI roles of the user in the launch context.
    pub roles: Option<String>,
}

impl LaunchParams {
    /// Parse a URL-encoded launch form.
    pub fn from_form(body: &[u8]) -> Result<Self, ValidationError> {
        serde_urlencoded::from_bytes(body).map_err(|e| {
            let mut errors = ValidationError::new();
            errors.add("body", e.to_string());
            errors
        })
    }

    /// Build the launch context. `tool_launch_url` is the URL the launch was
    /// posted to.
    pub fn into_context(self, tool_launch_url: String) -> Result<LaunchContext, ValidationError> {
        let mut errors = ValidationError::new();

        let user_id = parse_id(self.custom_canvas_user_id.as_deref());
        if user_id.is_none() {
            errors.add("custom_canvas_user_id", "can't be blank");
        }
        let guid = self
            .tool_consumer_instance_guid
            .filter(|guid| !guid.trim().is_empty());
        if guid.is_none() {
            errors.add("tool_consumer_instance_guid", "can't be blank");
        }
        let domain = self
            .custom_canvas_api_domain
            .filter(|domain| !domain.trim().is_empty());
        if domain.is_none() {
            errors.add("custom_canvas_api_domain", "can't be blank");
        }

        let (Some(user_id), Some(guid), Some(domain)) = (user_id, guid, domain) else {
            return Err(errors);
        };

        let course_id = parse_id(self.custom_canvas_course_id.as_deref()).map(CourseId::new);
        let account_id = parse_id(self.custom_canvas_account_id.as_deref()).map(AccountId::new);
        let target = match (course_id, account_id) {
            (Some(course_id), _) if is_student(self.roles.as_deref()) => {
                LaunchTarget::Student { course_id }
            }
            (Some(course_id), _) => LaunchTarget::Course { course_id },
            (None, Some(account_id)) => LaunchTarget::Account { account_id },
            (None, None) => LaunchTarget::Unknown,
        };

        Ok(LaunchContext::new(
            UserId::new(user_id),
            guid,
            lms_url(&domain),
            tool_launch_url,
            target,
        ))
    }
}

// Unsubstituted custom variables arrive literally, e.g. "$Canvas.course.id".
fn parse_id(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse().ok())
}

fn is_student(roles: Option<&str>) -> bool {
    let roles: Vec<&str> = roles
        .unwrap_or_default()
        .split(',')
        .map(|role| role.trim().rsplit(|c| c == '/' || c == '#').next().unwrap_or_default())
        .collect();
    roles.contains(&"Learner") && !roles.iter().any(|role| STAFF_ROLES.contains(role))
}

fn lms_url(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_string()
    } else {
        format!("https://{domain}")
    }
}
