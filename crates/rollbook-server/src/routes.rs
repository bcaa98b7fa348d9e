//! Request routing.

use http::Method;
use rollbook_core::{AccountId, CourseId, SectionId, StudentId};
use rollbook_tasks::JobId;

use crate::error::{ServerError, ServerResult};

/// An endpoint of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `GET /`: redirect to the launch target.
    Root,
    /// `POST /launch`: start a session from an LTI launch.
    Launch,
    /// `GET|POST /logout`: end the session.
    Logout,
    /// `GET /health_check`.
    HealthCheck,
    /// `GET /liveness`.
    Liveness,
    /// `GET /readiness`.
    Readiness,
    /// `GET /metrics`.
    Metrics,
    /// `GET /courses/{id}`.
    Course(CourseId),
    /// `PUT /courses/{id}/config`.
    CourseConfig(CourseId),
    /// `GET /sections/{id}`.
    Section(SectionId),
    /// `GET /accounts/{id}`.
    Account(AccountId),
    /// `GET /students/{id}?course_id=`.
    Student(StudentId),
    /// `GET /jobs/{id}`: status of a queued grade sync job.
    Job(JobId),
}

impl Route {
    /// Match a request to a route.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown paths, `MethodNotAllowed` for a known path
    /// requested with the wrong method.
    pub fn resolve(method: &Method, path: &str) -> ServerResult<Self> {
        let segments: Vec<&str> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();

        let (route, allowed): (Self, &[Method]) = match segments.as_slice() {
            [] => (Self::Root, &[Method::GET]),
            ["launch"] => (Self::Launch, &[Method::POST]),
            ["logout"] => (Self::Logout, &[Method::GET, Method::POST]),
            ["health_check"] => (Self::HealthCheck, &[Method::GET]),
            ["liveness"] => (Self::Liveness, &[Method::GET]),
            ["readiness"] => (Self::Readiness, &[Method::GET]),
            ["metrics"] => (Self::Metrics, &[Method::GET]),
            ["courses", id] => (Self::Course(parse_id(id, path)?), &[Method::GET]),
            ["courses", id, "config"] => (Self::CourseConfig(parse_id(id, path)?), &[Method::PUT]),
            ["sections", id] => (Self::Section(parse_id(id, path)?), &[Method::GET]),
            ["accounts", id] => (Self::Account(parse_id(id, path)?), &[Method::GET]),
            ["students", id] => (Self::Student(parse_id(id, path)?), &[Method::GET]),
            ["jobs", id] => (Self::Job(parse_id(id, path)?), &[Method::GET]),
            _ => return Err(ServerError::not_found(path)),
        };

        if allowed.contains(method) {
            Ok(route)
        } else {
            Err(ServerError::MethodNotAllowed)
        }
    }

    /// Low-cardinality route name for metrics and logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Launch => "launch",
            Self::Logout => "logout",
            Self::HealthCheck => "health_check",
            Self::Liveness => "liveness",
            Self::Readiness => "readiness",
            Self::Metrics => "metrics",
            Self::Course(_) => "course",
            Self::CourseConfig(_) => "course_config",
            Self::Section(_) => "section",
            Self::Account(_) => "account",
            Self::Student(_) => "student",
            Self::Job(_) => "job",
        }
    }
}

fn parse_id<T: std::str::FromStr>(segment: &str, path: &str) -> ServerResult<T> {
    segment.parse().map_err(|_| ServerError::not_found(path))
}

/// Location the root path redirects a launch to.
pub fn launch_redirect(launch: &rollbook_core::LaunchContext) -> Option<String> {
    use rollbook_core::LaunchTarget;

    match launch.target {
        LaunchTarget::Student { course_id } => Some(format!(
            "/students/{}?course_id={course_id}",
            launch.user_id
        )),
        LaunchTarget::Course { course_id } => Some(format!("/courses/{course_id}")),
        LaunchTarget::Account { account_id } => Some(format!("/accounts/{account_id}")),
        LaunchTarget::Unknown => None,
    }
}
