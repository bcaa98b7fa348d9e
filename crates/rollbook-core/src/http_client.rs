//! [`LmsClient`] over the LMS REST API.

use std::time::Duration;

use dashmap::DashMap;
use http::StatusCode;
use reqwest::header::{HeaderMap, LINK};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{LmsError, LmsResult};
use crate::ids::{AccountId, AssignmentId, CourseId, SectionId, StudentId, UserId};
use crate::lms::{LmsClient, LmsConnector, NewAssignment};
use crate::records::{
    AccountRecord, AssignmentRecord, CourseRecord, SectionRecord, SubmissionRecord,
};

/// Items requested per page on list endpoints.
const PER_PAGE: u32 = 100;

/// LMS REST client acting as one user.
#[derive(Debug, Clone)]
pub struct HttpLmsClient {
    /// HTTP client.
    client: Client,
    /// LMS base URL, without trailing slash.
    base_url: String,
    /// OAuth access token of the acting user.
    token: String,
}

impl HttpLmsClient {
    /// Create a client for `base_url` using `token`.
    pub fn new(client: Client, base_url: &str, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> LmsResult<reqwest::Response> {
        let response = request.bearer_auth(&self.token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), resource = what, "LMS request failed");
        Err(status_error(status, what, body))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> LmsResult<T> {
        let response = self.send(self.client.get(self.url(path)), path).await?;
        Ok(response.json().await?)
    }

    /// Fetch every page of a list endpoint, following `Link: rel="next"`.
    async fn get_all<T: DeserializeOwned>(&self, path: &str, query: &str) -> LmsResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(format!("{}?{query}per_page={PER_PAGE}", self.url(path)));

        while let Some(url) = next.take() {
            let response = self.send(self.client.get(&url), path).await?;
            next = next_page(response.headers());
            let mut page: Vec<T> = response.json().await?;
            items.append(&mut page);
        }

        Ok(items)
    }
}

/// Map a non-success status to an [`LmsError`].
fn status_error(status: StatusCode, what: &str, body: String) -> LmsError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LmsError::unauthorized(if body.is_empty() {
            status.to_string()
        } else {
            body
        }),
        StatusCode::NOT_FOUND => LmsError::not_found(what),
        _ => LmsError::remote(status.as_u16(), body),
    }
}

/// Extract the `rel="next"` target of a `Link` header.
fn next_page(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.split(';').any(|p| p.trim() == r#"rel="next""#) {
            return None;
        }
        let target = target.trim();
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

impl LmsClient for HttpLmsClient {
    async fn get_course(&self, id: CourseId) -> LmsResult<CourseRecord> {
        self.get_json(&format!("/courses/{id}")).await
    }

    async fn get_sections(&self, course_id: CourseId) -> LmsResult<Vec<SectionRecord>> {
        self.get_all(
            &format!("/courses/{course_id}/sections"),
            "include[]=students&",
        )
        .await
    }

    async fn get_section(&self, id: SectionId) -> LmsResult<SectionRecord> {
        self.get_json(&format!("/sections/{id}")).await
    }

    async fn get_account(&self, id: AccountId) -> LmsResult<AccountRecord> {
        self.get_json(&format!("/accounts/{id}")).await
    }

    async fn get_submission(
        &self,
        course_id: CourseId,
        assignment_id: AssignmentId,
        student_id: StudentId,
    ) -> LmsResult<SubmissionRecord> {
        self.get_json(&format!(
            "/courses/{course_id}/assignments/{assignment_id}/submissions/{student_id}"
        ))
        .await
    }

    async fn find_assignment(
        &self,
        course_id: CourseId,
        tool_launch_url: &str,
    ) -> LmsResult<Option<AssignmentRecord>> {
        let assignments: Vec<AssignmentRecord> = self
            .get_all(&format!("/courses/{course_id}/assignments"), "")
            .await?;
        Ok(assignments.into_iter().find(|a| a.launches(tool_launch_url)))
    }

    async fn create_assignment(
        &self,
        course_id: CourseId,
        assignment: &NewAssignment,
    ) -> LmsResult<AssignmentRecord> {
        let path = format!("/courses/{course_id}/assignments");
        let body = json!({
            "assignment": {
                "name": assignment.name,
                "points_possible": assignment.points_possible,
                "grading_type": assignment.grading_type,
                "submission_types": assignment.submission_types,
                "omit_from_final_grade": assignment.omit_from_final_grade,
                "published": assignment.published,
                "external_tool_tag_attributes": { "url": assignment.tool_launch_url },
            }
        });
        let response = self
            .send(self.client.post(self.url(&path)).json(&body), &path)
            .await?;
        Ok(response.json().await?)
    }

    async fn submit_grade(
        &self,
        course_id: CourseId,
        assignment_id: AssignmentId,
        student_id: StudentId,
        posted_grade: Option<&str>,
    ) -> LmsResult<()> {
        let path =
            format!("/courses/{course_id}/assignments/{assignment_id}/submissions/{student_id}");
        let body = json!({ "submission": { "posted_grade": posted_grade.unwrap_or("") } });
        self.send(self.client.put(self.url(&path)).json(&body), &path)
            .await?;
        Ok(())
    }
}

/// Builds [`HttpLmsClient`]s from stored per-user access tokens.
///
/// Each LMS instance is registered with its API root, and tokens are keyed by
/// instance and user. A client is only handed out when the launch names the
/// instance's registered root; anything else is `Unauthorized`, so a stored
/// token never travels to a host the deployment did not configure.
#[derive(Debug)]
pub struct HttpLmsConnector {
    client: Client,
    instances: DashMap<String, String>,
    tokens: DashMap<(String, UserId), String>,
}

impl HttpLmsConnector {
    /// Create a connector whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> LmsResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(100)
            .build()
            .map_err(|e| LmsError::Transport(format!("failed to create client: {e}")))?;

        Ok(Self {
            client,
            instances: DashMap::new(),
            tokens: DashMap::new(),
        })
    }

    /// Register the API root of an LMS instance.
    pub fn register_instance(
        &self,
        tool_consumer_instance_guid: impl Into<String>,
        base_url: &str,
    ) {
        self.instances
            .insert(tool_consumer_instance_guid.into(), normalize_base_url(base_url));
    }

    /// Store the access token of a user.
    pub fn store_token(
        &self,
        tool_consumer_instance_guid: impl Into<String>,
        user_id: UserId,
        token: impl Into<String>,
    ) {
        self.tokens
            .insert((tool_consumer_instance_guid.into(), user_id), token.into());
    }
}

/// Scheme and host are case-insensitive; a trailing slash is not significant.
fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_ascii_lowercase()
}

impl LmsConnector for HttpLmsConnector {
    type Client = HttpLmsClient;

    fn connect(
        &self,
        lms_url: &str,
        user_id: UserId,
        tool_consumer_instance_guid: &str,
    ) -> LmsResult<HttpLmsClient> {
        let Some(base_url) = self
            .instances
            .get(tool_consumer_instance_guid)
            .map(|entry| entry.value().clone())
        else {
            warn!(guid = tool_consumer_instance_guid, "Launch from unregistered LMS instance");
            return Err(LmsError::unauthorized(format!(
                "unknown LMS instance {tool_consumer_instance_guid}"
            )));
        };

        if normalize_base_url(lms_url) != base_url {
            warn!(
                guid = tool_consumer_instance_guid,
                lms_url,
                expected = %base_url,
                "Launch LMS url does not match the registered instance"
            );
            return Err(LmsError::unauthorized(format!(
                "{lms_url} is not the API root of instance {tool_consumer_instance_guid}"
            )));
        }

        let token = self
            .tokens
            .get(&(tool_consumer_instance_guid.to_string(), user_id))
            .map(|entry| entry.value().clone());

        match token {
            Some(token) => Ok(HttpLmsClient::new(self.client.clone(), &base_url, token)),
            None => {
                warn!(user_id = %user_id, guid = tool_consumer_instance_guid, "No LMS token for user");
                Err(LmsError::unauthorized(format!(
                    "no access token for user {user_id}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::UNAUTHORIZED, "/courses/1", String::new()).is_unauthorized());
        assert!(status_error(StatusCode::FORBIDDEN, "/courses/1", "denied".into()).is_unauthorized());
        assert!(status_error(StatusCode::NOT_FOUND, "/courses/1", String::new()).is_not_found());
        assert_eq!(
            status_error(StatusCode::BAD_GATEWAY, "/courses/1", "oops".into()),
            LmsError::remote(502, "oops")
        );
    }

    #[test]
    fn test_next_page_link() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                r#"<https://lms.example/api/v1/courses/1/sections?page=1>; rel="current", <https://lms.example/api/v1/courses/1/sections?page=2>; rel="next""#,
            ),
        );
        assert_eq!(
            next_page(&headers).as_deref(),
            Some("https://lms.example/api/v1/courses/1/sections?page=2")
        );
    }

    #[test]
    fn test_no_next_page() {
        let mut headers = HeaderMap::new();
        assert!(next_page(&headers).is_none());
        headers.insert(
            LINK,
            HeaderValue::from_static(r#"<https://lms.example/x?page=3>; rel="last""#),
        );
        assert!(next_page(&headers).is_none());
    }

    #[test]
    fn test_base_url_is_normalized() {
        let client = HttpLmsClient::new(Client::new(), "https://lms.example/", "token");
        assert_eq!(client.base_url(), "https://lms.example");
        assert_eq!(client.url("/courses/1"), "https://lms.example/api/v1/courses/1");
    }

    fn connector() -> HttpLmsConnector {
        let connector = HttpLmsConnector::new(Duration::from_secs(5)).unwrap();
        connector.register_instance("abc123", "https://LMS.example/");
        connector
    }

    #[test]
    fn test_connector_requires_token() {
        let connector = connector();
        let err = connector
            .connect("https://lms.example", UserId::new(1), "abc123")
            .unwrap_err();
        assert!(err.is_unauthorized());

        connector.store_token("abc123", UserId::new(1), "secret");
        let client = connector
            .connect("https://lms.example/", UserId::new(1), "abc123")
            .unwrap();
        assert_eq!(client.base_url(), "https://lms.example");
    }

    #[test]
    fn test_connector_rejects_foreign_lms_url() {
        let connector = connector();
        connector.store_token("abc123", UserId::new(42), "secret-token");

        let err = connector
            .connect("https://attacker.example", UserId::new(42), "abc123")
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert!(err.to_string().contains("attacker.example"));
    }

    #[test]
    fn test_connector_rejects_unknown_instance() {
        let connector = connector();
        connector.store_token("def456", UserId::new(1), "secret");

        let err = connector
            .connect("https://lms.example", UserId::new(1), "def456")
            .unwrap_err();
        assert!(err.is_unauthorized());
    }
}
