//! Health, liveness and readiness checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use http::StatusCode;
use rollbook_tasks::LockService;
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};
use crate::session::SessionStore;

/// Body of `/health_check` and `/liveness`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthMessage {
    /// `ok` or `down`.
    pub message: String,
}

/// State of one dependency reported by `/readiness`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// Component name.
    pub name: String,
    /// HTTP-style status: 200 when healthy, 503 otherwise.
    pub status: u16,
    /// Optional detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Time the check took.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
}

impl ComponentStatus {
    /// A healthy component.
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StatusCode::OK.as_u16(),
            message: None,
            response_time_ms: None,
        }
    }

    /// An unhealthy component.
    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
            message: Some(message.into()),
            response_time_ms: None,
        }
    }

    /// Set the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the response time.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn with_response_time(mut self, duration: Duration) -> Self {
        self.response_time_ms = Some(duration.as_millis() as u64);
        self
    }

    /// Whether the component is healthy.
    pub fn is_healthy(&self) -> bool {
        self.status < 400
    }
}

/// Body of `/readiness`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// 200 when every component is healthy, 503 otherwise.
    pub status: u16,
    /// Per-component results.
    pub components: Vec<ComponentStatus>,
}

impl ReadinessResponse {
    /// HTTP status to respond with.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
    }
}

/// Runs the server's health checks.
#[derive(Debug)]
pub struct HealthChecker {
    start_time: Instant,
    ready: AtomicBool,
    lms_health_url: Option<String>,
    client: reqwest::Client,
}

impl HealthChecker {
    /// Create a checker. When `lms_health_url` is set, readiness checks it.
    pub fn new(lms_health_url: Option<String>, timeout: Duration) -> ServerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServerError::server(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            start_time: Instant::now(),
            ready: AtomicBool::new(false),
            lms_health_url,
            client,
        })
    }

    /// Mark the server as accepting traffic, or as draining.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Whether the server is accepting traffic.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Time since the checker was created.
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Liveness: `ok` while serving, `down` once draining.
    pub fn liveness(&self) -> (StatusCode, HealthMessage) {
        if self.is_ready() {
            (
                StatusCode::OK,
                HealthMessage {
                    message: "ok".to_string(),
                },
            )
        } else {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                HealthMessage {
                    message: "down".to_string(),
                },
            )
        }
    }

    /// Readiness: checks each dependency. A draining server reports 503 with
    /// no components.
    pub async fn readiness<L: LockService>(
        &self,
        sessions: &SessionStore,
        locks: &L,
    ) -> ReadinessResponse {
        if !self.is_ready() {
            return ReadinessResponse {
                status: StatusCode::SERVICE_UNAVAILABLE.as_u16(),
                components: Vec::new(),
            };
        }

        let components = vec![
            ComponentStatus::healthy("session_store")
                .with_message(format!("{} sessions", sessions.len())),
            check_locks(locks).await,
            self.check_lms().await,
        ];

        let status = if components.iter().all(ComponentStatus::is_healthy) {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        ReadinessResponse {
            status: status.as_u16(),
            components,
        }
    }

    /// Probe the LMS health URL, if one is configured.
    pub async fn check_lms(&self) -> ComponentStatus {
        let Some(url) = &self.lms_health_url else {
            return ComponentStatus::healthy("lms").with_message("not configured");
        };

        let start = Instant::now();
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => ComponentStatus::healthy("lms")
                .with_message(format!("status {}", resp.status()))
                .with_response_time(start.elapsed()),
            Ok(resp) => ComponentStatus::unhealthy("lms", format!("unhealthy status: {}", resp.status()))
                .with_response_time(start.elapsed()),
            Err(e) => ComponentStatus::unhealthy("lms", format!("connection failed: {e}")),
        }
    }
}

async fn check_locks<L: LockService>(locks: &L) -> ComponentStatus {
    let start = Instant::now();
    let component = if locks.is_available().await {
        ComponentStatus::healthy("lock_service")
    } else {
        ComponentStatus::unhealthy("lock_service", "lock service unavailable")
    };
    component.with_response_time(start.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollbook_authz::CacheConfig;
    use rollbook_tasks::InMemoryLockService;

    fn checker(url: Option<&str>) -> HealthChecker {
        HealthChecker::new(url.map(str::to_string), Duration::from_millis(200)).unwrap()
    }

    fn sessions() -> SessionStore {
        SessionStore::new(Duration::from_secs(60), CacheConfig::default())
    }

    #[test]
    fn test_liveness_follows_ready_flag() {
        let checker = checker(None);
        assert_eq!(checker.liveness().0, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(checker.liveness().1.message, "down");

        checker.set_ready(true);
        let (status, body) = checker.liveness();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.message, "ok");
    }

    #[tokio::test]
    async fn test_readiness_all_healthy() {
        let checker = checker(None);
        checker.set_ready(true);

        let response = checker
            .readiness(&sessions(), &InMemoryLockService::new())
            .await;

        assert_eq!(response.status_code(), StatusCode::OK);
        let names: Vec<_> = response.components.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["session_store", "lock_service", "lms"]);
    }

    #[tokio::test]
    async fn test_readiness_when_draining() {
        let checker = checker(None);

        let response = checker
            .readiness(&sessions(), &InMemoryLockService::new())
            .await;

        assert_eq!(response.status, 503);
        assert!(response.components.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_lms_is_unhealthy() {
        let checker = checker(Some("http://127.0.0.1:1/health"));
        checker.set_ready(true);

        let response = checker
            .readiness(&sessions(), &InMemoryLockService::new())
            .await;

        assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        let lms = response.components.iter().find(|c| c.name == "lms").unwrap();
        assert!(!lms.is_healthy());
    }

    #[test]
    fn test_component_serialization() {
        let json = serde_json::to_value(ComponentStatus::healthy("lms")).unwrap();
        assert_eq!(json, serde_json::json!({"name": "lms", "status": 200}));
    }
}
