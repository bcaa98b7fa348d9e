//! Request handling.
//!
//! [`App`] turns a request into a response. It is independent of the
//! transport so tests can drive it with in-memory bodies.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, LOCATION, SET_COOKIE};
use http::request::Parts;
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use rollbook_authz::Session;
use rollbook_core::{
    AccountId, AttendanceSource, CourseConfig, CourseConfigStore, CourseId, LaunchContext,
    LmsConnector, ResourceKind, SectionId, StudentId,
};
use rollbook_tasks::{GradeSyncQueue, JobHandle, JobId, LockService};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{ErrorResponse, ServerError, ServerResult};
use crate::health::{HealthChecker, HealthMessage};
use crate::launch::LaunchParams;
use crate::routes::{launch_redirect, Route};
use crate::session::{clear_session_cookie, session_cookie, session_id_from_headers, SessionStore};

/// Shown when a request has no launch to act on.
const LAUNCH_PROMPT: &str = "Launch Rollbook from your LMS to continue";

/// Per-deployment request handling settings.
#[derive(Debug, Clone, Copy)]
pub struct AppSettings {
    /// Mark the session cookie `Secure` and `SameSite=None`.
    pub secure_cookies: bool,
    /// Lifetime of the session cookie.
    pub session_max_age: Duration,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            secure_cookies: true,
            session_max_age: Duration::from_secs(8 * 60 * 60),
        }
    }
}

/// The Rollbook request handler.
pub struct App<C, A, S, L> {
    queue: GradeSyncQueue<C, A, S, L>,
    sessions: Arc<SessionStore>,
    health: Arc<HealthChecker>,
    settings: AppSettings,
}

impl<C, A, S, L> Clone for App<C, A, S, L> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            sessions: Arc::clone(&self.sessions),
            health: Arc::clone(&self.health),
            settings: self.settings,
        }
    }
}

impl<C, A, S, L> fmt::Debug for App<C, A, S, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("sessions", &self.sessions.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Body of `PUT /courses/{id}/config`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigUpdate {
    #[serde(default)]
    tardy_weight: Option<f64>,
    #[serde(default)]
    omit_from_final_grade: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StudentQuery {
    course_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct StudentResponse {
    student_id: StudentId,
    course_id: CourseId,
    tally: rollbook_core::AttendanceTally,
    grade: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ConfigResponse {
    config: CourseConfig,
    needs_regrade: bool,
    queued_jobs: Vec<rollbook_tasks::JobId>,
}

impl<C, A, S, L> App<C, A, S, L>
where
    C: LmsConnector,
    A: AttendanceSource + 'static,
    S: CourseConfigStore + 'static,
    L: LockService + 'static,
{
    /// Create the handler.
    pub const fn new(
        queue: GradeSyncQueue<C, A, S, L>,
        sessions: Arc<SessionStore>,
        health: Arc<HealthChecker>,
        settings: AppSettings,
    ) -> Self {
        Self {
            queue,
            sessions,
            health,
            settings,
        }
    }

    /// The session store.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// The health checker.
    pub fn health(&self) -> &HealthChecker {
        &self.health
    }

    /// The grade sync queue.
    pub const fn queue(&self) -> &GradeSyncQueue<C, A, S, L> {
        &self.queue
    }

    /// Handle one request. Never fails; errors become JSON error responses.
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes>,
        B::Error: fmt::Display,
    {
        let start = Instant::now();
        let request_id = Uuid::now_v7().to_string();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %method,
            path = %path,
        );

        async move {
            let (route_name, result) = match Route::resolve(&method, &path) {
                Ok(route) => (route.name(), self.dispatch(route, req).await),
                Err(e) => ("unmatched", Err(e)),
            };

            let mut response = match result {
                Ok(response) => response,
                Err(e) => {
                    if e.status_code().is_server_error() {
                        warn!(error = %e, category = e.category(), "request failed");
                    } else {
                        debug!(error = %e, category = e.category(), "request rejected");
                    }
                    error_response(&e, &request_id)
                }
            };

            if let Ok(value) = HeaderValue::from_str(&request_id) {
                response.headers_mut().insert("x-request-id", value);
            }

            let duration = start.elapsed();
            rollbook_telemetry::metrics::record_request(
                route_name,
                response.status().as_u16(),
                duration,
            );
            info!(
                status = response.status().as_u16(),
                duration_ms = %duration.as_millis(),
                "request completed"
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch<B>(&self, route: Route, req: Request<B>) -> ServerResult<Response<Full<Bytes>>>
    where
        B: Body<Data = Bytes>,
        B::Error: fmt::Display,
    {
        let (parts, body) = req.into_parts();
        match route {
            Route::HealthCheck | Route::Liveness => {
                let (status, message) = self.health.liveness();
                Ok(json_response(status, &message))
            }
            Route::Readiness => {
                let readiness = self
                    .health
                    .readiness(&self.sessions, self.queue.updater().locks())
                    .await;
                Ok(json_response(readiness.status_code(), &readiness))
            }
            Route::Metrics => rollbook_telemetry::metrics::render_metrics()
                .map(text_response)
                .ok_or_else(|| ServerError::not_found(parts.uri.path())),
            Route::Launch => {
                let body = collect_body(body).await?;
                self.launch(&parts, &body)
            }
            Route::Logout => Ok(self.logout(&parts.headers)),
            Route::Root => Ok(self.root(&parts.headers).await),
            route => {
                let (_, session) = self
                    .sessions
                    .from_headers(&parts.headers)
                    .ok_or(ServerError::NoSession)?;
                let mut session = session.lock().await;
                session.touch();

                match route {
                    Route::Course(id) => self.course(&mut session, id).await,
                    Route::CourseConfig(id) => {
                        let body = collect_body(body).await?;
                        self.update_config(&mut session, id, &body).await
                    }
                    Route::Section(id) => self.section(&mut session, id).await,
                    Route::Account(id) => self.account(&mut session, id).await,
                    Route::Student(id) => {
                        let course_id = course_id_param(parts.uri.query())?;
                        self.student(&mut session, course_id, id).await
                    }
                    Route::Job(id) => self.job(&session, id, parts.uri.path()),
                    _ => Err(ServerError::not_found(parts.uri.path())),
                }
            }
        }
    }

    fn launch(&self, parts: &Parts, body: &[u8]) -> ServerResult<Response<Full<Bytes>>> {
        let tool_launch_url = tool_launch_url(&parts.headers)?;
        let launch = LaunchParams::from_form(body)?.into_context(tool_launch_url)?;

        info!(
            user_id = %launch.user_id,
            tool_consumer_instance_guid = %launch.tool_consumer_instance_guid,
            target = ?launch.target,
            "Tool launched"
        );

        // A relaunch from the same browser replaces the previous session.
        if let Some(previous) = session_id_from_headers(&parts.headers) {
            self.sessions.destroy(previous);
        }
        let (id, _) = self.sessions.create(launch);

        let mut response = empty_response(StatusCode::SEE_OTHER);
        response
            .headers_mut()
            .insert(LOCATION, HeaderValue::from_static("/"));
        set_cookie(
            &mut response,
            &session_cookie(id, self.settings.secure_cookies, self.settings.session_max_age),
        );
        Ok(response)
    }

    fn logout(&self, headers: &HeaderMap) -> Response<Full<Bytes>> {
        if let Some(id) = session_id_from_headers(headers) {
            self.sessions.destroy(id);
        }

        let mut response = json_response(
            StatusCode::OK,
            &HealthMessage {
                message: "logged out".to_string(),
            },
        );
        set_cookie(&mut response, &clear_session_cookie());
        response
    }

    async fn root(&self, headers: &HeaderMap) -> Response<Full<Bytes>> {
        let location = match self.sessions.from_headers(headers) {
            Some((_, session)) => launch_redirect(session.lock().await.launch()),
            None => None,
        };

        match location.and_then(|location| HeaderValue::from_str(&location).ok()) {
            Some(location) => {
                let mut response = empty_response(StatusCode::FOUND);
                response.headers_mut().insert(LOCATION, location);
                response
            }
            None => json_response(
                StatusCode::OK,
                &HealthMessage {
                    message: LAUNCH_PROMPT.to_string(),
                },
            ),
        }
    }

    async fn course(
        &self,
        session: &mut Session,
        id: CourseId,
    ) -> ServerResult<Response<Full<Bytes>>> {
        let launch = session.launch().clone();
        let client = self.connect(&launch)?;

        let course = session.authorizer(&client).load_and_authorize_course(id).await?;
        let config = self
            .queue
            .updater()
            .configs()
            .find(id, &launch.tool_consumer_instance_guid)
            .await;

        Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "course": course, "config": config }),
        ))
    }

    async fn update_config(
        &self,
        session: &mut Session,
        id: CourseId,
        body: &[u8],
    ) -> ServerResult<Response<Full<Bytes>>> {
        let update: ConfigUpdate = serde_json::from_slice(body)
            .map_err(|e| ServerError::bad_request(format!("invalid config body: {e}")))?;

        let launch = session.launch().clone();
        let guid = launch.tool_consumer_instance_guid.as_str();
        let client = self.connect(&launch)?;
        let mut authorizer = session.authorizer(&client);
        authorizer.load_and_authorize_course(id).await?;

        let configs = self.queue.updater().configs();
        let previous = configs.find(id, guid).await;
        let current = previous
            .clone()
            .unwrap_or_else(|| CourseConfig::new(id, guid));
        let config = CourseConfig {
            tardy_weight: update.tardy_weight.or(current.tardy_weight),
            omit_from_final_grade: update
                .omit_from_final_grade
                .unwrap_or(current.omit_from_final_grade),
            ..current
        };

        // The roster is loaded and checked against job capacity before saving,
        // so a refused regrade leaves the stored config unchanged.
        let mut students = BTreeSet::new();
        if config.needs_regrade(previous.as_ref()) {
            students = authorizer
                .load_and_authorize_sections(id)
                .await?
                .into_iter()
                .flat_map(|section| section.students.unwrap_or_default())
                .map(|student| student.id)
                .collect();
            self.queue.spawner().ensure_capacity(students.len())?;
        }

        let saved = configs.save(config).await?;

        let mut queued_jobs = Vec::new();
        if saved.needs_regrade {
            queued_jobs = self
                .queue
                .enqueue_course(&launch, id, students)?
                .iter()
                .map(JobHandle::id)
                .collect();
        }

        info!(
            course_id = %id,
            needs_regrade = saved.needs_regrade,
            queued = queued_jobs.len(),
            "Course config saved"
        );

        Ok(json_response(
            StatusCode::OK,
            &ConfigResponse {
                config: saved.config,
                needs_regrade: saved.needs_regrade,
                queued_jobs,
            },
        ))
    }

    /// Jobs are only visible to sessions already authorized for their course.
    fn job(&self, session: &Session, id: JobId, path: &str) -> ServerResult<Response<Full<Bytes>>> {
        let info = self
            .queue
            .job(id)
            .filter(|info| {
                session
                    .authorization()
                    .is_authorized(ResourceKind::Course, info.target.course_id)
            })
            .ok_or_else(|| ServerError::not_found(path))?;
        Ok(json_response(StatusCode::OK, &info))
    }

    async fn section(
        &self,
        session: &mut Session,
        id: SectionId,
    ) -> ServerResult<Response<Full<Bytes>>> {
        let launch = session.launch().clone();
        let client = self.connect(&launch)?;

        let section = session
            .authorizer(&client)
            .load_and_authorize_full_section(id)
            .await?;
        Ok(json_response(StatusCode::OK, &section))
    }

    async fn account(
        &self,
        session: &mut Session,
        id: AccountId,
    ) -> ServerResult<Response<Full<Bytes>>> {
        let launch = session.launch().clone();
        let client = self.connect(&launch)?;

        let account = session
            .authorizer(&client)
            .load_and_authorize_account(id, &launch.tool_consumer_instance_guid)
            .await?;
        Ok(json_response(StatusCode::OK, &account))
    }

    async fn student(
        &self,
        session: &mut Session,
        course_id: CourseId,
        student_id: StudentId,
    ) -> ServerResult<Response<Full<Bytes>>> {
        let launch = session.launch().clone();
        let guid = launch.tool_consumer_instance_guid.as_str();
        let client = self.connect(&launch)?;

        session
            .authorizer(&client)
            .load_and_authorize_student(course_id, student_id)
            .await?;

        let updater = self.queue.updater();
        let tally = updater.attendance().tally(guid, course_id, student_id).await;
        let tardy_weight = updater
            .configs()
            .find(course_id, guid)
            .await
            .and_then(|config| config.tardy_weight);

        Ok(json_response(
            StatusCode::OK,
            &StudentResponse {
                student_id,
                course_id,
                tally,
                grade: tally.grade(tardy_weight).map(|grade| grade.percent()),
            },
        ))
    }

    fn connect(&self, launch: &LaunchContext) -> ServerResult<C::Client> {
        Ok(self.queue.updater().connector().connect(
            &launch.lms_url,
            launch.user_id,
            &launch.tool_consumer_instance_guid,
        )?)
    }
}

async fn collect_body<B>(body: B) -> ServerResult<Bytes>
where
    B: Body<Data = Bytes>,
    B::Error: fmt::Display,
{
    body.collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .map_err(|e| ServerError::bad_request(format!("failed to read request body: {e}")))
}

fn course_id_param(query: Option<&str>) -> ServerResult<CourseId> {
    let query: StudentQuery = serde_urlencoded::from_str(query.unwrap_or_default())
        .map_err(|e| ServerError::bad_request(format!("invalid query: {e}")))?;
    query
        .course_id
        .as_deref()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| ServerError::bad_request("course_id is required"))
}

/// The launch URL the LMS posted to, rebuilt from the request headers.
fn tool_launch_url(headers: &HeaderMap) -> ServerResult<String> {
    let host = headers
        .get(HOST)
        .and_then(|host| host.to_str().ok())
        .ok_or_else(|| ServerError::bad_request("missing Host header"))?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|proto| proto.to_str().ok())
        .unwrap_or("http");
    Ok(format!("{scheme}://{host}/launch"))
}

fn set_cookie(response: &mut Response<Full<Bytes>>, cookie: &str) {
    if let Ok(value) = HeaderValue::from_str(cookie) {
        response.headers_mut().append(SET_COOKIE, value);
    }
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// Create a JSON response.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());

    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn text_response(body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}

/// Create an error response.
pub fn error_response(err: &ServerError, request_id: &str) -> Response<Full<Bytes>> {
    let body = ErrorResponse::from(err).with_request_id(request_id);
    json_response(err.status_code(), &body)
}
