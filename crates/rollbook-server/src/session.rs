//! In-memory session store.
//!
//! Sessions are keyed by the `rollbook_session` cookie. Each one sits behind
//! its own async mutex so requests of one browser session are handled one at
//! a time while other sessions proceed in parallel.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use http::header::{HeaderMap, COOKIE};
use parking_lot::Mutex as SyncMutex;
use rollbook_authz::{CacheConfig, Session};
use rollbook_core::{LaunchContext, SessionId};
use tokio::sync::Mutex;
use tracing::debug;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "rollbook_session";

/// A session shared between the requests that use it.
pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Debug)]
struct Entry {
    session: SharedSession,
    last_seen: SyncMutex<Instant>,
}

/// Cookie-keyed store of live sessions.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SessionId, Entry>,
    idle_timeout: Duration,
    cache_config: CacheConfig,
}

impl SessionStore {
    /// Create a store expiring sessions idle for longer than `idle_timeout`.
    pub fn new(idle_timeout: Duration, cache_config: CacheConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
            cache_config,
        }
    }

    /// Start a session for a launch.
    pub fn create(&self, launch: LaunchContext) -> (SessionId, SharedSession) {
        let session = Session::new(launch, self.cache_config.clone());
        let id = session.id();
        let shared = Arc::new(Mutex::new(session));
        self.sessions.insert(
            id,
            Entry {
                session: Arc::clone(&shared),
                last_seen: SyncMutex::new(Instant::now()),
            },
        );
        debug!(session_id = %id, "Session created");
        (id, shared)
    }

    /// Look up a live session, refreshing its idle timer.
    ///
    /// An expired session is removed and reported as absent.
    pub fn get(&self, id: SessionId) -> Option<SharedSession> {
        {
            let entry = self.sessions.get(&id)?;
            let mut last_seen = entry.last_seen.lock();
            if last_seen.elapsed() <= self.idle_timeout {
                *last_seen = Instant::now();
                return Some(Arc::clone(&entry.session));
            }
        }

        self.sessions.remove(&id);
        debug!(session_id = %id, "Session expired");
        None
    }

    /// Look up the session named by the request's cookie.
    pub fn from_headers(&self, headers: &HeaderMap) -> Option<(SessionId, SharedSession)> {
        let id = session_id_from_headers(headers)?;
        self.get(id).map(|session| (id, session))
    }

    /// End a session. Returns whether it existed.
    pub fn destroy(&self, id: SessionId) -> bool {
        let existed = self.sessions.remove(&id).is_some();
        if existed {
            debug!(session_id = %id, "Session destroyed");
        }
        existed
    }

    /// Remove every idle session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, entry| entry.last_seen.lock().elapsed() <= self.idle_timeout);
        before.saturating_sub(self.sessions.len())
    }

    /// Number of stored sessions, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Idle time after which sessions expire.
    pub const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

/// Extract the session id from a request's `Cookie` headers.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == SESSION_COOKIE)
        .and_then(|(_, value)| value.trim().trim_matches('"').parse().ok())
}

/// `Set-Cookie` value starting a session.
pub fn session_cookie(id: SessionId, secure: bool, max_age: Duration) -> String {
    // Launches arrive inside an LMS iframe, so the cookie must be sent cross-site.
    let same_site = if secure { "None" } else { "Lax" };
    let mut cookie = format!(
        "{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite={same_site}; Max-Age={}",
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value clearing the session cookie.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use rollbook_core::{CourseId, LaunchTarget, UserId};

    fn launch() -> LaunchContext {
        LaunchContext::new(
            UserId::new(1),
            "abc123",
            "https://lms.example",
            "http://localhost:3001/launch",
            LaunchTarget::Course {
                course_id: CourseId::new(1),
            },
        )
    }

    fn store(idle: Duration) -> SessionStore {
        SessionStore::new(idle, CacheConfig::default())
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = store(Duration::from_secs(60));
        let (id, _) = store.create(launch());

        let session = store.get(id).unwrap();
        assert_eq!(session.lock().await.id(), id);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_unknown_session() {
        let store = store(Duration::from_secs(60));
        assert!(store.get(SessionId::new()).is_none());
    }

    #[test]
    fn test_destroy() {
        let store = store(Duration::from_secs(60));
        let (id, _) = store.create(launch());

        assert!(store.destroy(id));
        assert!(!store.destroy(id));
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_idle_session_expires() {
        let store = store(Duration::ZERO);
        let (id, _) = store.create(launch());
        std::thread::sleep(Duration::from_millis(5));

        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let store = store(Duration::from_millis(1));
        store.create(launch());
        store.create(launch());
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(store.purge_expired(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_session_id_from_headers() {
        let id = SessionId::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE}={id}")).unwrap(),
        );

        assert_eq!(session_id_from_headers(&headers), Some(id));
    }

    #[test]
    fn test_malformed_session_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("rollbook_session=not-a-uuid"),
        );
        assert_eq!(session_id_from_headers(&headers), None);
        assert_eq!(session_id_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let id = SessionId::new();
        let cookie = session_cookie(id, true, Duration::from_secs(3600));
        assert!(cookie.starts_with(&format!("rollbook_session={id};")));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=None"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.ends_with("; Secure"));

        let insecure = session_cookie(id, false, Duration::from_secs(60));
        assert!(!insecure.contains("Secure"));
        assert!(insecure.contains("SameSite=Lax"));
        assert!(clear_session_cookie().contains("Max-Age=0"));
    }
}
