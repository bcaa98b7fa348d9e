//! Browser sessions.
//!
//! A [`Session`] is created when the tool is launched and holds everything
//! authorization needs: the launch context, the set of already-authorized
//! resources and the LMS resource cache. Sessions live in memory only.

use std::time::{Duration, Instant};

use rollbook_core::{LaunchContext, LmsClient, SessionId};

use crate::authorization::AuthorizationSet;
use crate::cache::{CacheConfig, ResourceCache};
use crate::loaders::Authorizer;

/// Per-user, per-launch session state.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    launch: LaunchContext,
    authorization: AuthorizationSet,
    cache: ResourceCache,
    created_at: Instant,
    last_seen: Instant,
}

impl Session {
    /// Start a session for a launch.
    pub fn new(launch: LaunchContext, cache_config: CacheConfig) -> Self {
        let now = Instant::now();
        Self {
            id: SessionId::new(),
            launch,
            authorization: AuthorizationSet::new(),
            cache: ResourceCache::new(cache_config),
            created_at: now,
            last_seen: now,
        }
    }

    /// Session id.
    pub const fn id(&self) -> SessionId {
        self.id
    }

    /// The launch that started this session.
    pub const fn launch(&self) -> &LaunchContext {
        &self.launch
    }

    /// Resources this session is authorized to access.
    pub const fn authorization(&self) -> &AuthorizationSet {
        &self.authorization
    }

    /// The session's LMS resource cache.
    pub const fn cache(&self) -> &ResourceCache {
        &self.cache
    }

    /// Record activity on the session.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Time since the session was last used.
    pub fn idle_for(&self) -> Duration {
        self.last_seen.elapsed()
    }

    /// Time since the session was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Borrow the session as an [`Authorizer`] acting through `client`.
    pub fn authorizer<'s, C: LmsClient>(&'s mut self, client: &'s C) -> Authorizer<'s, C> {
        Authorizer::new(client, &self.launch, &mut self.authorization, &self.cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollbook_core::fixtures::MockLms;
    use rollbook_core::{CourseId, LaunchTarget, ResourceKind, UserId};

    fn session() -> Session {
        Session::new(
            LaunchContext::new(
                UserId::new(1),
                "abc123",
                "https://lms.example",
                "http://localhost:3001",
                LaunchTarget::Course {
                    course_id: CourseId::new(1),
                },
            ),
            CacheConfig::default(),
        )
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = session();
        assert!(session.authorization().is_empty());
        assert_eq!(session.cache().stats().size, 0);
        assert_eq!(session.launch().user_id, UserId::new(1));
    }

    #[test]
    fn test_sessions_have_distinct_ids() {
        assert_ne!(session().id(), session().id());
    }

    #[test]
    fn test_touch_resets_idle_time() {
        let mut session = session();
        std::thread::sleep(Duration::from_millis(5));
        let before = session.idle_for();
        assert!(before >= Duration::from_millis(5));
        session.touch();
        assert!(session.idle_for() < before);
        assert!(session.age() >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_authorizer_updates_session() {
        let lms = MockLms::new().with_course(1);
        let mut session = session();

        session
            .authorizer(&lms)
            .load_and_authorize_course(CourseId::new(1))
            .await
            .unwrap();

        assert!(session.authorization().is_authorized(ResourceKind::Course, 1_u64));
        assert_eq!(session.cache().stats().size, 1);
    }
}
