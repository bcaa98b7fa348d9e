//! Wiring a server from configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rollbook_authz::CacheConfig;
use rollbook_config::RollbookConfig;
use rollbook_core::{HttpLmsConnector, InMemoryAttendance, InMemoryCourseConfigStore, UserId};
use rollbook_tasks::{
    GradeSyncQueue, GradeUpdater, InMemoryLockService, JobSpawner, LockConfig, RetryPolicy,
    SpawnerConfig,
};
use tracing::info;

use crate::app::{App, AppSettings};
use crate::error::{ServerError, ServerResult};
use crate::health::HealthChecker;
use crate::server::{Server, ServerSettings};
use crate::session::SessionStore;

/// The server as deployed: HTTP LMS access with in-memory stores.
pub type RollbookServer =
    Server<HttpLmsConnector, InMemoryAttendance, InMemoryCourseConfigStore, InMemoryLockService>;

/// Build a server from configuration.
///
/// # Errors
///
/// Returns an error if the listen address is invalid or an HTTP client cannot
/// be created.
pub fn build_server(config: &RollbookConfig) -> ServerResult<RollbookServer> {
    let addr: SocketAddr = config.server.http_addr.parse().map_err(|e| {
        ServerError::server(format!("invalid http_addr '{}': {e}", config.server.http_addr))
    })?;
    let lms_timeout = Duration::from_millis(config.lms.request_timeout_ms);

    let connector = HttpLmsConnector::new(lms_timeout)?;
    for instance in &config.lms.instances {
        connector.register_instance(
            instance.tool_consumer_instance_guid.as_str(),
            &instance.base_url,
        );
    }
    for token in &config.lms.access_tokens {
        connector.store_token(
            token.tool_consumer_instance_guid.as_str(),
            UserId::new(token.user_id),
            token.token.as_str(),
        );
    }
    info!(
        instances = config.lms.instances.len(),
        tokens = config.lms.access_tokens.len(),
        "LMS instances and access tokens loaded"
    );

    let sync = &config.grade_sync;
    let locks = InMemoryLockService::with_config(LockConfig {
        retry_count: sync.lock_retry_count,
        retry_delay: Duration::from_millis(sync.lock_retry_delay_ms),
    });
    let updater = GradeUpdater::new(
        Arc::new(connector),
        Arc::new(InMemoryAttendance::new()),
        Arc::new(InMemoryCourseConfigStore::new()),
        Arc::new(locks),
    )
    .with_lock_ttl(Duration::from_secs(sync.lock_ttl_secs))
    .with_retry_policy(RetryPolicy::new(
        sync.retry_limit,
        Duration::from_secs(sync.retry_delay_secs),
    ));
    let spawner = JobSpawner::with_config(
        SpawnerConfig::new()
            .with_max_concurrent(sync.max_concurrent_jobs)
            .with_default_timeout(Duration::from_secs(sync.job_timeout_secs)),
    );
    let queue = GradeSyncQueue::new(updater, Arc::new(spawner));

    let idle_timeout = Duration::from_secs(config.server.session_idle_timeout_secs);
    let sessions = SessionStore::new(
        idle_timeout,
        CacheConfig {
            max_entries: config.cache.max_entries,
            ttl: Duration::from_secs(config.cache.ttl_secs),
        },
    );
    let health = HealthChecker::new(config.lms.health_check_url.clone(), lms_timeout)?;

    let app = App::new(
        queue,
        Arc::new(sessions),
        Arc::new(health),
        AppSettings {
            secure_cookies: config.server.secure_cookies,
            session_max_age: idle_timeout,
        },
    );

    Ok(Server::new(
        app,
        ServerSettings {
            addr,
            shutdown_timeout: Duration::from_secs(config.server.shutdown_timeout_secs),
            request_timeout: Duration::from_millis(config.server.request_timeout_ms),
            max_connections: usize::try_from(config.server.max_connections)
                .unwrap_or(usize::MAX),
            session_purge_interval: idle_timeout.min(Duration::from_secs(60)),
        },
    ))
}
