//! Job spawner for background execution.
//!
//! Every accepted job gets a tokio task straight away and waits there for one
//! of `max_concurrent` worker slots, so a burst larger than the slot count is
//! queued rather than refused. The spawner enforces a per-job deadline, keeps
//! a registry of recent jobs for the status endpoint and refuses new work
//! after shutdown.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{TaskError, TaskResult};
use crate::job::{JobId, JobInfo, JobStatus, JobTarget};

/// Configuration for the job spawner.
#[derive(Debug, Clone)]
pub struct SpawnerConfig {
    /// Worker slots: jobs running at once. Further jobs wait their turn.
    pub max_concurrent: usize,
    /// Deadline for one job, counted from when it gets a slot.
    pub default_timeout: Option<Duration>,
    /// Maximum number of jobs kept in the registry.
    pub max_registry_size: usize,
    /// How long finished jobs stay in the registry.
    pub history_retention: Duration,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl SpawnerConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Production settings.
    pub fn production() -> Self {
        Self {
            max_concurrent: 64,
            default_timeout: Some(Duration::from_secs(300)),
            max_registry_size: 10_000,
            history_retention: Duration::from_secs(3600),
        }
    }

    /// Development settings: fewer slots, shorter history.
    pub fn development() -> Self {
        Self {
            max_concurrent: 8,
            default_timeout: Some(Duration::from_secs(120)),
            max_registry_size: 1_000,
            history_retention: Duration::from_secs(600),
        }
    }

    /// Set the number of worker slots.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Set the job deadline.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Disable the job deadline.
    pub fn without_timeout(mut self) -> Self {
        self.default_timeout = None;
        self
    }

    /// Set maximum registry size.
    pub fn with_max_registry_size(mut self, size: usize) -> Self {
        self.max_registry_size = size;
        self
    }
}

/// Passed to a running job so it can report reruns into its registry entry.
#[derive(Debug, Clone)]
pub struct JobContext {
    info: Arc<RwLock<JobInfo>>,
}

impl JobContext {
    /// Record that the job is starting another attempt.
    pub fn record_retry(&self) {
        self.info.write().retry_count += 1;
    }
}

/// A handle to a spawned job.
///
/// Dropping the handle detaches the job; it keeps running.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    handle: JoinHandle<TaskResult<()>>,
}

impl JobHandle {
    /// Get the job id.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Wait for the job to finish.
    pub async fn join(self) -> TaskResult<()> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(TaskError::cancelled("runtime dropped the job")),
            Err(e) if e.is_panic() => Err(TaskError::panicked("job panicked")),
            Err(e) => Err(TaskError::internal(e.to_string())),
        }
    }
}

/// Keeps a job counted as active until its task ends, including by panic.
struct ActiveGuard(Arc<AtomicU64>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Background job spawner.
#[derive(Debug)]
pub struct JobSpawner {
    config: SpawnerConfig,
    registry: DashMap<JobId, Arc<RwLock<JobInfo>>>,
    slots: Arc<Semaphore>,
    active: Arc<AtomicU64>,
    shutdown: AtomicBool,
}

impl JobSpawner {
    /// Create a spawner with default configuration.
    pub fn new() -> Self {
        Self::with_config(SpawnerConfig::default())
    }

    /// Create a spawner with custom configuration.
    pub fn with_config(config: SpawnerConfig) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
            registry: DashMap::new(),
            active: Arc::new(AtomicU64::new(0)),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Check if the spawner is shut down.
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Jobs accepted and not yet finished, queued or running.
    pub fn active_count(&self) -> u64 {
        self.active.load(Ordering::Acquire)
    }

    /// Look up a job.
    pub fn get_job(&self, id: JobId) -> Option<JobInfo> {
        self.registry.get(&id).map(|v| v.read().clone())
    }

    /// Check that `jobs` more jobs would be accepted.
    ///
    /// Lets a caller queueing a batch fail before the first job rather than
    /// part way through.
    pub fn ensure_capacity(&self, jobs: usize) -> TaskResult<()> {
        if self.is_shutdown() {
            return Err(TaskError::spawn_failed("spawner is shut down"));
        }

        if self.registry.len() + jobs > self.config.max_registry_size {
            self.cleanup_finished_jobs();

            if self.registry.len() + jobs > self.config.max_registry_size {
                return Err(TaskError::registry_full(self.config.max_registry_size));
            }
        }
        Ok(())
    }

    /// Spawn a job grading `target`.
    ///
    /// `job` is called once a worker slot frees up, with the job's
    /// [`JobContext`]. An `Err` marks the job failed with the error's message.
    pub fn spawn<F, Fut, E>(&self, target: JobTarget, job: F) -> TaskResult<JobHandle>
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        self.ensure_capacity(1)?;

        let id = JobId::new();
        let info = Arc::new(RwLock::new(JobInfo::queued(id, target)));
        self.registry.insert(id, info.clone());

        let context = JobContext { info: info.clone() };
        let slots = self.slots.clone();
        let timeout = self.config.default_timeout;

        self.active.fetch_add(1, Ordering::AcqRel);
        let active = ActiveGuard(self.active.clone());

        debug!(job_id = %id, %target, "queued background job");

        let handle = tokio::spawn(async move {
            let _active = active;
            let Ok(_slot) = slots.acquire_owned().await else {
                info.write()
                    .finish(JobStatus::Failed, Some("worker slots closed".to_string()));
                return Err(TaskError::spawn_failed("worker slots closed"));
            };
            info.write().start();

            let deadline = async move {
                match timeout {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending::<()>().await,
                }
            };

            let result = tokio::select! {
                result = job(context) => result.map_err(|e| e.to_string()),
                () = deadline => {
                    let limit = timeout.unwrap_or_default();
                    warn!(job_id = %id, %target, ?limit, "job timed out");
                    info.write().finish(JobStatus::TimedOut, None);
                    return Err(TaskError::timeout(limit));
                }
            };

            match result {
                Ok(()) => {
                    info.write().finish(JobStatus::Completed, None);
                    debug!(job_id = %id, "job completed");
                    Ok(())
                }
                Err(message) => {
                    warn!(job_id = %id, %target, error = %message, "job failed");
                    info.write().finish(JobStatus::Failed, Some(message.clone()));
                    Err(TaskError::failed(message))
                }
            }
        });

        Ok(JobHandle { id, handle })
    }

    /// Drop finished jobs older than the retention period.
    fn cleanup_finished_jobs(&self) {
        let retention = self.config.history_retention;
        let now = chrono::Utc::now();

        self.registry.retain(|_, info| {
            let info = info.read();
            match (info.status.is_terminal(), info.finished_at) {
                (true, Some(finished_at)) => (now - finished_at)
                    .to_std()
                    .map_or(true, |age| age < retention),
                _ => true,
            }
        });
    }

    /// Stop accepting jobs and wait for queued and running ones, up to
    /// `timeout`.
    pub async fn shutdown(&self, timeout: Duration) {
        info!(active = self.active_count(), "shutting down job spawner");
        self.shutdown.store(true, Ordering::Release);

        let deadline = tokio::time::Instant::now() + timeout;
        while self.active_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    active = self.active_count(),
                    "shutdown timeout reached, jobs still queued or running"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        info!("job spawner shutdown complete");
    }
}

impl Default for JobSpawner {
    fn default() -> Self {
        Self::new()
    }
}
