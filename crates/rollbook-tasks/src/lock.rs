//! Mutual exclusion for grade submissions.
//!
//! Two jobs posting the same grade for the same student must not overlap.
//! They serialize on a [`LockKey`] through a [`LockService`]. Acquisition is
//! retried a bounded number of times and then fails with
//! [`LockError::Timeout`], which the job runner treats as retryable.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rollbook_core::{AssignmentId, Grade, StudentId};
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::LockError;

/// How long a grade lock is held before it expires on its own.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60);

/// Name of a lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// Key serializing submissions of one grade value for one student.
    ///
    /// The grade is part of the key, so submissions of different values are
    /// not serialized against each other. A missing grade renders empty.
    pub fn grade_update(
        tool_consumer_instance_guid: &str,
        assignment_id: AssignmentId,
        student_id: StudentId,
        grade: Option<Grade>,
    ) -> Self {
        let grade = grade.map(|g| g.to_string()).unwrap_or_default();
        Self(format!(
            "grade_updater.guid_{tool_consumer_instance_guid}.assignment_id_{assignment_id}.student_id_{student_id}.grade_{grade}"
        ))
    }

    /// The key as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A held lock. Give it back with [`LockService::release`].
#[derive(Debug)]
#[must_use = "a lock that is never released stays held until it expires"]
pub struct Lock {
    key: LockKey,
    token: Uuid,
    expires_at: Instant,
}

impl Lock {
    /// The locked key.
    pub fn key(&self) -> &LockKey {
        &self.key
    }

    /// Check if the lock has outlived its TTL.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// A lock backend.
pub trait LockService: Send + Sync {
    /// Acquire `key` for at most `ttl`, retrying while it is held elsewhere.
    fn acquire(
        &self,
        key: &LockKey,
        ttl: Duration,
    ) -> impl Future<Output = Result<Lock, LockError>> + Send;

    /// Release a lock. Releasing an expired or stolen lock is a no-op.
    fn release(&self, lock: Lock) -> impl Future<Output = ()> + Send;

    /// Check if the backend can hand out locks.
    fn is_available(&self) -> impl Future<Output = bool> + Send;
}

/// Run `f` while holding `key`. The lock is released whether `f` succeeds or not.
pub async fn with_lock<L, F, Fut, T, E>(
    locks: &L,
    key: &LockKey,
    ttl: Duration,
    f: F,
) -> Result<T, E>
where
    L: LockService,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<LockError>,
{
    let lock = locks.acquire(key, ttl).await?;
    let result = f().await;
    locks.release(lock).await;
    result
}

/// Acquisition retry settings.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Attempts before giving up with [`LockError::Timeout`].
    pub retry_count: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            retry_count: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Holder {
    token: Uuid,
    expires_at: Instant,
}

/// Process-local [`LockService`].
#[derive(Debug, Default)]
pub struct InMemoryLockService {
    locks: DashMap<LockKey, Holder>,
    config: LockConfig,
}

impl InMemoryLockService {
    /// Create a service with default retry settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a service with custom retry settings.
    pub fn with_config(config: LockConfig) -> Self {
        Self {
            locks: DashMap::new(),
            config,
        }
    }

    /// Check if `key` is currently held.
    pub fn is_locked(&self, key: &LockKey) -> bool {
        self.locks
            .get(key)
            .is_some_and(|holder| holder.expires_at > Instant::now())
    }

    fn try_acquire(&self, key: &LockKey, ttl: Duration) -> Option<Lock> {
        let now = Instant::now();
        let holder = Holder {
            token: Uuid::now_v7(),
            expires_at: now + ttl,
        };

        match self.locks.entry(key.clone()) {
            Entry::Occupied(mut held) => {
                if held.get().expires_at > now {
                    return None;
                }
                held.insert(holder);
            }
            Entry::Vacant(slot) => {
                slot.insert(holder);
            }
        }

        Some(Lock {
            key: key.clone(),
            token: holder.token,
            expires_at: holder.expires_at,
        })
    }
}

impl LockService for InMemoryLockService {
    async fn acquire(&self, key: &LockKey, ttl: Duration) -> Result<Lock, LockError> {
        let attempts = self.config.retry_count.max(1);
        for attempt in 1..=attempts {
            if let Some(lock) = self.try_acquire(key, ttl) {
                debug!(lock_key = %key, attempt, "lock acquired");
                return Ok(lock);
            }
            trace!(lock_key = %key, attempt, "lock held elsewhere");
            if attempt < attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }
        Err(LockError::timeout(key.as_str(), attempts))
    }

    async fn release(&self, lock: Lock) {
        let released = self
            .locks
            .remove_if(&lock.key, |_, holder| holder.token == lock.token)
            .is_some();
        debug!(lock_key = %lock.key, released, "lock released");
    }

    async fn is_available(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(grade: Option<f64>) -> LockKey {
        LockKey::grade_update(
            "abc123",
            AssignmentId::new(3),
            StudentId::new(2),
            grade.map(Grade::from_percent),
        )
    }

    fn quick() -> InMemoryLockService {
        InMemoryLockService::with_config(LockConfig {
            retry_count: 2,
            retry_delay: Duration::from_millis(5),
        })
    }

    #[test]
    fn test_grade_update_key_format() {
        assert_eq!(
            key(Some(76.0)).as_str(),
            "grade_updater.guid_abc123.assignment_id_3.student_id_2.grade_76.00"
        );
        assert_eq!(
            key(None).to_string(),
            "grade_updater.guid_abc123.assignment_id_3.student_id_2.grade_"
        );
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let locks = quick();
        let lock = locks.acquire(&key(Some(50.0)), DEFAULT_LOCK_TTL).await.unwrap();
        assert!(locks.is_locked(lock.key()));
        assert!(!lock.is_expired());

        locks.release(lock).await;
        assert!(!locks.is_locked(&key(Some(50.0))));
    }

    #[tokio::test]
    async fn test_contention_times_out() {
        let locks = quick();
        let _held = locks.acquire(&key(Some(50.0)), DEFAULT_LOCK_TTL).await.unwrap();

        let err = locks
            .acquire(&key(Some(50.0)), DEFAULT_LOCK_TTL)
            .await
            .unwrap_err();
        assert_eq!(err, LockError::timeout(key(Some(50.0)).as_str(), 2));

        // A different grade is a different lock.
        assert!(locks.acquire(&key(Some(60.0)), DEFAULT_LOCK_TTL).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lock_can_be_taken() {
        let locks = quick();
        let stale = locks
            .acquire(&key(None), Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(stale.is_expired());
        let fresh = locks.acquire(&key(None), DEFAULT_LOCK_TTL).await.unwrap();

        // The stale holder must not free the new holder's lock.
        locks.release(stale).await;
        assert!(locks.is_locked(fresh.key()));
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_error() {
        let locks = quick();
        let result: Result<(), LockError> = with_lock(&locks, &key(None), DEFAULT_LOCK_TTL, || async {
            Err(LockError::Unavailable("boom".into()))
        })
        .await;

        assert!(result.is_err());
        assert!(!locks.is_locked(&key(None)));
    }

    proptest! {
        #[test]
        fn prop_keys_equal_iff_inputs_equal(
            a in ("[a-z0-9]{1,8}", 1u64..50, 1u64..50, proptest::option::of(0u32..=10_000)),
            b in ("[a-z0-9]{1,8}", 1u64..50, 1u64..50, proptest::option::of(0u32..=10_000)),
        ) {
            let build = |(guid, assignment, student, hundredths): &(String, u64, u64, Option<u32>)| {
                LockKey::grade_update(
                    guid,
                    AssignmentId::new(*assignment),
                    StudentId::new(*student),
                    hundredths.map(|h| Grade::from_percent(f64::from(h) / 100.0)),
                )
            };
            prop_assert_eq!(build(&a) == build(&b), a == b);
        }
    }
}
