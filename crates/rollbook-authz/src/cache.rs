//! LMS resource caching.
//!
//! Caches LMS payloads fetched during a session so that authorizing a
//! resource and then building its domain object costs one remote call.
//! Failed fetches are never cached.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rollbook_core::records::{AccountRecord, CourseRecord, SectionRecord};
use rollbook_core::LmsResult;
use tracing::trace;

/// Configuration for the resource cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache.
    pub max_entries: usize,
    /// Time-to-live for cached payloads.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            ttl: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl CacheConfig {
    /// Create a production cache configuration.
    pub fn production() -> Self {
        Self {
            max_entries: 512,
            ttl: Duration::from_secs(60), // 1 minute
        }
    }

    /// Create a development cache configuration.
    pub fn development() -> Self {
        Self {
            max_entries: 64,
            ttl: Duration::from_secs(30),
        }
    }

    /// Disable caching.
    pub fn disabled() -> Self {
        Self {
            max_entries: 0,
            ttl: Duration::ZERO,
        }
    }
}

/// The kinds of payload held by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheBucket {
    /// A single course, keyed by course id.
    Course,
    /// A course's section listing, keyed by course id.
    Sections,
    /// A single section, keyed by section id.
    Section,
    /// An account, keyed by account id.
    Account,
}

impl CacheBucket {
    /// Returns the bucket name used in logs and metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Course => "course",
            Self::Sections => "sections",
            Self::Section => "section",
            Self::Account => "account",
        }
    }
}

/// A cached payload.
#[derive(Debug, Clone)]
pub enum CachedValue {
    /// A course.
    Course(CourseRecord),
    /// A course's sections.
    Sections(Vec<SectionRecord>),
    /// A section.
    Section(SectionRecord),
    /// An account.
    Account(AccountRecord),
}

/// A payload type that can live in the cache.
pub trait Cacheable: Clone + Sized {
    /// Bucket this payload is stored in.
    const BUCKET: CacheBucket;

    /// Wrap into a cached value.
    fn into_cached(self) -> CachedValue;

    /// Unwrap from a cached value of the right bucket.
    fn from_cached(value: &CachedValue) -> Option<Self>;
}

macro_rules! cacheable {
    ($ty:ty, $variant:ident, $bucket:ident) => {
        impl Cacheable for $ty {
            const BUCKET: CacheBucket = CacheBucket::$bucket;

            fn into_cached(self) -> CachedValue {
                CachedValue::$variant(self)
            }

            fn from_cached(value: &CachedValue) -> Option<Self> {
                match value {
                    CachedValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }
        }
    };
}

cacheable!(CourseRecord, Course, Course);
cacheable!(Vec<SectionRecord>, Sections, Sections);
cacheable!(SectionRecord, Section, Section);
cacheable!(AccountRecord, Account, Account);

/// Cache key: bucket plus LMS id.
type CacheKey = (CacheBucket, u64);

/// Cached payload entry.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// The cached payload.
    value: CachedValue,
    /// When the entry was created.
    created_at: Instant,
}

impl CacheEntry {
    fn new(value: CachedValue) -> Self {
        Self {
            value,
            created_at: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() > ttl
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub size: usize,
    /// Number of evictions due to capacity.
    pub evictions: u64,
}

/// Cache of LMS payloads.
#[derive(Debug)]
pub struct ResourceCache {
    /// Cache configuration.
    config: CacheConfig,
    /// Cached payloads.
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    /// Cache hit counter.
    hits: AtomicU64,
    /// Cache miss counter.
    misses: AtomicU64,
    /// Eviction counter.
    evictions: AtomicU64,
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResourceCache {
    /// Create a new resource cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get a cached payload.
    pub fn get<T: Cacheable>(&self, id: u64) -> Option<T> {
        let found = if self.config.max_entries == 0 {
            None
        } else {
            let entries = self.entries.read();
            entries
                .get(&(T::BUCKET, id))
                .filter(|entry| !entry.is_expired(self.config.ttl))
                .and_then(|entry| T::from_cached(&entry.value))
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        rollbook_telemetry::metrics::record_cache_lookup(T::BUCKET.as_str(), found.is_some());
        found
    }

    /// Insert a payload into the cache.
    pub fn insert<T: Cacheable>(&self, id: u64, value: T) {
        if self.config.max_entries == 0 {
            return;
        }

        let mut entries = self.entries.write();

        // Evict expired entries if we're at capacity
        if entries.len() >= self.config.max_entries {
            self.evict_expired(&mut entries);
        }

        // If still at capacity, evict oldest entries
        while entries.len() >= self.config.max_entries {
            if let Some(oldest_key) = Self::find_oldest(&entries) {
                entries.remove(&oldest_key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            } else {
                break;
            }
        }

        entries.insert((T::BUCKET, id), CacheEntry::new(value.into_cached()));
    }

    /// Return the cached payload, or run `fetch` and cache its result.
    ///
    /// Errors from `fetch` are returned unchanged and nothing is cached.
    pub async fn fetch<T, F, Fut>(&self, id: u64, fetch: F) -> LmsResult<T>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = LmsResult<T>>,
    {
        if let Some(cached) = self.get::<T>(id) {
            trace!(bucket = T::BUCKET.as_str(), id, "resource cache hit");
            return Ok(cached);
        }

        let value = fetch().await?;
        self.insert(id, value.clone());
        Ok(value)
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size: entries.len(),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn evict_expired(&self, entries: &mut HashMap<CacheKey, CacheEntry>) {
        let ttl = self.config.ttl;
        let before = entries.len();
        entries.retain(|_, v| !v.is_expired(ttl));
        let evicted = before - entries.len();
        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        }
    }

    fn find_oldest(entries: &HashMap<CacheKey, CacheEntry>) -> Option<CacheKey> {
        entries
            .iter()
            .min_by_key(|(_, v)| v.created_at)
            .map(|(k, _)| *k)
    }
}
