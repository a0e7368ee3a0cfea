//! Volume location cache.
//!
//! Remembers which volume server serves a file id. Placement never changes
//! after assignment, so a stale entry is still correct; the freshness window
//! only bounds how long a moved or re-replicated volume can be missed.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Time source used to judge entry freshness.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to. Used by tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed_ms: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.elapsed_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
    }
}

#[derive(Clone, Debug)]
struct CachedLocation {
    node: String,
    cached_at: Instant,
}

/// File id -> volume server address, with a freshness window.
#[derive(Clone)]
pub struct LocationCache {
    entries: moka::future::Cache<String, CachedLocation>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl LocationCache {
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        Self::with_clock(ttl, capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, capacity: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: moka::future::Cache::builder()
                .max_capacity(capacity)
                .build(),
            clock,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached node if the entry is younger than the freshness window.
    pub async fn get(&self, fid: &str) -> Option<String> {
        let entry = self.entries.get(fid).await?;
        if self.clock.now().saturating_duration_since(entry.cached_at) < self.ttl {
            Some(entry.node)
        } else {
            self.entries.invalidate(fid).await;
            None
        }
    }

    pub async fn put(&self, fid: &str, node: impl Into<String>) {
        let entry = CachedLocation {
            node: node.into(),
            cached_at: self.clock.now(),
        };
        self.entries.insert(fid.to_string(), entry).await;
    }

    pub async fn invalidate(&self, fid: &str) {
        self.entries.invalidate(fid).await;
    }
}
