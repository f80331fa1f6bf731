//! Per-client response caches
//!
//! Two never-expiring caches, owned by one client instance:
//! line details keyed by `(line, direction)` and confirmed stop ids.
//! Upstream data for both is static for the life of a process, so entries are
//! only ever added. Negative existence results are not stored.

use std::sync::atomic::{AtomicU64, Ordering};

use moka::future::Cache;
use tracing::debug;

use crate::models::{LineStops, StopId};

/// Key for the line cache; an empty direction is stored as `None`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineKey {
    line: String,
    direction: Option<String>,
}

impl LineKey {
    /// Build a key from a line code and an optional direction token
    #[must_use]
    pub fn new(line: &str, direction: Option<&str>) -> Self {
        Self {
            line: line.to_string(),
            direction: direction.filter(|d| !d.is_empty()).map(str::to_string),
        }
    }
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups served from memory
    pub hits: u64,
    /// Lookups that fell through to the network
    pub misses: u64,
}

/// Caches for line details and stop existence
pub struct EmtCache {
    lines: Cache<LineKey, LineStops>,
    stops: Cache<StopId, ()>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for EmtCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmtCache")
            .field("lines", &self.lines.entry_count())
            .field("stops", &self.stops.entry_count())
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}

impl EmtCache {
    /// Create empty caches.
    ///
    /// Without `max_entries` nothing is ever evicted. With a cap, moka may drop
    /// entries, which are then fetched again on demand.
    #[must_use]
    pub fn new(max_entries: Option<u64>) -> Self {
        let (mut lines, mut stops) = (Cache::builder(), Cache::builder());
        if let Some(max) = max_entries {
            lines = lines.max_capacity(max);
            stops = stops.max_capacity(max);
        }
        Self {
            lines: lines.build(),
            stops: stops.build(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached line details, if any
    pub async fn line(&self, key: &LineKey) -> Option<LineStops> {
        let found = self.lines.get(key).await;
        self.record(found.is_some());
        if found.is_some() {
            debug!(?key, "Line cache hit");
        }
        found
    }

    /// Store line details
    pub async fn insert_line(&self, key: LineKey, value: LineStops) {
        self.lines.insert(key, value).await;
    }

    /// Whether the stop has already been confirmed to exist
    pub async fn stop_known(&self, stop: StopId) -> bool {
        let known = self.stops.get(&stop).await.is_some();
        self.record(known);
        if known {
            debug!(%stop, "Stop existence cache hit");
        }
        known
    }

    /// Remember a stop as existing
    pub async fn insert_stop(&self, stop: StopId) {
        self.stops.insert(stop, ()).await;
    }

    /// Current hit/miss counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn record(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

impl Default for EmtCache {
    fn default() -> Self {
        Self::new(None)
    }
}
