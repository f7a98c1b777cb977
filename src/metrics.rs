//! Metrics Module
//!
//! Global and per-namespace performance counters, plus the snapshot views
//! returned by the facade. Counter updates and snapshot reads share the
//! same mutexes, so a snapshot is internally consistent.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;

// == Counters ==
/// The counter set kept globally and mirrored per namespace.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Counters {
    /// Successful reads
    pub hits: u64,
    /// Reads of absent or expired keys
    pub misses: u64,
    /// Entries removed by LRU eviction
    pub evictions: u64,
    /// Writes dropped by the value-size limit or the hard memory cap
    pub rejected: u64,
}

impl Counters {
    /// hits / (hits + misses), or 0.0 before any read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Metrics ==
#[derive(Default)]
pub struct Metrics {
    global: Mutex<Counters>,
    namespaces: Mutex<HashMap<String, Counters>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, namespace: Option<&str>) {
        self.bump(namespace, |c| c.hits += 1);
    }

    pub fn record_miss(&self, namespace: Option<&str>) {
        self.bump(namespace, |c| c.misses += 1);
    }

    /// Records `count` LRU evictions, charged to the namespace the evicted
    /// keys belonged to.
    pub fn record_evictions(&self, namespace: Option<&str>, count: u64) {
        if count == 0 {
            return;
        }
        self.bump(namespace, |c| c.evictions += count);
    }

    pub fn record_rejected(&self, namespace: Option<&str>) {
        self.bump(namespace, |c| c.rejected += 1);
    }

    fn bump(&self, namespace: Option<&str>, apply: impl Fn(&mut Counters)) {
        apply(&mut self.global.lock());
        if let Some(ns) = namespace {
            let mut namespaces = self.namespaces.lock();
            apply(namespaces.entry(ns.to_string()).or_default());
        }
    }

    /// Consistent copy of the global counters.
    pub fn snapshot(&self) -> Counters {
        *self.global.lock()
    }

    /// Counters for one namespace; zeroes when it was never touched.
    pub fn namespace_snapshot(&self, namespace: &str) -> Counters {
        self.namespaces
            .lock()
            .get(namespace)
            .copied()
            .unwrap_or_default()
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        *self.global.lock() = Counters::default();
        self.namespaces.lock().clear();
    }
}

// == Snapshot Views ==
/// Byte and key counts for one shard at snapshot time.
#[derive(Debug, Clone, Serialize)]
pub struct ShardMetrics {
    pub index: usize,
    pub keys: usize,
    pub bytes: u64,
    pub lru_len: usize,
}

/// One entry of the least-touched projection.
#[derive(Debug, Clone, Serialize)]
pub struct KeyTouches {
    pub key: String,
    pub touches: u64,
}

/// Full observability snapshot returned by `Cache::metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    #[serde(flatten)]
    pub counters: Counters,
    pub hit_rate: f64,
    pub total_memory: u64,
    pub shards: Vec<ShardMetrics>,
    pub least_touched: Vec<KeyTouches>,
}

/// Per-namespace view returned by `Cache::namespace_metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceMetrics {
    pub namespace: String,
    #[serde(flatten)]
    pub counters: Counters,
    pub hit_rate: f64,
}
