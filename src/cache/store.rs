//! Cache Store Module
//!
//! The public cache facade. Routes effective keys to shards, enforces the
//! value-size and memory policies, and ties together TTL handling,
//! metrics, single-flight fetches, the sweeper, and snapshots.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::accountant::MemoryAccountant;
use crate::cache::entry::{effective_ttl, now_ms, CacheEntry};
use crate::cache::shard::{entry_cost, Shard};
use crate::codec::Codec;
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::metrics::{
    KeyTouches, Metrics, MetricsSnapshot, NamespaceMetrics, ShardMetrics,
};
use crate::namespace;
use crate::persistence;
use crate::singleflight::SingleFlight;
use crate::tasks::sweeper::{SweepState, Sweeper};

/// Number of keys included in the least-touched projection of `metrics()`.
const LEAST_TOUCHED_SAMPLE: usize = 10;

// == Fetch Options ==
/// Options for [`Cache::fetch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    /// TTL for a value written on miss; resolved like any write
    pub ttl: Option<u64>,
    /// Recompute even when the key is present
    pub force: bool,
    /// De-duplicate concurrent misses on the same effective key
    pub singleflight: bool,
}

// == Entry Info ==
/// Metadata view returned by [`Cache::inspect`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct EntryInfo {
    /// Effective key
    pub key: String,
    pub shard_index: usize,
    pub expires_at: Option<u64>,
    pub created_at: u64,
    /// Stored payload size in bytes (after compression, when on)
    pub size_bytes: u64,
    pub compressed: bool,
}

pub(crate) struct CacheInner {
    pub(crate) shards: RwLock<Vec<Mutex<Shard>>>,
    pub(crate) config: RwLock<Config>,
    pub(crate) accountant: MemoryAccountant,
    pub(crate) metrics: Metrics,
    flights: SingleFlight,
    sweeper: Sweeper,
}

impl CacheInner {
    /// One sweep over every shard, taking each shard mutex in turn.
    pub(crate) fn sweep_pass(&self) -> usize {
        let now = now_ms();
        let shards = self.shards.read();
        let mut removed = 0;
        for shard in shards.iter() {
            let (count, freed) = shard.lock().purge_expired(now);
            removed += count;
            self.accountant.sub(freed);
        }
        removed
    }
}

// == Cache ==
/// Sharded, thread-safe cache with LRU eviction, TTL expiration, memory
/// accounting, and namespacing. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

enum Lookup {
    Missing,
    Expired,
    Live(Vec<u8>, bool),
}

impl Cache {
    // == Constructor ==
    /// Builds a cache from a validated configuration, loads a snapshot when
    /// persistence is enabled, and starts the sweeper when an interval is
    /// configured.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let shard_count = config.shard_count;
        let sweep_interval = config.sweep_interval;
        let persistence_enabled = config.persistence.enabled;

        let cache = Self {
            inner: Arc::new(CacheInner {
                shards: RwLock::new(build_shards(shard_count)),
                config: RwLock::new(config),
                accountant: MemoryAccountant::new(),
                metrics: Metrics::new(),
                flights: SingleFlight::new(),
                sweeper: Sweeper::new(),
            }),
        };

        if persistence_enabled {
            match cache.load_snapshot() {
                Ok(0) => {}
                Ok(restored) => info!(restored, "snapshot loaded"),
                Err(e) => warn!(error = %e, "snapshot load failed, starting cold"),
            }
        }
        if sweep_interval.is_some() {
            cache.start_sweeper();
        }
        Ok(cache)
    }

    fn codec(&self) -> Codec {
        let config = self.inner.config.read();
        Codec::new(config.serializer, config.compress)
    }

    // == Read ==
    /// Returns the value stored under the key, promoting it to most
    /// recently used and counting the touch. Expired entries are purged
    /// and read as a miss. A payload that no longer decodes is removed and
    /// surfaces as [`CacheError::Corrupt`].
    pub fn read<T: DeserializeOwned>(&self, key: &str, ns: Option<&str>) -> Result<Option<T>> {
        let (effective, namespace) = namespace::resolve(key, ns)?;
        let now = now_ms();

        let found = {
            let shards = self.inner.shards.read();
            let idx = shard_index_of(&effective, shards.len());
            let mut shard = shards[idx].lock();

            let lookup = match shard.get_mut(&effective) {
                None => Lookup::Missing,
                Some(entry) if entry.is_expired(now) => Lookup::Expired,
                Some(entry) => {
                    entry.touches += 1;
                    Lookup::Live(entry.payload.clone(), entry.compressed)
                }
            };
            if let Lookup::Expired = lookup {
                if let Some(entry) = shard.remove(&effective) {
                    self.inner
                        .accountant
                        .sub(entry_cost(&effective, entry.payload.len()));
                }
            }
            if let Lookup::Live(..) = lookup {
                shard.promote(&effective);
            }
            lookup
        };

        let (payload, compressed) = match found {
            Lookup::Live(payload, compressed) => {
                self.inner.metrics.record_hit(namespace.as_deref());
                (payload, compressed)
            }
            Lookup::Missing | Lookup::Expired => {
                self.inner.metrics.record_miss(namespace.as_deref());
                return Ok(None);
            }
        };

        // Decode outside the shard lock
        match self.codec().decode::<T>(&payload, compressed) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                self.remove_entry(&effective);
                Err(CacheError::Corrupt {
                    key: effective,
                    reason: e.to_string(),
                })
            }
        }
    }

    // == Write ==
    /// Stores a value under the key, replacing any existing entry.
    ///
    /// Oversized values and writes past the hard memory cap are dropped
    /// silently (the `rejected` counter records them); the write may evict
    /// least-recently-used entries to stay under the per-shard threshold.
    pub fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
        ns: Option<&str>,
    ) -> Result<()> {
        let (effective, namespace) = namespace::resolve(key, ns)?;
        let (payload, compressed, ttl) = {
            let config = self.inner.config.read();
            let codec = Codec::new(config.serializer, config.compress);
            let payload = codec.encode(value)?;
            let ttl = effective_ttl(ttl, config.default_ttl, config.max_ttl);
            (payload, codec.compression_enabled(), ttl)
        };
        self.store_encoded(effective, namespace.as_deref(), payload, ttl, compressed, false)
    }

    // == Replace ==
    /// Like [`Cache::write`], but a no-op when the key is absent.
    pub fn replace<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
        ns: Option<&str>,
    ) -> Result<()> {
        let (effective, namespace) = namespace::resolve(key, ns)?;
        let (payload, compressed, ttl) = {
            let config = self.inner.config.read();
            let codec = Codec::new(config.serializer, config.compress);
            let payload = codec.encode(value)?;
            let ttl = effective_ttl(ttl, config.default_ttl, config.max_ttl);
            (payload, codec.compression_enabled(), ttl)
        };
        self.store_encoded(effective, namespace.as_deref(), payload, ttl, compressed, true)
    }

    // == Update ==
    /// Rewrites an existing entry through `f`, which runs with no cache
    /// lock held. A key that is absent (or vanishes while `f` runs) makes
    /// the call a no-op. Capacity rejection leaves the prior value intact.
    /// The entry keeps its touch count and its original TTL duration,
    /// restarted from now.
    pub fn update<T, F>(&self, key: &str, ns: Option<&str>, f: F) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(T) -> T,
    {
        let (effective, namespace) = namespace::resolve(key, ns)?;
        let now = now_ms();

        let current = {
            let shards = self.inner.shards.read();
            let idx = shard_index_of(&effective, shards.len());
            let mut shard = shards[idx].lock();
            match shard.get(&effective) {
                None => return Ok(()),
                Some(entry) if entry.is_expired(now) => {
                    if let Some(entry) = shard.remove(&effective) {
                        self.inner
                            .accountant
                            .sub(entry_cost(&effective, entry.payload.len()));
                    }
                    return Ok(());
                }
                Some(entry) => (entry.payload.clone(), entry.compressed),
            }
        };

        let codec = self.codec();
        let value = match codec.decode::<T>(&current.0, current.1) {
            Ok(value) => value,
            Err(e) => {
                self.remove_entry(&effective);
                return Err(CacheError::Corrupt {
                    key: effective,
                    reason: e.to_string(),
                });
            }
        };

        // User code runs without any cache lock held
        let next = f(value);
        let payload = codec.encode(&next)?;

        let (max_value_bytes, hard_cap, threshold) = {
            let config = self.inner.config.read();
            (
                config.max_value_bytes,
                config.hard_memory_limit.then_some(config.max_bytes),
                config.per_shard_threshold(),
            )
        };
        if let Some(max_value) = max_value_bytes {
            if payload.len() as u64 > max_value {
                self.inner.metrics.record_rejected(namespace.as_deref());
                return Ok(());
            }
        }

        let new_cost = entry_cost(&effective, payload.len());
        let evicted = {
            let shards = self.inner.shards.read();
            let idx = shard_index_of(&effective, shards.len());
            let mut shard = shards[idx].lock();

            // Re-verify: the key may have been deleted or replaced while
            // the block ran
            let old_cost = match shard.get(&effective) {
                Some(entry) if !entry.is_expired(now_ms()) => {
                    entry_cost(&effective, entry.payload.len())
                }
                _ => return Ok(()),
            };
            let cap = hard_cap.unwrap_or(u64::MAX);
            if !self.inner.accountant.try_reserve(new_cost, old_cost, cap) {
                self.inner.metrics.record_rejected(namespace.as_deref());
                return Ok(());
            }

            let prior = match shard.remove(&effective) {
                Some(prior) => prior,
                None => return Ok(()),
            };
            let expires_at = prior.original_duration_ms().map(|d| now_ms() + d);
            let entry = CacheEntry {
                payload,
                created_at: now_ms(),
                expires_at,
                touches: prior.touches,
                compressed: codec.compression_enabled(),
                node: usize::MAX,
            };
            shard.insert(effective.clone(), entry);

            // The rewritten key sits at MRU, so eviction can reach every
            // key but it
            let (evicted, freed) = shard.fill_to_fit(0, threshold, Some(&effective));
            self.inner.accountant.sub(freed);
            evicted
        };
        self.record_eviction_keys(&evicted);
        Ok(())
    }

    // == Delete ==
    /// Removes the entry under the key. Absent keys are a no-op.
    pub fn delete(&self, key: &str, ns: Option<&str>) -> Result<()> {
        let (effective, _) = namespace::resolve(key, ns)?;
        self.remove_entry(&effective);
        Ok(())
    }

    /// Alias of [`Cache::delete`].
    pub fn clear(&self, key: &str, ns: Option<&str>) -> Result<()> {
        self.delete(key, ns)
    }

    // == Exists ==
    /// Whether a live entry is stored under the key. Expired entries are
    /// purged; neither recency nor counters change.
    pub fn exists(&self, key: &str, ns: Option<&str>) -> Result<bool> {
        let (effective, _) = namespace::resolve(key, ns)?;
        let now = now_ms();
        let shards = self.inner.shards.read();
        let idx = shard_index_of(&effective, shards.len());
        let mut shard = shards[idx].lock();
        match shard.get(&effective) {
            None => Ok(false),
            Some(entry) if entry.is_expired(now) => {
                if let Some(entry) = shard.remove(&effective) {
                    self.inner
                        .accountant
                        .sub(entry_cost(&effective, entry.payload.len()));
                }
                Ok(false)
            }
            Some(_) => Ok(true),
        }
    }

    // == Fetch ==
    /// Reads the key, or computes it with `f` on a miss (or always, with
    /// `force`), writes the result, and returns it. With `singleflight`,
    /// concurrent callers on the same effective key wait for one winner
    /// and read the value it wrote; `f` never runs under a cache lock.
    pub fn fetch<T, F>(
        &self,
        key: &str,
        options: FetchOptions,
        ns: Option<&str>,
        f: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let (effective, namespace) = namespace::resolve(key, ns)?;
        if options.singleflight {
            self.inner
                .flights
                .with_lock(&effective, || {
                    self.fetch_inner(key, &options, namespace.as_deref(), f)
                })
        } else {
            self.fetch_inner(key, &options, namespace.as_deref(), f)
        }
    }

    fn fetch_inner<T, F>(&self, key: &str, options: &FetchOptions, ns: Option<&str>, f: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        if !options.force {
            if let Some(value) = self.read(key, ns)? {
                return Ok(value);
            }
        }
        let value = f();
        self.write(key, &value, options.ttl, ns)?;
        Ok(value)
    }

    // == Inspect ==
    /// Metadata for the entry under the key, without promoting or touching
    /// it. Expired entries are purged and report as absent.
    pub fn inspect(&self, key: &str, ns: Option<&str>) -> Result<Option<EntryInfo>> {
        let (effective, _) = namespace::resolve(key, ns)?;
        let now = now_ms();
        let shards = self.inner.shards.read();
        let idx = shard_index_of(&effective, shards.len());
        let mut shard = shards[idx].lock();
        match shard.get(&effective) {
            None => Ok(None),
            Some(entry) if entry.is_expired(now) => {
                if let Some(entry) = shard.remove(&effective) {
                    self.inner
                        .accountant
                        .sub(entry_cost(&effective, entry.payload.len()));
                }
                Ok(None)
            }
            Some(entry) => Ok(Some(EntryInfo {
                key: effective.clone(),
                shard_index: idx,
                expires_at: entry.expires_at,
                created_at: entry.created_at,
                size_bytes: entry.payload.len() as u64,
                compressed: entry.compressed,
            })),
        }
    }

    // == Keys ==
    /// Raw keys of every live entry in the namespace, prefix stripped,
    /// unordered.
    pub fn keys(&self, ns: &str) -> Result<Vec<String>> {
        namespace::validate(ns)?;
        let prefix = namespace::prefix(ns);
        let now = now_ms();
        let mut out = Vec::new();
        let shards = self.inner.shards.read();
        for shard in shards.iter() {
            let shard = shard.lock();
            for (key, entry) in shard.entries() {
                if key.starts_with(&prefix) && !entry.is_expired(now) {
                    out.push(key[prefix.len()..].to_string());
                }
            }
        }
        Ok(out)
    }

    // == Clear Namespace ==
    /// Deletes every key in the namespace, one shard at a time.
    pub fn clear_namespace(&self, ns: &str) -> Result<()> {
        namespace::validate(ns)?;
        let prefix = namespace::prefix(ns);
        let shards = self.inner.shards.read();
        let mut removed = 0;
        for shard in shards.iter() {
            let (count, freed) = shard.lock().remove_prefix(&prefix);
            removed += count;
            self.inner.accountant.sub(freed);
        }
        debug!(namespace = ns, removed, "namespace cleared");
        Ok(())
    }

    // == Least Touched ==
    /// Up to `n` live keys ordered by ascending touch count; ties break by
    /// key for a stable order.
    pub fn least_touched(&self, n: usize) -> Vec<(String, u64)> {
        let now = now_ms();
        let mut touched: Vec<(String, u64)> = Vec::new();
        let shards = self.inner.shards.read();
        for shard in shards.iter() {
            let shard = shard.lock();
            for (key, entry) in shard.entries() {
                if !entry.is_expired(now) {
                    touched.push((key.clone(), entry.touches));
                }
            }
        }
        touched.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        touched.truncate(n);
        touched
    }

    // == All Keys ==
    /// Every live effective key, unordered. Diagnostics only.
    pub fn all_keys(&self) -> Vec<String> {
        let now = now_ms();
        let mut out = Vec::new();
        let shards = self.inner.shards.read();
        for shard in shards.iter() {
            let shard = shard.lock();
            for (key, entry) in shard.entries() {
                if !entry.is_expired(now) {
                    out.push(key.clone());
                }
            }
        }
        out
    }

    // == Purge Expired ==
    /// Removes every expired entry, as one sweeper pass would.
    pub fn purge_expired(&self) -> usize {
        self.inner.sweep_pass()
    }

    // == Memory ==
    /// Current live bytes across all shards.
    pub fn total_bytes(&self) -> u64 {
        self.inner.accountant.total()
    }

    /// Configured soft/hard memory cap.
    pub fn max_bytes(&self) -> u64 {
        self.inner.config.read().max_bytes
    }

    // == Metrics ==
    /// Counter snapshot plus memory and per-shard views.
    pub fn metrics(&self) -> MetricsSnapshot {
        let counters = self.inner.metrics.snapshot();
        let shards = self.inner.shards.read();
        let shard_metrics: Vec<ShardMetrics> = shards
            .iter()
            .enumerate()
            .map(|(index, shard)| {
                let shard = shard.lock();
                ShardMetrics {
                    index,
                    keys: shard.len(),
                    bytes: shard.bytes(),
                    lru_len: shard.lru_len(),
                }
            })
            .collect();
        drop(shards);

        let least_touched = self
            .least_touched(LEAST_TOUCHED_SAMPLE)
            .into_iter()
            .map(|(key, touches)| KeyTouches { key, touches })
            .collect();

        MetricsSnapshot {
            hit_rate: counters.hit_rate(),
            counters,
            total_memory: self.inner.accountant.total(),
            shards: shard_metrics,
            least_touched,
        }
    }

    /// Counters for one namespace.
    pub fn namespace_metrics(&self, ns: &str) -> Result<NamespaceMetrics> {
        namespace::validate(ns)?;
        let counters = self.inner.metrics.namespace_snapshot(ns);
        Ok(NamespaceMetrics {
            namespace: ns.to_string(),
            hit_rate: counters.hit_rate(),
            counters,
        })
    }

    // == Reset ==
    /// Returns the cache to the freshly configured state: stops the
    /// sweeper, rebuilds every shard empty, and zeroes all counters.
    pub fn reset(&self) {
        self.stop_sweeper();
        let shard_count = self.inner.config.read().shard_count;
        let mut shards = self.inner.shards.write();
        *shards = build_shards(shard_count);
        drop(shards);
        self.inner.accountant.reset();
        self.inner.metrics.reset();
        info!("cache reset");
    }

    // == Reconfigure ==
    /// Validates and applies a new configuration. The serializer is fixed
    /// for the cache lifetime; a shard-count change rebuilds the cache
    /// empty. Other fields apply live without rewriting existing entries.
    pub fn reconfigure(&self, config: Config) -> Result<()> {
        config.validate()?;
        let (shards_changed, sweep_changed) = {
            let current = self.inner.config.read();
            if config.serializer != current.serializer {
                return Err(CacheError::InvalidConfig(
                    "serializer cannot change for the lifetime of a cache".to_string(),
                ));
            }
            (
                config.shard_count != current.shard_count,
                config.sweep_interval != current.sweep_interval,
            )
        };
        let sweep_interval = config.sweep_interval;
        *self.inner.config.write() = config;

        if shards_changed {
            self.reset();
        }
        if shards_changed || sweep_changed {
            self.stop_sweeper();
            if sweep_interval.is_some() {
                self.start_sweeper();
            }
        }
        Ok(())
    }

    // == Sweeper Lifecycle ==
    /// Starts the background TTL sweeper; a no-op while it is running or
    /// when no interval is configured.
    pub fn start_sweeper(&self) {
        if let Some(secs) = self.inner.config.read().sweep_interval {
            self.inner
                .sweeper
                .start(Duration::from_secs(secs), Arc::downgrade(&self.inner));
        }
    }

    /// Signals the sweeper to stop and joins it.
    pub fn stop_sweeper(&self) {
        self.inner.sweeper.stop();
    }

    pub fn sweeper_state(&self) -> SweepState {
        self.inner.sweeper.state()
    }

    // == Snapshots ==
    /// Writes a warm-boot image of all unexpired entries.
    pub fn save_snapshot(&self) -> Result<()> {
        persistence::save(self)
    }

    /// Restores entries from the snapshot file; a no-op when it is absent.
    /// Returns the number of restored entries.
    pub fn load_snapshot(&self) -> Result<usize> {
        persistence::load(self)
    }

    // == Shutdown ==
    /// Stops the sweeper and, when persistence is enabled, saves a final
    /// snapshot. Failures are logged and swallowed.
    pub fn shutdown(&self) {
        self.stop_sweeper();
        if self.inner.config.read().persistence.enabled {
            if let Err(e) = self.save_snapshot() {
                warn!(error = %e, "snapshot save failed during shutdown");
            }
        }
    }

    pub(crate) fn inner(&self) -> &CacheInner {
        &self.inner
    }

    // == Internal ==
    /// Stores an already-encoded payload under its effective key, applying
    /// the value-size limit, the hard cap, and inline eviction. This is the
    /// single replace path, so the byte counters stay exact.
    pub(crate) fn store_encoded(
        &self,
        effective: String,
        namespace: Option<&str>,
        payload: Vec<u8>,
        ttl: Option<u64>,
        compressed: bool,
        require_present: bool,
    ) -> Result<()> {
        let (max_value_bytes, hard_cap, threshold) = {
            let config = self.inner.config.read();
            (
                config.max_value_bytes,
                config.hard_memory_limit.then_some(config.max_bytes),
                config.per_shard_threshold(),
            )
        };
        if let Some(max_value) = max_value_bytes {
            if payload.len() as u64 > max_value {
                self.inner.metrics.record_rejected(namespace);
                debug!(key = %effective, size = payload.len(), "value over size limit, dropped");
                return Ok(());
            }
        }

        let new_cost = entry_cost(&effective, payload.len());
        let evicted = {
            let shards = self.inner.shards.read();
            let idx = shard_index_of(&effective, shards.len());
            let mut shard = shards[idx].lock();

            if require_present {
                let live = matches!(
                    shard.get(&effective),
                    Some(entry) if !entry.is_expired(now_ms())
                );
                if !live {
                    return Ok(());
                }
            }

            let old_cost = shard
                .get(&effective)
                .map(|entry| entry_cost(&effective, entry.payload.len()))
                .unwrap_or(0);
            let cap = hard_cap.unwrap_or(u64::MAX);
            if !self.inner.accountant.try_reserve(new_cost, old_cost, cap) {
                self.inner.metrics.record_rejected(namespace);
                debug!(key = %effective, "write rejected by hard memory limit");
                return Ok(());
            }

            let prior = shard.remove(&effective);
            let (evicted, freed) = shard.fill_to_fit(new_cost, threshold, None);
            self.inner.accountant.sub(freed);

            let mut entry = CacheEntry::new(payload, ttl, compressed);
            if let Some(prior) = &prior {
                entry.touches = prior.touches;
            }
            shard.insert(effective, entry);
            evicted
        };
        self.record_eviction_keys(&evicted);
        Ok(())
    }

    fn remove_entry(&self, effective: &str) {
        let shards = self.inner.shards.read();
        let idx = shard_index_of(effective, shards.len());
        let mut shard = shards[idx].lock();
        if let Some(entry) = shard.remove(effective) {
            self.inner
                .accountant
                .sub(entry_cost(effective, entry.payload.len()));
        }
    }

    /// Charges evictions to the namespaces the evicted keys belonged to.
    fn record_eviction_keys(&self, evicted: &[String]) {
        for key in evicted {
            let ns = key.split_once(namespace::NAMESPACE_DELIMITER).map(|(ns, _)| ns);
            self.inner.metrics.record_evictions(ns, 1);
        }
    }
}

fn build_shards(count: usize) -> Vec<Mutex<Shard>> {
    (0..count).map(|_| Mutex::new(Shard::new())).collect()
}

// == Router ==
/// Deterministic key→shard mapping for this process run.
fn shard_index_of(key: &str, shard_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % shard_count as u64) as usize
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn small_cache() -> Cache {
        Cache::new(Config {
            shard_count: 1,
            sweep_interval: None,
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn test_write_and_read() {
        let cache = small_cache();
        cache.write("k", &json!({"a": 1}), None, None).unwrap();
        let value: Option<Value> = cache.read("k", None).unwrap();
        assert_eq!(value, Some(json!({"a": 1})));
    }

    #[test]
    fn test_read_missing_counts_miss() {
        let cache = small_cache();
        let value: Option<Value> = cache.read("nope", None).unwrap();
        assert!(value.is_none());
        assert_eq!(cache.metrics().counters.misses, 1);
    }

    #[test]
    fn test_write_replaces_and_preserves_touches() {
        let cache = small_cache();
        cache.write("k", &json!(1), None, None).unwrap();
        let _: Option<Value> = cache.read("k", None).unwrap();
        let _: Option<Value> = cache.read("k", None).unwrap();
        cache.write("k", &json!(2), None, None).unwrap();

        let info = cache.inspect("k", None).unwrap().unwrap();
        assert_eq!(info.key, "k");
        let touched = cache.least_touched(1);
        assert_eq!(touched[0], ("k".to_string(), 2));
        let value: Option<Value> = cache.read("k", None).unwrap();
        assert_eq!(value, Some(json!(2)));
    }

    #[test]
    fn test_delete() {
        let cache = small_cache();
        cache.write("k", &json!(1), None, None).unwrap();
        cache.delete("k", None).unwrap();
        let value: Option<Value> = cache.read("k", None).unwrap();
        assert!(value.is_none());
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn test_replace_requires_presence() {
        let cache = small_cache();
        cache.replace("absent", &json!(1), None, None).unwrap();
        assert!(!cache.exists("absent", None).unwrap());

        cache.write("present", &json!(1), None, None).unwrap();
        cache.replace("present", &json!(2), None, None).unwrap();
        let value: Option<Value> = cache.read("present", None).unwrap();
        assert_eq!(value, Some(json!(2)));
    }

    #[test]
    fn test_update_applies_block_outside_lock() {
        let cache = small_cache();
        cache.write("n", &json!(10), None, None).unwrap();
        cache
            .update("n", None, |v: Value| json!(v.as_i64().unwrap() + 5))
            .unwrap();
        let value: Option<Value> = cache.read("n", None).unwrap();
        assert_eq!(value, Some(json!(15)));
    }

    #[test]
    fn test_update_absent_is_noop() {
        let cache = small_cache();
        let mut ran = false;
        cache
            .update("missing", None, |v: Value| {
                ran = true;
                v
            })
            .unwrap();
        assert!(!ran, "block must not run for an absent key");
    }

    #[test]
    fn test_update_restarts_original_duration() {
        let cache = small_cache();
        cache.write("k", &json!(1), Some(600), None).unwrap();
        let before = cache.inspect("k", None).unwrap().unwrap();
        cache.update("k", None, |_: Value| json!(2)).unwrap();
        let after = cache.inspect("k", None).unwrap().unwrap();

        let duration_before = before.expires_at.unwrap() - before.created_at;
        let duration_after = after.expires_at.unwrap() - after.created_at;
        assert_eq!(duration_before, duration_after);
        assert!(after.created_at >= before.created_at);
    }

    #[test]
    fn test_update_keeps_entries_without_expiry_unexpiring() {
        let cache = small_cache();
        cache.write("k", &json!(1), None, None).unwrap();
        cache.update("k", None, |_: Value| json!(2)).unwrap();
        let info = cache.inspect("k", None).unwrap().unwrap();
        assert!(info.expires_at.is_none());
    }

    #[test]
    fn test_byte_accounting_matches_shards() {
        let cache = small_cache();
        cache.write("alpha", &json!("12345"), None, None).unwrap();
        cache.write("beta", &json!("678"), None, None).unwrap();
        cache.delete("alpha", None).unwrap();

        let shard_bytes: u64 = cache.metrics().shards.iter().map(|s| s.bytes).sum();
        assert_eq!(cache.total_bytes(), shard_bytes);
    }

    #[test]
    fn test_router_is_stable() {
        for key in ["a", "b", "longer-key", "ns:k"] {
            assert_eq!(shard_index_of(key, 32), shard_index_of(key, 32));
            assert!(shard_index_of(key, 7) < 7);
        }
    }

    #[test]
    fn test_reset_clears_everything() {
        let cache = small_cache();
        cache.write("k", &json!(1), None, None).unwrap();
        let _: Option<Value> = cache.read("k", None).unwrap();
        cache.reset();

        assert!(cache.all_keys().is_empty());
        assert_eq!(cache.total_bytes(), 0);
        let snap = cache.metrics();
        assert_eq!(snap.counters.hits, 0);
        assert_eq!(snap.counters.misses, 0);
        assert_eq!(snap.counters.evictions, 0);
        assert_eq!(snap.counters.rejected, 0);
    }

    #[test]
    fn test_reconfigure_rejects_serializer_change() {
        let cache = small_cache();
        let config = Config {
            serializer: crate::codec::Strategy::Binary,
            shard_count: 1,
            sweep_interval: None,
            ..Config::default()
        };
        assert!(matches!(
            cache.reconfigure(config),
            Err(CacheError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_reconfigure_shard_count_resets() {
        let cache = small_cache();
        cache.write("k", &json!(1), None, None).unwrap();
        cache
            .reconfigure(Config {
                shard_count: 4,
                sweep_interval: None,
                ..Config::default()
            })
            .unwrap();
        assert!(cache.all_keys().is_empty());
        assert_eq!(cache.metrics().shards.len(), 4);
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let config = Config {
            shard_count: 0,
            ..Config::default()
        };
        assert!(Cache::new(config).is_err());
    }
}
