//! Mudis - An in-process sharded cache
//!
//! Thread-safe cache with per-shard LRU eviction, optional TTL expiration,
//! payload compression, byte-exact memory accounting with soft and hard
//! caps, logical namespacing, single-flight fetches, warm-boot snapshots,
//! and an optional local line-protocol server.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod namespace;
pub mod persistence;
pub mod server;
pub mod singleflight;
pub mod tasks;

pub use cache::{Cache, CacheEntry, EntryInfo, FetchOptions};
pub use codec::Strategy;
pub use config::{Config, PersistenceConfig, ServerConfig};
pub use error::{CacheError, Result};
pub use namespace::{with_namespace, NamespaceScope};
pub use persistence::SnapshotFormat;
pub use tasks::SweepState;
