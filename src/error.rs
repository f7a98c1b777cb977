//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine and server.
///
/// Capacity overflows are deliberately absent: a write that exceeds the
/// value-size limit or the hard memory cap is dropped silently and only
/// surfaces through the `rejected` counter.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A namespace-scoped operation was called without a namespace
    #[error("Namespace must not be empty")]
    EmptyNamespace,

    /// Namespace contains the reserved key delimiter
    #[error("Namespace '{0}' must not contain ':'")]
    InvalidNamespace(String),

    /// Value could not be encoded; nothing was written
    #[error("Failed to encode value: {0}")]
    Encode(String),

    /// Payload failed to decode under the configured strategy
    #[error("Failed to decode payload: {0}")]
    Decode(String),

    /// Stored payload could not be decoded; the entry has been removed
    #[error("Corrupted payload for key '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Snapshot file carries an unknown version tag
    #[error("Unsupported snapshot version {0}")]
    SnapshotVersion(u32),

    /// Snapshot was written under a different serializer strategy
    #[error("Snapshot serializer mismatch: expected '{expected}', found '{found}'")]
    SnapshotSerializer { expected: String, found: String },

    /// Snapshot file could not be parsed
    #[error("Malformed snapshot: {0}")]
    SnapshotFormat(String),

    /// I/O failure during snapshot save or load
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
