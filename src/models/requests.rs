//! Request DTO for the wire protocol
//!
//! One JSON object per line. Only `cmd` is always required; the other
//! fields are checked per command by the dispatcher.

use serde::Deserialize;

/// A single protocol request.
#[derive(Debug, Clone, Deserialize)]
pub struct WireRequest {
    /// Command name, e.g. "read" or "clear_namespace"
    pub cmd: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// TTL in seconds for write-like commands
    #[serde(default)]
    pub ttl: Option<u64>,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Result cap for `least_touched`
    #[serde(default)]
    pub limit: Option<usize>,
    /// Value written and returned by `fetch` on a miss
    #[serde(default)]
    pub fallback: Option<serde_json::Value>,
}
