//! Response DTO for the wire protocol
//!
//! Every request gets exactly one JSON line back: `{"ok":true,"value":…}`
//! on success, `{"ok":false,"error":…}` on failure.

use serde::Serialize;

/// A single protocol response.
#[derive(Debug, Clone, Serialize)]
pub struct WireResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireResponse {
    pub fn success(value: serde_json::Value) -> Self {
        Self {
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            value: None,
            error: Some(error.into()),
        }
    }
}
