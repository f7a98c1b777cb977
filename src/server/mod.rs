//! Server Module
//!
//! Optional cross-process access to one cache over a local stream socket,
//! speaking newline-delimited JSON.
//!
//! # Commands
//! `read`, `write`, `delete`, `exists`, `fetch`, `inspect`, `keys`,
//! `clear_namespace`, `least_touched`, `all_keys`, `current_memory_bytes`,
//! `max_memory_bytes`, `metrics`

pub mod commands;
pub mod listener;

pub use commands::dispatch;
pub use listener::serve;
