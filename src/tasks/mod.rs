//! Background Tasks
//!
//! Long-running maintenance work that runs beside the cache, currently the
//! TTL sweeper.

pub mod sweeper;

pub use sweeper::{SweepState, Sweeper};
