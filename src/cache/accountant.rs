//! Memory Accountant Module
//!
//! Process-wide byte total mirroring the per-shard counters. Writes under a
//! hard memory limit reserve their net growth atomically, so the total can
//! never cross the cap through a race between shards.

use std::sync::atomic::{AtomicU64, Ordering};

// == Memory Accountant ==
#[derive(Debug, Default)]
pub struct MemoryAccountant {
    total: AtomicU64,
}

impl MemoryAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current total of live bytes across all shards.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Acquire)
    }

    /// Records `n` freshly stored bytes.
    #[allow(dead_code)]
    pub fn add(&self, n: u64) {
        self.total.fetch_add(n, Ordering::AcqRel);
    }

    /// Records `n` released bytes.
    pub fn sub(&self, n: u64) {
        self.total.fetch_sub(n, Ordering::AcqRel);
    }

    // == Reserve ==
    /// Atomically applies a replace delta (`grow` new bytes, `shrink` bytes
    /// released by the entry being replaced) unless the resulting total
    /// would exceed `cap`. Returns false without changing anything when the
    /// cap would be crossed; that is the silent-rejection path.
    pub fn try_reserve(&self, grow: u64, shrink: u64, cap: u64) -> bool {
        self.total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                let next = cur.saturating_sub(shrink) + grow;
                if next > cap {
                    None
                } else {
                    Some(next)
                }
            })
            .is_ok()
    }

    /// Zeroes the total. Only valid while every shard is being rebuilt.
    pub fn reset(&self) {
        self.total.store(0, Ordering::Release);
    }
}
