//! Single-flight Module
//!
//! De-duplicates concurrent cache misses on the same effective key. Each
//! in-flight key owns one mutex plus a waiter count in a registry; the
//! per-key mutex is acquired outside the registry lock, and the slot is
//! dropped once the last waiter leaves so the registry never grows
//! unbounded.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

struct FlightSlot {
    lock: Arc<Mutex<()>>,
    waiters: usize,
}

// == Single Flight Registry ==
#[derive(Default)]
pub struct SingleFlight {
    slots: Mutex<HashMap<String, FlightSlot>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    // == With Lock ==
    /// Runs `f` while holding the flight lock for `key`. Callers racing on
    /// the same key serialize; distinct keys proceed in parallel.
    pub fn with_lock<R>(&self, key: &str, f: impl FnOnce() -> R) -> R {
        let lock = {
            let mut slots = self.slots.lock();
            let slot = slots.entry(key.to_string()).or_insert_with(|| FlightSlot {
                lock: Arc::new(Mutex::new(())),
                waiters: 0,
            });
            slot.waiters += 1;
            Arc::clone(&slot.lock)
        };

        // Declared before the guard so the waiter count is released after
        // the key mutex, even when f panics
        let _release = Release { flight: self, key };
        let _guard = lock.lock();
        f()
    }

    /// Number of keys currently in flight.
    pub fn in_flight(&self) -> usize {
        self.slots.lock().len()
    }
}

struct Release<'a> {
    flight: &'a SingleFlight,
    key: &'a str,
}

impl Drop for Release<'_> {
    fn drop(&mut self) {
        let mut slots = self.flight.slots.lock();
        if let Some(slot) = slots.get_mut(self.key) {
            slot.waiters -= 1;
            if slot.waiters == 0 {
                slots.remove(self.key);
            }
        }
    }
}
