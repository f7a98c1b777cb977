//! TTL Sweeper Task
//!
//! Background thread that periodically removes expired cache entries,
//! taking each shard mutex in turn. The thread observes its stop signal at
//! the sleep boundary, so `stop` never interrupts a pass midway; a panic
//! inside one pass is logged and the thread continues on the next tick.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info};

use crate::cache::store::CacheInner;

// == Sweep State ==
/// Lifecycle of the sweeper thread: Stopped → Running → Stopping → Stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Stopped,
    Running,
    Stopping,
}

#[derive(Default)]
struct StopSignal {
    stop: Mutex<bool>,
    cond: Condvar,
}

impl StopSignal {
    /// Sleeps up to `timeout`; returns true when a stop was requested.
    fn wait(&self, timeout: Duration) -> bool {
        let mut stop = self.stop.lock();
        if *stop {
            return true;
        }
        self.cond.wait_for(&mut stop, timeout);
        *stop
    }

    fn trigger(&self) {
        *self.stop.lock() = true;
        self.cond.notify_all();
    }
}

struct RunningSweeper {
    handle: JoinHandle<()>,
    signal: Arc<StopSignal>,
}

// == Sweeper ==
/// Handle owning the sweeper thread's lifecycle.
#[derive(Default)]
pub struct Sweeper {
    running: Mutex<Option<RunningSweeper>>,
    stopping: AtomicBool,
}

impl Sweeper {
    pub fn new() -> Self {
        Self::default()
    }

    // == Start ==
    /// Spawns the sweep thread; a no-op while one is already running.
    ///
    /// The thread holds only a weak reference, so a cache dropped without
    /// an explicit shutdown still gets torn down; the sweeper exits on the
    /// next tick.
    pub fn start(&self, interval: Duration, cache: Weak<CacheInner>) {
        let mut running = self.running.lock();
        if running.is_some() {
            return;
        }
        let signal = Arc::new(StopSignal::default());
        let thread_signal = Arc::clone(&signal);
        let spawned = std::thread::Builder::new()
            .name("mudis-sweeper".to_string())
            .spawn(move || run(interval, cache, thread_signal));
        match spawned {
            Ok(handle) => {
                info!(interval_secs = interval.as_secs(), "TTL sweeper started");
                *running = Some(RunningSweeper { handle, signal });
            }
            Err(e) => error!(error = %e, "failed to spawn TTL sweeper"),
        }
    }

    // == Stop ==
    /// Signals the thread to stop and joins it; a no-op when stopped.
    pub fn stop(&self) {
        let taken = self.running.lock().take();
        if let Some(running) = taken {
            self.stopping.store(true, Ordering::Release);
            running.signal.trigger();
            if running.handle.join().is_err() {
                error!("TTL sweeper thread panicked during shutdown");
            }
            self.stopping.store(false, Ordering::Release);
            info!("TTL sweeper stopped");
        }
    }

    pub fn state(&self) -> SweepState {
        if self.stopping.load(Ordering::Acquire) {
            SweepState::Stopping
        } else if self.running.lock().is_some() {
            SweepState::Running
        } else {
            SweepState::Stopped
        }
    }
}

fn run(interval: Duration, cache: Weak<CacheInner>, signal: Arc<StopSignal>) {
    loop {
        if signal.wait(interval) {
            break;
        }
        let Some(inner) = cache.upgrade() else {
            break;
        };
        match catch_unwind(AssertUnwindSafe(|| inner.sweep_pass())) {
            Ok(0) => debug!("sweep pass found no expired entries"),
            Ok(removed) => info!(removed, "sweep pass removed expired entries"),
            Err(_) => error!("sweep pass panicked, continuing on next tick"),
        }
    }
    debug!("TTL sweeper exiting");
}
