//! The shared timer driving periodic connector work.
//!
//! One [`TickScheduler`] serves every connector of a process. It runs a
//! single background thread that wakes on a fixed interval and calls
//! [`TickTarget::on_tick`] on each registered target. Targets are held
//! weakly, so a dropped connector simply disappears from the list.
//!
//! Tick handlers perform no blocking channel reads; they only inspect
//! timestamps, transition state and enqueue writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Interval between scheduler ticks.
pub const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Something that wants periodic attention from the scheduler.
pub trait TickTarget: Send + Sync {
    /// Called on every scheduler tick.
    fn on_tick(&self, now: Instant);
}

struct SchedulerInner {
    targets: Mutex<Vec<Weak<dyn TickTarget>>>,
    stop: AtomicBool,
}

/// A shared ticker thread over weakly referenced targets.
pub struct TickScheduler {
    inner: Arc<SchedulerInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TickScheduler {
    /// Create the scheduler and start its thread.
    pub fn new() -> Self {
        let inner = Arc::new(SchedulerInner {
            targets: Mutex::new(Vec::new()),
            stop: AtomicBool::new(false),
        });

        let tick_inner = Arc::clone(&inner);
        let handle = thread::spawn(move || {
            while !tick_inner.stop.load(Ordering::Relaxed) {
                thread::sleep(TICK_INTERVAL);

                // Upgrade outside the lock so a tick handler can register
                // further targets without deadlocking.
                let live: Vec<Arc<dyn TickTarget>> = {
                    let mut targets = tick_inner.targets.lock();
                    targets.retain(|t| t.strong_count() > 0);
                    targets.iter().filter_map(Weak::upgrade).collect()
                };

                let now = Instant::now();
                for target in live {
                    target.on_tick(now);
                }
            }
        });

        TickScheduler {
            inner,
            thread: Mutex::new(Some(handle)),
        }
    }

    /// Register a target for ticking.
    pub fn register(&self, target: Weak<dyn TickTarget>) {
        self.inner.targets.lock().push(target);
    }

    /// Number of live targets (dead weak references are not counted).
    pub fn target_count(&self) -> usize {
        self.inner
            .targets
            .lock()
            .iter()
            .filter(|t| t.strong_count() > 0)
            .count()
    }

    /// Stop the ticker thread and wait for it to finish.
    pub fn shutdown(&self) {
        self.inner.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.inner.stop.store(true, Ordering::Relaxed);
        // the thread wakes within one tick and exits on its own
    }
}
