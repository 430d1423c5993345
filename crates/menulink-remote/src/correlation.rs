//! Matching outbound commands to their acknowledgements.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use menulink_protocol::{AckCode, AckStatus, CorrelationId};

type AckCallback = Box<dyn FnOnce(AckStatus) + Send>;

struct Waiter {
    callback: AckCallback,
    registered_at: Instant,
}

/// Tracks outstanding correlated commands and resolves each exactly once.
///
/// A waiter is registered *before* its command is written, so the reply can
/// never race past the registration. Resolution happens through a matching
/// acknowledgement, a timeout sweep, or a drain when the connection closes;
/// whichever comes first removes the entry, so later resolutions of the
/// same id are no-ops. The map is the one structure shared between the
/// write path and the read path and is guarded by a single mutex; callbacks
/// always run outside it.
pub struct CorrelationTracker {
    waiters: Mutex<HashMap<CorrelationId, Waiter>>,
    timeout: Duration,
}

impl CorrelationTracker {
    /// Create a tracker whose entries expire after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        CorrelationTracker {
            waiters: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Register a waiter for a correlation id.
    ///
    /// The empty sentinel is fire-and-forget and never registered.
    pub fn track(&self, id: CorrelationId, callback: impl FnOnce(AckStatus) + Send + 'static) {
        if id.is_empty() {
            return;
        }
        let previous = self.waiters.lock().insert(
            id,
            Waiter {
                callback: Box::new(callback),
                registered_at: Instant::now(),
            },
        );
        if let Some(previous) = previous {
            // ids are random u64s, so this indicates a caller reusing one
            warn!(%id, "correlation id re-tracked before resolution");
            (previous.callback)(AckStatus {
                correlation: id,
                code: AckCode::ConnectionClosed,
            });
        }
    }

    /// Remove a registration without invoking it (failed write).
    pub fn cancel(&self, id: CorrelationId) {
        self.waiters.lock().remove(&id);
    }

    /// Resolve a waiter with the device's acknowledgement.
    ///
    /// Returns false when the id is unknown (already resolved, timed out,
    /// or never tracked) - that is a no-op by design.
    pub fn resolve(&self, ack: AckStatus) -> bool {
        let waiter = self.waiters.lock().remove(&ack.correlation);
        match waiter {
            Some(waiter) => {
                debug!(id = %ack.correlation, code = ?ack.code, "correlation resolved");
                (waiter.callback)(ack);
                true
            }
            None => false,
        }
    }

    /// Resolve every waiter older than the timeout with a synthetic
    /// timeout status. Called from the scheduler tick.
    pub fn sweep(&self, now: Instant) {
        let expired: Vec<(CorrelationId, Waiter)> = {
            let mut waiters = self.waiters.lock();
            let ids: Vec<CorrelationId> = waiters
                .iter()
                .filter(|(_, w)| now.duration_since(w.registered_at) >= self.timeout)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| waiters.remove(&id).map(|w| (id, w)))
                .collect()
        };

        for (id, waiter) in expired {
            warn!(%id, "correlated command timed out waiting for its acknowledgement");
            (waiter.callback)(AckStatus {
                correlation: id,
                code: AckCode::Timeout,
            });
        }
    }

    /// Resolve everything outstanding with the given local status. Called
    /// on stop and on disconnect so no waiter is left to time out.
    pub fn drain(&self, code: AckCode) {
        let drained: Vec<(CorrelationId, Waiter)> = self.waiters.lock().drain().collect();
        for (id, waiter) in drained {
            (waiter.callback)(AckStatus {
                correlation: id,
                code,
            });
        }
    }

    /// Number of outstanding registrations.
    pub fn outstanding(&self) -> usize {
        self.waiters.lock().len()
    }
}
