// ── Request multiplexer ──
//
// Correlates outbound requests with inbound `result` frames by integer id.
// Each waiter is a oneshot sender held in the pending map; whoever removes
// it from the map (response, timeout, or teardown) settles the request, so
// every request gets exactly one outcome.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hubsync_api::ResultFrame;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::CoreError;

type Outcome = Result<Value, CoreError>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Outcome>>>>;

pub struct RequestMultiplexer {
    next_id: AtomicU64,
    pending: PendingMap,
    timeout: Duration,
}

impl RequestMultiplexer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Arc::default(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Allocate a correlation id and start tracking it.
    pub fn register(&self) -> PendingRequest {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);
        trace!(id, "request registered");
        PendingRequest {
            id,
            rx,
            pending: Arc::clone(&self.pending),
            timeout: self.timeout,
        }
    }

    /// Settle the request a `result` frame answers. Returns `false` when no
    /// caller is waiting for that id (already timed out, or unknown).
    pub fn resolve(&self, frame: ResultFrame) -> bool {
        let id = frame.id;
        let outcome = frame.into_outcome().map_err(CoreError::from);
        self.settle(id, outcome)
    }

    /// Settle a `ping` request.
    pub fn resolve_pong(&self, id: u64) -> bool {
        self.settle(id, Ok(Value::Null))
    }

    /// Fail every waiting request with [`CoreError::ConnectionClosed`].
    pub fn fail_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.pending).drain().collect();
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(CoreError::ConnectionClosed));
        }
        if count > 0 {
            debug!(count, "failed pending requests: connection closed");
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Hand `outcome` to whoever waits on `id`.
    pub fn settle(&self, id: u64, outcome: Outcome) -> bool {
        let Some(tx) = lock(&self.pending).remove(&id) else {
            debug!(id, "response for unknown or expired request");
            return false;
        };
        // The receiver may be gone if the caller dropped its future.
        let _ = tx.send(outcome);
        true
    }
}

fn lock(
    pending: &Mutex<HashMap<u64, oneshot::Sender<Outcome>>>,
) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Outcome>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── PendingRequest ───────────────────────────────────────────────────

/// A registered request awaiting its response.
///
/// Dropping it without waiting removes the bookkeeping entry.
pub struct PendingRequest {
    id: u64,
    rx: oneshot::Receiver<Outcome>,
    pending: PendingMap,
    timeout: Duration,
}

impl PendingRequest {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the response, the timeout, or connection teardown.
    pub async fn wait(mut self) -> Result<Value, CoreError> {
        match tokio::time::timeout(self.timeout, &mut self.rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without settling: the multiplexer went away.
            Ok(Err(_)) => Err(CoreError::ConnectionClosed),
            Err(_elapsed) => {
                let removed = lock(&self.pending).remove(&self.id).is_some();
                if !removed {
                    // Settled between the deadline and the removal above.
                    if let Ok(outcome) = self.rx.try_recv() {
                        return outcome;
                    }
                }
                debug!(id = self.id, "request timed out");
                Err(CoreError::Timeout {
                    id: self.id,
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.id);
    }
}

// ── Tests ────────────────────────────────────────────────────────────
