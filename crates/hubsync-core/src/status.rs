// ── Connection status broadcaster ──
//
// Holds the current connection phase and pushes every transition to
// listeners synchronously, plus a `watch` channel for async consumers.

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::subscription::{Subscription, SubscriptionRegistry};

/// Lifecycle phase of the hub connection.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
    AuthFailed,
    Exhausted,
}

impl ConnectionPhase {
    /// Phases that need an explicit `retry()` before the client connects
    /// again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AuthFailed | Self::Exhausted)
    }
}

/// Extra context attached to a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseDetail {
    /// Reconnection attempt number (1-based).
    Attempt(u32),
    Message(String),
}

/// One delivered transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub phase: ConnectionPhase,
    pub detail: Option<PhaseDetail>,
}

impl StatusChange {
    pub fn attempt(&self) -> Option<u32> {
        match self.detail {
            Some(PhaseDetail::Attempt(n)) => Some(n),
            _ => None,
        }
    }
}

pub struct StatusBroadcaster {
    current: watch::Sender<ConnectionPhase>,
    listeners: SubscriptionRegistry<(), StatusChange>,
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        let (current, _) = watch::channel(ConnectionPhase::Disconnected);
        Self {
            current,
            listeners: SubscriptionRegistry::new(),
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        *self.current.borrow()
    }

    pub fn on_phase_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        self.listeners.subscribe((), callback)
    }

    /// Receiver that always holds the latest phase. Intermediate phases may
    /// be skipped by a slow reader; use [`on_phase_change`](Self::on_phase_change)
    /// to observe every transition.
    pub fn watch(&self) -> watch::Receiver<ConnectionPhase> {
        self.current.subscribe()
    }

    /// Record `phase` and deliver it to every listener before returning.
    pub fn broadcast(&self, phase: ConnectionPhase, detail: Option<PhaseDetail>) {
        self.record(phase);
        self.deliver(&StatusChange { phase, detail });
    }

    /// Set the current phase without running listeners. Safe under a lock.
    pub fn record(&self, phase: ConnectionPhase) {
        debug!(%phase, "connection phase");
        self.current.send_replace(phase);
    }

    /// Run every listener with `change`.
    pub fn deliver(&self, change: &StatusChange) {
        self.listeners.notify(&(), change);
    }
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
