//! Realtime state-sync layer between `hubsync-api` and consumers (CLI,
//! dashboards, automations).
//!
//! This crate owns the live connection to a home-automation hub and the
//! in-memory mirror of its entities:
//!
//! - **[`HubClient`]**: central facade managing the full lifecycle.
//!   [`connect()`](HubClient::connect) opens the socket, authenticates,
//!   subscribes to change events and seeds the snapshot; a background
//!   supervisor reconnects with capped exponential backoff until the
//!   attempt budget runs out.
//!
//! - **[`SnapshotStore`]**: concurrent latest-record cache built on
//!   `DashMap` with `tokio::sync::watch` readiness and freshness metadata.
//!   Records are replaced wholesale, never merged.
//!
//! - **[`SubscriptionRegistry`]**: topic-keyed callback fan-out with
//!   per-subscription cancellation handles and panic isolation. Backs
//!   entity subscriptions, forecast streams, and status listeners.
//!
//! - **[`RequestMultiplexer`]**: correlation-id bookkeeping that pairs each
//!   request with exactly one outcome (response, hub error, timeout, or
//!   connection closed).
//!
//! - **[`StatusBroadcaster`]**: explicit [`ConnectionPhase`] state with
//!   synchronous listeners and a `watch` receiver.
//!
//! - **[`EntityStream`]**: `Stream` adapter over one entity's changes.

pub mod client;
pub mod config;
pub mod error;
pub mod request;
pub mod status;
pub mod store;
pub mod stream;
pub mod subscription;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{ForecastSubscription, HubClient};
pub use config::{DEFAULT_REQUEST_TIMEOUT, HubConfig};
pub use error::CoreError;
pub use request::{PendingRequest, RequestMultiplexer};
pub use status::{ConnectionPhase, PhaseDetail, StatusBroadcaster, StatusChange};
pub use store::SnapshotStore;
pub use stream::EntityStream;
pub use subscription::{Subscription, SubscriptionRegistry};

// Wire types consumers need alongside the client.
pub use hubsync_api::{EntityState, ForecastKind, OutgoingMessage, ReconnectConfig};
