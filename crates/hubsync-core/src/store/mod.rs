// ── Entity snapshot store ──
//
// Concurrent latest-record cache with `watch`-based readiness and
// freshness metadata.

mod snapshot;

pub use snapshot::SnapshotStore;
