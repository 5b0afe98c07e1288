// ── Snapshot store ──
//
// Holds the most recent record for every known entity. Readers get cheap
// `Arc` clones; the connection task is the only writer, applying events
// and full refreshes in the order the hub sent them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hubsync_api::EntityState;
use tokio::sync::watch;
use tracing::debug;

/// Latest known state of every hub entity.
///
/// The store is "ready" once a full refresh has been applied, and stops
/// being ready when cleared. Individual records are replaced wholesale;
/// there is no partial merge.
pub struct SnapshotStore {
    entities: DashMap<String, Arc<EntityState>>,
    ready: watch::Sender<bool>,
    version: watch::Sender<u64>,
    last_full_refresh: watch::Sender<Option<DateTime<Utc>>>,
    last_event: watch::Sender<Option<DateTime<Utc>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        let (version, _) = watch::channel(0u64);
        let (last_full_refresh, _) = watch::channel(None);
        let (last_event, _) = watch::channel(None);

        Self {
            entities: DashMap::new(),
            ready,
            version,
            last_full_refresh,
            last_event,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, entity_id: &str) -> Option<Arc<EntityState>> {
        self.entities.get(entity_id).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.entities.contains_key(entity_id)
    }

    /// Every record, sorted by entity id.
    pub fn snapshot(&self) -> Vec<Arc<EntityState>> {
        let mut all: Vec<_> = self.entities.iter().map(|r| Arc::clone(r.value())).collect();
        all.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        all
    }

    /// Records whose id starts with `"<domain>."`, sorted by entity id.
    pub fn in_domain(&self, domain: &str) -> Vec<Arc<EntityState>> {
        let mut matching: Vec<_> = self
            .entities
            .iter()
            .filter(|r| r.value().domain() == domain)
            .map(|r| Arc::clone(r.value()))
            .collect();
        matching.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        matching
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolve once a full refresh has been applied. Returns immediately
    /// if the store is already ready.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives in `self`, so `wait_for` cannot fail here.
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Bumped on every mutation.
    pub fn version(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Replace the whole store with `records`.
    ///
    /// Entities absent from `records` are dropped. Returns the records that
    /// are new or differ from what was cached, so callers can notify only
    /// on real changes.
    pub fn apply_full(&self, records: Vec<EntityState>) -> Vec<Arc<EntityState>> {
        let mut changed = Vec::new();
        let mut fresh = std::collections::HashSet::with_capacity(records.len());

        for record in records {
            fresh.insert(record.entity_id.clone());
            let differs = self
                .entities
                .get(&record.entity_id)
                .is_none_or(|existing| **existing != record);
            let record = Arc::new(record);
            self.entities
                .insert(record.entity_id.clone(), Arc::clone(&record));
            if differs {
                changed.push(record);
            }
        }

        // Insert first, prune after: readers never see a gap for entities
        // that survive the refresh.
        let before = self.entities.len();
        self.entities.retain(|id, _| fresh.contains(id));
        let pruned = before - self.entities.len();

        self.last_full_refresh.send_replace(Some(Utc::now()));
        self.ready.send_replace(true);
        self.bump_version();

        debug!(
            entities = self.entities.len(),
            changed = changed.len(),
            pruned,
            "snapshot refreshed"
        );
        changed
    }

    /// Store a single record from a change event.
    pub fn apply_change(&self, record: EntityState) -> Arc<EntityState> {
        let record = Arc::new(record);
        self.entities
            .insert(record.entity_id.clone(), Arc::clone(&record));
        self.last_event.send_replace(Some(Utc::now()));
        self.bump_version();
        record
    }

    /// Drop an entity the hub reported as removed.
    pub fn remove(&self, entity_id: &str) -> Option<Arc<EntityState>> {
        let removed = self.entities.remove(entity_id).map(|(_, v)| v);
        self.last_event.send_replace(Some(Utc::now()));
        if removed.is_some() {
            self.bump_version();
        }
        removed
    }

    /// Empty the store and mark it not ready.
    pub fn clear(&self) {
        self.entities.clear();
        self.ready.send_replace(false);
        self.bump_version();
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn last_full_refresh(&self) -> Option<DateTime<Utc>> {
        *self.last_full_refresh.borrow()
    }

    pub fn last_event(&self) -> Option<DateTime<Utc>> {
        *self.last_event.borrow()
    }

    /// How long ago the last full refresh occurred, or `None` if never refreshed.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_full_refresh().map(|t| Utc::now() - t)
    }

    fn bump_version(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
