// ── Topic-keyed callback registry ──
//
// Backs entity fan-out, forecast streams, and connection status listeners.
// Callbacks run synchronously on the notifying task with no lock held.

use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::warn;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

struct Topics<K, T> {
    next_id: u64,
    by_topic: HashMap<K, HashMap<u64, Entry<T>>>,
}

/// Maps topics to the callbacks interested in them.
///
/// Cloning yields another handle to the same registry.
pub struct SubscriptionRegistry<K, T> {
    inner: Arc<Mutex<Topics<K, T>>>,
}

impl<K, T> Clone for SubscriptionRegistry<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T> Default for SubscriptionRegistry<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, T> SubscriptionRegistry<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Topics {
                next_id: 0,
                by_topic: HashMap::new(),
            })),
        }
    }

    /// Register `callback` for `topic`. Dropping or cancelling the returned
    /// handle removes exactly this registration.
    pub fn subscribe<F>(&self, topic: K, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let id = {
            let mut topics = lock(&self.inner);
            topics.next_id += 1;
            let id = topics.next_id;
            topics.by_topic.entry(topic.clone()).or_default().insert(
                id,
                Entry {
                    active: Arc::clone(&active),
                    callback: Arc::new(callback),
                },
            );
            id
        };

        let registry: Weak<Mutex<Topics<K, T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            active.store(false, Ordering::Release);
            let Some(inner) = registry.upgrade() else {
                return;
            };
            let mut topics = lock(&inner);
            if let Some(set) = topics.by_topic.get_mut(&topic) {
                set.remove(&id);
                if set.is_empty() {
                    topics.by_topic.remove(&topic);
                }
            }
        })
    }

    /// Deliver `payload` to every callback registered for `topic` when the
    /// pass starts. Returns how many callbacks ran.
    ///
    /// A callback cancelled during the pass is skipped if it has not run
    /// yet. A panicking callback is logged and does not stop delivery to
    /// the rest.
    pub fn notify(&self, topic: &K, payload: &T) -> usize {
        let targets: Vec<(Arc<AtomicBool>, Callback<T>)> = {
            let topics = lock(&self.inner);
            match topics.by_topic.get(topic) {
                Some(set) => set
                    .values()
                    .map(|e| (Arc::clone(&e.active), Arc::clone(&e.callback)))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (active, callback) in targets {
            if !active.load(Ordering::Acquire) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                warn!("subscriber callback panicked; continuing fan-out");
            }
            delivered += 1;
        }
        delivered
    }

    /// Drop every registration. Outstanding handles become no-ops.
    pub fn clear(&self) {
        let drained = std::mem::take(&mut lock(&self.inner).by_topic);
        for entry in drained.into_values().flat_map(HashMap::into_values) {
            entry.active.store(false, Ordering::Release);
        }
    }

    pub fn has_subscribers(&self, topic: &K) -> bool {
        lock(&self.inner).by_topic.contains_key(topic)
    }

    pub fn subscriber_count(&self, topic: &K) -> usize {
        lock(&self.inner).by_topic.get(topic).map_or(0, HashMap::len)
    }

    pub fn topic_count(&self) -> usize {
        lock(&self.inner).by_topic.len()
    }
}

// Callbacks never run under this lock, so a poisoned guard still holds
// consistent data.
fn lock<K, T>(inner: &Mutex<Topics<K, T>>) -> MutexGuard<'_, Topics<K, T>> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Subscription handle ──────────────────────────────────────────────

/// Cancellation handle for a registered callback.
///
/// Cancels on drop; call [`detach`](Self::detach) to keep the callback for
/// the registry's lifetime instead.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Stop delivery. Takes effect for the next notify pass.
    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }

    /// Keep the callback registered until the registry is cleared.
    pub fn detach(mut self) {
        self.cancel = None;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
