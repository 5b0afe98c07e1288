// ── Per-entity change stream ──
//
// Async adapter over a registry subscription, for consumers that prefer
// `Stream` combinators to callbacks.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use hubsync_api::EntityState;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::subscription::Subscription;

/// Stream of records for one entity.
///
/// Holds the underlying subscription; dropping the stream unsubscribes.
/// Ends when the client disconnects and clears its subscribers.
pub struct EntityStream {
    entity_id: String,
    current: Option<Arc<EntityState>>,
    inner: UnboundedReceiverStream<Arc<EntityState>>,
    _subscription: Subscription,
}

impl EntityStream {
    pub(crate) fn new(
        entity_id: String,
        current: Option<Arc<EntityState>>,
        receiver: mpsc::UnboundedReceiver<Arc<EntityState>>,
        subscription: Subscription,
    ) -> Self {
        Self {
            entity_id,
            current,
            inner: UnboundedReceiverStream::new(receiver),
            _subscription: subscription,
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The most recent record seen by this stream: the cached value at
    /// creation, then whatever [`changed`](Self::changed) last returned.
    pub fn current(&self) -> Option<&Arc<EntityState>> {
        self.current.as_ref()
    }

    /// Wait for the next record. Returns `None` once the stream has ended.
    pub async fn changed(&mut self) -> Option<Arc<EntityState>> {
        std::future::poll_fn(|cx| Pin::new(&mut *self).poll_next(cx)).await
    }
}

impl Stream for EntityStream {
    type Item = Arc<EntityState>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(record)) => {
                this.current = Some(Arc::clone(&record));
                Poll::Ready(Some(record))
            }
            other => other,
        }
    }
}

impl std::fmt::Debug for EntityStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStream")
            .field("entity_id", &self.entity_id)
            .field("current", &self.current.as_ref().map(|s| s.state.as_str()))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::subscription::SubscriptionRegistry;
    use tokio_test::{assert_pending, assert_ready, task};

    type Entities = SubscriptionRegistry<String, Arc<EntityState>>;

    fn stream_for(registry: &Entities, current: Option<EntityState>) -> EntityStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription =
            registry.subscribe("light.kitchen".to_owned(), move |s: &Arc<EntityState>| {
                let _ = tx.send(Arc::clone(s));
            });
        EntityStream::new("light.kitchen".into(), current.map(Arc::new), rx, subscription)
    }

    #[test]
    fn pending_until_notified_then_tracks_current() {
        let registry = Entities::new();
        let initial = EntityState::new("light.kitchen", "off");
        let mut stream = task::spawn(stream_for(&registry, Some(initial)));
        assert_eq!(stream.current().unwrap().state, "off");
        assert_pending!(stream.poll_next());

        let on = Arc::new(EntityState::new("light.kitchen", "on"));
        registry.notify(&"light.kitchen".to_owned(), &on);
        assert!(stream.is_woken());
        let record = assert_ready!(stream.poll_next()).unwrap();
        assert_eq!(record.state, "on");
        assert_eq!(stream.current().unwrap().state, "on");
    }

    #[test]
    fn clearing_the_registry_ends_the_stream() {
        let registry = Entities::new();
        let mut stream = task::spawn(stream_for(&registry, None));
        assert!(stream.current().is_none());
        assert_pending!(stream.poll_next());

        registry.clear();
        assert!(assert_ready!(stream.poll_next()).is_none());
    }

    #[tokio::test]
    async fn dropping_the_stream_unsubscribes() {
        let registry = Entities::new();
        let mut stream = stream_for(&registry, None);
        let on = Arc::new(EntityState::new("light.kitchen", "on"));
        registry.notify(&"light.kitchen".to_owned(), &on);
        assert_eq!(stream.changed().await.unwrap().state, "on");

        drop(stream);
        assert!(!registry.has_subscribers(&"light.kitchen".to_owned()));
    }
}
