// ── Hub client ──
//
// Full lifecycle management for one hub connection: socket open and
// authentication, reconnect with backoff, request multiplexing, snapshot
// seeding, and change fan-out.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use hubsync_api::protocol::{self, STATE_CHANGED};
use hubsync_api::{
    EntityState, ForecastKind, HubEvent, IncomingMessage, OutgoingMessage, ResultFrame,
};
use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::HubConfig;
use crate::error::CoreError;
use crate::request::RequestMultiplexer;
use crate::status::{ConnectionPhase, PhaseDetail, StatusBroadcaster, StatusChange};
use crate::store::SnapshotStore;
use crate::stream::EntityStream;
use crate::subscription::{Subscription, SubscriptionRegistry};

type ReadySender = oneshot::Sender<Result<(), CoreError>>;

// ── HubClient ────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ClientInner>`. Construct one per hub and
/// share it: every clone sees the same socket, snapshot, and subscribers.
///
/// The background session task keeps the client alive while connected;
/// call [`disconnect()`](Self::disconnect) to tear it down.
#[derive(Clone)]
pub struct HubClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: HubConfig,
    store: SnapshotStore,
    entities: SubscriptionRegistry<String, Arc<EntityState>>,
    forecasts: SubscriptionRegistry<u64, Value>,
    status: StatusBroadcaster,
    requests: RequestMultiplexer,
    session: Mutex<Session>,
}

/// Mutable connection bookkeeping. Guarded by a short-lived lock that is
/// never held across an `.await` or while callbacks run.
struct Session {
    link: Link,
    /// Reconnect attempts since the last successful authentication.
    attempts: u32,
    /// Bumped by every `connect()` and `disconnect()`; a supervisor whose
    /// generation is stale must not touch shared state.
    generation: u64,
    /// Cancels the running supervisor (socket or backoff sleep).
    supervisor: Option<CancellationToken>,
    /// Correlation id of the seeding `get_states`, answered in the read loop.
    seed_request: Option<u64>,
}

enum Link {
    Idle,
    Opening,
    Open {
        outbound: mpsc::UnboundedSender<Message>,
        authenticated: bool,
    },
}

/// Why a single socket session ended.
enum SessionEnd {
    Cancelled,
    Closed,
    Failed(CoreError),
    AuthRejected(String),
}

impl HubClient {
    /// Create a client. Does NOT connect; call [`connect()`](Self::connect).
    pub fn new(config: HubConfig) -> Self {
        let requests = RequestMultiplexer::new(config.request_timeout);
        Self {
            inner: Arc::new(ClientInner {
                config,
                store: SnapshotStore::new(),
                entities: SubscriptionRegistry::new(),
                forecasts: SubscriptionRegistry::new(),
                status: StatusBroadcaster::new(),
                requests,
                session: Mutex::new(Session {
                    link: Link::Idle,
                    attempts: 0,
                    generation: 0,
                    supervisor: None,
                    seed_request: None,
                }),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// The entity snapshot.
    pub fn store(&self) -> &SnapshotStore {
        &self.inner.store
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Open the connection and wait for the hub to accept authentication.
    ///
    /// Returns immediately if a connection is already opening or open. A
    /// pending reconnect backoff is abandoned in favor of a fresh attempt.
    /// When the first attempt fails for a transport reason the error is
    /// returned and reconnection continues in the background.
    pub async fn connect(&self) -> Result<(), CoreError> {
        let (ready_tx, ready_rx) = oneshot::channel();
        {
            let mut session = self.inner.session();
            if !matches!(session.link, Link::Idle) {
                debug!("connect: already opening or open");
                return Ok(());
            }
            if let Some(previous) = session.supervisor.take() {
                previous.cancel();
            }
            session.generation += 1;
            session.link = Link::Opening;
            let token = CancellationToken::new();
            session.supervisor = Some(token.clone());
            tokio::spawn(supervise(
                Arc::clone(&self.inner),
                session.generation,
                token,
                ready_tx,
            ));
        }

        ready_rx.await.unwrap_or(Err(CoreError::ConnectionClosed))
    }

    /// Close the connection and discard all derived state.
    ///
    /// Cancels any pending reconnect, fails every in-flight request with
    /// [`CoreError::ConnectionClosed`], drops every entity and forecast
    /// subscription, empties the snapshot, and broadcasts `disconnected`.
    pub fn disconnect(&self) {
        {
            let mut session = self.inner.session();
            session.generation += 1;
            session.link = Link::Idle;
            session.attempts = 0;
            session.seed_request = None;
            if let Some(token) = session.supervisor.take() {
                token.cancel();
            }
            // Recorded under the lock so no stale session phase lands after it.
            self.inner.status.record(ConnectionPhase::Disconnected);
        }

        self.inner.requests.fail_all();
        self.inner.entities.clear();
        self.inner.forecasts.clear();
        self.inner.store.clear();
        info!("disconnected from hub");
        self.inner.status.deliver(&StatusChange {
            phase: ConnectionPhase::Disconnected,
            detail: None,
        });
    }

    /// Reset the attempt counter and connect. The way out of
    /// `auth_failed` and `exhausted`.
    pub async fn retry(&self) -> Result<(), CoreError> {
        self.inner.session().attempts = 0;
        self.connect().await
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.inner.status.phase()
    }

    /// Observe every phase transition synchronously.
    pub fn on_connection_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        self.inner.status.on_phase_change(callback)
    }

    /// Receiver holding the latest phase.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionPhase> {
        self.inner.status.watch()
    }

    // ── Entity state ─────────────────────────────────────────────────

    /// Current record for `entity_id`.
    ///
    /// Served from the snapshot once it has been seeded. Before that, a
    /// full state list is fetched and searched so callers never see a
    /// transient miss during the seed window.
    pub async fn get_state(&self, entity_id: &str) -> Result<Option<Arc<EntityState>>, CoreError> {
        if self.inner.store.is_ready() {
            return Ok(self.inner.store.get(entity_id));
        }
        let states = self.inner.fetch_states().await?;
        Ok(states
            .into_iter()
            .find(|s| s.entity_id == entity_id)
            .map(Arc::new))
    }

    /// Snapshot lookup only; never touches the network.
    pub fn cached_state(&self, entity_id: &str) -> Option<Arc<EntityState>> {
        self.inner.store.get(entity_id)
    }

    pub fn states(&self) -> Vec<Arc<EntityState>> {
        self.inner.store.snapshot()
    }

    pub fn states_in_domain(&self, domain: &str) -> Vec<Arc<EntityState>> {
        self.inner.store.in_domain(domain)
    }

    /// Fetch the full state list from the hub without touching the snapshot.
    pub async fn fetch_states(&self) -> Result<Vec<EntityState>, CoreError> {
        self.inner.fetch_states().await
    }

    /// Call `callback` with every new record for `entity_id`.
    pub fn subscribe_entity<F>(&self, entity_id: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&EntityState) + Send + Sync + 'static,
    {
        self.inner
            .entities
            .subscribe(entity_id.into(), move |state: &Arc<EntityState>| {
                callback(state);
            })
    }

    /// Async stream of records for `entity_id`, starting from the next change.
    pub fn entity_stream(&self, entity_id: impl Into<String>) -> EntityStream {
        let entity_id = entity_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self
            .inner
            .entities
            .subscribe(entity_id.clone(), move |state: &Arc<EntityState>| {
                let _ = tx.send(Arc::clone(state));
            });
        let current = self.inner.store.get(&entity_id);
        EntityStream::new(entity_id, current, rx, subscription)
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Invoke a hub service, e.g. `call_service("light", "turn_on", data)`.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: Option<Value>,
    ) -> Result<Value, CoreError> {
        debug!(domain, service, "calling service");
        self.request(OutgoingMessage::CallService {
            domain: domain.to_owned(),
            service: service.to_owned(),
            service_data: data,
            target: None,
        })
        .await
    }

    /// Send a typed request and wait for its result.
    pub async fn request(&self, message: OutgoingMessage) -> Result<Value, CoreError> {
        self.inner.request(message).await
    }

    /// Send a raw JSON object and wait for its result. The correlation id
    /// is attached here; any `id` already present is replaced.
    pub async fn send(&self, message: Value) -> Result<Value, CoreError> {
        let body = into_object(message)?;
        self.inner.request_object(body).await
    }

    /// Queue a raw JSON object without a correlation id. Allowed before
    /// authentication completes; nothing is awaited.
    pub fn send_unacknowledged(&self, message: Value) -> Result<(), CoreError> {
        let body = into_object(message)?;
        self.inner.transmit(body, None)
    }

    /// Round-trip time of a `ping`.
    pub async fn ping(&self) -> Result<Duration, CoreError> {
        let started = Instant::now();
        self.request(OutgoingMessage::Ping).await?;
        Ok(started.elapsed())
    }

    // ── Forecasts ────────────────────────────────────────────────────

    /// Subscribe to forecast updates for a weather entity.
    ///
    /// `callback` receives each forecast event payload. The returned
    /// handle cancels delivery on drop; call
    /// [`unsubscribe`](ForecastSubscription::unsubscribe) to also tell the
    /// hub to stop streaming.
    pub async fn subscribe_forecast<F>(
        &self,
        entity_id: &str,
        kind: ForecastKind,
        callback: F,
    ) -> Result<ForecastSubscription, CoreError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let body = OutgoingMessage::SubscribeForecast {
            entity_id: entity_id.to_owned(),
            forecast_type: kind,
        }
        .into_object()?;

        let pending = self.inner.requests.register();
        let id = pending.id();
        // Registered before transmit so the first update cannot be missed.
        let subscription = self.inner.forecasts.subscribe(id, callback);
        self.inner.transmit(body, Some(id))?;
        pending.wait().await?;

        debug!(id, entity_id, %kind, "forecast subscription active");
        Ok(ForecastSubscription {
            id,
            client: self.clone(),
            subscription: Some(subscription),
        })
    }
}

impl std::fmt::Debug for HubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubClient")
            .field("url", &self.inner.config.url.as_str())
            .field("phase", &self.phase())
            .field("entities", &self.inner.store.len())
            .finish_non_exhaustive()
    }
}

fn parse_states(result: Value) -> Result<Vec<EntityState>, CoreError> {
    serde_json::from_value(result).map_err(|e| CoreError::InvalidMessage {
        message: format!("get_states result is not a state list: {e}"),
    })
}

fn into_object(message: Value) -> Result<Map<String, Value>, CoreError> {
    match message {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::InvalidMessage {
            message: format!("expected a JSON object, got {other}"),
        }),
    }
}

// ── ForecastSubscription ─────────────────────────────────────────────

/// Live forecast stream. Dropping it stops local delivery only.
#[must_use = "dropping a ForecastSubscription cancels it"]
pub struct ForecastSubscription {
    id: u64,
    client: HubClient,
    subscription: Option<Subscription>,
}

impl ForecastSubscription {
    /// Correlation id of the subscribing request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop local delivery and ask the hub to end the stream.
    ///
    /// A connection that is already gone took the remote subscription with
    /// it, so that case is not an error.
    pub async fn unsubscribe(mut self) -> Result<(), CoreError> {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        match self
            .client
            .request(OutgoingMessage::UnsubscribeEvents {
                subscription: self.id,
            })
            .await
        {
            Ok(_) => Ok(()),
            Err(CoreError::NotConnected | CoreError::NotAuthenticated) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl std::fmt::Debug for ForecastSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

// ── ClientInner ──────────────────────────────────────────────────────

impl ClientInner {
    // Nothing panics while this lock is held.
    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session().generation == generation
    }

    /// Queue `body` on the open socket, attaching `id` when given.
    fn transmit(&self, mut body: Map<String, Value>, id: Option<u64>) -> Result<(), CoreError> {
        let session = self.session();
        let Link::Open {
            outbound,
            authenticated,
        } = &session.link
        else {
            return Err(CoreError::NotConnected);
        };
        if let Some(id) = id {
            if !authenticated {
                return Err(CoreError::NotAuthenticated);
            }
            body.insert("id".into(), Value::from(id));
        }

        let text = Value::Object(body).to_string();
        trace!(?id, "queueing frame");
        outbound
            .send(Message::text(text))
            .map_err(|_| CoreError::NotConnected)
    }

    async fn request_object(&self, body: Map<String, Value>) -> Result<Value, CoreError> {
        let pending = self.requests.register();
        self.transmit(body, Some(pending.id()))?;
        pending.wait().await
    }

    async fn request(&self, message: OutgoingMessage) -> Result<Value, CoreError> {
        self.request_object(message.into_object()?).await
    }

    async fn fetch_states(&self) -> Result<Vec<EntityState>, CoreError> {
        parse_states(self.request(OutgoingMessage::GetStates).await?)
    }

    // ── Session bookkeeping (generation-checked) ─────────────────────

    /// Run `mutate` under the session lock while `generation` is current.
    ///
    /// A concurrent `disconnect()` then either retires the generation first
    /// (and `mutate` is skipped) or clears shared state after `mutate` is
    /// done. `mutate` must not run callbacks.
    fn with_current<R>(&self, generation: u64, mutate: impl FnOnce() -> R) -> Option<R> {
        let session = self.session();
        (session.generation == generation).then(mutate)
    }

    fn mark_opening(&self, generation: u64) -> bool {
        let mut session = self.session();
        if session.generation != generation {
            return false;
        }
        session.link = Link::Opening;
        true
    }

    fn mark_open(&self, generation: u64, outbound: mpsc::UnboundedSender<Message>) -> bool {
        let mut session = self.session();
        if session.generation != generation {
            return false;
        }
        session.link = Link::Open {
            outbound,
            authenticated: false,
        };
        true
    }

    fn mark_authenticated(&self, generation: u64) -> bool {
        let mut session = self.session();
        if session.generation != generation {
            return false;
        }
        if let Link::Open { authenticated, .. } = &mut session.link {
            *authenticated = true;
        }
        session.attempts = 0;
        true
    }

    /// Drop the link after a session ends. Returns `false` when a newer
    /// `connect()` or `disconnect()` already took over.
    fn end_session(&self, generation: u64) -> bool {
        {
            let mut session = self.session();
            if session.generation != generation {
                return false;
            }
            session.link = Link::Idle;
            session.seed_request = None;
        }
        self.requests.fail_all();
        true
    }

    /// Mark `id` as the seeding `get_states` of this session.
    fn expect_seed(&self, generation: u64, id: u64) -> bool {
        let mut session = self.session();
        if session.generation != generation {
            return false;
        }
        session.seed_request = Some(id);
        true
    }

    fn take_seed(&self, generation: u64, id: u64) -> bool {
        let mut session = self.session();
        if session.generation != generation || session.seed_request != Some(id) {
            return false;
        }
        session.seed_request = None;
        true
    }

    /// Claim the next reconnect attempt, or `None` once the budget is
    /// spent (which also retires the supervisor).
    fn next_attempt(&self, generation: u64) -> Option<(u32, Duration)> {
        let mut session = self.session();
        if session.generation != generation {
            return None;
        }
        let attempt = session.attempts + 1;
        match self.config.reconnect.delay_for(attempt) {
            Some(delay) => {
                session.attempts = attempt;
                Some((attempt, delay))
            }
            None => {
                session.supervisor = None;
                None
            }
        }
    }

    fn retire_supervisor(&self, generation: u64) {
        let mut session = self.session();
        if session.generation == generation {
            session.supervisor = None;
        }
    }

    /// Publish `phase` for a live session. Listeners run after the lock is
    /// released.
    fn broadcast(&self, generation: u64, phase: ConnectionPhase, detail: Option<PhaseDetail>) {
        if self
            .with_current(generation, || self.status.record(phase))
            .is_some()
        {
            self.status.deliver(&StatusChange { phase, detail });
        }
    }

    // ── Inbound frames ───────────────────────────────────────────────

    /// Apply one text frame. Returns `Some` when the frame ends the session.
    fn handle_text(
        self: &Arc<Self>,
        generation: u64,
        text: &str,
        outbound: &mpsc::UnboundedSender<Message>,
        ready: &mut Option<ReadySender>,
    ) -> Option<SessionEnd> {
        let frames = match protocol::decode_frames(text) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return None;
            }
        };

        for frame in frames {
            if !self.is_current(generation) {
                return Some(SessionEnd::Cancelled);
            }
            if let Some(end) = self.handle_frame(generation, frame, outbound, ready) {
                return Some(end);
            }
        }
        None
    }

    fn handle_frame(
        self: &Arc<Self>,
        generation: u64,
        frame: IncomingMessage,
        outbound: &mpsc::UnboundedSender<Message>,
        ready: &mut Option<ReadySender>,
    ) -> Option<SessionEnd> {
        match frame {
            IncomingMessage::AuthRequired { hub_version } => {
                debug!(?hub_version, "hub requested authentication");
                if self.config.credential.is_none() {
                    warn!("no access token configured; the hub will reject authentication");
                }
                let auth = protocol::auth_frame(self.config.credential.as_ref());
                let _ = outbound.send(Message::text(auth));
            }
            IncomingMessage::AuthOk { hub_version } => {
                if !self.mark_authenticated(generation) {
                    return Some(SessionEnd::Cancelled);
                }
                info!(?hub_version, url = %self.config.url, "authenticated with hub");
                self.broadcast(generation, ConnectionPhase::Connected, None);
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Ok(()));
                }
                tokio::spawn(seed(Arc::clone(self), generation));
            }
            IncomingMessage::AuthInvalid { message } => {
                let message = message.unwrap_or_else(|| "Invalid access token".into());
                return Some(SessionEnd::AuthRejected(message));
            }
            IncomingMessage::Result(result) => {
                if self.take_seed(generation, result.id) {
                    self.apply_seed(generation, result);
                } else {
                    self.requests.resolve(result);
                }
            }
            IncomingMessage::Pong { id } => {
                self.requests.resolve_pong(id);
            }
            IncomingMessage::Event(event) => match event.into_hub_event() {
                Ok(event) => self.apply_event(generation, event),
                Err(e) => warn!(error = %e, "dropping malformed event"),
            },
            IncomingMessage::Unknown => trace!("ignoring unknown frame type"),
        }
        None
    }

    /// Replace the snapshot with the seed result before the next frame is
    /// handled, so change events behind it in the stream land on top.
    fn apply_seed(&self, generation: u64, frame: ResultFrame) {
        let id = frame.id;
        let outcome = frame
            .into_outcome()
            .map_err(CoreError::from)
            .and_then(parse_states)
            .and_then(|states| {
                self.with_current(generation, || self.store.apply_full(states))
                    .ok_or(CoreError::ConnectionClosed)
            })
            .map(|changed| {
                for record in &changed {
                    self.entities.notify(&record.entity_id, record);
                }
                info!(
                    entities = self.store.len(),
                    changed = changed.len(),
                    "snapshot seeded"
                );
                Value::from(changed.len())
            });
        self.requests.settle(id, outcome);
    }

    fn apply_event(&self, generation: u64, event: HubEvent) {
        match event {
            HubEvent::StateChanged(change) => match change.new_state {
                Some(state) => {
                    trace!(entity_id = %change.entity_id, state = %state.state, "state changed");
                    let Some(record) =
                        self.with_current(generation, || self.store.apply_change(state))
                    else {
                        return;
                    };
                    self.entities.notify(&record.entity_id, &record);
                }
                None => {
                    debug!(entity_id = %change.entity_id, "entity removed");
                    self.with_current(generation, || self.store.remove(&change.entity_id));
                }
            },
            HubEvent::Forecast {
                subscription,
                payload,
            } => {
                if self.forecasts.notify(&subscription, &payload) == 0 {
                    trace!(subscription, "forecast for inactive subscription");
                }
            }
            HubEvent::Other {
                subscription,
                event_type,
            } => {
                trace!(?subscription, ?event_type, "ignoring event");
            }
        }
    }
}

// ── Supervisor ───────────────────────────────────────────────────────

/// Drive sessions until cancelled, rejected, or out of attempts.
async fn supervise(
    inner: Arc<ClientInner>,
    generation: u64,
    cancel: CancellationToken,
    ready: ReadySender,
) {
    let mut ready = Some(ready);

    loop {
        if !inner.mark_opening(generation) {
            break;
        }
        inner.broadcast(generation, ConnectionPhase::Connecting, None);

        let end = run_session(&inner, generation, &cancel, &mut ready).await;
        if matches!(end, SessionEnd::Cancelled) || !inner.end_session(generation) {
            break;
        }

        match end {
            SessionEnd::Cancelled => break,
            SessionEnd::AuthRejected(message) => {
                warn!(reason = %message, "hub rejected authentication");
                inner.retire_supervisor(generation);
                inner.broadcast(
                    generation,
                    ConnectionPhase::AuthFailed,
                    Some(PhaseDetail::Message(message.clone())),
                );
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Err(CoreError::AuthenticationFailed { message }));
                }
                break;
            }
            SessionEnd::Closed => {
                info!("hub connection closed");
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Err(CoreError::ConnectionClosed));
                }
            }
            SessionEnd::Failed(error) => {
                warn!(error = %error, "hub connection failed");
                inner.broadcast(
                    generation,
                    ConnectionPhase::Error,
                    Some(PhaseDetail::Message(error.to_string())),
                );
                if let Some(ready) = ready.take() {
                    let _ = ready.send(Err(error));
                }
            }
        }

        let Some((attempt, delay)) = inner.next_attempt(generation) else {
            if inner.is_current(generation) {
                warn!(
                    max_retries = inner.config.reconnect.max_retries,
                    "reconnection limit reached, giving up"
                );
                inner.broadcast(generation, ConnectionPhase::Exhausted, None);
            }
            break;
        };

        inner.broadcast(
            generation,
            ConnectionPhase::Reconnecting,
            Some(PhaseDetail::Attempt(attempt)),
        );
        info!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    debug!(generation, "session supervisor exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Open one socket and pump frames until it drops or is cancelled.
async fn run_session(
    inner: &Arc<ClientInner>,
    generation: u64,
    cancel: &CancellationToken,
    ready: &mut Option<ReadySender>,
) -> SessionEnd {
    let url = &inner.config.url;
    let socket = tokio::select! {
        biased;
        () = cancel.cancelled() => return SessionEnd::Cancelled,
        opened = hubsync_api::websocket::open(url) => {
            match opened {
                Ok(socket) => socket,
                Err(e) => {
                    return SessionEnd::Failed(CoreError::ConnectionFailed {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    };

    let (mut write, mut read) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    if !inner.mark_open(generation, outbound_tx.clone()) {
        let _ = write.send(Message::Close(None)).await;
        return SessionEnd::Cancelled;
    }

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return SessionEnd::Cancelled;
            }
            Some(message) = outbound_rx.recv() => {
                if let Err(e) = write.send(message).await {
                    return SessionEnd::Failed(CoreError::ConnectionFailed {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(end) =
                            inner.handle_text(generation, text.as_str(), &outbound_tx, ready)
                        {
                            return end;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(cf) = frame {
                            info!(code = %cf.code, reason = %cf.reason, "close frame received");
                        }
                        return SessionEnd::Closed;
                    }
                    Some(Ok(_)) => {
                        // Binary, Ping, Pong: tungstenite answers pings itself.
                    }
                    Some(Err(e)) => {
                        return SessionEnd::Failed(CoreError::ConnectionFailed {
                            url: url.to_string(),
                            reason: e.to_string(),
                        });
                    }
                    None => return SessionEnd::Closed,
                }
            }
        }
    }
}

// ── Seeding ──────────────────────────────────────────────────────────

/// Subscribe to change events, then request the full snapshot. The read
/// loop applies the answer; this task only reports failures.
async fn seed(inner: Arc<ClientInner>, generation: u64) {
    if let Err(e) = try_seed(&inner, generation).await {
        if inner.is_current(generation) {
            warn!(error = %e, "initial state sync failed");
        }
    }
}

async fn try_seed(inner: &ClientInner, generation: u64) -> Result<(), CoreError> {
    inner
        .request(OutgoingMessage::SubscribeEvents {
            event_type: Some(STATE_CHANGED.into()),
        })
        .await?;

    let pending = inner.requests.register();
    if !inner.expect_seed(generation, pending.id()) {
        return Ok(());
    }
    inner.transmit(OutgoingMessage::GetStates.into_object()?, Some(pending.id()))?;
    pending.wait().await?;
    Ok(())
}
