//! Wire types for the hub's JSON WebSocket protocol.
//!
//! Inbound frames are tagged by `type` (`auth_required`, `auth_ok`,
//! `auth_invalid`, `result`, `event`, `pong`). Outbound requests carry a
//! `type` plus request-specific fields; the correlation `id` is attached
//! by the caller that owns the id counter, never by these types.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

/// Event type carried by entity change notifications.
pub const STATE_CHANGED: &str = "state_changed";

// ── EntityState ──────────────────────────────────────────────────────

/// The latest known record for one hub entity.
///
/// Records are replaced wholesale on every change; `attributes` is kept
/// as an open JSON map because its shape depends on the entity's domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Stable identifier, `"<domain>.<object_id>"`.
    pub entity_id: String,

    /// Primary value, e.g. `"on"`, `"21.5"`, `"unavailable"`.
    pub state: String,

    /// Domain-specific extra fields.
    #[serde(default)]
    pub attributes: Map<String, Value>,

    /// Last time `state` itself transitioned.
    #[serde(default)]
    pub last_changed: Option<DateTime<Utc>>,

    /// Last time the record was refreshed, including attribute-only changes.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl EntityState {
    /// Build a bare record with no attributes or timestamps.
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
            last_changed: None,
            last_updated: None,
            context: None,
        }
    }

    /// Attach an attribute (builder style).
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The domain prefix, e.g. `"light"` for `"light.kitchen"`.
    pub fn domain(&self) -> &str {
        split_entity_id(&self.entity_id).0
    }

    /// The part after the domain prefix.
    pub fn object_id(&self) -> &str {
        split_entity_id(&self.entity_id).1
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(Value::as_str)
    }
}

/// Split `"light.kitchen"` into `("light", "kitchen")`.
///
/// An id without a dot is treated as a bare domain with an empty object id.
pub fn split_entity_id(entity_id: &str) -> (&str, &str) {
    entity_id.split_once('.').unwrap_or((entity_id, ""))
}

// ── Inbound frames ───────────────────────────────────────────────────

/// One decoded frame received from the hub.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IncomingMessage {
    AuthRequired {
        #[serde(default, rename = "ha_version")]
        hub_version: Option<String>,
    },
    AuthOk {
        #[serde(default, rename = "ha_version")]
        hub_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result(ResultFrame),
    Event(EventFrame),
    Pong {
        id: u64,
    },
    #[serde(other)]
    Unknown,
}

/// Response to a correlated request.
#[derive(Debug, Clone, Deserialize)]
pub struct ResultFrame {
    pub id: u64,
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RemoteError>,
}

impl ResultFrame {
    /// Collapse the frame into the payload or the hub's error.
    pub fn into_outcome(self) -> Result<Value, RemoteError> {
        if self.success {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(self.error.unwrap_or_default())
        }
    }
}

/// Error body of a failed `result` frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// An `event` frame. `id` is the correlation id of the subscription that
/// produced it.
#[derive(Debug, Clone, Deserialize)]
pub struct EventFrame {
    #[serde(default)]
    pub id: Option<u64>,
    pub event: Value,
}

/// Classified content of an [`EventFrame`].
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// An entity's record changed (or was removed, when `new_state` is `None`).
    StateChanged(StateChange),
    /// A forecast update for the subscription with this correlation id.
    Forecast { subscription: u64, payload: Value },
    /// Any other event the client does not interpret.
    Other {
        subscription: Option<u64>,
        event_type: Option<String>,
    },
}

/// `data` of a `state_changed` event.
#[derive(Debug, Clone, Deserialize)]
pub struct StateChange {
    pub entity_id: String,
    #[serde(default)]
    pub new_state: Option<EntityState>,
    #[serde(default)]
    pub old_state: Option<EntityState>,
}

#[derive(Deserialize)]
struct StateChangedEnvelope {
    data: StateChange,
}

impl EventFrame {
    /// Interpret the event payload.
    ///
    /// Payloads carrying a `forecast` key are routed by the frame's id;
    /// everything else is keyed by `event_type`.
    pub fn into_hub_event(self) -> Result<HubEvent, Error> {
        if let Some(subscription) = self.id {
            if self.event.get("forecast").is_some() {
                return Ok(HubEvent::Forecast {
                    subscription,
                    payload: self.event,
                });
            }
        }

        let event_type = self.event.get("event_type").and_then(Value::as_str);
        if event_type == Some(STATE_CHANGED) {
            let envelope = StateChangedEnvelope::deserialize(&self.event).map_err(|e| {
                Error::Deserialization {
                    message: e.to_string(),
                    body: self.event.to_string(),
                }
            })?;
            return Ok(HubEvent::StateChanged(envelope.data));
        }

        Ok(HubEvent::Other {
            subscription: self.id,
            event_type: event_type.map(String::from),
        })
    }
}

/// Decode one text frame into one or more messages.
///
/// Hubs that coalesce messages send a JSON array; each element is
/// returned in order.
pub fn decode_frames(text: &str) -> Result<Vec<IncomingMessage>, Error> {
    let deserialization = |e: serde_json::Error| Error::Deserialization {
        message: e.to_string(),
        body: text.to_owned(),
    };

    let value: Value = serde_json::from_str(text).map_err(deserialization)?;
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(deserialization))
            .collect(),
        single => Ok(vec![serde_json::from_value(single).map_err(deserialization)?]),
    }
}

// ── Outbound messages ────────────────────────────────────────────────

/// Forecast granularity for `weather/subscribe_forecast`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ForecastKind {
    Daily,
    Hourly,
    TwiceDaily,
}

/// Requests the client knows how to build. Raw JSON objects can be sent
/// as well for commands not covered here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutgoingMessage {
    SubscribeEvents {
        #[serde(skip_serializing_if = "Option::is_none")]
        event_type: Option<String>,
    },
    UnsubscribeEvents {
        subscription: u64,
    },
    GetStates,
    CallService {
        domain: String,
        service: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        service_data: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<Value>,
    },
    #[serde(rename = "weather/subscribe_forecast")]
    SubscribeForecast {
        entity_id: String,
        forecast_type: ForecastKind,
    },
    Ping,
}

impl OutgoingMessage {
    /// Encode as a JSON object ready for an `id` to be attached.
    pub fn into_object(self) -> Result<Map<String, Value>, Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            // Every variant is a tagged struct or unit, so this is unreachable
            // in practice; report it rather than panic.
            other => Err(Error::Deserialization {
                message: "outgoing message did not encode as an object".into(),
                body: other.to_string(),
            }),
        }
    }
}

/// The unauthenticated handshake frame.
///
/// A missing credential is sent as an empty token; the hub answers with
/// `auth_invalid`.
pub fn auth_frame(credential: Option<&SecretString>) -> String {
    let token = credential.map_or("", |c| c.expose_secret());
    serde_json::json!({ "type": "auth", "access_token": token }).to_string()
}
