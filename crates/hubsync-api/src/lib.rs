// hubsync-api: wire protocol and socket plumbing for home-automation hub WebSocket APIs

pub mod error;
pub mod protocol;
pub mod websocket;

pub use error::Error;
pub use protocol::{
    EntityState, EventFrame, ForecastKind, HubEvent, IncomingMessage, OutgoingMessage,
    RemoteError, ResultFrame, StateChange,
};
pub use websocket::{HubSocket, ReconnectConfig};
