// ── Core error types ──
//
// User-facing errors from hubsync-core. Consumers never see raw socket or
// JSON errors; the `From<hubsync_api::Error>` impl translates them.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to hub at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The socket is not open.
    #[error("Not connected to hub")]
    NotConnected,

    /// The socket is open but the hub has not accepted the credential yet.
    #[error("Connection to hub is not authenticated")]
    NotAuthenticated,

    /// The connection went away while a request was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    // ── Request errors ───────────────────────────────────────────────
    #[error("Request {id} timed out after {timeout_ms}ms")]
    Timeout { id: u64, timeout_ms: u64 },

    #[error("Request failed: {message}")]
    RequestFailed {
        message: String,
        /// Hub-specific error code (e.g. `"not_found"`).
        code: Option<String>,
    },

    #[error("Invalid message: {message}")]
    InvalidMessage { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Returns `true` for failures caused by the connection rather than by
    /// the request itself.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::NotConnected
                | Self::NotAuthenticated
                | Self::ConnectionClosed
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hubsync_api::Error> for CoreError {
    fn from(err: hubsync_api::Error) -> Self {
        match err {
            hubsync_api::Error::InvalidUrl(e) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("Invalid URL: {e}"),
            },
            hubsync_api::Error::UnsupportedScheme(_) | hubsync_api::Error::MissingOrigin => {
                CoreError::ConnectionFailed {
                    url: String::new(),
                    reason: err.to_string(),
                }
            }
            hubsync_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket connection failed: {reason}"),
            },
            hubsync_api::Error::WebSocketClosed { code, reason } => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("WebSocket closed (code {code}): {reason}"),
            },
            hubsync_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            hubsync_api::Error::Serialization(e) => CoreError::InvalidMessage {
                message: e.to_string(),
            },
        }
    }
}

impl From<hubsync_api::RemoteError> for CoreError {
    fn from(err: hubsync_api::RemoteError) -> Self {
        CoreError::RequestFailed {
            message: err.message.unwrap_or_else(|| "Unknown error".into()),
            code: err.code,
        }
    }
}
