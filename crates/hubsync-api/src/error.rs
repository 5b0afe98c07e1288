use thiserror::Error;

/// Top-level error type for the `hubsync-api` crate.
///
/// Covers endpoint parsing, the WebSocket transport, and frame
/// (de)serialization. `hubsync-core` maps these into user-facing errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Endpoint ────────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The endpoint uses a scheme that has no WebSocket equivalent.
    #[error("Unsupported endpoint scheme '{0}' (expected http, https, ws, or wss)")]
    UnsupportedScheme(String),

    /// Same-origin deployment requested but no origin is known.
    #[error("Endpoint is empty and no origin URL is configured")]
    MissingOrigin,

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// WebSocket closed by the hub.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw frame for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An outbound message could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. }
        )
    }
}
