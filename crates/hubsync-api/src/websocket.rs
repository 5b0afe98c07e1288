//! WebSocket plumbing: endpoint derivation, socket open, and the
//! reconnect backoff policy.
//!
//! The session loop that drives a socket lives in `hubsync-core`; this
//! module only knows how to reach the hub and how long to wait between
//! attempts.
//!
//! # Example
//!
//! ```rust,ignore
//! use hubsync_api::websocket::{self, ReconnectConfig};
//!
//! let url = websocket::websocket_url("http://hub.local:8123", None)?;
//! let socket = websocket::open(&url).await?;
//!
//! let policy = ReconnectConfig::default();
//! assert_eq!(policy.delay_for(1), Some(std::time::Duration::from_secs(1)));
//! ```

use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;

/// Path of the hub's WebSocket API, relative to the endpoint root.
pub const WEBSOCKET_PATH: &str = "/api/websocket";

/// A connected client socket.
pub type HubSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ── Endpoint derivation ──────────────────────────────────────────────

/// Derive the WebSocket URL for an endpoint.
///
/// `http` becomes `ws` and `https` becomes `wss`; socket schemes are kept.
/// An empty `endpoint` means the hub is served from the same origin as the
/// consumer: the socket URL is then built from `origin`, keeping its path
/// so a reverse-proxy prefix survives.
pub fn websocket_url(endpoint: &str, origin: Option<&Url>) -> Result<Url, Error> {
    let endpoint = endpoint.trim();

    let base = if endpoint.is_empty() {
        origin.ok_or(Error::MissingOrigin)?.clone()
    } else {
        Url::parse(endpoint)?
    };

    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(Error::UnsupportedScheme(other.to_owned())),
    };

    let prefix = base.path().trim_end_matches('/');
    let path = if prefix.ends_with(WEBSOCKET_PATH) {
        prefix.to_owned()
    } else {
        format!("{prefix}{WEBSOCKET_PATH}")
    };

    let mut url = base.clone();
    // ws/wss are "special" schemes like http/https, so this cannot fail for
    // the schemes matched above.
    url.set_scheme(scheme)
        .map_err(|()| Error::UnsupportedScheme(base.scheme().to_owned()))?;
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

// ── Socket open ──────────────────────────────────────────────────────

/// Open a WebSocket to the hub. Authentication happens on top of the
/// returned socket.
pub async fn open(url: &Url) -> Result<HubSocket, Error> {
    tracing::info!(url = %url, "Connecting to WebSocket");

    let uri: tungstenite::http::Uri = url
        .as_str()
        .parse()
        .map_err(|e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()))?;

    let (socket, _response) = tokio_tungstenite::connect_async(ClientRequestBuilder::new(uri))
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

    tracing::info!("WebSocket connected");
    Ok(socket)
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Reconnection attempts before giving up. Default: 10.
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: 10,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnection attempt `attempt` (1-based), or `None`
    /// once the attempt budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        Some(calculate_backoff(attempt - 1, self))
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff: `min(initial * 2^exponent, max)`, without jitter.
fn calculate_backoff(exponent: u32, config: &ReconnectConfig) -> Duration {
    let factor = 2_u32.checked_pow(exponent).unwrap_or(u32::MAX);
    config
        .initial_delay
        .checked_mul(factor)
        .map_or(config.max_delay, |d| d.min(config.max_delay))
}

// ── Tests ────────────────────────────────────────────────────────────
