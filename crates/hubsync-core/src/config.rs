// ── Runtime connection configuration ──
//
// Describes *where* and *how* to connect to a hub. Core never reads config
// files or the environment; `hubsync-config` resolves those and hands a
// `HubConfig` in.

use std::time::Duration;

use hubsync_api::ReconnectConfig;
use secrecy::SecretString;
use url::Url;

/// Default time a request may wait for its `result` frame.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for one hub connection.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// WebSocket URL (`ws://…/api/websocket` or `wss://…`).
    pub url: Url,
    /// Access token sent in the `auth` frame. `None` sends an empty token.
    pub credential: Option<SecretString>,
    /// How long a request may wait for its response.
    pub request_timeout: Duration,
    /// Backoff policy for reconnecting after the socket drops.
    pub reconnect: ReconnectConfig,
}

impl HubConfig {
    pub fn new(url: Url, credential: Option<SecretString>) -> Self {
        Self {
            url,
            credential,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}
