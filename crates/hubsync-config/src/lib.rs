//! Shared configuration for hubsync consumers.
//!
//! Layered endpoint + credential resolution (runtime config, environment,
//! built-in fallback), TOML/env config loading, and translation to
//! `hubsync_core::HubConfig`. The CLI layers its flag overrides on top.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use hubsync_core::{HubConfig, ReconnectConfig};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable naming the hub endpoint.
pub const URL_VAR: &str = "HUBSYNC_URL";
/// Environment variable carrying the access token.
pub const TOKEN_VAR: &str = "HUBSYNC_TOKEN";
/// Environment variable overriding the config file location.
pub const CONFIG_VAR: &str = "HUBSYNC_CONFIG";
/// Endpoint used when nothing else is configured.
pub const FALLBACK_ENDPOINT: &str = "http://localhost:8123";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Runtime-injected endpoint and credentials.
    #[serde(default)]
    pub hub: RuntimeConfig,

    /// Connection tuning.
    #[serde(default)]
    pub client: ClientSettings,

    /// Origin the consumer is served from. Used to build the socket URL
    /// when the endpoint is empty (same-origin deployment).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Endpoint and credentials supplied at runtime (config file `[hub]`
/// table or command-line overrides).
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Long-lived access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Token injected by a supervising host; used when `token` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supervisor_token: Option<String>,
}

impl fmt::Debug for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("RuntimeConfig")
            .field("url", &self.url)
            .field("token", &redact(&self.token))
            .field("supervisor_token", &redact(&self.supervisor_token))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientSettings {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_reconnect_initial_delay_ms")]
    pub reconnect_initial_delay_ms: u64,

    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_initial_delay_ms: default_reconnect_initial_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}
fn default_max_reconnect_attempts() -> u32 {
    10
}
fn default_reconnect_initial_delay_ms() -> u64 {
    1_000
}
fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path: `HUBSYNC_CONFIG`, else the platform
/// config directory.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_VAR).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("dev", "hubsync", "hubsync").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("hubsync");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load Config from `path` layered over defaults, with `HUBSYNC_`
/// environment overrides (`__` separates nesting levels). A missing file
/// is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HUBSYNC_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Endpoint resolution ─────────────────────────────────────────────

/// Which layer supplied the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSource {
    Runtime,
    Environment,
    Fallback,
}

impl fmt::Display for EndpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Runtime => "runtime config",
            Self::Environment => "environment",
            Self::Fallback => "built-in fallback",
        })
    }
}

/// A resolved hub endpoint. An empty `endpoint` means same-origin.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub endpoint: String,
    pub credential: Option<SecretString>,
    pub source: EndpointSource,
}

/// Pick the endpoint and credential. First match wins:
///
/// 1. `runtime` with a non-empty `url`; its `token`, else its
///    `supervisor_token`.
/// 2. `HUBSYNC_URL` / `HUBSYNC_TOKEN` as returned by `env`. A present but
///    empty URL selects same-origin.
/// 3. [`FALLBACK_ENDPOINT`] with no credential.
///
/// A missing credential is not an error; the hub rejects the handshake.
pub fn resolve_endpoint<F>(runtime: Option<&RuntimeConfig>, env: F) -> Endpoint
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(runtime) = runtime {
        if let Some(url) = non_empty(runtime.url.as_deref()) {
            let credential = non_empty(runtime.token.as_deref())
                .or_else(|| non_empty(runtime.supervisor_token.as_deref()))
                .map(secret);
            return Endpoint {
                endpoint: url.to_owned(),
                credential,
                source: EndpointSource::Runtime,
            };
        }
    }

    if let Some(url) = env(URL_VAR) {
        return Endpoint {
            endpoint: url.trim().to_owned(),
            credential: non_empty(env(TOKEN_VAR).as_deref()).map(secret),
            source: EndpointSource::Environment,
        };
    }

    Endpoint {
        endpoint: FALLBACK_ENDPOINT.to_owned(),
        credential: None,
        source: EndpointSource::Fallback,
    }
}

/// Process environment, falling back to values baked in at build time.
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok().or_else(|| build_env(name))
}

fn build_env(name: &str) -> Option<String> {
    match name {
        URL_VAR => option_env!("HUBSYNC_URL").map(String::from),
        TOKEN_VAR => option_env!("HUBSYNC_TOKEN").map(String::from),
        _ => None,
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_owned())
}

// ── Translation to HubConfig ────────────────────────────────────────

/// Build a `HubConfig` from loaded settings and a resolved endpoint.
pub fn hub_config(config: &Config, endpoint: &Endpoint) -> Result<HubConfig, ConfigError> {
    let origin = config
        .origin
        .as_deref()
        .map(Url::parse)
        .transpose()
        .map_err(|e| ConfigError::Validation {
            field: "origin".into(),
            reason: e.to_string(),
        })?;

    let url = hubsync_api::websocket::websocket_url(&endpoint.endpoint, origin.as_ref()).map_err(
        |e| ConfigError::Validation {
            field: "url".into(),
            reason: e.to_string(),
        },
    )?;

    let client = &config.client;
    if client.request_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            field: "client.request_timeout_secs".into(),
            reason: "must be greater than zero".into(),
        });
    }
    if client.reconnect_max_delay_ms < client.reconnect_initial_delay_ms {
        return Err(ConfigError::Validation {
            field: "client.reconnect_max_delay_ms".into(),
            reason: format!(
                "must be at least reconnect_initial_delay_ms ({})",
                client.reconnect_initial_delay_ms
            ),
        });
    }

    let reconnect = ReconnectConfig {
        initial_delay: Duration::from_millis(client.reconnect_initial_delay_ms),
        max_delay: Duration::from_millis(client.reconnect_max_delay_ms),
        max_retries: client.max_reconnect_attempts,
    };

    Ok(HubConfig::new(url, endpoint.credential.clone())
        .with_request_timeout(Duration::from_secs(client.request_timeout_secs))
        .with_reconnect(reconnect))
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn runtime(url: &str, token: Option<&str>, supervisor: Option<&str>) -> RuntimeConfig {
        RuntimeConfig {
            url: Some(url.into()),
            token: token.map(String::from),
            supervisor_token: supervisor.map(String::from),
        }
    }

    fn credential(endpoint: &Endpoint) -> Option<&str> {
        endpoint.credential.as_ref().map(|c| c.expose_secret())
    }

    #[test]
    fn runtime_config_wins() {
        let rt = runtime("http://hub.lan:8123", Some("rt-token"), None);
        let env = env_of(&[(URL_VAR, "http://env:8123"), (TOKEN_VAR, "env-token")]);

        let endpoint = resolve_endpoint(Some(&rt), env);
        assert_eq!(endpoint.source, EndpointSource::Runtime);
        assert_eq!(endpoint.endpoint, "http://hub.lan:8123");
        assert_eq!(credential(&endpoint), Some("rt-token"));
    }

    #[test]
    fn runtime_falls_back_to_supervisor_token() {
        let rt = runtime("http://hub.lan:8123", None, Some("sup"));
        let endpoint = resolve_endpoint(Some(&rt), no_env);
        assert_eq!(credential(&endpoint), Some("sup"));

        let rt = runtime("http://hub.lan:8123", Some("  "), Some("sup"));
        assert_eq!(credential(&resolve_endpoint(Some(&rt), no_env)), Some("sup"));
    }

    #[test]
    fn runtime_without_url_defers_to_environment() {
        let rt = RuntimeConfig {
            url: Some(String::new()),
            token: Some("ignored".into()),
            supervisor_token: None,
        };
        let env = env_of(&[(URL_VAR, "https://env.example"), (TOKEN_VAR, "env-token")]);

        let endpoint = resolve_endpoint(Some(&rt), env);
        assert_eq!(endpoint.source, EndpointSource::Environment);
        assert_eq!(endpoint.endpoint, "https://env.example");
        assert_eq!(credential(&endpoint), Some("env-token"));
    }

    #[test]
    fn empty_environment_url_means_same_origin() {
        let endpoint = resolve_endpoint(None, env_of(&[(URL_VAR, "")]));
        assert_eq!(endpoint.source, EndpointSource::Environment);
        assert_eq!(endpoint.endpoint, "");
        assert!(endpoint.credential.is_none());
    }

    #[test]
    fn fallback_has_no_credential() {
        let endpoint = resolve_endpoint(None, env_of(&[(TOKEN_VAR, "orphan")]));
        assert_eq!(endpoint.source, EndpointSource::Fallback);
        assert_eq!(endpoint.endpoint, FALLBACK_ENDPOINT);
        assert!(endpoint.credential.is_none());
    }

    #[test]
    fn hub_config_derives_socket_url_and_tuning() {
        let mut config = Config::default();
        config.client.request_timeout_secs = 3;
        config.client.max_reconnect_attempts = 4;
        let endpoint = resolve_endpoint(None, no_env);

        let hub = hub_config(&config, &endpoint).unwrap();
        assert_eq!(hub.url.as_str(), "ws://localhost:8123/api/websocket");
        assert_eq!(hub.request_timeout, Duration::from_secs(3));
        assert_eq!(hub.reconnect.max_retries, 4);
        assert_eq!(hub.reconnect.initial_delay, Duration::from_secs(1));
        assert_eq!(hub.reconnect.max_delay, Duration::from_secs(30));
    }

    #[test]
    fn same_origin_uses_configured_origin() {
        let config = Config {
            origin: Some("https://home.example/hub/".into()),
            ..Config::default()
        };
        let endpoint = resolve_endpoint(None, env_of(&[(URL_VAR, "")]));

        let hub = hub_config(&config, &endpoint).unwrap();
        assert_eq!(hub.url.as_str(), "wss://home.example/hub/api/websocket");
    }

    #[test]
    fn same_origin_without_origin_is_rejected() {
        let endpoint = resolve_endpoint(None, env_of(&[(URL_VAR, "")]));
        let err = hub_config(&Config::default(), &endpoint).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "url"));
    }

    #[test]
    fn invalid_tuning_is_rejected() {
        let mut config = Config::default();
        config.client.reconnect_max_delay_ms = 10;
        let endpoint = resolve_endpoint(None, no_env);
        assert!(hub_config(&config, &endpoint).is_err());
    }

    #[test]
    fn load_config_reads_toml_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [hub]
            url = "http://hub.lan:8123"
            token = "abc"

            [client]
            max_reconnect_attempts = 3
            "#,
        )
        .unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.hub.url.as_deref(), Some("http://hub.lan:8123"));
        assert_eq!(config.hub.token.as_deref(), Some("abc"));
        assert_eq!(config.client.max_reconnect_attempts, 3);
        assert_eq!(config.client.request_timeout_secs, 10);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.client, ClientSettings::default());
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            hub: runtime("http://hub.lan:8123", Some("abc"), None),
            client: ClientSettings {
                request_timeout_secs: 5,
                ..ClientSettings::default()
            },
            origin: None,
        };

        save_config(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.client.request_timeout_secs, 5);
        assert_eq!(loaded.hub.token.as_deref(), Some("abc"));
    }

    #[test]
    fn runtime_debug_redacts_tokens() {
        let rt = runtime("http://hub.lan:8123", Some("super-secret"), None);
        let rendered = format!("{rt:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
