//! CLI-side configuration: loads the shared config and layers the global
//! flags on top before endpoint resolution.

use std::path::PathBuf;
use std::time::Duration;

use hubsync_config::{Config, Endpoint};
use hubsync_core::HubConfig;
use secrecy::SecretString;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file the CLI reads: `--config`, else the shared default.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(hubsync_config::config_path)
}

/// Load the config file and apply `--url` and `--timeout`.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = hubsync_config::load_config_from(&config_path(global))?;
    if let Some(url) = &global.url {
        cfg.hub.url = Some(url.clone());
        // A URL from the command line never pairs with a file token
        // meant for a different hub.
        cfg.hub.token = None;
        cfg.hub.supervisor_token = None;
    }
    if let Some(secs) = global.timeout {
        cfg.client.request_timeout_secs = secs;
    }
    Ok(cfg)
}

/// Resolve the endpoint for `cfg` against the process environment.
///
/// `--token` replaces the credential of whichever source won.
pub fn resolve(cfg: &Config, global: &GlobalOpts) -> Endpoint {
    let mut endpoint =
        hubsync_config::resolve_endpoint(Some(&cfg.hub), hubsync_config::process_env);
    if let Some(token) = &global.token {
        endpoint.credential = Some(SecretString::from(token.clone()));
    }
    endpoint
}

/// Everything needed to construct a client.
pub fn hub_config(global: &GlobalOpts) -> Result<HubConfig, CliError> {
    let cfg = load(global)?;
    let endpoint = resolve(&cfg, global);
    tracing::debug!(
        endpoint = %endpoint.endpoint,
        source = %endpoint.source,
        credential = endpoint.credential.is_some(),
        "resolved hub endpoint"
    );
    Ok(hubsync_config::hub_config(&cfg, &endpoint)?)
}

/// How long to wait for the initial snapshot before giving up.
pub fn seed_wait(config: &HubConfig) -> Duration {
    config.request_timeout * 2
}
