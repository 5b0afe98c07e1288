//! Config subcommand handlers. None of these open a connection.

use hubsync_config::{Config, RuntimeConfig};
use serde::Serialize;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

/// What `config show` reports. Never includes the credential itself.
#[derive(Debug, Serialize)]
struct ResolvedConfig {
    config_file: String,
    endpoint: String,
    source: String,
    websocket_url: String,
    credential: bool,
    request_timeout_secs: u64,
    max_reconnect_attempts: u32,
    reconnect_initial_delay_ms: u64,
    reconnect_max_delay_ms: u64,
}

impl ResolvedConfig {
    fn detail(&self) -> String {
        let endpoint = if self.endpoint.is_empty() {
            "(same origin)"
        } else {
            self.endpoint.as_str()
        };
        [
            format!("Config file:       {}", self.config_file),
            format!("Endpoint:          {endpoint}"),
            format!("Source:            {}", self.source),
            format!("WebSocket URL:     {}", self.websocket_url),
            format!(
                "Credential:        {}",
                if self.credential { "set" } else { "not set" }
            ),
            format!("Request timeout:   {}s", self.request_timeout_secs),
            format!(
                "Reconnect:         {} attempts, {}ms..{}ms",
                self.max_reconnect_attempts,
                self.reconnect_initial_delay_ms,
                self.reconnect_max_delay_ms
            ),
        ]
        .join("\n")
    }
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let endpoint = config::resolve(&cfg, global);
            let hub = hubsync_config::hub_config(&cfg, &endpoint)?;

            let resolved = ResolvedConfig {
                config_file: config::config_path(global).display().to_string(),
                endpoint: endpoint.endpoint.clone(),
                source: endpoint.source.to_string(),
                websocket_url: hub.url.to_string(),
                credential: endpoint.credential.is_some(),
                request_timeout_secs: cfg.client.request_timeout_secs,
                max_reconnect_attempts: cfg.client.max_reconnect_attempts,
                reconnect_initial_delay_ms: cfg.client.reconnect_initial_delay_ms,
                reconnect_max_delay_ms: cfg.client.reconnect_max_delay_ms,
            };
            let out = output::render_single(
                &global.output,
                &resolved,
                ResolvedConfig::detail,
                |r| r.websocket_url.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(
                &config::config_path(global).display().to_string(),
                global.quiet,
            );
            Ok(())
        }

        ConfigCommand::Init {
            hub_url,
            hub_token,
            force,
        } => {
            let path = config::config_path(global);
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }

            let cfg = Config {
                hub: RuntimeConfig {
                    url: Some(hub_url),
                    token: hub_token,
                    supervisor_token: None,
                },
                ..Config::default()
            };
            // Refuse to write something that would not resolve.
            let endpoint =
                hubsync_config::resolve_endpoint(Some(&cfg.hub), hubsync_config::process_env);
            hubsync_config::hub_config(&cfg, &endpoint)?;
            hubsync_config::save_config(&cfg, &path)?;

            if !global.quiet {
                eprintln!("Config written to {}", path.display());
            }
            Ok(())
        }
    }
}
