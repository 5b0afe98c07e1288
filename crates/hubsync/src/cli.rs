//! Clap derive structures for the `hubsync` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use hubsync_core::ForecastKind;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// hubsync -- live state and service calls for a home-automation hub
#[derive(Debug, Parser)]
#[command(
    name = "hubsync",
    version,
    about = "Inspect and drive a home-automation hub from the command line",
    long_about = "Connects to a hub over its WebSocket API, mirrors entity state,\n\
        and exposes listing, watching, service calls, and raw messages.\n\n\
        The endpoint comes from --url, the [hub] table of the config file,\n\
        HUBSYNC_URL / HUBSYNC_TOKEN, or http://localhost:8123, in that order.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Hub URL (overrides the config file and environment)
    #[arg(long, short = 'u', global = true)]
    pub url: Option<String>,

    /// Long-lived access token (overrides the config file and environment)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Config file to use instead of the platform default
    #[arg(long, env = "HUBSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "HUBSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides the config file)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List entity states
    #[command(alias = "ls")]
    States(StatesArgs),

    /// Show one entity's current state
    Get(GetArgs),

    /// Stream state changes for entities until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Invoke a hub service
    Call(CallArgs),

    /// Send a raw JSON message
    Raw(RawArgs),

    /// Measure round-trip time to the hub
    Ping,

    /// Stream weather forecasts for an entity
    Forecast(ForecastArgs),

    /// Inspect and write the configuration
    #[command(alias = "cfg")]
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── States ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatesArgs {
    /// Only entities in this domain (e.g. `light`)
    #[arg(long, short = 'd')]
    pub domain: Option<String>,

    /// Only entities whose id contains this text
    #[arg(long, short = 'f')]
    pub filter: Option<String>,

    /// Only entities currently in this state (e.g. `on`)
    #[arg(long, short = 's')]
    pub state: Option<String>,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Entity id, e.g. `light.kitchen`
    pub entity_id: String,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Entity ids to watch
    #[arg(required = true)]
    pub entity_ids: Vec<String>,

    /// Exit after this many updates
    #[arg(long, short = 'n')]
    pub count: Option<usize>,
}

// ── Services ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Service domain, e.g. `light`
    pub domain: String,

    /// Service name, e.g. `turn_on`
    pub service: String,

    /// Service data as a JSON object
    #[arg(long)]
    pub data: Option<String>,

    /// Target entity; merged into the service data as `entity_id`
    #[arg(long, short = 'e')]
    pub entity: Option<String>,
}

#[derive(Debug, Args)]
pub struct RawArgs {
    /// JSON object, e.g. `{"type":"get_config"}`. The id is assigned.
    pub message: String,

    /// Send without waiting for a result
    #[arg(long)]
    pub no_wait: bool,
}

#[derive(Debug, Args)]
pub struct ForecastArgs {
    /// Weather entity id
    pub entity_id: String,

    /// Forecast granularity
    #[arg(long, short = 'k', default_value = "daily", value_parser = parse_forecast_kind)]
    pub kind: ForecastKind,

    /// Exit after this many forecast updates (0 waits until interrupted)
    #[arg(long, short = 'n', default_value = "1")]
    pub count: usize,
}

fn parse_forecast_kind(value: &str) -> Result<ForecastKind, String> {
    value
        .parse()
        .map_err(|_| format!("expected one of: daily, hourly, twice_daily (got '{value}')"))
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the resolved endpoint and connection settings
    Show,

    /// Print the config file path
    Path,

    /// Write a config file with the given endpoint and token
    Init {
        /// Hub URL to store
        #[arg(long)]
        hub_url: String,

        /// Access token to store
        #[arg(long)]
        hub_token: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
