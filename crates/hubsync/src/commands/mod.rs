//! Command dispatch: bridges CLI args -> client calls -> output formatting.

pub mod call;
pub mod config_cmd;
pub mod forecast;
pub mod states;
pub mod util;
pub mod watch;

use hubsync_core::HubClient;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a hub-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    client: &HubClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::States(args) => states::list(client, &args, global).await,
        Command::Get(args) => states::get(client, &args, global).await,
        Command::Watch(args) => watch::handle(client, &args, global).await,
        Command::Call(args) => call::service(client, args, global).await,
        Command::Raw(args) => call::raw(client, &args, global).await,
        Command::Ping => call::ping(client, global).await,
        Command::Forecast(args) => forecast::handle(client, &args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
