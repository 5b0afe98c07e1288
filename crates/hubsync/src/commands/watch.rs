//! Live entity updates until interrupted.

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::select_all;
use hubsync_core::{EntityState, EntityStream, HubClient};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(client: &HubClient, args: &WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let quiet = global.quiet;
    let _phases = client.on_connection_change(move |change| {
        if !quiet {
            eprintln!("{}", output::describe_phase(change, color));
        }
    });
    let mut phase = client.connection_state();

    util::wait_seeded(client).await?;

    let streams: Vec<EntityStream> = args
        .entity_ids
        .iter()
        .map(|id| client.entity_stream(id.clone()))
        .collect();
    for stream in &streams {
        match stream.current() {
            Some(state) => print_update(state, global, color),
            None => tracing::warn!(entity_id = stream.entity_id(), "entity not in snapshot yet"),
        }
    }

    let mut updates = select_all(streams);
    let mut seen = 0usize;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                break;
            }
            changed = phase.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *phase.borrow_and_update();
                if current.is_terminal() {
                    return Err(CliError::ConnectionLost {
                        reason: format!("connection is {current}"),
                    });
                }
            }
            next = updates.next() => {
                let Some(state) = next else { break };
                print_update(&state, global, color);
                seen += 1;
                if args.count.is_some_and(|n| seen >= n) {
                    break;
                }
            }
        }
    }
    Ok(())
}

/// One update per line: text for `table`/`plain`, NDJSON for `json*`.
fn print_update(state: &Arc<EntityState>, global: &GlobalOpts, color: bool) {
    let line = match global.output {
        OutputFormat::Table => format!(
            "{}  {}  {}",
            util::format_time(state.last_updated),
            state.entity_id,
            output::paint_state(&state.state, color)
        ),
        OutputFormat::Plain => format!("{} {}", state.entity_id, state.state),
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json_compact(state),
        OutputFormat::Yaml => format!("---\n{}", output::render_yaml(state).trim_end()),
    };
    output::print_output(&line, global.quiet);
}
