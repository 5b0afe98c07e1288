//! Entity state listing and lookup.

use std::sync::Arc;

use hubsync_core::{EntityState, HubClient};
use tabled::Tabled;

use crate::cli::{GetArgs, GlobalOpts, StatesArgs};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Entity")]
    entity_id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Last Changed")]
    last_changed: String,
}

impl StateRow {
    fn new(s: &Arc<EntityState>, color: bool) -> Self {
        Self {
            entity_id: s.entity_id.clone(),
            state: output::paint_state(&s.state, color),
            name: s.friendly_name().unwrap_or_default().to_owned(),
            last_changed: util::format_time(s.last_changed),
        }
    }
}

fn matches(state: &EntityState, args: &StatesArgs) -> bool {
    args.filter
        .as_deref()
        .is_none_or(|f| state.entity_id.contains(f))
        && args.state.as_deref().is_none_or(|want| state.state == want)
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn list(
    client: &HubClient,
    args: &StatesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    util::wait_seeded(client).await?;

    let mut states = match &args.domain {
        Some(domain) => client.states_in_domain(domain),
        None => client.states(),
    };
    states.retain(|s| matches(s, args));

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &states,
        |s| StateRow::new(s, color),
        |s| s.entity_id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn get(client: &HubClient, args: &GetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let state = client
        .get_state(&args.entity_id)
        .await?
        .ok_or_else(|| CliError::NotFound {
            entity_id: args.entity_id.clone(),
        })?;

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &state,
        |s| util::entity_detail(s, color),
        |s| s.state.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
