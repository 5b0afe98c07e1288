//! Shared helpers for command handlers.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use hubsync_core::{EntityState, HubClient};
use serde_json::{Map, Value};

use crate::config;
use crate::error::CliError;

/// Wait until the initial snapshot has been loaded.
pub async fn wait_seeded(client: &HubClient) -> Result<(), CliError> {
    let limit = config::seed_wait(client.config());
    tokio::time::timeout(limit, client.store().wait_ready())
        .await
        .map_err(|_| CliError::Timeout {
            millis: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        })
}

/// Parse `raw` as a JSON object; `field` names the argument in errors.
pub fn parse_object(raw: &str, field: &str) -> Result<Map<String, Value>, CliError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(CliError::Validation {
            field: field.into(),
            reason: format!("expected a JSON object, got {other}"),
        }),
    }
}

pub fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Render an attribute value for a table cell: strings bare, the rest as JSON.
pub fn attribute_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Key/value detail view of one entity.
pub fn entity_detail(state: &Arc<EntityState>, color: bool) -> String {
    let mut lines = vec![
        format!("Entity:        {}", state.entity_id),
        format!(
            "State:         {}",
            crate::output::paint_state(&state.state, color)
        ),
    ];
    if let Some(name) = state.friendly_name() {
        lines.push(format!("Name:          {name}"));
    }
    lines.push(format!("Last changed:  {}", format_time(state.last_changed)));
    lines.push(format!("Last updated:  {}", format_time(state.last_updated)));
    if !state.attributes.is_empty() {
        lines.push("Attributes:".into());
        let mut pairs: Vec<_> = state.attributes.iter().collect();
        pairs.sort_by_key(|(key, _)| *key);
        for (key, value) in pairs {
            lines.push(format!("  {key}: {}", attribute_text(value)));
        }
    }
    lines.join("\n")
}
