//! Weather forecast streaming.

use hubsync_core::HubClient;
use serde_json::Value;
use tabled::Tabled;
use tokio::sync::mpsc;

use crate::cli::{ForecastArgs, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct ForecastRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Condition")]
    condition: String,
    #[tabled(rename = "Temp")]
    temperature: String,
    #[tabled(rename = "Low")]
    templow: String,
    #[tabled(rename = "Precip")]
    precipitation: String,
}

impl From<&Value> for ForecastRow {
    fn from(entry: &Value) -> Self {
        let field = |key: &str| entry.get(key).map(util::attribute_text).unwrap_or_default();
        Self {
            time: field("datetime"),
            condition: field("condition"),
            temperature: field("temperature"),
            templow: field("templow"),
            precipitation: field("precipitation"),
        }
    }
}

pub async fn handle(
    client: &HubClient,
    args: &ForecastArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let subscription = client
        .subscribe_forecast(&args.entity_id, args.kind, move |payload: &Value| {
            let _ = tx.send(payload.clone());
        })
        .await?;
    tracing::info!(id = subscription.id(), entity_id = %args.entity_id, "forecast stream open");

    let mut seen = 0usize;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                break;
            }
            payload = rx.recv() => {
                let Some(payload) = payload else { break };
                print_forecast(&payload, global);
                seen += 1;
                if args.count != 0 && seen >= args.count {
                    break;
                }
            }
        }
    }

    subscription.unsubscribe().await?;
    Ok(())
}

fn print_forecast(payload: &Value, global: &GlobalOpts) {
    let entries = payload
        .get("forecast")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let out = match global.output {
        OutputFormat::Table | OutputFormat::Plain => output::render_list(
            &global.output,
            entries,
            |e| ForecastRow::from(e),
            |e| ForecastRow::from(e).condition,
        ),
        _ => output::render_single(
            &global.output,
            payload,
            output::render_json_pretty,
            output::render_json_compact,
        ),
    };
    output::print_output(&out, global.quiet);
}
