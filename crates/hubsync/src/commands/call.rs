//! Service calls, raw messages, and ping.

use hubsync_core::HubClient;
use serde_json::{Value, json};

use crate::cli::{CallArgs, GlobalOpts, RawArgs};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn service(
    client: &HubClient,
    args: CallArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut data = args
        .data
        .as_deref()
        .map(|raw| util::parse_object(raw, "data"))
        .transpose()?;
    if let Some(entity) = args.entity {
        data.get_or_insert_default()
            .insert("entity_id".into(), Value::String(entity));
    }

    let result = client
        .call_service(&args.domain, &args.service, data.map(Value::Object))
        .await?;

    if !global.quiet {
        eprintln!("Called {}.{}", args.domain, args.service);
    }
    render_result(&result, global);
    Ok(())
}

pub async fn raw(client: &HubClient, args: &RawArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let message = Value::Object(util::parse_object(&args.message, "message")?);

    if args.no_wait {
        client.send_unacknowledged(message)?;
        // Outbound frames are written in order, so the pong means the
        // message above has left before we disconnect.
        client.ping().await?;
        return Ok(());
    }

    let result = client.send(message).await?;
    render_result(&result, global);
    Ok(())
}

pub async fn ping(client: &HubClient, global: &GlobalOpts) -> Result<(), CliError> {
    let rtt = client.ping().await?;
    let millis = rtt.as_secs_f64() * 1000.0;
    let out = output::render_single(
        &global.output,
        &json!({ "url": client.config().url.as_str(), "rtt_ms": millis }),
        |_| format!("pong from {} in {millis:.1}ms", client.config().url),
        |_| format!("{millis:.1}"),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Results are arbitrary JSON; `table` shows them pretty-printed.
fn render_result(result: &Value, global: &GlobalOpts) {
    let out = output::render_single(
        &global.output,
        result,
        |v| match v {
            Value::Null => String::new(),
            other => output::render_json_pretty(other),
        },
        |v| match v {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => output::render_json_compact(other),
        },
    );
    output::print_output(&out, global.quiet);
}
