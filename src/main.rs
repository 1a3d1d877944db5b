mod cli;

use futures::StreamExt;
use serde_json::Value;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ssewire::transport;
use ssewire::{PayloadLog, Reassembler, Result};

use crate::cli::{Cli, Command, ServeArgs, WatchArgs};

/// Longest rendering of a non-object payload in a summary line.
const SUMMARY_LEN: usize = 80;

#[tokio::main]
async fn main() {
    // Initialize tracing with RUST_LOG support; stdout is reserved for payloads
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Watch(args) => watch(args).await,
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = args.server_config();
    info!(
        port = config.port,
        payload_size = config.payload_size,
        defer = ?config.emitter.defer_policy,
        "ssewire starting"
    );

    tokio::select! {
        result = transport::run_server(config) => result?,
        _ = tokio::signal::ctrl_c() => info!("ssewire shut down"),
    }
    Ok(())
}

async fn watch(args: WatchArgs) -> Result<()> {
    let client = reqwest::Client::new();
    let reassembler = Reassembler::<Value>::new().max_frame_size(args.max_frame_size);
    let stream =
        transport::subscribe_with(&client, &args.url, args.method.into(), reassembler).await?;
    futures::pin_mut!(stream);

    let received = PayloadLog::new();
    let shutdown = tokio::signal::ctrl_c();
    futures::pin_mut!(shutdown);

    loop {
        tokio::select! {
            item = stream.next() => {
                let Some(payload) = item else { break };
                let payload = payload?;
                println!("{}", summarize(received.len() + 1, &payload));
                received.push(payload);

                if args.limit.is_some_and(|limit| received.len() >= limit) {
                    break;
                }
            }
            _ = &mut shutdown => break,
        }
    }

    info!(received = received.len(), "watch finished");
    Ok(())
}

/// One line describing payload number `index`.
fn summarize(index: usize, payload: &Value) -> String {
    match payload {
        Value::Object(map) => {
            let first = map.keys().next().map(String::as_str).unwrap_or("-");
            format!("#{index}: object with {} keys (first: {first})", map.len())
        }
        Value::Array(items) => format!("#{index}: array of {} items", items.len()),
        other => {
            let mut text = other.to_string();
            if text.len() > SUMMARY_LEN {
                let mut end = SUMMARY_LEN;
                while !text.is_char_boundary(end) {
                    end -= 1;
                }
                text.truncate(end);
                text.push_str("...");
            }
            format!("#{index}: {text}")
        }
    }
}
