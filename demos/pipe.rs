//! Pipe - an emitter feeding a reassembler in one process.
//!
//! This example demonstrates:
//! - Starting an [`Emitter`] with a closure source and a short interval
//! - Reassembling its output with [`Reassembler::attach_reader`]
//! - Closing the emitter and reading its counters
//!
//! The pipe is deliberately small so large payloads arrive fragmented.
//!
//! # Running
//!
//! ```sh
//! cargo run --example pipe
//! RUST_LOG=ssewire=debug cargo run --example pipe
//! ```

use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ssewire::{from_fn, DiagnosticLog, Emitter, Reassembler};

/// Payload sent on every tick.
#[derive(Serialize, Deserialize, Debug)]
struct Reading {
    tick: u64,
    label: String,
    samples: Vec<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (sink, source) = tokio::io::duplex(256);

    let handle = Emitter::new(from_fn(|tick| Reading {
        tick,
        label: format!("reading {} ✓", tick),
        samples: (0..64).map(|i| (tick as u32) * 100 + i).collect(),
    }))
    .interval(Duration::from_millis(50))
    .start(sink);

    let diagnostics = DiagnosticLog::new();
    let payloads = Reassembler::<Reading>::new()
        .with_diagnostics(diagnostics.clone())
        .attach_reader(source)
        .take(5);
    futures::pin_mut!(payloads);

    while let Some(reading) = payloads.next().await {
        let reading = reading?;
        println!(
            "tick {:>2}  {:<14} {} samples",
            reading.tick,
            reading.label,
            reading.samples.len()
        );
    }

    let stats = handle.close().await?;
    println!(
        "ticks={} queued={} written={} deferred={} dropped={}",
        stats.ticks,
        stats.frames_queued,
        stats.frames_written,
        stats.frames_deferred,
        stats.frames_dropped
    );
    println!("diagnostics: {}", diagnostics.len());

    Ok(())
}
