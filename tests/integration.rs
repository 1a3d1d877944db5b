//! Integration tests for ssewire.
//!
//! These tests verify the emitter and reassembler together, over in-memory
//! pipes and over real HTTP.

use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};
use tokio::io::AsyncReadExt;

use ssewire::protocol::encode_frame;
use ssewire::transport::{self, ServerConfig};
use ssewire::{
    from_fn, Diagnostic, DiagnosticLog, Emitter, EmitterConfig, EmitterState, KeyValueSource,
    PayloadLog, Reassembler,
};

/// A stream mixing payloads, multi-byte text, ignored kinds and a malformed frame.
fn mixed_stream() -> Vec<u8> {
    let mut bytes = Vec::new();
    for i in 0..20 {
        let payload = json!({"i": i, "text": "データ €"}).to_string();
        bytes.extend_from_slice(&encode_frame("data", &payload).unwrap());
        if i % 5 == 0 {
            bytes.extend_from_slice(&encode_frame("comment", "keep-alive").unwrap());
        }
    }
    bytes.extend_from_slice(&encode_frame("data", "{not json").unwrap());
    bytes.extend_from_slice(&encode_frame("data", "\"😀\"").unwrap());
    bytes.extend_from_slice(b"data: {\"tail\":");
    bytes
}

/// Feed `bytes` split at `cuts` and return payloads and diagnostics.
fn reassemble(bytes: &[u8], cuts: &[usize]) -> (Vec<Value>, Vec<Diagnostic>) {
    let log = DiagnosticLog::new();
    let mut reassembler = Reassembler::<Value>::new().with_diagnostics(log.clone());

    let mut payloads = Vec::new();
    let mut start = 0;
    for &cut in cuts.iter().chain(std::iter::once(&bytes.len())) {
        payloads.extend(reassembler.push(&bytes[start..cut]).unwrap());
        start = cut;
    }
    reassembler.finish();

    (payloads, log.entries())
}

fn fixed_cuts(len: usize, step: usize) -> Vec<usize> {
    (step..len).step_by(step).collect()
}

/// Deterministic pseudo-random cut points.
fn scattered_cuts(len: usize, seed: u64) -> Vec<usize> {
    let mut state = seed;
    let mut cuts = Vec::new();
    let mut pos = 0;
    loop {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        pos += 1 + (state >> 33) as usize % 17;
        if pos >= len {
            return cuts;
        }
        cuts.push(pos);
    }
}

#[test]
fn test_fragmentation_invariance() {
    let bytes = mixed_stream();
    let (expected, expected_diagnostics) = reassemble(&bytes, &[]);

    assert_eq!(expected.len(), 21);
    assert_eq!(expected[0], json!({"i": 0, "text": "データ €"}));
    assert_eq!(expected[20], json!("😀"));
    assert_eq!(expected_diagnostics.len(), 2);

    let mut strategies: Vec<Vec<usize>> = [1, 2, 3, 7, 64, 1000]
        .iter()
        .map(|&step| fixed_cuts(bytes.len(), step))
        .collect();
    strategies.extend((1..=5).map(|seed| scattered_cuts(bytes.len(), seed)));

    for cuts in strategies {
        let (payloads, diagnostics) = reassemble(&bytes, &cuts);
        assert_eq!(payloads, expected, "cuts: {:?}", &cuts[..cuts.len().min(8)]);
        assert_eq!(diagnostics, expected_diagnostics);
    }
}

/// Feed `bytes` split at `cuts` into a reassembler with a small frame limit
/// and return the first error, if any.
fn first_error(bytes: &[u8], cuts: &[usize]) -> Option<String> {
    let mut reassembler = Reassembler::<Value>::new().max_frame_size(64);
    let mut start = 0;
    for &cut in cuts.iter().chain(std::iter::once(&bytes.len())) {
        if let Err(e) = reassembler.push(&bytes[start..cut]) {
            return Some(e.to_string());
        }
        start = cut;
    }
    None
}

#[test]
fn test_frame_limit_independent_of_split() {
    let fits = encode_frame("data", &json!({"pad": "x".repeat(40)}).to_string()).unwrap();
    let oversized = encode_frame("data", &json!({"pad": "x".repeat(80)}).to_string()).unwrap();

    let mut strategies: Vec<Vec<usize>> = vec![Vec::new()];
    strategies.extend([1, 2, 3, 7].iter().map(|&step| fixed_cuts(fits.len() * 2, step)));
    strategies.extend((1..=3).map(|seed| scattered_cuts(fits.len() * 2, seed)));

    let fitting: Vec<u8> = [&fits[..], &fits[..]].concat();
    for cuts in &strategies {
        assert_eq!(first_error(&fitting, cuts), None);
    }

    let failing: Vec<u8> = [&fits[..], &oversized[..]].concat();
    let expected = first_error(&failing, &[]).expect("oversized frame rejected");
    for cuts in &strategies {
        assert_eq!(first_error(&failing, cuts).as_deref(), Some(expected.as_str()));
    }
}

#[test]
fn test_diagnostics_name_the_bad_frame_and_tail() {
    let (_, diagnostics) = reassemble(&mixed_stream(), &[]);

    assert!(matches!(
        &diagnostics[0],
        Diagnostic::MalformedFrame { frame, .. } if frame == "data: {not json"
    ));
    assert_eq!(
        diagnostics[1],
        Diagnostic::UnterminatedTail {
            tail: "data: {\"tail\":".to_string()
        }
    );
}

#[tokio::test]
async fn test_emitter_to_reassembler_over_pipe() {
    let (sink, source) = tokio::io::duplex(1024);
    let handle = Emitter::new(from_fn(|tick| json!({"tick": tick, "msg": "é"})))
        .interval(Duration::from_millis(5))
        .start(sink);

    let payloads: Vec<Value> = Reassembler::<Value>::new()
        .attach_reader(source)
        .take(5)
        .map(|item| item.unwrap())
        .collect()
        .await;

    let ticks: Vec<u64> = payloads
        .iter()
        .map(|p| p["tick"].as_u64().unwrap())
        .collect();
    assert_eq!(ticks, vec![1, 2, 3, 4, 5]);

    // The reader is gone: the emitter notices on its next write and closes
    let stats = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("emitter closes after reader drop")
        .unwrap();
    assert!(stats.ticks >= 5);
}

#[tokio::test]
async fn test_close_stops_stream() {
    let (sink, mut source) = tokio::io::duplex(64 * 1024);
    let handle = Emitter::new(KeyValueSource::new(10))
        .interval(Duration::from_millis(5))
        .start(sink);
    let mut state = handle.watch_state();
    state
        .wait_for(|s| *s == EmitterState::Streaming)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(30)).await;
    let stats = handle.close().await.unwrap();

    // The sink is released: the reader sees end of stream, and nothing
    // beyond what was handed to the writer before close
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(1), source.read_to_end(&mut received))
        .await
        .expect("eof after close")
        .unwrap();

    let frames = received.windows(2).filter(|w| *w == b"\n\n").count() as u64;
    assert!(frames <= stats.frames_queued);
    assert_eq!(*state.borrow(), EmitterState::Closed);
}

#[tokio::test]
async fn test_http_end_to_end() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig {
        payload_size: 50,
        emitter: EmitterConfig {
            interval: Duration::from_millis(10),
            ..EmitterConfig::default()
        },
        ..ServerConfig::default()
    };
    tokio::spawn(transport::server::serve(listener, config));

    let client = reqwest::Client::new();
    let url = format!("http://{}/sse", addr);

    for method in [reqwest::Method::POST, reqwest::Method::GET] {
        let stream = transport::subscribe::<Value>(&client, &url, method)
            .await
            .unwrap();
        futures::pin_mut!(stream);

        let received = PayloadLog::new();
        while received.len() < 3 {
            let payload = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("payload within timeout")
                .expect("stream open")
                .unwrap();
            received.push(payload);
        }

        received.with_items(|items| {
            for item in items {
                let map = item.as_object().unwrap();
                assert_eq!(map.len(), 50);
                assert_eq!(map["key49"], "value49");
            }
        });
    }
}

#[tokio::test]
async fn test_subscribe_rejects_error_status() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(transport::server::serve(listener, ServerConfig::default()));

    let client = reqwest::Client::new();
    let result = transport::subscribe::<Value>(
        &client,
        &format!("http://{}/missing", addr),
        reqwest::Method::GET,
    )
    .await;

    assert!(matches!(result, Err(ssewire::SsewireError::Http(_))));
}
