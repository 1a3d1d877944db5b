//! Periodic SSE emitter.
//!
//! One [`Emitter`] serves one connection. [`Emitter::start`] spawns a task
//! that owns the connection's timer; every tick it asks a [`PayloadSource`]
//! for a payload, frames it as `data: <json>\n\n` and hands it to a writer
//! task that owns the sink.
//!
//! # States
//!
//! ```text
//! Idle ─► Streaming ◄──► Draining
//!             │              │
//!             └──► Closed ◄──┘
//! ```
//!
//! `Streaming → Draining` happens when the sink reports full, `Draining →
//! Streaming` when a drain signal lets every deferred frame out. `Closed` is
//! terminal: reached on [`EmitterHandle::close`], on drop of the handle, or
//! when the sink fails.
//!
//! # Example
//!
//! ```ignore
//! use ssewire::{Emitter, KeyValueSource};
//!
//! let (sink, body) = tokio::io::duplex(64 * 1024);
//! let handle = Emitter::new(KeyValueSource::new(100)).start(sink);
//! // ... serve `body` ...
//! let stats = handle.close().await?;
//! ```

use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::io::AsyncWrite;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backpressure::{DeferPolicy, DeferQueue, DEFAULT_MAX_PENDING};
use crate::codec::JsonCodec;
use crate::error::{Result, SsewireError};
use crate::protocol::Frame;
use crate::writer::{spawn_writer_task, TrySendError, WriterConfig, WriterHandle};

/// Default emission interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest accepted emission interval; shorter ones are raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Produces one application payload per tick.
pub trait PayloadSource: Send + 'static {
    /// Payload type, serialized as JSON.
    type Payload: Serialize;

    /// Generate the payload for tick number `tick` (starting at 1).
    fn next_payload(&mut self, tick: u64) -> Self::Payload;
}

/// [`PayloadSource`] backed by a closure. See [`from_fn`].
pub struct FnSource<F>(F);

/// Create a payload source from a closure taking the tick number.
pub fn from_fn<F, T>(f: F) -> FnSource<F>
where
    F: FnMut(u64) -> T + Send + 'static,
    T: Serialize,
{
    FnSource(f)
}

impl<F, T> PayloadSource for FnSource<F>
where
    F: FnMut(u64) -> T + Send + 'static,
    T: Serialize,
{
    type Payload = T;

    fn next_payload(&mut self, tick: u64) -> T {
        (self.0)(tick)
    }
}

/// Generates a flat object of `size` entries: `{"key0":"value0", ...}`.
///
/// Large objects exercise fragmentation on the receiving side: at the
/// default size of 100 000 entries one payload is about 2 MB.
#[derive(Debug, Clone)]
pub struct KeyValueSource {
    size: usize,
}

impl KeyValueSource {
    /// Default number of entries per payload.
    pub const DEFAULT_SIZE: usize = 100_000;

    /// Create a source producing `size` entries per payload.
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl Default for KeyValueSource {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SIZE)
    }
}

impl PayloadSource for KeyValueSource {
    type Payload = Value;

    fn next_payload(&mut self, _tick: u64) -> Value {
        let map: Map<String, Value> = (0..self.size)
            .map(|i| (format!("key{}", i), Value::String(format!("value{}", i))))
            .collect();
        Value::Object(map)
    }
}

/// Emitter connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitterState {
    /// Created, task not yet running.
    Idle,
    /// Ticks are written as they come.
    Streaming,
    /// Sink is full; ticks are deferred until it drains.
    Draining,
    /// Terminal.
    Closed,
}

/// Configuration for an emitter.
#[derive(Debug, Clone)]
pub struct EmitterConfig {
    /// Time between payloads.
    pub interval: Duration,
    /// Frames queued on the sink before it reports full.
    pub max_pending_frames: usize,
    /// What to keep while the sink is full.
    pub defer_policy: DeferPolicy,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_pending_frames: DEFAULT_MAX_PENDING,
            defer_policy: DeferPolicy::default(),
        }
    }
}

/// Counters reported when an emitter closes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitterStats {
    /// Timer ticks handled.
    pub ticks: u64,
    /// Frames handed to the writer.
    pub frames_queued: u64,
    /// Frames actually written to the sink.
    pub frames_written: u64,
    /// Frames deferred because the sink was full.
    pub frames_deferred: u64,
    /// Deferred frames evicted by the defer policy or still deferred at close.
    pub frames_dropped: u64,
    /// Ticks skipped because the payload failed to encode.
    pub encode_failures: u64,
    /// Drain signals acted upon.
    pub drain_events: u64,
}

/// Builder and entry point for a per-connection emitter.
pub struct Emitter<S> {
    source: S,
    config: EmitterConfig,
}

impl<S: PayloadSource> Emitter<S> {
    /// Create an emitter with default configuration.
    pub fn new(source: S) -> Self {
        Self::with_config(source, EmitterConfig::default())
    }

    /// Create an emitter with explicit configuration.
    ///
    /// An interval below [`MIN_INTERVAL`] is raised to it.
    pub fn with_config(source: S, mut config: EmitterConfig) -> Self {
        config.interval = config.interval.max(MIN_INTERVAL);
        Self { source, config }
    }

    /// Set the emission interval.
    ///
    /// Default: 1 second. Clamped to at least [`MIN_INTERVAL`].
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Set the maximum pending frames before the sink reports full.
    ///
    /// Default: 16
    pub fn max_pending_frames(mut self, limit: usize) -> Self {
        self.config.max_pending_frames = limit;
        self
    }

    /// Set the defer policy used while the sink is full.
    ///
    /// Default: [`DeferPolicy::KeepLatest`]
    pub fn defer_policy(mut self, policy: DeferPolicy) -> Self {
        self.config.defer_policy = policy;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &EmitterConfig {
        &self.config
    }

    /// Start emitting into `sink`.
    ///
    /// Must be called from within a tokio runtime. The first payload is
    /// produced one interval after start.
    pub fn start<W>(self, sink: W) -> EmitterHandle
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(EmitterState::Idle);

        let writer_config = WriterConfig {
            max_pending_frames: self.config.max_pending_frames,
        };
        let (writer, writer_task) = spawn_writer_task(sink, writer_config, cancel.clone());

        let task = tokio::spawn(run(
            self.source,
            self.config,
            writer,
            writer_task,
            cancel.clone(),
            StatePublisher(state_tx),
        ));

        EmitterHandle {
            cancel,
            state: state_rx,
            task: Some(task),
        }
    }
}

/// Cancellation handle for a running emitter.
///
/// Dropping the handle cancels the emitter and aborts its task.
pub struct EmitterHandle {
    cancel: CancellationToken,
    state: watch::Receiver<EmitterState>,
    task: Option<JoinHandle<Result<EmitterStats>>>,
}

impl EmitterHandle {
    /// Current state.
    pub fn state(&self) -> EmitterState {
        *self.state.borrow()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<EmitterState> {
        self.state.clone()
    }

    /// Check if the emitter has closed.
    pub fn is_closed(&self) -> bool {
        self.state() == EmitterState::Closed
    }

    /// Stop the emitter and wait for it to finish.
    ///
    /// After this returns the timer is gone, the writer task has stopped and
    /// the sink has been dropped.
    pub async fn close(mut self) -> Result<EmitterStats> {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the emitter to close on its own (sink closed or failed).
    pub async fn wait(mut self) -> Result<EmitterStats> {
        self.join().await
    }

    async fn join(&mut self) -> Result<EmitterStats> {
        match self.task.take() {
            Some(task) => task
                .await
                .map_err(|e| SsewireError::Protocol(format!("Emitter task failed: {}", e)))?,
            None => Err(SsewireError::ConnectionClosed),
        }
    }
}

impl Drop for EmitterHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Owns the state sender of a running emitter.
///
/// Publishes `Closed` when dropped, so watchers see the terminal state even
/// if the task panics or is aborted.
struct StatePublisher(watch::Sender<EmitterState>);

impl StatePublisher {
    fn set(&self, state: EmitterState) {
        let previous = self.0.send_replace(state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "emitter state changed");
        }
    }
}

impl Drop for StatePublisher {
    fn drop(&mut self) {
        self.set(EmitterState::Closed);
    }
}

fn encode_payload<T: Serialize>(payload: &T) -> Result<Bytes> {
    let json = JsonCodec::encode(payload)?;
    Frame::data(&json).encode()
}

/// Per-connection emitter loop.
///
/// Cancellation, sink closure, drain and tick are handled in one biased
/// select, so a drain and a tick never interleave.
async fn run<S: PayloadSource>(
    mut source: S,
    config: EmitterConfig,
    writer: WriterHandle,
    writer_task: JoinHandle<Result<u64>>,
    cancel: CancellationToken,
    state_tx: StatePublisher,
) -> Result<EmitterStats> {
    let mut stats = EmitterStats::default();
    let mut deferred = DeferQueue::new(config.defer_policy);
    let period = config.interval.max(MIN_INTERVAL);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut state = EmitterState::Streaming;
    state_tx.set(state);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!("emitter cancelled");
                break;
            }

            _ = writer.closed() => {
                tracing::debug!("sink closed");
                break;
            }

            _ = writer.drained(), if state == EmitterState::Draining => {
                stats.drain_events += 1;
                tracing::info!(deferred = deferred.len(), "sink drained");

                if flush_deferred(&writer, &mut deferred, &mut stats) {
                    state = EmitterState::Streaming;
                    state_tx.set(state);
                }
            }

            _ = ticker.tick() => {
                stats.ticks += 1;

                let frame = match encode_payload(&source.next_payload(stats.ticks)) {
                    Ok(frame) => frame,
                    Err(e) => {
                        stats.encode_failures += 1;
                        tracing::warn!(tick = stats.ticks, error = %e, "payload encode failed, skipping tick");
                        continue;
                    }
                };

                if state == EmitterState::Draining {
                    defer(&mut deferred, frame, &mut stats);
                    continue;
                }

                match writer.try_send(frame) {
                    Ok(()) => stats.frames_queued += 1,
                    Err(TrySendError::Full(frame)) => {
                        tracing::debug!(pending = writer.pending_count(), "sink full, deferring");
                        defer(&mut deferred, frame, &mut stats);
                        state = EmitterState::Draining;
                        state_tx.set(state);
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!("sink closed");
                        break;
                    }
                }
            }
        }
    }

    // Stop the writer before releasing the sink; nothing is written past here
    cancel.cancel();
    drop(writer);
    let leftover = deferred.len();
    if leftover > 0 {
        tracing::debug!(leftover, "discarding deferred frames at close");
    }
    stats.frames_dropped = deferred.dropped() + leftover as u64;

    match writer_task.await {
        Ok(Ok(written)) => stats.frames_written = written,
        Ok(Err(e)) => tracing::debug!(error = %e, "writer stopped on sink error"),
        Err(e) => tracing::warn!(error = %e, "writer task failed"),
    }

    state_tx.set(EmitterState::Closed);
    tracing::debug!(?stats, "emitter closed");

    Ok(stats)
}

fn defer(deferred: &mut DeferQueue, frame: Bytes, stats: &mut EmitterStats) {
    stats.frames_deferred += 1;
    if deferred.push(frame).is_some() {
        tracing::debug!(policy = ?deferred.policy(), "deferred frame dropped");
    }
}

/// Hand deferred frames to the writer in order. Returns true once all are out.
fn flush_deferred(
    writer: &WriterHandle,
    deferred: &mut DeferQueue,
    stats: &mut EmitterStats,
) -> bool {
    while let Some(frame) = deferred.pop_front() {
        match writer.try_send(frame) {
            Ok(()) => stats.frames_queued += 1,
            Err(e) => {
                deferred.push_front(e.into_inner());
                return false;
            }
        }
    }
    true
}
