//! Client-side stream reassembly.
//!
//! A [`Reassembler`] turns a stream of raw byte chunks into the sequence of
//! payloads carried by its `data` frames:
//!
//! ```text
//! bytes ─► Utf8Decoder ─► FrameBuffer ─► Frame::parse ─► JsonCodec ─► T
//!                                              │              │
//!                                           ignored       DiagnosticSink
//! ```
//!
//! Chunk boundaries carry no meaning: however the bytes are split, the same
//! payloads come out in the same order.
//!
//! # Example
//!
//! ```
//! use serde_json::Value;
//! use ssewire::Reassembler;
//!
//! let mut reassembler = Reassembler::<Value>::new();
//!
//! assert!(reassembler.push(b"data: {\"a\":").unwrap().is_empty());
//! let payloads = reassembler.push(b"1}\n\n").unwrap();
//!
//! assert_eq!(payloads, vec![serde_json::json!({"a": 1})]);
//! ```

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::pin::Pin;

use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::codec::JsonCodec;
use crate::error::{Result, SsewireError};
use crate::protocol::{Frame, FrameBuffer, Utf8Decoder};
use crate::sink::{DiagnosticSink, TracingDiagnostics};

/// Counters for one reassembled stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Non-empty chunks received.
    pub chunks: u64,
    /// Bytes received.
    pub bytes: u64,
    /// Complete frames found (including ignored ones).
    pub frames: u64,
    /// Payloads decoded and delivered.
    pub payloads: u64,
    /// Frames skipped: other kinds, no separator, empty payload.
    pub ignored: u64,
    /// `data` frames whose payload failed to decode.
    pub malformed: u64,
    /// Whether the stream ended inside a frame.
    pub unterminated: bool,
}

/// Reassembles one byte stream into decoded payloads.
///
/// `T` is the payload type (any `DeserializeOwned`, `serde_json::Value` by
/// default). `D` receives malformed frames and unterminated tails.
pub struct Reassembler<T = Value, D = TracingDiagnostics> {
    decoder: Utf8Decoder,
    frames: FrameBuffer,
    diagnostics: D,
    stats: ReassemblerStats,
    _payload: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Reassembler<T, TracingDiagnostics> {
    /// Create a reassembler that logs diagnostics through `tracing`.
    pub fn new() -> Self {
        Self {
            decoder: Utf8Decoder::new(),
            frames: FrameBuffer::new(),
            diagnostics: TracingDiagnostics,
            stats: ReassemblerStats::default(),
            _payload: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Default for Reassembler<T, TracingDiagnostics> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned, D: DiagnosticSink> Reassembler<T, D> {
    /// Replace the diagnostic sink.
    pub fn with_diagnostics<D2: DiagnosticSink>(self, diagnostics: D2) -> Reassembler<T, D2> {
        Reassembler {
            decoder: self.decoder,
            frames: self.frames,
            diagnostics,
            stats: self.stats,
            _payload: PhantomData,
        }
    }

    /// Set the largest unterminated frame the buffer may hold
    /// (default [`DEFAULT_MAX_FRAME_SIZE`](crate::protocol::DEFAULT_MAX_FRAME_SIZE)).
    ///
    /// Must be called before any data is pushed.
    pub fn max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.frames = FrameBuffer::with_max_frame_size(max_frame_size);
        self
    }

    /// Counters so far.
    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }

    /// Number of text bytes buffered but not yet part of a complete frame.
    pub fn buffered(&self) -> usize {
        self.frames.len()
    }

    /// Feed one chunk, returning the payloads of every frame it completes.
    ///
    /// # Errors
    ///
    /// Returns [`SsewireError::Decode`] on invalid UTF-8 and
    /// [`SsewireError::Protocol`] when a frame, complete or not, is longer
    /// than the maximum frame size. Both end the stream.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<T>> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }

        self.stats.chunks += 1;
        self.stats.bytes += chunk.len() as u64;
        tracing::trace!(bytes = chunk.len(), "chunk received");

        let text = self.decoder.decode(chunk)?;
        let raw_frames = self.frames.push(&text)?;
        tracing::trace!(buffered = self.frames.len(), "buffer state");

        if raw_frames.is_empty() && !self.frames.is_empty() {
            tracing::debug!(buffered = self.frames.len(), "partial frame buffered");
        }

        let mut payloads = Vec::with_capacity(raw_frames.len());
        for raw in &raw_frames {
            if let Some(payload) = self.parse_frame(raw) {
                payloads.push(payload);
            }
        }
        Ok(payloads)
    }

    /// End the stream.
    ///
    /// Leftover bytes are decoded lossily and joined to the buffered text.
    /// Anything but whitespace is reported as an unterminated tail and
    /// discarded. Returns the final counters.
    pub fn finish(&mut self) -> ReassemblerStats {
        let mut tail = self.frames.take_remainder();
        tail.push_str(&self.decoder.finish());

        if !tail.trim().is_empty() {
            self.stats.unterminated = true;
            self.diagnostics.unterminated_tail(&tail);
        }

        tracing::debug!(
            frames = self.stats.frames,
            payloads = self.stats.payloads,
            malformed = self.stats.malformed,
            "stream finished"
        );
        self.stats
    }

    fn parse_frame(&mut self, raw: &str) -> Option<T> {
        self.stats.frames += 1;

        let frame = match Frame::parse(raw) {
            Some(frame) if frame.has_payload() => frame,
            _ => {
                self.stats.ignored += 1;
                tracing::trace!(len = raw.len(), "frame ignored");
                return None;
            }
        };

        match JsonCodec::decode::<T>(frame.payload()) {
            Ok(payload) => {
                self.stats.payloads += 1;
                Some(payload)
            }
            Err(e) => {
                self.stats.malformed += 1;
                self.diagnostics.malformed_frame(raw.trim(), &e);
                None
            }
        }
    }

    /// Consume `stream` to its end, calling `consumer` once per payload in
    /// order.
    ///
    /// # Errors
    ///
    /// Transport, decode and oversized-frame errors end the loop and are
    /// returned; payloads delivered before that stay delivered.
    pub async fn run<S, B, E, F>(mut self, stream: S, mut consumer: F) -> Result<ReassemblerStats>
    where
        S: Stream<Item = std::result::Result<B, E>>,
        B: AsRef<[u8]>,
        E: Into<SsewireError>,
        F: FnMut(T),
    {
        futures::pin_mut!(stream);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(Into::into)?;
            for payload in self.push(chunk.as_ref())? {
                consumer(payload);
            }
        }

        Ok(self.finish())
    }

    /// [`run`](Self::run) over an `AsyncRead` source.
    pub async fn run_reader<R, F>(self, reader: R, consumer: F) -> Result<ReassemblerStats>
    where
        R: AsyncRead,
        F: FnMut(T),
    {
        self.run(ReaderStream::new(reader), consumer).await
    }
}

struct AttachState<S, T, D> {
    reassembler: Reassembler<T, D>,
    source: Pin<Box<S>>,
    ready: VecDeque<T>,
    done: bool,
}

impl<T, D> Reassembler<T, D>
where
    T: DeserializeOwned + Send + 'static,
    D: DiagnosticSink + 'static,
{
    /// Turn a chunk stream into a payload stream.
    ///
    /// The returned stream yields every payload in order, then ends. An
    /// error is yielded once and ends it.
    pub fn attach<S, B, E>(self, source: S) -> impl Stream<Item = Result<T>> + Send + 'static
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + 'static,
        E: Into<SsewireError> + 'static,
    {
        let state = AttachState {
            reassembler: self,
            source: Box::pin(source),
            ready: VecDeque::new(),
            done: false,
        };

        stream::unfold(state, |mut state| async move {
            loop {
                if let Some(payload) = state.ready.pop_front() {
                    return Some((Ok(payload), state));
                }
                if state.done {
                    return None;
                }

                match state.source.next().await {
                    Some(Ok(chunk)) => match state.reassembler.push(chunk.as_ref()) {
                        Ok(payloads) => state.ready.extend(payloads),
                        Err(e) => {
                            state.done = true;
                            return Some((Err(e), state));
                        }
                    },
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((Err(e.into()), state));
                    }
                    None => {
                        state.reassembler.finish();
                        state.done = true;
                    }
                }
            }
        })
    }

    /// [`attach`](Self::attach) over an `AsyncRead` source.
    pub fn attach_reader<R>(self, reader: R) -> impl Stream<Item = Result<T>> + Send + 'static
    where
        R: AsyncRead + Send + 'static,
    {
        self.attach(ReaderStream::new(reader))
    }
}
