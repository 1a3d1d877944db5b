//! Outbound sinks for the reassembler.
//!
//! - [`DiagnosticSink`] - where malformed frames and unterminated tails go
//! - [`TracingDiagnostics`] - default sink, logs through `tracing`
//! - [`DiagnosticLog`] - in-memory sink, cloneable, for inspection
//! - [`PayloadLog`] - append-only store of received payloads
//!
//! Payload consumers are plain `FnMut(T)` closures; these types cover the
//! observability side and a ready-made accumulator.

use std::sync::{Arc, Mutex, MutexGuard};

/// Receives problems found while reassembling a stream.
///
/// Nothing reported here ends the stream.
pub trait DiagnosticSink: Send {
    /// A `data` frame whose payload failed to decode.
    fn malformed_frame(&mut self, frame: &str, error: &serde_json::Error);

    /// Text left in the buffer at end of stream, never terminated by a
    /// boundary and therefore never parsed.
    fn unterminated_tail(&mut self, tail: &str);
}

/// Logs diagnostics with `tracing::warn!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

/// Longest frame excerpt included in a log line.
const LOG_EXCERPT_LEN: usize = 256;

fn excerpt(text: &str) -> &str {
    if text.len() <= LOG_EXCERPT_LEN {
        return text;
    }
    let mut end = LOG_EXCERPT_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

impl DiagnosticSink for TracingDiagnostics {
    fn malformed_frame(&mut self, frame: &str, error: &serde_json::Error) {
        tracing::warn!(
            error = %error,
            frame_len = frame.len(),
            frame = excerpt(frame),
            "malformed frame skipped"
        );
    }

    fn unterminated_tail(&mut self, tail: &str) {
        tracing::warn!(
            tail_len = tail.len(),
            tail = excerpt(tail),
            "stream ended inside a frame, discarding"
        );
    }
}

/// A recorded diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Payload decode failed.
    MalformedFrame { frame: String, error: String },
    /// Stream ended without a final boundary.
    UnterminatedTail { tail: String },
}

/// Records diagnostics in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    entries: Arc<Mutex<Vec<Diagnostic>>>,
}

impl DiagnosticLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all entries so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.lock().clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Diagnostic>> {
        // A panic while holding the lock cannot leave a Vec half-pushed
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DiagnosticSink for DiagnosticLog {
    fn malformed_frame(&mut self, frame: &str, error: &serde_json::Error) {
        self.lock().push(Diagnostic::MalformedFrame {
            frame: frame.to_string(),
            error: error.to_string(),
        });
    }

    fn unterminated_tail(&mut self, tail: &str) {
        self.lock().push(Diagnostic::UnterminatedTail {
            tail: tail.to_string(),
        });
    }
}

/// Append-only list of received payloads, shared between the read loop and
/// whatever renders them.
#[derive(Debug)]
pub struct PayloadLog<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> PayloadLog<T> {
    /// Create an empty log.
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append a payload.
    pub fn push(&self, item: T) {
        self.lock().push(item);
    }

    /// Number of payloads received.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if nothing was received.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run `f` over the current contents.
    pub fn with_items<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<T>> {
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Clone> PayloadLog<T> {
    /// Snapshot of all payloads so far.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().clone()
    }
}

impl<T> Clone for PayloadLog<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T> Default for PayloadLog<T> {
    fn default() -> Self {
        Self::new()
    }
}
