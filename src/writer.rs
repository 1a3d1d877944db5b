//! Dedicated writer task for sending encoded frames to a sink.
//!
//! The emitter never touches the sink directly. It hands encoded frames to a
//! writer task over an mpsc channel; the task owns the `AsyncWrite` and
//! batches whatever is queued into a single vectored write.
//!
//! # Architecture
//!
//! ```text
//! Emitter ─► WriterHandle::try_send ─► mpsc ─► Writer Task ─► AsyncWrite sink
//!                  ▲                                 │
//!                  └──── drain signal ◄── release ───┘
//! ```
//!
//! A slow sink makes the writer task block, frames pile up as pending, and
//! once the limit is reached `try_send` reports [`TrySendError::Full`].

use std::io::IoSlice;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backpressure::{BackpressureController, DEFAULT_MAX_PENDING};
use crate::error::{Result, SsewireError};

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum frames queued but not yet written before the sink reports full.
    pub max_pending_frames: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING,
        }
    }
}

/// Error returned by [`WriterHandle::try_send`], giving the frame back.
#[derive(Debug, Error)]
pub enum TrySendError {
    /// The sink's buffer is full; wait for a drain signal.
    #[error("sink buffer full")]
    Full(Bytes),
    /// The writer task has stopped (connection closed or cancelled).
    #[error("sink closed")]
    Closed(Bytes),
}

impl TrySendError {
    /// Recover the frame that was not sent.
    pub fn into_inner(self) -> Bytes {
        match self {
            TrySendError::Full(frame) | TrySendError::Closed(frame) => frame,
        }
    }
}

/// Handle for sending frames to the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for frames.
    tx: mpsc::Sender<Bytes>,
    /// Pending frame accounting shared with the writer task.
    backpressure: BackpressureController,
}

impl WriterHandle {
    /// Hand a frame to the writer without waiting.
    pub fn try_send(&self, frame: Bytes) -> std::result::Result<(), TrySendError> {
        if self.tx.is_closed() {
            return Err(TrySendError::Closed(frame));
        }

        if self.backpressure.try_reserve().is_err() {
            return Err(TrySendError::Full(frame));
        }

        self.tx.try_send(frame).map_err(|e| {
            self.backpressure.cancel_reservation();
            match e {
                mpsc::error::TrySendError::Full(frame) => TrySendError::Full(frame),
                mpsc::error::TrySendError::Closed(frame) => TrySendError::Closed(frame),
            }
        })
    }

    /// Wait for the next drain signal from the writer task.
    pub async fn drained(&self) {
        self.backpressure.drained().await;
    }

    /// Wait until the writer task has stopped.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }

    /// Check if the writer task has stopped.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Check if backpressure is currently active.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.backpressure.is_active()
    }

    /// Get current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.backpressure.pending_count()
    }

    /// Number of drain signals raised so far.
    #[inline]
    pub fn drain_count(&self) -> u64 {
        self.backpressure.drain_count()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task stops when every handle is dropped, when `cancel` fires, or when
/// a write fails. Once `cancel` fires no further write is started, and an
/// in-flight write is abandoned. The task resolves to the number of frames
/// written.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
    cancel: CancellationToken,
) -> (WriterHandle, JoinHandle<Result<u64>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let backpressure = BackpressureController::new(config.max_pending_frames);
    // Pending count always covers channel occupancy, so the channel never
    // fills before backpressure does
    let (tx, rx) = mpsc::channel(backpressure.max_pending());

    let handle = WriterHandle {
        tx,
        backpressure: backpressure.clone(),
    };

    let task = tokio::spawn(writer_loop(rx, writer, backpressure, cancel));

    (handle, task)
}

/// Main writer loop - receives frames and writes them to the sink.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    backpressure: BackpressureController,
    cancel: CancellationToken,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written: u64 = 0;

    loop {
        let first = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(written),
            frame = rx.recv() => match frame {
                Some(f) => f,
                None => return Ok(written),
            },
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(written),
            result = write_batch(&mut writer, &batch) => result?,
        }

        let batch_size = batch.len();
        written += batch_size as u64;
        tracing::trace!(frames = batch_size, total = written, "batch written");

        backpressure.release_many(batch_size);
    }
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(|f| f.len()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;

        if written == 0 {
            return Err(SsewireError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }

        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for remaining data after partial write.
fn build_remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.len();

        if skip_bytes < end && !frame.is_empty() {
            let start_in_frame = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame[start_in_frame..]));
        }
        offset = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    fn frame(text: &'static str) -> Bytes {
        Bytes::from_static(text.as_bytes())
    }

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.max_pending_frames, DEFAULT_MAX_PENDING);
    }

    #[tokio::test]
    async fn test_writer_handle_send() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) =
            spawn_writer_task(client, WriterConfig::default(), CancellationToken::new());

        handle.try_send(frame("data: 1\n\n")).unwrap();

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();

        assert_eq!(&buf[..n], b"data: 1\n\n");
    }

    #[tokio::test]
    async fn test_writer_batching_preserves_order() {
        let (client, mut server) = duplex(4096);
        let (handle, task) =
            spawn_writer_task(client, WriterConfig::default(), CancellationToken::new());

        for i in 0..10 {
            handle
                .try_send(Bytes::from(format!("data: {}\n\n", i)))
                .unwrap();
        }
        drop(handle);

        assert_eq!(task.await.unwrap().unwrap(), 10);

        let mut out = String::new();
        server.read_to_string(&mut out).await.unwrap();
        let expected: String = (0..10).map(|i| format!("data: {}\n\n", i)).collect();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn test_try_send_full_when_sink_stalls() {
        // Tiny pipe that nobody reads: the writer blocks, frames pile up
        let (client, mut server) = duplex(8);
        let config = WriterConfig {
            max_pending_frames: 2,
        };
        let (handle, _task) = spawn_writer_task(client, config, CancellationToken::new());

        let mut full = None;
        for _ in 0..10 {
            match handle.try_send(frame("data: 12345\n\n")) {
                Ok(()) => tokio::task::yield_now().await,
                Err(e) => {
                    full = Some(e);
                    break;
                }
            }
        }

        let err = full.expect("sink should report full");
        assert!(matches!(err, TrySendError::Full(_)));
        assert_eq!(&err.into_inner()[..], b"data: 12345\n\n");
        assert!(handle.is_backpressure_active());

        // Reading unblocks the writer and raises a drain signal
        let reader = tokio::spawn(async move {
            let mut sink = Vec::new();
            let _ = server.read_to_end(&mut sink).await;
        });
        tokio::time::timeout(Duration::from_secs(1), handle.drained())
            .await
            .expect("drain signal");
        assert!(handle.drain_count() >= 1);
        drop(handle);
        reader.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_stops_writer() {
        let (client, mut server) = duplex(4096);
        let cancel = CancellationToken::new();
        let (handle, task) = spawn_writer_task(client, WriterConfig::default(), cancel.clone());

        handle.try_send(frame("data: 1\n\n")).unwrap();
        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(n, 9);

        cancel.cancel();
        task.await.unwrap().unwrap();

        assert!(handle.is_closed());
        assert!(matches!(
            handle.try_send(frame("data: 2\n\n")),
            Err(TrySendError::Closed(_))
        ));

        // Write half dropped with the task: reader sees EOF, nothing more
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_writer_stops_on_sink_error() {
        let (client, server) = duplex(64);
        drop(server);

        let (handle, task) =
            spawn_writer_task(client, WriterConfig::default(), CancellationToken::new());
        handle.try_send(frame("data: 1\n\n")).unwrap();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(SsewireError::Io(_))));

        tokio::time::timeout(Duration::from_secs(1), handle.closed())
            .await
            .expect("closed");
    }

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let batch = vec![frame("abc"), frame("defg")];
        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn test_build_remaining_slices_partial_frame() {
        let batch = vec![frame("abc"), frame("defg")];

        let slices = build_remaining_slices(&batch, 2);
        assert_eq!(slices.len(), 2);
        assert_eq!(&slices[0][..], b"c");
        assert_eq!(&slices[1][..], b"defg");
    }

    #[test]
    fn test_build_remaining_slices_skip_frame() {
        let batch = vec![frame("abc"), frame("defg")];

        let slices = build_remaining_slices(&batch, 4);
        assert_eq!(slices.len(), 1);
        assert_eq!(&slices[0][..], b"efg");
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch = vec![frame("data: 1\n\n"), frame("data: 2\n\n")];

        write_batch(&mut buf, &batch).await.unwrap();

        assert_eq!(buf.into_inner(), b"data: 1\n\ndata: 2\n\n");
    }
}
