//! Frame buffer for accumulating partial reads.
//!
//! Holds decoded text that has not yet been attributed to a complete frame
//! and splits it at `\n\n` boundaries. Boundary search is done on the buffer,
//! never per chunk, so a boundary split across two reads is still found.
//!
//! # Example
//!
//! ```
//! use ssewire::protocol::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//!
//! let frames = buffer.push("data: 1\n\ndata: ").unwrap();
//! assert_eq!(frames, vec!["data: 1".to_string()]);
//!
//! let frames = buffer.push("2\n\n").unwrap();
//! assert_eq!(frames, vec!["data: 2".to_string()]);
//! assert!(buffer.is_empty());
//! ```

use super::wire_format::{BOUNDARY, BOUNDARY_BYTES, DEFAULT_MAX_FRAME_SIZE};
use crate::error::{Result, SsewireError};

/// Buffer for accumulating incoming text and extracting complete raw frames.
pub struct FrameBuffer {
    /// Text received but not yet consumed.
    buffer: String,
    /// Offset up to which the buffer is known to contain no boundary.
    scanned: usize,
    /// Maximum length of a single frame, boundary excluded.
    max_frame_size: usize,
}

impl FrameBuffer {
    /// Create a new frame buffer with default settings.
    ///
    /// Default capacity: 64KB, max frame: 16 MiB.
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a new frame buffer with a custom max frame size.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: String::with_capacity(64 * 1024),
            scanned: 0,
            max_frame_size,
        }
    }

    /// Push text into the buffer and extract all complete raw frames.
    ///
    /// Returns the text before each boundary, in order. Text after the last
    /// boundary stays buffered verbatim for the next push.
    ///
    /// # Errors
    ///
    /// Returns error if a complete frame, or the unterminated remainder, is
    /// longer than `max_frame_size`. The limit applies to the frame text, so
    /// the same input fails the same way however it is split across pushes.
    pub fn push(&mut self, text: &str) -> Result<Vec<String>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        self.buffer.push_str(text);

        let mut frames = Vec::new();
        let mut consumed = 0;

        while let Some(end) = self.find_boundary(consumed) {
            self.check_size(end - consumed)?;
            frames.push(self.buffer[consumed..end].to_string());
            consumed = end + BOUNDARY.len();
            self.scanned = consumed;
        }

        if consumed > 0 {
            self.buffer.drain(..consumed);
        }
        // A boundary may straddle the end of the buffer; rescan its last byte
        self.scanned = self.buffer.len().saturating_sub(BOUNDARY.len() - 1);

        self.check_size(self.pending_frame_len())?;

        Ok(frames)
    }

    /// Length of the buffered frame text, not counting a trailing byte that
    /// may be the first half of a boundary.
    fn pending_frame_len(&self) -> usize {
        let len = self.buffer.len();
        if self.buffer.as_bytes().last() == BOUNDARY_BYTES.first() {
            len - 1
        } else {
            len
        }
    }

    fn check_size(&self, frame_len: usize) -> Result<()> {
        if frame_len > self.max_frame_size {
            return Err(SsewireError::Protocol(format!(
                "Frame exceeds maximum size of {} bytes",
                self.max_frame_size
            )));
        }
        Ok(())
    }

    /// Find the next boundary at or after `from`, skipping already-scanned text.
    fn find_boundary(&self, from: usize) -> Option<usize> {
        let start = from.max(self.scanned);
        self.buffer.as_bytes()[start..]
            .windows(BOUNDARY_BYTES.len())
            .position(|window| window == BOUNDARY_BYTES)
            .map(|pos| start + pos)
    }

    /// Take whatever is left in the buffer, leaving it empty.
    ///
    /// Used at end of stream to report an unterminated trailing frame.
    pub fn take_remainder(&mut self) -> String {
        self.scanned = 0;
        std::mem::take(&mut self.buffer)
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get the buffered text.
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.scanned = 0;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
