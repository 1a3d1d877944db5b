//! Frame struct with typed accessors.
//!
//! Represents one complete SSE frame: a `kind` label and a raw payload.
//! Frames borrow from the reassembly buffer; nothing is copied until the
//! payload is decoded.
//!
//! # Example
//!
//! ```
//! use ssewire::protocol::Frame;
//!
//! let frame = Frame::parse("data: {\"a\":1}").unwrap();
//!
//! assert!(frame.is_data());
//! assert_eq!(frame.payload(), "{\"a\":1}");
//! ```

use bytes::Bytes;

use super::wire_format::{encode_frame, DATA_KIND, FIELD_SEPARATOR};
use crate::error::Result;

/// A complete protocol frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    kind: &'a str,
    payload: &'a str,
}

impl<'a> Frame<'a> {
    /// Create a new frame from kind and payload.
    pub fn new(kind: &'a str, payload: &'a str) -> Self {
        Self { kind, payload }
    }

    /// Create a `data` frame.
    pub fn data(payload: &'a str) -> Self {
        Self::new(DATA_KIND, payload)
    }

    /// Parse a raw frame (the text between two boundaries).
    ///
    /// The text is trimmed, then split at the first `": "`. Returns `None`
    /// when there is no separator.
    pub fn parse(raw: &'a str) -> Option<Self> {
        let (kind, payload) = raw.trim().split_once(FIELD_SEPARATOR)?;
        Some(Self { kind, payload })
    }

    /// Get the frame kind.
    #[inline]
    pub fn kind(&self) -> &'a str {
        self.kind
    }

    /// Get the raw payload text.
    #[inline]
    pub fn payload(&self) -> &'a str {
        self.payload
    }

    /// Check if this frame carries an application payload.
    #[inline]
    pub fn is_data(&self) -> bool {
        self.kind == DATA_KIND
    }

    /// Check if this frame should be decoded: a `data` frame with a payload.
    #[inline]
    pub fn has_payload(&self) -> bool {
        self.is_data() && !self.payload.is_empty()
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Result<Bytes> {
        encode_frame(self.kind, self.payload)
    }
}
