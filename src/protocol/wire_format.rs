//! Wire format constants and frame encoding.
//!
//! Implements the SSE text framing used between emitter and reassembler:
//! ```text
//! data: {"key0":"value0"}\n
//! \n
//! ```
//!
//! A frame is `kind`, the field separator `": "`, a single-line payload, and
//! the blank-line boundary `\n\n`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, SsewireError};

/// Boundary terminating every frame (a blank line).
pub const BOUNDARY: &str = "\n\n";

/// Boundary as raw bytes, for byte-level scanning.
pub const BOUNDARY_BYTES: &[u8; 2] = b"\n\n";

/// Separator between a frame's kind and its payload.
pub const FIELD_SEPARATOR: &str = ": ";

/// The only frame kind carrying application payloads.
pub const DATA_KIND: &str = "data";

/// Default maximum size of a buffered, not yet terminated frame (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Response headers for an SSE stream, as `(name, value)` pairs.
pub const EVENT_STREAM_HEADERS: [(&str, &str); 3] = [
    ("content-type", EVENT_STREAM_CONTENT_TYPE),
    ("cache-control", "no-cache"),
    ("connection", "keep-alive"),
];

/// MIME type of an SSE response body.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Encode one frame as `kind: payload\n\n`.
///
/// The payload must be a single line; a newline would let the payload
/// forge a boundary.
///
/// # Errors
///
/// Returns a protocol error if `kind` or `payload` contains a newline, or if
/// `kind` contains the field separator.
pub fn encode_frame(kind: &str, payload: &str) -> Result<Bytes> {
    validate_field(kind, payload)?;

    let mut buf = BytesMut::with_capacity(frame_len(kind, payload));
    encode_frame_into(&mut buf, kind, payload);
    Ok(buf.freeze())
}

/// Encode a frame into an existing buffer without validation.
#[inline]
pub fn encode_frame_into(buf: &mut BytesMut, kind: &str, payload: &str) {
    buf.put_slice(kind.as_bytes());
    buf.put_slice(FIELD_SEPARATOR.as_bytes());
    buf.put_slice(payload.as_bytes());
    buf.put_slice(BOUNDARY_BYTES);
}

/// Encoded length of a frame in bytes.
#[inline]
pub fn frame_len(kind: &str, payload: &str) -> usize {
    kind.len() + FIELD_SEPARATOR.len() + payload.len() + BOUNDARY.len()
}

fn validate_field(kind: &str, payload: &str) -> Result<()> {
    if kind.is_empty() || kind.contains('\n') || kind.contains(FIELD_SEPARATOR) {
        return Err(SsewireError::Protocol(format!(
            "Invalid frame kind {:?}",
            kind
        )));
    }
    if payload.contains('\n') {
        return Err(SsewireError::Protocol(
            "Frame payload must be a single line".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_data_frame() {
        let frame = encode_frame(DATA_KIND, r#"{"a":1}"#).unwrap();
        assert_eq!(&frame[..], b"data: {\"a\":1}\n\n");
        assert_eq!(frame.len(), frame_len(DATA_KIND, r#"{"a":1}"#));
    }

    #[test]
    fn test_encode_rejects_multiline_payload() {
        let result = encode_frame(DATA_KIND, "{\"a\":\n1}");
        assert!(matches!(result, Err(SsewireError::Protocol(_))));
    }

    #[test]
    fn test_encode_rejects_bad_kind() {
        assert!(encode_frame("", "x").is_err());
        assert!(encode_frame("da: ta", "x").is_err());
        assert!(encode_frame("da\nta", "x").is_err());
    }

    #[test]
    fn test_encode_into_appends() {
        let mut buf = BytesMut::new();
        encode_frame_into(&mut buf, "comment", "hello");
        encode_frame_into(&mut buf, DATA_KIND, "1");
        assert_eq!(&buf[..], b"comment: hello\n\ndata: 1\n\n");
    }

    #[test]
    fn test_headers() {
        assert_eq!(EVENT_STREAM_HEADERS[0].1, "text/event-stream");
        assert!(EVENT_STREAM_HEADERS
            .iter()
            .any(|(name, value)| *name == "cache-control" && *value == "no-cache"));
    }
}
