//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the SSE text framing:
//! - Frame encoding and the shared wire constants
//! - Streaming UTF-8 decoding across chunk boundaries
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors

mod frame;
mod frame_buffer;
mod utf8;
mod wire_format;

pub use frame::Frame;
pub use frame_buffer::FrameBuffer;
pub use utf8::Utf8Decoder;
pub use wire_format::{
    encode_frame, encode_frame_into, frame_len, BOUNDARY, BOUNDARY_BYTES, DATA_KIND,
    DEFAULT_MAX_FRAME_SIZE, EVENT_STREAM_CONTENT_TYPE, EVENT_STREAM_HEADERS, FIELD_SEPARATOR,
};
