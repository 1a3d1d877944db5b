//! JSON codec using `serde_json`.
//!
//! Payloads travel as the text after `data: `, so encoding must always
//! produce a single line: use the compact `to_string`, never
//! `to_string_pretty`. Compact JSON escapes control characters inside
//! strings, so the output can never contain a raw `\n`.
//!
//! # Example
//!
//! ```
//! use ssewire::codec::JsonCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Message {
//!     id: u32,
//!     content: String,
//! }
//!
//! let msg = Message { id: 42, content: "line 1\nline 2".to_string() };
//! let encoded = JsonCodec::encode(&msg).unwrap();
//! assert!(!encoded.contains('\n'));
//!
//! let decoded: Message = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use crate::error::Result;

/// JSON codec for frame payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to single-line JSON text.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized (e.g. a map with
    /// non-string keys).
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }

    /// Decode JSON text to a value.
    ///
    /// Returns the raw `serde_json::Error` so callers can report it next to
    /// the frame it came from.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(
        text: &str,
    ) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_str(text)
    }
}
