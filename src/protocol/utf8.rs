//! Streaming UTF-8 decoder.
//!
//! Network chunks split multi-byte characters at arbitrary offsets. The
//! decoder holds back an incomplete trailing sequence (at most 3 bytes) and
//! prepends it to the next chunk, so every character is decoded exactly once.
//! Only a byte sequence that can never become valid is an error.

use crate::error::{Result, SsewireError};

/// Stateful per-stream UTF-8 decoder.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    /// Incomplete sequence carried over from the previous chunk.
    pending: Vec<u8>,
    /// Bytes fully decoded so far (for error offsets).
    decoded: u64,
}

impl Utf8Decoder {
    /// Create a new decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a chunk, returning all text that is complete so far.
    ///
    /// # Errors
    ///
    /// Returns [`SsewireError::Decode`] if the input contains a byte sequence
    /// that is invalid regardless of what follows.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<String> {
        if chunk.is_empty() {
            return Ok(String::new());
        }

        let bytes = if self.pending.is_empty() {
            chunk.to_vec()
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            joined
        };

        match String::from_utf8(bytes) {
            Ok(text) => {
                self.decoded += text.len() as u64;
                Ok(text)
            }
            Err(e) => {
                let error = e.utf8_error();
                let valid = error.valid_up_to();

                if error.error_len().is_some() {
                    return Err(SsewireError::Decode {
                        offset: self.decoded + valid as u64,
                    });
                }

                // Incomplete sequence at the end: keep it for the next chunk
                let mut bytes = e.into_bytes();
                self.pending = bytes.split_off(valid);
                let text = String::from_utf8(bytes).map_err(|_| SsewireError::Decode {
                    offset: self.decoded,
                })?;
                self.decoded += text.len() as u64;
                Ok(text)
            }
        }
    }

    /// Flush at end of stream.
    ///
    /// Any incomplete sequence left over is returned lossily decoded so it can
    /// be reported with the rest of the unterminated data.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }

    /// Number of bytes held back waiting for the rest of a character.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
