//! Codec module - serialization/deserialization for payloads.
//!
//! - [`JsonCodec`] - single-line JSON using `serde_json`
//!
//! # Design
//!
//! Codecs are marker structs with static methods rather than trait objects,
//! so the payload type is chosen at compile time by the caller.

mod json;

pub use json::JsonCodec;
