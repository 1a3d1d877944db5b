//! Transport module - HTTP adapters around the emitter and reassembler.
//!
//! - [`server`]: axum router serving one emitter per request at `/sse`
//! - [`client`]: reqwest subscription feeding a [`Reassembler`](crate::Reassembler)

pub mod client;
pub mod server;

pub use client::{subscribe, subscribe_with, SseResponseExt};
pub use server::{build_app, run_server, EmitterBody, ServerConfig};
