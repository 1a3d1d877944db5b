//! # ssewire
//!
//! Server-Sent Events framing for tokio.
//!
//! - **Emitter** (server side): one task per connection, ticking at a fixed
//!   interval, writing `data: <json>\n\n` frames to an `AsyncWrite` sink with
//!   backpressure and an explicit defer policy.
//! - **Reassembler** (client side): turns an arbitrarily fragmented byte
//!   stream back into decoded payloads, in order.
//!
//! The two share nothing but the wire format.
//!
//! ## Example
//!
//! ```ignore
//! use ssewire::{Emitter, KeyValueSource, Reassembler};
//! use serde_json::Value;
//!
//! let (sink, source) = tokio::io::duplex(64 * 1024);
//! let handle = Emitter::new(KeyValueSource::new(10)).start(sink);
//!
//! let stats = Reassembler::<Value>::new()
//!     .run_reader(source, |payload| println!("{payload}"))
//!     .await?;
//! ```

pub mod backpressure;
pub mod codec;
pub mod error;
pub mod protocol;
pub mod sink;
pub mod transport;
pub mod writer;

mod emitter;
mod reassembler;

pub use backpressure::{DeferPolicy, DEFAULT_MAX_PENDING};
pub use emitter::{
    from_fn, Emitter, EmitterConfig, EmitterHandle, EmitterState, EmitterStats, FnSource,
    KeyValueSource, PayloadSource, DEFAULT_INTERVAL, MIN_INTERVAL,
};
pub use error::{Result, SsewireError};
pub use reassembler::{Reassembler, ReassemblerStats};
pub use sink::{Diagnostic, DiagnosticLog, DiagnosticSink, PayloadLog, TracingDiagnostics};
pub use writer::WriterConfig;
