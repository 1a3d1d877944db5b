//! HTTP server exposing the emitter at `/sse`.
//!
//! Every request, `GET` or `POST`, gets its own [`Emitter`] writing into an
//! in-memory duplex pipe. The read half of the pipe is the response body, and
//! the body owns the emitter's handle: when the client goes away axum drops
//! the body, which drops the handle and cancels the emitter.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::Stream;
use tokio::io::DuplexStream;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use crate::emitter::{Emitter, EmitterConfig, EmitterHandle, KeyValueSource};
use crate::protocol::EVENT_STREAM_HEADERS;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default size of the in-memory pipe between an emitter and its response body.
pub const DEFAULT_PIPE_CAPACITY: usize = 256 * 1024;

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind on `127.0.0.1`.
    pub port: u16,
    /// Entries per generated payload.
    pub payload_size: usize,
    /// Per-connection emitter settings.
    pub emitter: EmitterConfig,
    /// Bytes the pipe buffers before the writer task blocks.
    pub pipe_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            payload_size: KeyValueSource::DEFAULT_SIZE,
            emitter: EmitterConfig::default(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

/// Response body streaming one emitter's output.
///
/// Dropping the body cancels the emitter.
pub struct EmitterBody {
    reader: ReaderStream<DuplexStream>,
    handle: EmitterHandle,
}

impl EmitterBody {
    /// Wrap the read half of an emitter's pipe.
    pub fn new(reader: DuplexStream, handle: EmitterHandle) -> Self {
        Self {
            reader: ReaderStream::new(reader),
            handle,
        }
    }

    /// The emitter feeding this body.
    pub fn handle(&self) -> &EmitterHandle {
        &self.handle
    }
}

impl Stream for EmitterBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().reader).poll_next(cx)
    }
}

impl Drop for EmitterBody {
    fn drop(&mut self) {
        debug!(state = ?self.handle.state(), "sse body dropped");
    }
}

/// Build the axum application router.
///
/// Separated from [`run_server`] to enable testing without a fixed port.
pub fn build_app(config: ServerConfig) -> Router {
    Router::new()
        .route("/sse", get(handle_sse).post(handle_sse))
        .with_state(Arc::new(config))
}

async fn handle_sse(State(config): State<Arc<ServerConfig>>, method: Method) -> Response {
    let (sink, reader) = tokio::io::duplex(config.pipe_capacity);
    let source = KeyValueSource::new(config.payload_size);
    let handle = Emitter::with_config(source, config.emitter.clone()).start(sink);
    info!(%method, payload_size = config.payload_size, "sse connection opened");

    let mut response = Body::from_stream(EmitterBody::new(reader, handle)).into_response();
    let headers = response.headers_mut();
    for (name, value) in EVENT_STREAM_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    response
}

/// Serve the app on an already bound listener.
pub async fn serve(listener: TcpListener, config: ServerConfig) -> io::Result<()> {
    axum::serve(listener, build_app(config)).await
}

/// Run the HTTP server
///
/// Binds to `127.0.0.1:<port>` and serves until the process exits.
pub async fn run_server(config: ServerConfig) -> io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;
    info!(
        addr = %listener.local_addr()?,
        interval_ms = config.emitter.interval.as_millis() as u64,
        "ssewire server listening"
    );
    serve(listener, config).await
}
