//! HTTP subscription to an SSE endpoint.
//!
//! ```ignore
//! use futures::StreamExt;
//! use serde_json::Value;
//!
//! let client = reqwest::Client::new();
//! let stream = ssewire::transport::subscribe::<Value>(&client, "http://127.0.0.1:3000/sse", reqwest::Method::POST).await?;
//! futures::pin_mut!(stream);
//! while let Some(payload) = stream.next().await {
//!     println!("{}", payload?);
//! }
//! ```

use futures::Stream;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::protocol::EVENT_STREAM_CONTENT_TYPE;
use crate::reassembler::Reassembler;
use crate::sink::DiagnosticSink;

/// Extension trait for `reqwest::Response` to reassemble its body.
pub trait SseResponseExt {
    /// Payloads of the response body, through `reassembler`.
    fn payloads<T, D>(self, reassembler: Reassembler<T, D>) -> impl Stream<Item = Result<T>> + Send
    where
        T: DeserializeOwned + Send + 'static,
        D: DiagnosticSink + 'static;
}

impl SseResponseExt for Response {
    fn payloads<T, D>(self, reassembler: Reassembler<T, D>) -> impl Stream<Item = Result<T>> + Send
    where
        T: DeserializeOwned + Send + 'static,
        D: DiagnosticSink + 'static,
    {
        reassembler.attach(self.bytes_stream())
    }
}

/// Open `url` with `method` and return its payload stream.
///
/// # Errors
///
/// Returns error if the request fails or the status is not a success.
pub async fn subscribe<T>(
    client: &Client,
    url: &str,
    method: Method,
) -> Result<impl Stream<Item = Result<T>> + Send>
where
    T: DeserializeOwned + Send + 'static,
{
    subscribe_with(client, url, method, Reassembler::new()).await
}

/// [`subscribe`] with a caller-configured reassembler.
pub async fn subscribe_with<T, D>(
    client: &Client,
    url: &str,
    method: Method,
    reassembler: Reassembler<T, D>,
) -> Result<impl Stream<Item = Result<T>> + Send>
where
    T: DeserializeOwned + Send + 'static,
    D: DiagnosticSink + 'static,
{
    let response = client
        .request(method.clone(), url)
        .header(ACCEPT, EVENT_STREAM_CONTENT_TYPE)
        .send()
        .await?
        .error_for_status()?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    if !content_type.starts_with(EVENT_STREAM_CONTENT_TYPE) {
        tracing::warn!(content_type, "response is not an event stream, reading anyway");
    }

    tracing::info!(%method, url, status = %response.status(), "subscribed");
    Ok(response.payloads(reassembler))
}
