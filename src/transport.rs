//! The transport boundary: fully-assembled wire requests go in, raw
//! responses come out.
//!
//! A [`Transport`] performs the actual network I/O and is deliberately
//! opaque: it never interprets HTTP status codes as success or failure, so a
//! 500 is a successful dispatch. Only connection-level problems (refused
//! connections, DNS failures, timeouts) are transport errors, and those are
//! what the executor retries. The default implementation wraps
//! [`reqwest::Client`]; tests substitute doubles to observe the retry loop
//! and body-read behaviour.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Version};
use url::Url;

/// Error produced by a single transport dispatch attempt.
#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    /// A network-level failure from the underlying HTTP client.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Any other transport failure, e.g. from a custom [`Transport`]
    /// implementation or a body supplier that could not re-open the body.
    #[error("{0}")]
    Other(String),
}

/// Re-invokable body source.
///
/// Retries re-dispatch the same [`WireRequest`], so the body must be
/// re-openable rather than a one-shot stream.
pub type BodySupplier = Arc<dyn Fn() -> io::Result<Bytes> + Send + Sync>;

/// One-shot handle to a response body stream.
///
/// Awaiting it is the single read of the underlying stream; the response
/// envelope does so at most once and caches the result.
pub type BodyFuture = Pin<Box<dyn Future<Output = std::result::Result<Bytes, TransportError>> + Send>>;

/// The canonical, fully-resolved outbound request.
///
/// Built exactly once per execution by the request assembler; every retry
/// attempt dispatches this same object, re-obtaining the body through
/// [`WireRequest::body`].
#[derive(Clone)]
pub struct WireRequest {
    /// The HTTP method.
    pub method: Method,
    /// The absolute request URL, query string included.
    pub url: Url,
    /// Finalized headers, cookies already folded into a `Cookie` header.
    pub headers: HeaderMap,
    /// Length of the resolved body, or `None` when a caller-supplied body
    /// supplier makes the length unknown ahead of the read.
    pub content_length: Option<u64>,
    /// Re-invokable body source.
    pub body: BodySupplier,
    /// Timeout honored by the transport for each attempt.
    pub timeout: Option<Duration>,
    /// Wire protocol, pinned at HTTP/1.1.
    pub version: Version,
}

impl std::fmt::Debug for WireRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireRequest")
            .field("method", &self.method)
            .field("url", &self.url.as_str())
            .field("headers", &self.headers)
            .field("content_length", &self.content_length)
            .field("timeout", &self.timeout)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// A raw transport response: status line, headers, and an unread body.
pub struct RawResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The final URL after the transport followed any redirects.
    pub url: Url,
    /// The unread body stream.
    pub body: BodyFuture,
}

/// Performs network I/O for assembled wire requests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Dispatches one attempt of the request.
    ///
    /// Implementations must not treat HTTP error statuses as dispatch
    /// failures; an `Err` here means the request never produced a response.
    async fn dispatch(&self, request: &WireRequest) -> std::result::Result<RawResponse, TransportError>;
}

/// The default [`Transport`], backed by a pooled [`reqwest::Client`].
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Wraps an existing `reqwest::Client`, keeping its pool and TLS setup.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn dispatch(&self, request: &WireRequest) -> std::result::Result<RawResponse, TransportError> {
        let body = (request.body)()
            .map_err(|error| TransportError::Other(format!("failed to open request body: {error}")))?;

        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .version(request.version)
            .headers(request.headers.clone())
            .body(body);
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body: BodyFuture = Box::pin(async move {
            response.bytes().await.map_err(TransportError::from)
        });

        Ok(RawResponse {
            status,
            headers,
            url,
            body,
        })
    }
}
