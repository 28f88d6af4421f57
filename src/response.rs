//! Response envelope with lazy, cached, thread-safe body access.
//!
//! The underlying body stream is consumed at most once: the first
//! [`Response::body`] call materializes it into a shared buffer under a
//! mutex, and every later call — from any task — reuses the cache. All
//! derived views (`text`, `json`, `pretty_print`, ...) are built over that
//! cache and never trigger a second stream read.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use cookie::Cookie;
use http::{header, HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use url::Url;

use crate::client::JsonCodec;
use crate::transport::{BodyFuture, RawResponse};
use crate::{util, Result};

/// Materialize-once body cell.
///
/// `stream` is taken on first read; afterwards exactly one of `bytes` or
/// `error` is set and stays authoritative.
struct BodyCache {
    stream: Option<BodyFuture>,
    bytes: Option<Bytes>,
    error: Option<String>,
}

/// A wrapper around a raw transport response.
///
/// `Response` is cheap to share behind an `Arc` and safe to read from
/// multiple tasks concurrently; the body cache guarantees the underlying
/// stream is read exactly once.
///
/// A 4xx/5xx status is a normal response, not an error — check
/// [`is_success`](Response::is_success) / [`is_client_error`](Response::is_client_error) /
/// [`is_server_error`](Response::is_server_error) explicitly.
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    url: Url,
    method: Method,
    latency: Duration,
    attempts: u32,
    codec: JsonCodec,
    cache: Mutex<BodyCache>,
}

impl Response {
    pub(crate) fn new(
        raw: RawResponse,
        method: Method,
        codec: JsonCodec,
        latency: Duration,
        attempts: u32,
    ) -> Self {
        Self {
            status: raw.status,
            headers: raw.headers,
            url: raw.url,
            method,
            latency,
            attempts,
            codec,
            cache: Mutex::new(BodyCache {
                stream: Some(raw.body),
                bytes: None,
                error: None,
            }),
        }
    }

    /// Returns the response body, reading and closing the underlying stream
    /// exactly once.
    ///
    /// If the read fails the error is recorded on the envelope (see
    /// [`read_error`](Response::read_error)) and this and all future calls
    /// return empty bytes.
    pub async fn body(&self) -> Bytes {
        // The lock is held across the read so concurrent callers observe a
        // single materialization.
        let mut cache = self.cache.lock().await;
        if let Some(bytes) = &cache.bytes {
            return bytes.clone();
        }
        if cache.error.is_some() {
            return Bytes::new();
        }
        match cache.stream.take() {
            Some(stream) => match stream.await {
                Ok(bytes) => {
                    cache.bytes = Some(bytes.clone());
                    bytes
                }
                Err(error) => {
                    tracing::error!(error = %error, url = %self.url, "failed to read response body");
                    cache.error = Some(error.to_string());
                    Bytes::new()
                }
            },
            None => Bytes::new(),
        }
    }

    /// Returns the recorded body-read error, if the single stream read
    /// failed.
    pub async fn read_error(&self) -> Option<String> {
        self.cache.lock().await.error.clone()
    }

    /// Returns the body as a string, replacing invalid UTF-8 sequences.
    pub async fn text(&self) -> String {
        String::from_utf8_lossy(&self.body().await).into_owned()
    }

    /// Deserializes the body as JSON into `T` via the configured codec.
    pub async fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let body = self.body().await;
        let value = self.codec.decode(&body)?;
        Ok(serde_json::from_value(value)?)
    }

    /// Deserializes the body as a JSON object map.
    pub async fn to_map(&self) -> Result<serde_json::Map<String, Value>> {
        self.json().await
    }

    /// Returns the body as an owned byte vector.
    pub async fn to_vec(&self) -> Vec<u8> {
        self.body().await.to_vec()
    }

    /// Pretty-prints the body as indented JSON, falling back to the raw text
    /// when the body is not JSON.
    pub async fn pretty_print(&self) -> String {
        let body = self.body().await;
        match self
            .codec
            .decode(&body)
            .and_then(|value| serde_json::to_string_pretty(&value).map_err(crate::Error::from))
        {
            Ok(pretty) => pretty,
            Err(_) => String::from_utf8_lossy(&body).into_owned(),
        }
    }

    /// Writes the exact body bytes to `path`.
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let body = self.body().await;
        tokio::fs::write(path, &body).await?;
        Ok(())
    }

    /// Validates the cached body as UTF-8 and, when invalid, re-interprets
    /// it as GBK and transcodes it to UTF-8 in place.
    ///
    /// Idempotent: already-valid UTF-8 is left untouched. This is a
    /// heuristic with a single legacy fallback encoding, not negotiated
    /// charset handling.
    pub async fn detect_encoding(&self) -> Result<()> {
        let body = self.body().await;
        if std::str::from_utf8(&body).is_ok() {
            return Ok(());
        }
        let decoded = util::gbk_to_utf8(&body)?;
        self.cache.lock().await.bytes = Some(decoded);
        Ok(())
    }

    /// The HTTP status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// True for statuses in `[200, 300)`.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status.as_u16())
    }

    /// True for statuses in `[400, 500)`.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status.as_u16())
    }

    /// True for statuses in `[500, 600)`.
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status.as_u16())
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the first value of the named header, if present and valid
    /// UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Whether the named header is present.
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }

    /// All values of the named header.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect()
    }

    /// Cookies parsed from the `Set-Cookie` response headers.
    pub fn cookies(&self) -> Vec<Cookie<'static>> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter_map(|raw| Cookie::parse(raw.to_owned()).ok())
            .collect()
    }

    /// The final request URL, redirects applied.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The method of the originating request. Diagnostics only.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Total time from the start of execution until this response arrived,
    /// all retry attempts included.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// How many dispatch attempts this response took.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True when the response needed more than one dispatch attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Full response dump for debug mode.
    pub(crate) async fn log_response(&self) {
        let body = self.text().await;
        let cookies: Vec<String> = self
            .cookies()
            .iter()
            .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
            .collect();
        tracing::debug!(
            status = self.status.as_u16(),
            url = %self.url,
            headers = ?self.headers,
            cookies = ?cookies,
            body = %body,
            "received response"
        );
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("method", &self.method)
            .field("attempts", &self.attempts)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{BodyFuture, TransportError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn canned(
        status: u16,
        headers: HeaderMap,
        body: BodyFuture,
    ) -> Response {
        let raw = RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            url: Url::parse("http://localhost/test").unwrap(),
            body,
        };
        Response::new(
            raw,
            Method::GET,
            JsonCodec::default(),
            Duration::from_millis(1),
            1,
        )
    }

    fn counting_body(bytes: Bytes, reads: Arc<AtomicUsize>) -> BodyFuture {
        Box::pin(async move {
            reads.fetch_add(1, Ordering::SeqCst);
            Ok(bytes)
        })
    }

    #[tokio::test]
    async fn body_is_read_exactly_once_and_cached() {
        let reads = Arc::new(AtomicUsize::new(0));
        let response = canned(
            200,
            HeaderMap::new(),
            counting_body(Bytes::from_static(b"payload"), Arc::clone(&reads)),
        );

        let first = response.body().await;
        let second = response.body().await;

        assert_eq!(first, second);
        assert_eq!(&first[..], b"payload");
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_body_calls_share_one_read() {
        let reads = Arc::new(AtomicUsize::new(0));
        let response = Arc::new(canned(
            200,
            HeaderMap::new(),
            counting_body(Bytes::from_static(b"shared"), Arc::clone(&reads)),
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let response = Arc::clone(&response);
                tokio::spawn(async move { response.body().await })
            })
            .collect();
        for task in tasks {
            assert_eq!(&task.await.unwrap()[..], b"shared");
        }
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_read_is_recorded_and_yields_empty_body() {
        let body: BodyFuture =
            Box::pin(async move { Err(TransportError::Other("stream reset".to_owned())) });
        let response = canned(200, HeaderMap::new(), body);

        assert!(response.body().await.is_empty());
        assert!(response.body().await.is_empty());
        assert_eq!(response.read_error().await.unwrap(), "stream reset");
    }

    #[tokio::test]
    async fn json_and_map_views_reuse_the_cache() {
        let reads = Arc::new(AtomicUsize::new(0));
        let response = canned(
            200,
            HeaderMap::new(),
            counting_body(Bytes::from_static(br#"{"id":5,"name":"ok"}"#), Arc::clone(&reads)),
        );

        let map = response.to_map().await.unwrap();
        assert_eq!(map["id"], 5);
        let text = response.text().await;
        assert!(text.contains("name"));
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn json_decode_failure_is_an_explicit_error() {
        let body: BodyFuture = Box::pin(async { Ok(Bytes::from_static(b"not json")) });
        let response = canned(200, HeaderMap::new(), body);

        let result = response.to_map().await;
        assert!(matches!(result, Err(crate::Error::Decode(_))));
    }

    #[tokio::test]
    async fn pretty_print_falls_back_to_raw_text() {
        let body: BodyFuture = Box::pin(async { Ok(Bytes::from_static(b"plain text")) });
        let response = canned(200, HeaderMap::new(), body);
        assert_eq!(response.pretty_print().await, "plain text");

        let body: BodyFuture = Box::pin(async { Ok(Bytes::from_static(br#"{"a":1}"#)) });
        let response = canned(200, HeaderMap::new(), body);
        let pretty = response.pretty_print().await;
        assert!(pretty.contains("\n"));
        assert!(pretty.contains("\"a\": 1"));
    }

    #[tokio::test]
    async fn detect_encoding_is_idempotent_on_utf8() {
        let body: BodyFuture = Box::pin(async { Ok(Bytes::from_static("héllo".as_bytes())) });
        let response = canned(200, HeaderMap::new(), body);

        response.detect_encoding().await.unwrap();
        response.detect_encoding().await.unwrap();
        assert_eq!(response.text().await, "héllo");
    }

    #[tokio::test]
    async fn detect_encoding_transcodes_gbk_in_place() {
        // "你好" in GBK, invalid as UTF-8.
        let body: BodyFuture = Box::pin(async { Ok(Bytes::from_static(&[0xC4, 0xE3, 0xBA, 0xC3])) });
        let response = canned(200, HeaderMap::new(), body);

        response.detect_encoding().await.unwrap();
        assert_eq!(response.text().await, "你好");
    }

    #[tokio::test]
    async fn status_classification_is_range_arithmetic() {
        let ok = canned(204, HeaderMap::new(), Box::pin(async { Ok(Bytes::new()) }));
        assert!(ok.is_success());
        assert!(!ok.is_client_error());
        assert!(!ok.is_server_error());

        let not_found = canned(404, HeaderMap::new(), Box::pin(async { Ok(Bytes::new()) }));
        assert!(not_found.is_client_error());
        assert!(!not_found.is_success());

        let unavailable = canned(503, HeaderMap::new(), Box::pin(async { Ok(Bytes::new()) }));
        assert!(unavailable.is_server_error());
        assert!(!unavailable.is_success());
    }

    #[tokio::test]
    async fn header_and_cookie_accessors() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        headers.append(header::SET_COOKIE, "session=abc".parse().unwrap());
        headers.append(header::SET_COOKIE, "theme=dark".parse().unwrap());
        let response = canned(200, headers, Box::pin(async { Ok(Bytes::new()) }));

        assert_eq!(response.header("content-type"), Some("application/json"));
        assert!(response.has_header("set-cookie"));
        assert_eq!(response.header_values("set-cookie").len(), 2);
        let cookies = response.cookies();
        assert_eq!(cookies[0].name(), "session");
        assert_eq!(cookies[1].value(), "dark");
    }

    #[tokio::test]
    async fn save_to_file_writes_exact_body_bytes() {
        let body: BodyFuture = Box::pin(async { Ok(Bytes::from_static(b"\x00exact bytes\xff")) });
        let response = canned(200, HeaderMap::new(), body);

        let path = std::env::temp_dir().join("quickreq-save-test.bin");
        response.save_to_file(&path).await.unwrap();
        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, b"\x00exact bytes\xff");
        let _ = std::fs::remove_file(&path);
    }
}
