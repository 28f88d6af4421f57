//! Per-call request configuration, assembly, and the bounded-retry executor.
//!
//! A [`RequestBuilder`] is created by [`Client::request`](crate::Client::request)
//! as a deep-copied snapshot of the client defaults, mutated through
//! consuming fluent setters, and consumed by [`RequestBuilder::execute`].
//! Assembly happens exactly once per execution; only transport dispatch is
//! retried.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use cookie::Cookie;
use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Version};
use serde::Serialize;
use url::form_urlencoded;
use url::Url;

use crate::client::Client;
use crate::response::Response;
use crate::transport::{BodySupplier, WireRequest};
use crate::{util, Error, Result, CONTENT_TYPE_JSON};

/// Mutable, per-call request state.
///
/// Setters consume and return the builder for chaining. A builder is a
/// single-task value: it is created, configured, and executed on the
/// caller's task, never shared.
pub struct RequestBuilder<'c> {
    client: &'c Client,
    method: Option<Method>,
    path: String,
    headers: HeaderMap,
    cookies: Vec<Cookie<'static>>,
    query_params: HashMap<String, String>,
    form_params: Vec<(String, String)>,
    body: Bytes,
    body_supplier: Option<BodySupplier>,
    timeout: Option<Duration>,
    started_at: Instant,
}

impl<'c> RequestBuilder<'c> {
    pub(crate) fn new(client: &'c Client) -> Self {
        Self {
            client,
            method: client.default_method(),
            path: String::new(),
            headers: client.default_headers().clone(),
            cookies: client.default_cookies().to_vec(),
            query_params: client.default_query_params().clone(),
            form_params: client.default_form_params().to_vec(),
            body: Bytes::from(client.default_body().to_owned()),
            body_supplier: None,
            timeout: None,
            started_at: Instant::now(),
        }
    }

    /// Sets the HTTP method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Sets a header, replacing all existing values for the key.
    ///
    /// Invalid header names or values are logged and skipped.
    pub fn header(mut self, key: &str, value: &str) -> Self {
        match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::error!(key, value, "invalid header, skipping"),
        }
        self
    }

    /// Sets several headers at once.
    pub fn headers(mut self, headers: &[(&str, &str)]) -> Self {
        for (key, value) in headers {
            self = self.header(key, value);
        }
        self
    }

    /// Appends a header value, keeping existing values for the key.
    pub fn add_header(mut self, key: &str, value: &str) -> Self {
        match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::error!(key, value, "invalid header, skipping"),
        }
        self
    }

    /// Removes all values for a header key.
    pub fn remove_header(mut self, key: &str) -> Self {
        if let Ok(name) = HeaderName::try_from(key) {
            self.headers.remove(name);
        }
        self
    }

    /// Returns the first value currently set for a header key.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)?.to_str().ok()
    }

    /// Parses a raw `"k=v; k2=v2"` cookie string and appends the cookies.
    pub fn cookie(mut self, raw: &str) -> Self {
        self.cookies.extend(util::parse_cookies(raw));
        self
    }

    /// Appends a pre-built cookie.
    pub fn cookie_raw(mut self, cookie: Cookie<'static>) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Appends several pre-built cookies.
    pub fn cookies_raw(mut self, cookies: Vec<Cookie<'static>>) -> Self {
        self.cookies.extend(cookies);
        self
    }

    /// Sets a query parameter. Last write for a key wins.
    pub fn query_param(mut self, key: &str, value: &str) -> Self {
        self.query_params.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Sets several query parameters.
    pub fn query_params(mut self, params: &[(&str, &str)]) -> Self {
        for (key, value) in params {
            self.query_params.insert((*key).to_owned(), (*value).to_owned());
        }
        self
    }

    /// Removes a query parameter.
    pub fn remove_query_param(mut self, key: &str) -> Self {
        self.query_params.remove(key);
        self
    }

    /// Sets a form parameter, replacing existing values for the key.
    pub fn form_param(mut self, key: &str, value: &str) -> Self {
        self.form_params.retain(|(existing, _)| existing != key);
        self.form_params.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Appends a form parameter value, keeping existing values for the key.
    pub fn add_form_param(mut self, key: &str, value: &str) -> Self {
        self.form_params.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Sets several form parameters.
    pub fn form_params(mut self, params: &[(&str, &str)]) -> Self {
        for (key, value) in params {
            self = self.form_param(key, value);
        }
        self
    }

    /// Sets the raw request body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Sets the request body from raw bytes, preserved exactly as given.
    pub fn body_bytes(mut self, body: &[u8]) -> Self {
        self.body = Bytes::copy_from_slice(body);
        self
    }

    /// Serializes `data` as the JSON request body and forces
    /// `Content-Type: application/json`.
    ///
    /// Serialization failures are logged and leave the body untouched.
    pub fn json<T: Serialize>(mut self, data: &T) -> Self {
        match serde_json::to_value(data)
            .map_err(Error::from)
            .and_then(|value| self.client.json_codec().encode(&value))
        {
            Ok(encoded) => self.body = Bytes::from(encoded),
            Err(error) => tracing::error!(error = %error, "failed to marshal JSON body"),
        }
        self.header(header::CONTENT_TYPE.as_str(), CONTENT_TYPE_JSON)
    }

    /// Sets an already-encoded JSON string as the body.
    ///
    /// The string is passed through verbatim when it is bracket-balanced
    /// (`{...}` or `[...]`); anything else is rejected and logged, never
    /// silently sent. `Content-Type: application/json` is forced either way.
    pub fn raw_json(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        if util::is_json_shaped(&body) {
            self.body = Bytes::from(body);
        } else {
            tracing::error!(body = %body, "invalid JSON string, body not set");
        }
        self.header(header::CONTENT_TYPE.as_str(), CONTENT_TYPE_JSON)
    }

    /// Installs a re-invokable body supplier.
    ///
    /// A supplier takes precedence over the raw body and form parameters,
    /// and leaves the content length unset since it is unknown ahead of the
    /// read.
    pub fn body_supplier(mut self, supplier: BodySupplier) -> Self {
        self.body_supplier = Some(supplier);
        self
    }

    /// Overrides the client timeout for this request.
    ///
    /// Dropping the returned future is the other cancellation path; neither
    /// is re-checked between retry attempts.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Joins the client base URL with the request path.
    fn join_url(&self) -> String {
        let base = self.client.base_url();
        if self.path.is_empty() {
            base.to_owned()
        } else {
            format!("{}/{}", base, self.path)
        }
    }

    /// Resolves the effective body: an external supplier wins, otherwise
    /// non-empty form parameters are URL-encoded, otherwise the raw body
    /// string is used. A supplier is always (re-)installed so retries can
    /// re-open the body.
    fn resolve_body(&mut self) -> (BodySupplier, Option<u64>) {
        if let Some(supplier) = &self.body_supplier {
            return (Arc::clone(supplier), None);
        }
        let bytes = if self.form_params.is_empty() {
            self.body.clone()
        } else {
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(self.form_params.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .finish();
            Bytes::from(encoded)
        };
        let content_length = bytes.len() as u64;
        let supplier: BodySupplier = Arc::new(move || Ok(bytes.clone()));
        self.body_supplier = Some(Arc::clone(&supplier));
        (supplier, Some(content_length))
    }

    /// Assembles the canonical wire request. Runs exactly once per
    /// execution; assembly failures are never retried.
    fn assemble(&mut self) -> Result<WireRequest> {
        let mut url = Url::parse(&self.join_url())?;
        if !self.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query_params {
                pairs.append_pair(key, value);
            }
            pairs.finish();
        }

        let (body, content_length) = self.resolve_body();

        let method = self
            .method
            .clone()
            .ok_or_else(|| Error::Configuration("HTTP method is not set".to_owned()))?;

        let timeout = self.timeout.or(self.client.timeout());

        let mut headers = self.headers.clone();
        if !self.cookies.is_empty() {
            let value = self
                .cookies
                .iter()
                .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
                .collect::<Vec<_>>()
                .join("; ");
            let value = HeaderValue::from_str(&value)
                .map_err(|error| Error::Configuration(format!("invalid cookie value: {error}")))?;
            headers.insert(header::COOKIE, value);
        }

        if let Some(user) = self.client.user_info() {
            // Basic auth takes precedence over a bearer-style token.
            use base64::engine::general_purpose::STANDARD;
            use base64::Engine as _;
            let credentials = STANDARD.encode(format!("{}:{}", user.username, user.password));
            let value = HeaderValue::from_str(&format!("Basic {credentials}"))
                .map_err(|error| Error::Configuration(format!("invalid credentials: {error}")))?;
            headers.insert(header::AUTHORIZATION, value);
        } else if let Some(token) = self.client.auth_token() {
            let value = HeaderValue::from_str(&format!("{} {}", self.client.auth_scheme(), token))
                .map_err(|error| Error::Configuration(format!("invalid auth token: {error}")))?;
            headers.insert(header::AUTHORIZATION, value);
        }

        Ok(WireRequest {
            method,
            url,
            headers,
            content_length,
            body,
            timeout,
            version: Version::HTTP_11,
        })
    }

    /// Executes the request against `url_path`, retrying transport failures
    /// up to the client's retry ceiling.
    ///
    /// Any response the transport produces — a 500 included — ends the loop
    /// and is returned; status codes are never inspected here.
    pub async fn execute(mut self, url_path: &str) -> Result<Response> {
        self.path = url_path.trim_start_matches('/').to_owned();
        let mut wire = match self.assemble() {
            Ok(wire) => wire,
            Err(error) => {
                tracing::error!(error = %error, "failed to build HTTP request");
                return Err(error);
            }
        };
        if let Some(hook) = self.client.request_hook() {
            // The hook runs once per execution, not once per attempt.
            wire = hook(wire);
        }

        let max_attempts = self.client.retry_max().max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.client.transport().dispatch(&wire).await {
                Ok(raw) => {
                    let response = Response::new(
                        raw,
                        wire.method.clone(),
                        self.client.json_codec().clone(),
                        self.started_at.elapsed(),
                        attempt,
                    );
                    if self.client.debug() {
                        self.log_request(&wire);
                        response.log_response().await;
                    }
                    return Ok(response);
                }
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        attempt,
                        method = %wire.method,
                        url = %wire.url,
                        "request attempt failed"
                    );
                    if self.client.debug() {
                        self.log_request(&wire);
                    }
                    if attempt >= max_attempts {
                        return Err(Error::RetriesExhausted {
                            attempts: attempt,
                            last_error: Box::new(error),
                        });
                    }
                }
            }
        }
    }

    /// Full request dump for debug mode.
    fn log_request(&self, wire: &WireRequest) {
        let cookies: Vec<String> = self
            .cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name(), cookie.value()))
            .collect();
        tracing::debug!(
            method = %wire.method,
            url = %wire.url,
            headers = ?wire.headers,
            cookies = ?cookies,
            query_params = ?self.query_params,
            form_params = ?self.form_params,
            body = %String::from_utf8_lossy(&self.body),
            content_length = ?wire.content_length,
            "performing request"
        );
    }
}
