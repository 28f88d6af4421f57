//! Long-lived client configuration and convenience verb helpers.
//!
//! A [`Client`] holds per-session defaults (headers, cookies, query/form
//! parameters, body, auth, retry ceiling, timeout) plus the transport and
//! JSON codec. [`Client::request`] snapshots those defaults into a fresh
//! [`RequestBuilder`], deep-copying the maps so later client mutation never
//! affects a request already under construction.
//!
//! Configuration writes take `&mut Client` while in-flight requests borrow
//! `&Client`, so the borrow checker rules out mutating a client while
//! requests built from it are executing. Fan-out pattern: configure once,
//! then share.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cookie::Cookie;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use serde_json::Value;

use crate::request::RequestBuilder;
use crate::response::Response;
use crate::transport::{ReqwestTransport, Transport, WireRequest};
use crate::{util, Error, Result, CONTENT_TYPE_FORM};

const DEFAULT_RETRY_MAX: u32 = 5;
const DEFAULT_AUTH_SCHEME: &str = "Bearer";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Basic-auth credentials. When set, they take precedence over a bearer
/// token.
#[derive(Debug, Clone)]
pub struct UserInfo {
    /// The username.
    pub username: String,
    /// The password.
    pub password: String,
}

/// Caller-supplied hook that may rewrite the assembled wire request once per
/// execution, e.g. to inject tracing headers.
pub type RequestHook = Arc<dyn Fn(WireRequest) -> WireRequest + Send + Sync>;

/// Injectable JSON codec.
///
/// Both halves default to `serde_json`; substitute function values to swap
/// in an alternate codec without touching the client internals.
#[derive(Clone)]
pub struct JsonCodec {
    encode: Arc<dyn Fn(&Value) -> serde_json::Result<Vec<u8>> + Send + Sync>,
    decode: Arc<dyn Fn(&[u8]) -> serde_json::Result<Value> + Send + Sync>,
}

impl JsonCodec {
    /// Builds a codec from explicit encode/decode strategies.
    pub fn new(
        encode: impl Fn(&Value) -> serde_json::Result<Vec<u8>> + Send + Sync + 'static,
        decode: impl Fn(&[u8]) -> serde_json::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        }
    }

    pub(crate) fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        (self.encode)(value).map_err(Error::from)
    }

    pub(crate) fn decode(&self, bytes: &[u8]) -> Result<Value> {
        (self.decode)(bytes).map_err(Error::from)
    }
}

impl Default for JsonCodec {
    fn default() -> Self {
        Self::new(
            |value| serde_json::to_vec(value),
            |bytes| serde_json::from_slice(bytes),
        )
    }
}

/// A reusable HTTP client with fluent defaults.
///
/// # Examples
///
/// ```no_run
/// use http::Method;
/// use quickreq::Client;
///
/// # async fn example() -> Result<(), quickreq::Error> {
/// let mut client = Client::new();
/// client
///     .set_base_url("https://api.example.com")
///     .set_header("user-agent", "quickreq/0.1")
///     .set_retry_max(3);
///
/// let response = client
///     .request()
///     .method(Method::GET)
///     .query_param("id", "5")
///     .execute("/v1/users")
///     .await?;
///
/// if response.is_success() {
///     println!("{}", response.text().await);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Client {
    method: Option<Method>,
    base_url: String,
    headers: HeaderMap,
    cookies: Vec<Cookie<'static>>,
    query_params: HashMap<String, String>,
    form_params: Vec<(String, String)>,
    body: String,
    user_info: Option<UserInfo>,
    auth_token: Option<String>,
    auth_scheme: String,
    retry_max: u32,
    timeout: Option<Duration>,
    debug: bool,
    request_hook: Option<RequestHook>,
    json_codec: JsonCodec,
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Creates a client with default settings: 5 retries, 30 second timeout,
    /// `Bearer` auth scheme, and a pooled reqwest transport.
    pub fn new() -> Self {
        Self {
            method: None,
            base_url: String::new(),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            query_params: HashMap::new(),
            form_params: Vec::new(),
            body: String::new(),
            user_info: None,
            auth_token: None,
            auth_scheme: DEFAULT_AUTH_SCHEME.to_owned(),
            retry_max: DEFAULT_RETRY_MAX,
            timeout: Some(DEFAULT_TIMEOUT),
            debug: false,
            request_hook: None,
            json_codec: JsonCodec::default(),
            transport: Arc::new(ReqwestTransport::default()),
        }
    }

    /// Sets the default HTTP method for requests built from this client.
    pub fn set_method(&mut self, method: Method) -> &mut Self {
        self.method = Some(method);
        self
    }

    /// Sets the base URL, trimming a trailing `/`.
    ///
    /// An empty port (`host:`) is dropped when the URL is parsed at assembly
    /// time, per RFC 3986 section 6.2.3.
    pub fn set_base_url(&mut self, base_url: impl AsRef<str>) -> &mut Self {
        self.base_url = base_url.as_ref().trim_end_matches('/').to_owned();
        self
    }

    /// Sets a default header, replacing existing values for the key.
    /// Invalid names or values are logged and skipped.
    pub fn set_header(&mut self, key: &str, value: &str) -> &mut Self {
        match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::error!(key, value, "invalid header, skipping"),
        }
        self
    }

    /// Sets several default headers at once.
    pub fn set_headers(&mut self, headers: &[(&str, &str)]) -> &mut Self {
        for (key, value) in headers {
            self.set_header(key, value);
        }
        self
    }

    /// Sets the `User-Agent` header.
    pub fn set_user_agent(&mut self, user_agent: &str) -> &mut Self {
        self.set_header("user-agent", user_agent)
    }

    /// Sets the default raw body.
    pub fn set_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.body = body.into();
        self
    }

    /// Serializes `data` as the default JSON body and forces
    /// `Content-Type: application/json`. Failures are logged and leave the
    /// body untouched.
    pub fn set_body_json<T: Serialize>(&mut self, data: &T) -> &mut Self {
        match serde_json::to_value(data)
            .map_err(Error::from)
            .and_then(|value| self.json_codec.encode(&value))
        {
            Ok(encoded) => self.body = String::from_utf8_lossy(&encoded).into_owned(),
            Err(error) => tracing::error!(error = %error, "failed to marshal JSON body"),
        }
        self.set_header("content-type", crate::CONTENT_TYPE_JSON)
    }

    /// Sets an already-encoded JSON string as the default body.
    ///
    /// Bracket-balanced strings pass through verbatim; anything else is
    /// rejected and logged. The content-type header is forced either way.
    pub fn set_raw_json(&mut self, body: impl Into<String>) -> &mut Self {
        let body = body.into();
        if util::is_json_shaped(&body) {
            self.body = body;
        } else {
            tracing::error!(body = %body, "invalid JSON string, body not set");
        }
        self.set_header("content-type", crate::CONTENT_TYPE_JSON)
    }

    /// Parses a raw `"k=v; k2=v2"` cookie string and appends the cookies to
    /// the defaults.
    pub fn set_cookie(&mut self, raw: &str) -> &mut Self {
        self.cookies.extend(util::parse_cookies(raw));
        self
    }

    /// Appends a pre-built default cookie.
    pub fn set_cookie_raw(&mut self, cookie: Cookie<'static>) -> &mut Self {
        self.cookies.push(cookie);
        self
    }

    /// Appends several pre-built default cookies.
    pub fn set_cookies_raw(&mut self, cookies: Vec<Cookie<'static>>) -> &mut Self {
        self.cookies.extend(cookies);
        self
    }

    /// Drops all default cookies.
    pub fn clear_cookies(&mut self) -> &mut Self {
        self.cookies.clear();
        self
    }

    /// Sets a default query parameter. Last write for a key wins.
    pub fn set_query_param(&mut self, key: &str, value: &str) -> &mut Self {
        self.query_params.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Sets several default query parameters.
    pub fn set_query_params(&mut self, params: &[(&str, &str)]) -> &mut Self {
        for (key, value) in params {
            self.set_query_param(key, value);
        }
        self
    }

    /// Sets a default form parameter, replacing existing values for the key.
    pub fn set_form_param(&mut self, key: &str, value: &str) -> &mut Self {
        self.form_params.retain(|(existing, _)| existing != key);
        self.form_params.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Appends a default form parameter value, keeping existing values.
    pub fn add_form_param(&mut self, key: &str, value: &str) -> &mut Self {
        self.form_params.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Sets several default form parameters.
    pub fn set_form_params(&mut self, params: &[(&str, &str)]) -> &mut Self {
        for (key, value) in params {
            self.set_form_param(key, value);
        }
        self
    }

    /// Sets basic-auth credentials. Takes precedence over a bearer token.
    pub fn set_basic_auth(&mut self, username: &str, password: &str) -> &mut Self {
        self.user_info = Some(UserInfo {
            username: username.to_owned(),
            password: password.to_owned(),
        });
        self
    }

    /// Sets a bearer-style auth token, sent as `Authorization: <scheme> <token>`.
    pub fn set_auth_token(&mut self, token: &str) -> &mut Self {
        self.auth_token = Some(token.to_owned());
        self
    }

    /// Sets the auth scheme used with the token. Defaults to `Bearer`.
    pub fn set_auth_scheme(&mut self, scheme: &str) -> &mut Self {
        self.auth_scheme = scheme.to_owned();
        self
    }

    /// Sets the retry ceiling. Values below 1 still execute one attempt.
    pub fn set_retry_max(&mut self, retry_max: u32) -> &mut Self {
        self.retry_max = retry_max;
        self
    }

    /// Sets the per-attempt timeout. Defaults to 30 seconds.
    pub fn set_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Enables or disables full request/response dumps after each attempt.
    pub fn set_debug(&mut self, debug: bool) -> &mut Self {
        self.debug = debug;
        self
    }

    /// Installs a hook that may rewrite each assembled wire request once,
    /// before the retry loop.
    pub fn set_request_hook(&mut self, hook: RequestHook) -> &mut Self {
        self.request_hook = Some(hook);
        self
    }

    /// Replaces the JSON codec used for body marshaling and response
    /// decoding.
    pub fn set_json_codec(&mut self, codec: JsonCodec) -> &mut Self {
        self.json_codec = codec;
        self
    }

    /// Replaces the transport. Useful for tests and custom I/O stacks.
    pub fn set_transport(&mut self, transport: Arc<dyn Transport>) -> &mut Self {
        self.transport = transport;
        self
    }

    /// Starts a request from a deep-copied snapshot of the client defaults.
    ///
    /// Later mutation of the client cannot affect the returned builder; the
    /// builder additionally borrows the client, so the compiler rejects
    /// mutation while it is alive.
    pub fn request(&self) -> RequestBuilder<'_> {
        RequestBuilder::new(self)
    }

    /// Convenience GET: query params and headers on top of the defaults.
    pub async fn get(
        &mut self,
        url_path: &str,
        params: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        self.set_method(Method::GET);
        self.request()
            .query_params(params)
            .headers(headers)
            .execute(url_path)
            .await
    }

    /// Convenience HEAD request.
    pub async fn head(
        &mut self,
        url_path: &str,
        params: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        self.set_method(Method::HEAD);
        self.request()
            .query_params(params)
            .headers(headers)
            .execute(url_path)
            .await
    }

    /// Convenience POST with query params only.
    pub async fn post(
        &mut self,
        url_path: &str,
        params: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        self.set_method(Method::POST);
        self.request()
            .query_params(params)
            .headers(headers)
            .execute(url_path)
            .await
    }

    /// Convenience POST with URL-encoded form data.
    pub async fn post_form(
        &mut self,
        url_path: &str,
        data: &[(&str, &str)],
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        self.set_method(Method::POST);
        self.request()
            .header("content-type", CONTENT_TYPE_FORM)
            .form_params(data)
            .headers(headers)
            .execute(url_path)
            .await
    }

    /// Convenience POST with a JSON body.
    pub async fn post_json<T: Serialize>(
        &mut self,
        url_path: &str,
        data: &T,
        headers: &[(&str, &str)],
    ) -> Result<Response> {
        self.set_method(Method::POST);
        self.request()
            .json(data)
            .headers(headers)
            .execute(url_path)
            .await
    }

    pub(crate) fn default_method(&self) -> Option<Method> {
        self.method.clone()
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn default_headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub(crate) fn default_cookies(&self) -> &[Cookie<'static>] {
        &self.cookies
    }

    pub(crate) fn default_query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    pub(crate) fn default_form_params(&self) -> &[(String, String)] {
        &self.form_params
    }

    pub(crate) fn default_body(&self) -> &str {
        &self.body
    }

    pub(crate) fn user_info(&self) -> Option<&UserInfo> {
        self.user_info.as_ref()
    }

    pub(crate) fn auth_token(&self) -> Option<&str> {
        self.auth_token.as_deref()
    }

    pub(crate) fn auth_scheme(&self) -> &str {
        &self.auth_scheme
    }

    pub(crate) fn retry_max(&self) -> u32 {
        self.retry_max
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn debug(&self) -> bool {
        self.debug
    }

    pub(crate) fn request_hook(&self) -> Option<&RequestHook> {
        self.request_hook.as_ref()
    }

    pub(crate) fn json_codec(&self) -> &JsonCodec {
        &self.json_codec
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot GET with a throwaway client.
pub async fn get(
    url: &str,
    params: &[(&str, &str)],
    headers: &[(&str, &str)],
) -> Result<Response> {
    let mut client = Client::new();
    client.set_base_url(url);
    client.get("", params, headers).await
}

/// One-shot HEAD with a throwaway client.
pub async fn head(
    url: &str,
    params: &[(&str, &str)],
    headers: &[(&str, &str)],
) -> Result<Response> {
    let mut client = Client::new();
    client.set_base_url(url);
    client.head("", params, headers).await
}

/// One-shot form POST with a throwaway client.
pub async fn post_form(
    url: &str,
    data: &[(&str, &str)],
    headers: &[(&str, &str)],
) -> Result<Response> {
    let mut client = Client::new();
    client.set_base_url(url);
    client.post_form("", data, headers).await
}

/// One-shot JSON POST with a throwaway client.
pub async fn post_json<T: Serialize>(
    url: &str,
    data: &T,
    headers: &[(&str, &str)],
) -> Result<Response> {
    let mut client = Client::new();
    client.set_base_url(url);
    client.post_json("", data, headers).await
}
