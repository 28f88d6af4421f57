//! # quickreq - a fluent HTTP request pipeline
//!
//! quickreq is a retry-aware HTTP client library built on top of `reqwest`.
//! Requests are described fluently, assembled into a canonical wire request
//! exactly once, dispatched through a pluggable transport with a bounded
//! retry loop, and returned as a response envelope whose body is
//! materialized lazily, cached, and safe to read from concurrent tasks.
//!
//! ## Quick start
//!
//! ```no_run
//! use http::Method;
//! use quickreq::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), quickreq::Error> {
//!     let mut client = Client::new();
//!     client
//!         .set_base_url("https://api.example.com")
//!         .set_retry_max(3)
//!         .set_auth_token("secret");
//!
//!     let response = client
//!         .request()
//!         .method(Method::GET)
//!         .query_param("id", "5")
//!         .execute("/v1/users")
//!         .await?;
//!
//!     // 4xx/5xx are normal responses, not errors.
//!     if response.is_success() {
//!         let user: serde_json::Value = response.json().await?;
//!         println!("{user}");
//!     } else if response.is_server_error() {
//!         eprintln!("server said {}", response.status());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Design notes
//!
//! - **Assembly happens once.** URL composition, body resolution, cookie
//!   and auth injection all run before the retry loop; assembly errors are
//!   never retried.
//! - **Retries are structural.** Only transport-level failures (refused
//!   connections, DNS errors, timeouts) retry; any HTTP status ends the
//!   loop successfully. On exhaustion the last transport error is preserved
//!   in [`Error::RetriesExhausted`].
//! - **The body is read exactly once.** [`Response::body`] consumes the
//!   underlying stream under a mutex and caches the bytes; every derived
//!   view ([`Response::text`], [`Response::json`], ...) reuses the cache.
//! - **Sharing is compiler-checked.** In-flight requests borrow the
//!   [`Client`] immutably, so reconfiguring a client mid-flight does not
//!   compile. Configure first, then fan out.
//!
//! Logging goes through [`tracing`]; install any subscriber (e.g.
//! `tracing-subscriber`) to capture the structured debug dumps emitted in
//! debug mode.

mod client;
mod error;
mod request;
mod response;
mod transport;
mod util;

pub use client::{get, head, post_form, post_json, Client, JsonCodec, RequestHook, UserInfo};
pub use error::{Error, Result};
pub use request::RequestBuilder;
pub use response::Response;
pub use transport::{
    BodyFuture, BodySupplier, RawResponse, ReqwestTransport, Transport, TransportError,
    WireRequest,
};

/// `application/json`
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// `application/x-www-form-urlencoded`
pub const CONTENT_TYPE_FORM: &str = "application/x-www-form-urlencoded";
/// `application/xml`
pub const CONTENT_TYPE_XML: &str = "application/xml";
/// `text/plain`
pub const CONTENT_TYPE_TEXT: &str = "text/plain";
