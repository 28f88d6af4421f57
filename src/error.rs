//! Error types for the request pipeline.
//!
//! Assembly problems (bad URL, missing method) surface immediately and are
//! never retried. Transport failures are retried up to the configured bound
//! and collapse into [`Error::RetriesExhausted`], which keeps the last
//! underlying transport error so callers can still tell a DNS failure from a
//! refused connection.

use crate::transport::TransportError;

/// The main error type for request execution.
///
/// A 4xx/5xx HTTP status is **not** an error: the response is returned
/// normally and callers check [`Response::is_success`](crate::Response::is_success)
/// and friends.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The base URL plus request path did not parse as an absolute URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The request was misconfigured, e.g. no HTTP method was set.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every dispatch attempt failed at the transport level.
    ///
    /// The last transport error is preserved so exhaustion is still
    /// diagnosable.
    #[error("failed to execute request after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// How many dispatch attempts were made.
        attempts: u32,
        /// The transport error from the final attempt.
        last_error: Box<TransportError>,
    },

    /// The response body could not be decoded as JSON.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response body could not be transcoded to UTF-8.
    #[error("failed to convert body to UTF-8: {0}")]
    Encoding(String),

    /// Filesystem error while persisting a response body.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the number of dispatch attempts if this error came from an
    /// exhausted retry loop.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Error::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    /// Returns the last transport error for an exhausted retry loop.
    pub fn last_transport_error(&self) -> Option<&TransportError> {
        match self {
            Error::RetriesExhausted { last_error, .. } => Some(last_error),
            _ => None,
        }
    }
}

/// A specialized `Result` type for request execution.
pub type Result<T> = std::result::Result<T, Error>;
