//! Targets of the workload.
//!
//! The shopping actions speak to the storefront frontend through the
//! [`Transport`] trait, implemented for real traffic by [`frontend::HttpTarget`].
//! The currency probe speaks gRPC to the currency service through
//! [`currency::CurrencyClient`]. Neither interprets responses beyond their
//! status; checking the storefront's answers is not a goal of this program.
//!
//! ## Metrics
//!
//! `requests_sent`: Total number of requests sent
//! `request_ok`: Requests that received a response, labelled by `status_code`
//! `request_failure`: Requests that failed in transport, labelled by `error`
//! `request_latency_seconds`: Time from send until the response body is read
//! `response_bytes`: Total response body bytes received
//!

use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;

pub mod currency;
pub mod frontend;

/// Errors produced by a [`Transport`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The base URL joined with a request path is not a valid URI.
    #[error("Invalid target URI {uri}: {source}")]
    InvalidUri {
        /// The URI that failed to parse
        uri: String,
        /// Underlying parse error
        #[source]
        source: http::uri::InvalidUri,
    },
    /// Wrapper around [`http::Error`].
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),
    /// Error making HTTP request
    #[error("Failed to send HTTP request to {uri}: {source}")]
    RequestFailed {
        /// Target URI
        uri: String,
        /// Underlying client error
        #[source]
        source: Box<hyper_util::client::legacy::Error>,
    },
    /// Error reading the HTTP response body
    #[error("Failed to read response from {uri}: {source}")]
    Body {
        /// Target URI
        uri: String,
        /// Underlying hyper error
        #[source]
        source: Box<hyper::Error>,
    },
    /// The request did not complete in time.
    #[error("Request to {uri} timed out after {timeout:?}")]
    Timeout {
        /// Target URI
        uri: String,
        /// The configured request timeout
        timeout: Duration,
    },
}

#[async_trait]
/// The call contract the shopping actions rely on.
///
/// Paths are absolute, beginning with `/`, and are resolved against the
/// configured base URL by the implementation. A response of any status is a
/// success from the point of view of the caller.
pub trait Transport: Send + Sync {
    /// Issue a GET for `path`.
    async fn get(&self, path: &str) -> Result<StatusCode, Error>;

    /// Issue a POST for `path` carrying `body`, a form-urlencoded string.
    async fn post_form(&self, path: &str, body: String) -> Result<StatusCode, Error>;
}
