//! Request body encoding.
//!
//! Every POST the storefront accepts is an HTML form submission, so bodies are
//! `application/x-www-form-urlencoded`. Payloads are plain serde structs;
//! fields are emitted in declaration order with keys and values
//! percent-escaped.

use serde::Serialize;

/// The content type of every body produced by [`form`].
pub const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Errors produced by [`form`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wrapper for [`serde_qs::Error`].
    #[error("Failed to form-encode payload: {0}")]
    SerdeQs(#[from] serde_qs::Error),
}

/// Encode `payload` as a form-urlencoded string.
///
/// # Errors
///
/// Function will return an error if `payload` does not serialize as a flat
/// record, for instance a bare sequence.
pub fn form<T>(payload: &T) -> Result<String, Error>
where
    T: Serialize,
{
    Ok(serde_qs::to_string(payload)?)
}
