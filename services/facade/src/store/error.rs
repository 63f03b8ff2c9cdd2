//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
///
/// Every variant is an infrastructure failure: the store could not be
/// reached, refused the request, or answered with something unreadable.
/// An empty result is never an error at this layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The request never produced a response.
    #[error("store request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("failed to decode store response: {0}")]
    Decode(String),

    /// Failure injected by the in-memory store.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
