//! Error types for outbound API calls.

use thiserror::Error;

/// Errors from the inventory, metrics and subscription APIs.
///
/// A deadline expiry is reported through the same type as any other call
/// failure.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API error: status={status}, code={code}, message={message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("batch of {size} resource IDs exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
}

pub type ClientResult<T> = Result<T, ClientError>;
