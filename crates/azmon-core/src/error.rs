//! Error types for probe configuration parsing.

use thiserror::Error;

/// Errors produced while validating `/probe` request parameters.
///
/// The `Display` output is returned verbatim to the caller with a 400 status.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("'{0}' parameter must be specified")]
    Missing(&'static str),

    #[error("'{0}' parameter must be specified once")]
    NotOnce(&'static str),

    #[error("'top' parameter must be a number")]
    InvalidTop,

    #[error("'queryCacheExpiration' parameter must be a duration: {0}")]
    InvalidCacheExpiration(#[from] DurationError),
}

/// Errors produced by [`crate::parse_go_duration`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration")]
    Empty,

    #[error("invalid duration {0:?}")]
    Invalid(String),

    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },

    #[error("negative duration {0:?}")]
    Negative(String),
}
