//! azmon-core: shared types for the azmon probe.
//!
//! - [`ProbeConfig`]: the validated per-request configuration parsed from
//!   `/probe` query parameters.
//! - [`parse_go_duration`]: duration strings in the `1m30s` / `500ms` form.
//! - [`ResourceInventory`]: discovered resources grouped by region and
//!   subscription, plus per-resource extra labels.
//! - [`Aggregation`]: the five aggregation kinds the metrics API reports.
//! - [`text`]: escaping and value formatting for the text exposition format.

pub mod config;
pub mod duration;
pub mod error;
pub mod text;
pub mod types;

pub use config::{ProbeConfig, QueryOptions};
pub use duration::parse_go_duration;
pub use error::{ConfigError, DurationError};
pub use types::*;
