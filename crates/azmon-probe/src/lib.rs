//! azmon-probe: the per-request probe pipeline.
//!
//! A probe runs in two phases under one [`azmon_client::Deadline`]:
//!
//! 1. **Discovery** ([`discovery`]): the paginated inventory query, optionally
//!    served from the shared inventory cache.
//! 2. **Fetch** ([`fetch`]): metrics for each (region, subscription) bucket in
//!    batches of at most 50 resource IDs, reduced to the latest value per
//!    aggregation and synthesized into gauges ([`synth`]).
//!
//! Samples are pushed into a [`SampleSink`] and rendered by [`exposition`].

pub mod clients;
pub mod collector;
pub mod discovery;
pub mod error;
pub mod exposition;
pub mod fetch;
pub mod sample;
pub mod synth;

#[cfg(test)]
pub(crate) mod testing;

pub use clients::MetricsClientCache;
pub use collector::{Probe, ProbeServices, SCRAPE_TIMEOUT_HEADER, probe_timeout};
pub use error::{ProbeError, ProbeResult};
pub use fetch::EntityOutcome;
pub use sample::{Gauge, Labels, MetricIdentity, Sample, SampleSink};
