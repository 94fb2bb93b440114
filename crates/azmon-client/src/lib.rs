//! azmon-client: outbound Azure API clients.
//!
//! - [`ResourceGraphClient`] ([`InventoryApi`]): paginated inventory queries.
//! - [`MetricsClient`] ([`MetricsApi`]): the regional `metrics:getBatch` API,
//!   built per region by [`HttpMetricsFactory`].
//! - [`SubscriptionsClient`]: subscription listing.
//! - [`RateLimitRecorder`]: quota header telemetry for every response.
//!
//! Every call takes a [`Deadline`] and fails with
//! [`ClientError::DeadlineExceeded`] once it passes. Throttled and 5xx
//! responses are retried within that deadline.

pub mod auth;
pub mod deadline;
pub mod error;
pub mod metrics;
pub mod ratelimit;
pub mod resourcegraph;
pub mod subscriptions;
pub mod transport;

pub use auth::{StaticToken, TokenSource};
pub use deadline::Deadline;
pub use error::{ClientError, ClientResult};
pub use metrics::{
    DEFAULT_METRICS_ENDPOINT_TEMPLATE, HttpMetricsFactory, MAX_RESOURCES_PER_QUERY, MetricResults,
    MetricsApi, MetricsApiFactory, MetricsClient, MetricsQuery,
};
pub use ratelimit::RateLimitRecorder;
pub use resourcegraph::{
    ApiFuture, InventoryApi, QueryRequest, QueryResponse, ResourceGraphClient, ResultTruncated,
};
pub use subscriptions::{DEFAULT_MANAGEMENT_ENDPOINT, Subscription, SubscriptionsClient};
pub use transport::{MAX_ATTEMPTS, Transport};
