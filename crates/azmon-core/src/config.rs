//! `/probe` request parameter parser.
//!
//! Parameters may repeat. List-valued parameters also accept the `name[]`
//! suffix form, which is only consulted when the plain form is absent.

use std::collections::HashMap;
use std::time::Duration;

use crate::duration::parse_go_duration;
use crate::error::ConfigError;

pub const DEFAULT_QUERY: &str = "Resources";
pub const DEFAULT_METRIC_PREFIX: &str = "azure_monitor";

/// Pass-through options for the metrics batch API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Comma-separated aggregation selector, e.g. `average,maximum`.
    pub aggregation: Option<String>,
    /// ISO-8601 interval, e.g. `PT5M`.
    pub interval: Option<String>,
    /// Metric filter expression.
    pub filter: Option<String>,
    /// Maximum number of records per dimension.
    pub top: Option<i32>,
}

/// Validated configuration for a single probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Subscriptions to query. `None` means the process-wide fallback list.
    pub subscriptions: Option<Vec<String>>,
    pub resource_type: String,
    /// Base inventory query, filtered further by resource type.
    pub query: String,
    /// Metric namespace sent to the metrics API.
    pub metric_namespace: String,
    pub metric_names: Vec<String>,
    /// Leading segment of every synthesized metric name.
    pub metric_prefix: String,
    /// Inventory cache TTL. Zero disables caching.
    pub query_cache_expiration: Duration,
    pub options: QueryOptions,
}

/// Repeated-key view over raw query pairs.
struct Params(HashMap<String, Vec<String>>);

impl Params {
    fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (k, v) in pairs {
            map.entry(k.into()).or_default().push(v.into());
        }
        Self(map)
    }

    fn all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Values of `key`, falling back to `key[]` when `key` is absent.
    fn list(&self, key: &str) -> &[String] {
        let plain = self.all(key);
        if !plain.is_empty() {
            return plain;
        }
        self.all(&format!("{key}[]"))
    }

    /// At most one value; empty strings count as absent.
    fn at_most_once(&self, key: &'static str) -> Result<Option<&str>, ConfigError> {
        match self.all(key) {
            [] => Ok(None),
            [value] if value.is_empty() => Ok(None),
            [value] => Ok(Some(value.as_str())),
            _ => Err(ConfigError::NotOnce(key)),
        }
    }
}

impl ProbeConfig {
    /// Build a config from decoded query pairs.
    pub fn from_query_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let params = Params::new(pairs);

        let subscriptions = match params.list("subscriptionID") {
            [] => None,
            subs => Some(subs.to_vec()),
        };

        let resource_type = match params.all("resourceType") {
            [value] if !value.is_empty() => value.clone(),
            _ => return Err(ConfigError::NotOnce("resourceType")),
        };

        let metric_names = match params.list("metricName") {
            [] => return Err(ConfigError::Missing("metricName")),
            names => names.to_vec(),
        };

        let query = params
            .at_most_once("query")?
            .unwrap_or(DEFAULT_QUERY)
            .to_string();

        let aggregation = match params.list("aggregation") {
            [] => None,
            values => Some(values.join(",")),
        };

        let interval = params.at_most_once("interval")?.map(str::to_string);
        let filter = params.at_most_once("filter")?.map(str::to_string);

        let metric_prefix = params
            .at_most_once("metricPrefix")?
            .unwrap_or(DEFAULT_METRIC_PREFIX)
            .to_string();

        let metric_namespace = params
            .at_most_once("metricNamespace")?
            .unwrap_or(&resource_type)
            .to_string();

        let top = params
            .at_most_once("top")?
            .map(|v| v.trim().parse::<i32>().map_err(|_| ConfigError::InvalidTop))
            .transpose()?;

        let query_cache_expiration = params
            .at_most_once("queryCacheExpiration")?
            .map(parse_go_duration)
            .transpose()?
            .unwrap_or(Duration::ZERO);

        Ok(Self {
            subscriptions,
            resource_type,
            query,
            metric_namespace,
            metric_names,
            metric_prefix,
            query_cache_expiration,
            options: QueryOptions {
                aggregation,
                interval,
                filter,
                top,
            },
        })
    }

    /// Subscriptions for this request, or `fallback` when none were given.
    pub fn effective_subscriptions<'a>(&'a self, fallback: &'a [String]) -> &'a [String] {
        self.subscriptions.as_deref().unwrap_or(fallback)
    }

    /// Whether inventory results may be cached.
    pub fn caching_enabled(&self) -> bool {
        !self.query_cache_expiration.is_zero()
    }
}
