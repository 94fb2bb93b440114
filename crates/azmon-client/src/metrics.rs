//! Azure Monitor `metrics:getBatch` API.
//!
//! One [`MetricsClient`] is bound to one regional endpoint. The batch API
//! accepts at most [`MAX_RESOURCES_PER_QUERY`] resource IDs per call; larger
//! batches are rejected before anything goes on the wire.

use std::sync::Arc;

use azmon_core::QueryOptions;
use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::deadline::Deadline;
use crate::error::{ClientError, ClientResult};
use crate::resourcegraph::ApiFuture;
use crate::transport::Transport;

pub const MAX_RESOURCES_PER_QUERY: usize = 50;
pub const METRICS_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_METRICS_ENDPOINT_TEMPLATE: &str = "https://{region}.metrics.monitor.azure.com";

/// One batch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsQuery {
    pub subscription_id: String,
    pub metric_namespace: String,
    pub metric_names: Vec<String>,
    pub resource_ids: Vec<String>,
    pub options: QueryOptions,
}

#[derive(Debug, Serialize)]
struct ResourceIdList<'a> {
    resourceids: &'a [String],
}

/// Response of `metrics:getBatch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricResults {
    #[serde(default)]
    pub values: Vec<MetricData>,
}

/// Metrics of one resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricData {
    #[serde(default)]
    pub starttime: Option<String>,
    #[serde(default)]
    pub endtime: Option<String>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub resourceregion: String,
    #[serde(default)]
    pub resourceid: String,
    #[serde(default, rename = "value")]
    pub values: Vec<Metric>,
}

/// Localizable name pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizableString {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub localized_value: String,
}

/// One metric of one resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: LocalizableString,
    #[serde(default)]
    pub display_description: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub timeseries: Vec<TimeSeries>,
}

impl Metric {
    /// `Some((code, message))` when the service reported a per-metric error.
    pub fn error(&self) -> Option<(&str, &str)> {
        match self.error_code.as_deref() {
            Some(code) if !code.is_empty() && code != "Success" => {
                Some((code, self.error_message.as_deref().unwrap_or_default()))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    #[serde(default)]
    pub metadatavalues: Vec<MetadataValue>,
    #[serde(default)]
    pub data: Vec<MetricValue>,
}

/// A dimension value of a time series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataValue {
    #[serde(default)]
    pub name: LocalizableString,
    #[serde(default)]
    pub value: String,
}

/// One data point. Each aggregation may be null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValue {
    #[serde(default)]
    pub time_stamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub total: Option<f64>,
    #[serde(default)]
    pub average: Option<f64>,
    #[serde(default)]
    pub count: Option<f64>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Batch metrics query for one region.
pub trait MetricsApi: Send + Sync {
    fn query_resources<'a>(&'a self, query: &'a MetricsQuery, deadline: Deadline) -> ApiFuture<'a, MetricResults>;
}

/// Builds region-bound [`MetricsApi`] instances.
pub trait MetricsApiFactory: Send + Sync {
    fn build(&self, region: &str) -> ClientResult<Arc<dyn MetricsApi>>;
}

/// HTTP implementation bound to one regional endpoint.
#[derive(Clone)]
pub struct MetricsClient {
    transport: Transport,
    endpoint: Url,
}

impl MetricsClient {
    pub fn new(transport: Transport, endpoint: &str) -> ClientResult<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| ClientError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        if endpoint.cannot_be_a_base() || endpoint.host_str().is_none() {
            return Err(ClientError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: "endpoint has no host".to_string(),
            });
        }
        Ok(Self { transport, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn request_url(&self, query: &MetricsQuery) -> Url {
        let mut url = self.endpoint.clone();
        url.set_path(&format!("/subscriptions/{}/metrics:getBatch", query.subscription_id));
        url.set_query(None);
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("api-version", METRICS_API_VERSION);
            pairs.append_pair("metricnamespace", &query.metric_namespace);
            pairs.append_pair("metricnames", &query.metric_names.join(","));
            let options = &query.options;
            if let Some(aggregation) = &options.aggregation {
                pairs.append_pair("aggregation", aggregation);
            }
            if let Some(interval) = &options.interval {
                pairs.append_pair("interval", interval);
            }
            if let Some(filter) = &options.filter {
                pairs.append_pair("filter", filter);
            }
            if let Some(top) = options.top {
                pairs.append_pair("top", &top.to_string());
            }
        }
        url
    }
}

impl MetricsApi for MetricsClient {
    fn query_resources<'a>(&'a self, query: &'a MetricsQuery, deadline: Deadline) -> ApiFuture<'a, MetricResults> {
        Box::pin(async move {
            if query.resource_ids.len() > MAX_RESOURCES_PER_QUERY {
                return Err(ClientError::BatchTooLarge {
                    size: query.resource_ids.len(),
                    limit: MAX_RESOURCES_PER_QUERY,
                });
            }
            let builder = self
                .transport
                .client()
                .post(self.request_url(query))
                .json(&ResourceIdList {
                    resourceids: &query.resource_ids,
                });
            self.transport.send_json(builder, deadline).await
        })
    }
}

/// Factory substituting `{region}` into an endpoint template.
#[derive(Clone)]
pub struct HttpMetricsFactory {
    transport: Transport,
    template: String,
}

impl HttpMetricsFactory {
    pub fn new(transport: Transport, template: impl Into<String>) -> Self {
        Self {
            transport,
            template: template.into(),
        }
    }

    /// Regional endpoint for `region`.
    pub fn endpoint_for(&self, region: &str) -> ClientResult<String> {
        if region.is_empty() || !region.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ClientError::InvalidEndpoint {
                endpoint: self.template.clone(),
                reason: format!("invalid region {region:?}"),
            });
        }
        Ok(self.template.replace("{region}", &region.to_lowercase()))
    }
}

impl MetricsApiFactory for HttpMetricsFactory {
    fn build(&self, region: &str) -> ClientResult<Arc<dyn MetricsApi>> {
        let endpoint = self.endpoint_for(region)?;
        Ok(Arc::new(MetricsClient::new(self.transport.clone(), &endpoint)?))
    }
}
