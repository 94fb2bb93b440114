//! In-memory fakes of the API traits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use azmon_client::metrics::{
    LocalizableString, MetadataValue, Metric, MetricData, MetricValue, TimeSeries,
};
use azmon_client::{
    ApiFuture, ClientError, ClientResult, Deadline, InventoryApi, MetricResults, MetricsApi,
    MetricsApiFactory, MetricsQuery, QueryRequest, QueryResponse,
};
use chrono::{DateTime, TimeZone, Utc};

/// Replays scripted inventory responses and records every request.
pub struct FakeInventory {
    responses: Mutex<VecDeque<ClientResult<QueryResponse>>>,
    repeat: Option<QueryResponse>,
    requests: Mutex<Vec<QueryRequest>>,
}

impl FakeInventory {
    pub fn new(responses: Vec<ClientResult<QueryResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with `response`.
    pub fn repeating(response: QueryResponse) -> Self {
        Self {
            repeat: Some(response),
            ..Self::new(Vec::new())
        }
    }

    pub fn requests(&self) -> Vec<QueryRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl InventoryApi for FakeInventory {
    fn query<'a>(&'a self, request: &'a QueryRequest, _deadline: Deadline) -> ApiFuture<'a, QueryResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.responses.lock().unwrap().pop_front();
        let result = match (next, &self.repeat) {
            (Some(result), _) => result,
            (None, Some(response)) => Ok(response.clone()),
            (None, None) => Err(ClientError::Api {
                status: 500,
                code: "Exhausted".into(),
                message: "no scripted response left".into(),
            }),
        };
        Box::pin(async move { result })
    }
}

type Responder = dyn Fn(&MetricsQuery) -> ClientResult<MetricResults> + Send + Sync;

/// Metrics API answering through a closure and recording every batch.
pub struct FakeMetrics {
    respond: Box<Responder>,
    queries: Mutex<Vec<MetricsQuery>>,
}

impl FakeMetrics {
    pub fn new(respond: impl Fn(&MetricsQuery) -> ClientResult<MetricResults> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<MetricsQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.queries
            .lock()
            .unwrap()
            .iter()
            .map(|q| q.resource_ids.len())
            .collect()
    }
}

impl MetricsApi for FakeMetrics {
    fn query_resources<'a>(&'a self, query: &'a MetricsQuery, _deadline: Deadline) -> ApiFuture<'a, MetricResults> {
        self.queries.lock().unwrap().push(query.clone());
        let result = (self.respond)(query);
        Box::pin(async move { result })
    }
}

/// Hands out one shared [`FakeMetrics`] for every region and counts builds.
pub struct FakeFactory {
    pub metrics: Arc<FakeMetrics>,
    builds: AtomicUsize,
    fail_region: Option<String>,
}

impl FakeFactory {
    pub fn new(metrics: Arc<FakeMetrics>) -> Self {
        Self {
            metrics,
            builds: AtomicUsize::new(0),
            fail_region: None,
        }
    }

    /// Fail construction for `region`.
    pub fn failing_for(mut self, region: &str) -> Self {
        self.fail_region = Some(region.to_string());
        self
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl MetricsApiFactory for FakeFactory {
    fn build(&self, region: &str) -> ClientResult<Arc<dyn MetricsApi>> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_region.as_deref() == Some(region) {
            return Err(ClientError::InvalidEndpoint {
                endpoint: format!("https://{region}.invalid"),
                reason: "rejected by test".into(),
            });
        }
        Ok(self.metrics.clone())
    }
}

pub fn ts(minute: u32) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).single()
}

pub fn point(minute: u32, average: Option<f64>) -> MetricValue {
    MetricValue {
        time_stamp: ts(minute),
        average,
        ..Default::default()
    }
}

pub fn metric(name: &str, unit: &str, series: Vec<TimeSeries>) -> Metric {
    Metric {
        id: format!("metric/{name}"),
        name: LocalizableString {
            value: name.to_string(),
            localized_value: format!("{name} (localized)"),
        },
        display_description: format!("{name} description"),
        error_code: Some("Success".into()),
        error_message: None,
        unit: unit.to_string(),
        timeseries: series,
    }
}

pub fn series(metadata: &[(&str, &str)], data: Vec<MetricValue>) -> TimeSeries {
    TimeSeries {
        metadatavalues: metadata
            .iter()
            .map(|(name, value)| MetadataValue {
                name: LocalizableString {
                    value: name.to_string(),
                    localized_value: name.to_string(),
                },
                value: value.to_string(),
            })
            .collect(),
        data,
    }
}

pub fn resource(namespace: &str, region: &str, id: &str, metrics: Vec<Metric>) -> MetricData {
    MetricData {
        namespace: namespace.to_string(),
        resourceregion: region.to_string(),
        resourceid: id.to_string(),
        values: metrics,
        ..Default::default()
    }
}
