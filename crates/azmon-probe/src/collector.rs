//! Two-phase probe orchestration: discovery, then metric fetch.
//!
//! A [`Probe`] is built per request from the shared [`ProbeServices`] and
//! the parsed [`ProbeConfig`]. The set of gauges is only known after
//! collection, so [`Probe::describe`] returns nothing.

use std::sync::Arc;
use std::time::{Duration, Instant};

use azmon_cache::ExpiringCache;
use azmon_client::{Deadline, InventoryApi, MetricsApiFactory};
use azmon_core::{ProbeConfig, ResourceInventory};
use tracing::{error, info, warn};

use crate::clients::MetricsClientCache;
use crate::discovery::get_resources;
use crate::fetch::fetch_metrics;
use crate::sample::{Gauge, Labels, SampleSink};
use crate::synth::sanitize_metric_name;

pub const SCRAPE_TIMEOUT_HEADER: &str = "X-Prometheus-Scrape-Timeout-Seconds";
pub const DEFAULT_SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);
pub const TIMEOUT_MARGIN: Duration = Duration::from_millis(500);
pub const MIN_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

const PHASE_QUERY_RESOURCES: &str = "query_resources";
const PHASE_FETCH_METRICS: &str = "fetch_metrics";

/// Process-wide dependencies shared by all probes.
pub struct ProbeServices {
    pub inventory_api: Arc<dyn InventoryApi>,
    pub inventory_cache: ExpiringCache<Arc<ResourceInventory>>,
    pub metrics_clients: MetricsClientCache,
    /// Used when a request names no subscriptions.
    pub subscriptions: Vec<String>,
}

impl ProbeServices {
    pub fn new(
        inventory_api: Arc<dyn InventoryApi>,
        metrics_factory: Arc<dyn MetricsApiFactory>,
        subscriptions: Vec<String>,
    ) -> Self {
        Self {
            inventory_api,
            inventory_cache: ExpiringCache::new(),
            metrics_clients: MetricsClientCache::new(metrics_factory),
            subscriptions,
        }
    }
}

/// Time budget for one probe from the scrape timeout header.
///
/// Absent, unparseable or non-positive values fall back to
/// [`DEFAULT_SCRAPE_TIMEOUT`]. `margin` is subtracted, with
/// [`MIN_PROBE_TIMEOUT`] as the floor.
pub fn probe_timeout(header: Option<&str>, margin: Duration) -> Duration {
    let scrape_timeout = match header.map(str::trim).filter(|v| !v.is_empty()) {
        None => DEFAULT_SCRAPE_TIMEOUT,
        Some(raw) => match raw.parse::<f64>() {
            Ok(secs) if secs.is_finite() && secs > 0.0 => {
                Duration::try_from_secs_f64(secs).unwrap_or(DEFAULT_SCRAPE_TIMEOUT)
            }
            Ok(_) => DEFAULT_SCRAPE_TIMEOUT,
            Err(_) => {
                warn!(
                    value = raw,
                    default_secs = DEFAULT_SCRAPE_TIMEOUT.as_secs(),
                    "couldn't parse {SCRAPE_TIMEOUT_HEADER}, using default"
                );
                DEFAULT_SCRAPE_TIMEOUT
            }
        },
    };
    scrape_timeout.saturating_sub(margin).max(MIN_PROBE_TIMEOUT)
}

/// One probe request.
pub struct Probe {
    services: Arc<ProbeServices>,
    config: ProbeConfig,
    timeout: Duration,
}

impl Probe {
    pub fn new(services: Arc<ProbeServices>, config: ProbeConfig, scrape_timeout_header: Option<&str>) -> Self {
        Self {
            services,
            config,
            timeout: probe_timeout(scrape_timeout_header, TIMEOUT_MARGIN),
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Metric names known before collection. Always empty.
    pub fn describe(&self) -> Vec<String> {
        Vec::new()
    }

    fn duration_gauge(&self, phase: &str, elapsed: Duration) -> Gauge {
        Gauge::new(
            sanitize_metric_name(&format!("{}_scrape_collector_duration_seconds", self.config.metric_prefix)),
            "azure_monitor_exporter: Duration of a collector scrape.",
            Labels::from([("phase".to_string(), phase.to_string())]),
            elapsed.as_secs_f64(),
        )
    }

    fn success_gauge(&self, success: bool) -> Gauge {
        Gauge::new(
            sanitize_metric_name(&format!("{}_scrape_collector_success", self.config.metric_prefix)),
            "azure_monitor_exporter: Whether a collector succeeded.",
            Labels::new(),
            if success { 1.0 } else { 0.0 },
        )
    }

    /// Run both phases under one deadline and push every sample to `sink`.
    pub async fn collect(&self, sink: &mut (dyn SampleSink + Send)) {
        let deadline = Deadline::after(self.timeout);
        let services = &self.services;

        let started = Instant::now();
        let inventory = get_resources(
            services.inventory_api.as_ref(),
            &services.inventory_cache,
            &self.config,
            &services.subscriptions,
            deadline,
        )
        .await;
        sink.gauge(self.duration_gauge(PHASE_QUERY_RESOURCES, started.elapsed()));

        let inventory = match inventory {
            Ok(inventory) => inventory,
            Err(e) => {
                error!(resource_type = %self.config.resource_type, err = %e, "error querying resources");
                sink.invalid(e.to_string());
                sink.gauge(self.success_gauge(false));
                return;
            }
        };

        let started = Instant::now();
        let fetched = fetch_metrics(&services.metrics_clients, &inventory, &self.config, deadline, sink).await;
        sink.gauge(self.duration_gauge(PHASE_FETCH_METRICS, started.elapsed()));

        if let Err(e) = fetched {
            error!(resource_type = %self.config.resource_type, err = %e, "error fetching metrics");
            sink.invalid(e.to_string());
            sink.gauge(self.success_gauge(false));
            return;
        }

        info!(
            resource_type = %self.config.resource_type,
            resources = inventory.resource_count(),
            "probe complete"
        );
        sink.gauge(self.success_gauge(true));
    }
}
