//! Batched metric retrieval for a discovered inventory.

use azmon_client::metrics::{Metric, MetricData, MetricValue};
use azmon_client::{Deadline, MAX_RESOURCES_PER_QUERY, MetricsQuery};
use azmon_core::{Aggregation, ExtraLabels, ProbeConfig, ResourceInventory};
use tracing::{debug, warn};

use crate::clients::MetricsClientCache;
use crate::error::ProbeResult;
use crate::sample::{Gauge, MetricIdentity, SampleSink};
use crate::synth;

/// What happened to one metric of one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOutcome {
    /// Number of gauges pushed.
    Emitted(usize),
    /// The service reported an error for this metric.
    Skipped,
}

/// Fetch metrics for every (region, subscription) bucket of `inventory`.
///
/// Any request-level failure aborts the whole fetch.
pub async fn fetch_metrics(
    clients: &MetricsClientCache,
    inventory: &ResourceInventory,
    config: &ProbeConfig,
    deadline: Deadline,
    sink: &mut (dyn SampleSink + Send),
) -> ProbeResult<()> {
    for (region, subscription_id, resource_ids) in inventory.buckets() {
        let client = clients.get(region)?;

        for batch in resource_ids.chunks(MAX_RESOURCES_PER_QUERY) {
            let query = MetricsQuery {
                subscription_id: subscription_id.to_string(),
                metric_namespace: config.metric_namespace.clone(),
                metric_names: config.metric_names.clone(),
                resource_ids: batch.to_vec(),
                options: config.options.clone(),
            };
            let results = client.query_resources(&query, deadline).await?;
            debug!(
                %region,
                subscription_id,
                batch = batch.len(),
                resources = results.values.len(),
                "metrics batch"
            );

            let mut skipped = 0usize;
            for data in &results.values {
                let extra = inventory.extra_labels(&data.resourceid);
                for metric in &data.values {
                    if emit_entity(config, subscription_id, region, data, metric, extra, sink)
                        == EntityOutcome::Skipped
                    {
                        skipped += 1;
                    }
                }
            }
            if skipped > 0 {
                debug!(%region, subscription_id, skipped, "metrics skipped");
            }
        }
    }
    Ok(())
}

/// Turn one metric of one resource into gauges.
pub fn emit_entity(
    config: &ProbeConfig,
    subscription_id: &str,
    bucket_region: &str,
    data: &MetricData,
    metric: &Metric,
    extra: Option<&ExtraLabels>,
    sink: &mut (dyn SampleSink + Send),
) -> EntityOutcome {
    if let Some((code, message)) = metric.error() {
        warn!(
            resource_id = %data.resourceid,
            metric = %metric.name.value,
            err = %format!("{code}: {message}"),
            "error querying metric"
        );
        return EntityOutcome::Skipped;
    }

    let region = if data.resourceregion.is_empty() {
        bucket_region
    } else {
        data.resourceregion.as_str()
    };
    let metadata = metric
        .timeseries
        .iter()
        .find(|ts| !ts.data.is_empty())
        .map(|ts| ts.metadatavalues.as_slice())
        .unwrap_or_default();
    let labels = synth::build_labels(subscription_id, region, &data.resourceid, extra, metadata);
    let help = synth::help_text(metric);

    let latest = latest_values(metric);
    let mut emitted = 0;
    for (aggregation, value) in Aggregation::ALL.into_iter().zip(latest) {
        let Some(value) = value else { continue };
        let name = synth::metric_name(
            &config.metric_prefix,
            &data.namespace,
            &metric.name.value,
            aggregation,
            &metric.unit,
        );
        sink.gauge(
            Gauge::new(name, help.clone(), labels.clone(), value).with_identity(MetricIdentity {
                namespace: data.namespace.clone(),
                metric: metric.name.value.clone(),
                aggregation,
                unit: metric.unit.clone(),
            }),
        );
        emitted += 1;
    }
    EntityOutcome::Emitted(emitted)
}

fn value_of(point: &MetricValue, aggregation: Aggregation) -> Option<f64> {
    match aggregation {
        Aggregation::Total => point.total,
        Aggregation::Average => point.average,
        Aggregation::Count => point.count,
        Aggregation::Minimum => point.minimum,
        Aggregation::Maximum => point.maximum,
    }
}

/// Latest non-null value per aggregation kind, in [`Aggregation::ALL`]
/// order. Ties keep the first value seen.
pub fn latest_values(metric: &Metric) -> [Option<f64>; 5] {
    let mut latest: [Option<(&MetricValue, f64)>; 5] = [None; 5];
    for point in metric.timeseries.iter().flat_map(|ts| &ts.data) {
        for (slot, aggregation) in latest.iter_mut().zip(Aggregation::ALL) {
            let Some(value) = value_of(point, aggregation) else {
                continue;
            };
            let newer = match slot {
                Some((seen, _)) => point.time_stamp > seen.time_stamp,
                None => true,
            };
            if newer {
                *slot = Some((point, value));
            }
        }
    }
    latest.map(|slot| slot.map(|(_, value)| value))
}
