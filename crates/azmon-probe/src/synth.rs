//! Metric name, label and help text synthesis.

use azmon_client::metrics::{MetadataValue, Metric};
use azmon_core::{Aggregation, ExtraLabels};

use crate::sample::Labels;

pub const LABEL_SUBSCRIPTION_ID: &str = "subscription_id";
pub const LABEL_REGION: &str = "region";
pub const LABEL_INSTANCE: &str = "instance";

/// `{prefix}_{namespace}` with the namespace lower-cased and `.`/`/` turned
/// into `_`.
pub fn namespace_segment(prefix: &str, namespace: &str) -> String {
    let ns = namespace.to_lowercase().replace(['.', '/'], "_");
    format!("{prefix}_{ns}")
}

/// Full gauge name for one (metric, aggregation) pair.
///
/// `{prefix}_{namespace}_{metric}_{aggregation}_{unit}`, then every character
/// outside `[a-zA-Z0-9_:]` becomes `_`.
pub fn metric_name(prefix: &str, namespace: &str, metric: &str, aggregation: Aggregation, unit: &str) -> String {
    let metric = metric.to_lowercase().replace(' ', "");
    sanitize_metric_name(&format!(
        "{}_{metric}_{aggregation}_{}",
        namespace_segment(prefix, namespace),
        unit.to_lowercase()
    ))
}

/// Restrict a metric name to `[a-zA-Z0-9_:]`, prefixing a leading digit
/// with `_`.
pub fn sanitize_metric_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Restrict a label name to `[a-zA-Z0-9_]`, prefixing a leading digit
/// with `_`.
pub fn sanitize_label_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Labels for one metric entity.
///
/// Extra labels are applied first, then time series metadata, then the base
/// labels, so base labels win on collision.
pub fn build_labels(
    subscription_id: &str,
    region: &str,
    instance: &str,
    extra: Option<&ExtraLabels>,
    metadata: &[MetadataValue],
) -> Labels {
    let mut labels = Labels::new();

    let merged = extra
        .into_iter()
        .flat_map(|e| e.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .chain(metadata.iter().map(|m| (m.name.value.as_str(), m.value.as_str())));
    for (name, value) in merged {
        let name = sanitize_label_name(name);
        if !name.is_empty() {
            labels.insert(name, value.to_string());
        }
    }

    labels.insert(LABEL_SUBSCRIPTION_ID.to_string(), subscription_id.to_string());
    labels.insert(LABEL_REGION.to_string(), region.to_string());
    labels.insert(LABEL_INSTANCE.to_string(), instance.to_string());
    labels
}

/// `"{localized name}: {description}"`.
pub fn help_text(metric: &Metric) -> String {
    format!("{}: {}", metric.name.localized_value, metric.display_description)
}
