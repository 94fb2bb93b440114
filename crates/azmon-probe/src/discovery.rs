//! Resource discovery through the paginated inventory query.
//!
//! [`discover`] builds a fresh [`ResourceInventory`] or fails as a whole;
//! [`get_resources`] wraps it with the shared inventory cache.

use std::sync::Arc;

use azmon_cache::ExpiringCache;
use azmon_client::{Deadline, InventoryApi, QueryRequest, ResultTruncated};
use azmon_core::{ExtraLabels, LABEL_COLUMN_PREFIX, ProbeConfig, ResourceInventory};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{ProbeError, ProbeResult};

const REQUIRED_COLUMNS: [&str; 3] = ["subscriptionId", "location", "id"];

/// Inventory query text for `config`.
pub fn build_query(config: &ProbeConfig) -> String {
    let resource_type = config
        .resource_type
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('\'', "\\'");
    format!(
        "{}\n| where type =~ '{resource_type}'\n| project-keep id, subscriptionId, location, label_*",
        config.query
    )
}

/// Run the inventory query to completion and group the rows.
pub async fn discover(
    api: &dyn InventoryApi,
    config: &ProbeConfig,
    fallback_subscriptions: &[String],
    deadline: Deadline,
) -> ProbeResult<ResourceInventory> {
    let query = build_query(config);
    let subscriptions = config.effective_subscriptions(fallback_subscriptions).to_vec();
    let mut builder = ResourceInventory::builder();
    let mut skip_token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let request = QueryRequest::new(query.clone(), subscriptions.clone(), skip_token.take());
        let response = api.query(&request, deadline).await?;
        pages += 1;

        let (Some(truncated), Some(count), Some(data)) =
            (response.result_truncated, response.count, response.data)
        else {
            return Err(ProbeError::Structural("unexpected response".to_string()));
        };

        if truncated == ResultTruncated::True {
            warn!(%query, "result truncated");
        }

        if count == 0 {
            break;
        }

        let rows = match data {
            Value::Array(rows) => rows,
            other => return Err(ProbeError::Structural(format!("unexpected type: {other}"))),
        };
        if rows.is_empty() {
            return Err(ProbeError::Structural("no rows returned".to_string()));
        }

        for row in &rows {
            let Value::Object(row) = row else {
                return Err(ProbeError::Structural(format!("unexpected row type: {row}")));
            };
            let (subscription_id, location, resource_id) = required_columns(row)?;
            let labels = label_columns(row)?;

            if builder.insert(location, subscription_id, resource_id) {
                builder.extend_labels(resource_id, labels);
            }
        }

        match response.skip_token {
            Some(token) if !token.is_empty() => skip_token = Some(token),
            _ => break,
        }
    }

    let inventory = builder.build();
    debug!(
        resource_type = %config.resource_type,
        pages,
        resources = inventory.resource_count(),
        "discovered resources"
    );
    Ok(inventory)
}

fn required_columns(row: &Map<String, Value>) -> ProbeResult<(&str, &str, &str)> {
    let mut values = [""; 3];
    for (slot, column) in values.iter_mut().zip(REQUIRED_COLUMNS) {
        *slot = match row.get(column) {
            Some(Value::String(s)) => s.as_str(),
            Some(other) => {
                return Err(ProbeError::Structural(format!("unexpected {column} type: {other}")));
            }
            None => {
                let available: Vec<&str> = row.keys().map(String::as_str).collect();
                return Err(ProbeError::Structural(format!(
                    "missing field {column}. Available fields: {available:?}"
                )));
            }
        };
    }
    let [subscription_id, location, resource_id] = values;
    Ok((subscription_id, location, resource_id))
}

fn label_columns(row: &Map<String, Value>) -> ProbeResult<ExtraLabels> {
    let mut labels = ExtraLabels::new();
    for (column, value) in row {
        let Some(name) = column.strip_prefix(LABEL_COLUMN_PREFIX) else {
            continue;
        };
        let Value::String(value) = value else {
            return Err(ProbeError::Structural(format!(
                "unexpected {column} type: {value}"
            )));
        };
        labels.insert(name.to_string(), value.clone());
    }
    Ok(labels)
}

/// Cache key for an inventory: SHA-256 hex of
/// `"{query}-{resource type}-{sorted subscriptions joined by ','}"`.
pub fn cache_key(config: &ProbeConfig, subscriptions: &[String]) -> String {
    let mut sorted: Vec<&str> = subscriptions.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let raw = format!(
        "{}-{}-{}",
        config.query,
        config.resource_type,
        sorted.join(",")
    );
    hex::encode(Sha256::digest(raw.as_bytes()))
}

/// Discover through the inventory cache.
///
/// A zero TTL bypasses the cache. Concurrent misses on the same key each run
/// their own discovery; the last one to finish is stored.
pub async fn get_resources(
    api: &dyn InventoryApi,
    cache: &ExpiringCache<Arc<ResourceInventory>>,
    config: &ProbeConfig,
    fallback_subscriptions: &[String],
    deadline: Deadline,
) -> ProbeResult<Arc<ResourceInventory>> {
    if !config.caching_enabled() {
        return Ok(Arc::new(
            discover(api, config, fallback_subscriptions, deadline).await?,
        ));
    }

    let key = cache_key(config, config.effective_subscriptions(fallback_subscriptions));
    if let Some(inventory) = cache.get(&key) {
        return Ok(inventory);
    }

    let inventory = Arc::new(discover(api, config, fallback_subscriptions, deadline).await?);
    cache.set(key, inventory.clone(), config.query_cache_expiration);
    Ok(inventory)
}
