//! Per-region metrics clients, built once and kept for the process lifetime.

use std::sync::Arc;
use std::time::Duration;

use azmon_cache::ExpiringCache;
use azmon_client::{MetricsApi, MetricsApiFactory};
use tracing::debug;

use crate::error::{ProbeError, ProbeResult};

pub struct MetricsClientCache {
    factory: Arc<dyn MetricsApiFactory>,
    clients: ExpiringCache<Arc<dyn MetricsApi>>,
}

impl MetricsClientCache {
    pub fn new(factory: Arc<dyn MetricsApiFactory>) -> Self {
        Self {
            factory,
            clients: ExpiringCache::new(),
        }
    }

    /// Client for `region`, building it on first use. Construction failures
    /// are returned and not cached.
    pub fn get(&self, region: &str) -> ProbeResult<Arc<dyn MetricsApi>> {
        if let Some(client) = self.clients.get(region) {
            return Ok(client);
        }

        let client = self
            .factory
            .build(region)
            .map_err(|source| ProbeError::ClientConstruction {
                region: region.to_string(),
                source,
            })?;
        debug!(%region, "metrics client created");
        self.clients.set(region, client.clone(), Duration::MAX);
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
