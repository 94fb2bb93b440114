//! Resource inventory and aggregation kinds.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Inventory query columns with this prefix become extra labels on every
/// sample of the resource (prefix stripped).
pub const LABEL_COLUMN_PREFIX: &str = "label_";

/// Extra labels attached to a single resource.
pub type ExtraLabels = BTreeMap<String, String>;

/// Statistical reduction reported by the metrics API for one data point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Aggregation {
    Total,
    Average,
    Count,
    Minimum,
    Maximum,
}

impl Aggregation {
    /// All kinds, in emission order.
    pub const ALL: [Aggregation; 5] = [
        Aggregation::Total,
        Aggregation::Average,
        Aggregation::Count,
        Aggregation::Minimum,
        Aggregation::Maximum,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Aggregation::Total => "total",
            Aggregation::Average => "average",
            Aggregation::Count => "count",
            Aggregation::Minimum => "minimum",
            Aggregation::Maximum => "maximum",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discovered resources: region → subscription → resource IDs, plus extra
/// labels per resource ID.
///
/// Immutable once built. Refreshes replace the whole inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceInventory {
    resources: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    extra_labels: HashMap<String, ExtraLabels>,
}

impl ResourceInventory {
    /// Start assembling a new inventory.
    pub fn builder() -> InventoryBuilder {
        InventoryBuilder::default()
    }

    /// Iterate `(region, subscription_id, resource_ids)` buckets.
    pub fn buckets(&self) -> impl Iterator<Item = (&str, &str, &[String])> {
        self.resources.iter().flat_map(|(region, subs)| {
            subs.iter()
                .map(move |(sub, ids)| (region.as_str(), sub.as_str(), ids.as_slice()))
        })
    }

    /// Resource IDs for one (region, subscription) bucket.
    pub fn resource_ids(&self, region: &str, subscription_id: &str) -> Option<&[String]> {
        self.resources
            .get(region)
            .and_then(|subs| subs.get(subscription_id))
            .map(Vec::as_slice)
    }

    /// Extra labels collected for a resource, if any.
    pub fn extra_labels(&self, resource_id: &str) -> Option<&ExtraLabels> {
        self.extra_labels.get(resource_id)
    }

    /// Regions present in the inventory.
    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Total number of resource IDs across all buckets.
    pub fn resource_count(&self) -> usize {
        self.resources
            .values()
            .flat_map(|subs| subs.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.resource_count() == 0
    }
}

/// Accumulates rows into a [`ResourceInventory`].
///
/// A resource ID is recorded at most once per (region, subscription) bucket.
#[derive(Debug, Default)]
pub struct InventoryBuilder {
    inventory: ResourceInventory,
    seen: HashMap<(String, String), HashSet<String>>,
}

impl InventoryBuilder {
    /// Record a resource. Returns `false` if it was already present in the
    /// bucket.
    pub fn insert(&mut self, region: &str, subscription_id: &str, resource_id: &str) -> bool {
        let seen = self
            .seen
            .entry((region.to_string(), subscription_id.to_string()))
            .or_default();
        if !seen.insert(resource_id.to_string()) {
            return false;
        }

        self.inventory
            .resources
            .entry(region.to_string())
            .or_default()
            .entry(subscription_id.to_string())
            .or_default()
            .push(resource_id.to_string());
        true
    }

    /// Attach extra labels to a resource, merging with any earlier ones.
    pub fn extend_labels(&mut self, resource_id: &str, labels: ExtraLabels) {
        if labels.is_empty() {
            return;
        }
        self.inventory
            .extra_labels
            .entry(resource_id.to_string())
            .or_default()
            .extend(labels);
    }

    pub fn build(self) -> ResourceInventory {
        self.inventory
    }
}
