//! Azure Resource Manager quota telemetry.
//!
//! Every response passing through [`crate::Transport`] is inspected for the
//! `x-ms-ratelimit-remaining-*` family of headers (and the resource graph's
//! `x-ms-user-quota-remaining`). The latest value of each quota is kept as a
//! gauge, together with a per-(method, status) request latency histogram,
//! and rendered for the daemon's `/metrics` endpoint.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::{LazyLock, Mutex, MutexGuard};
use std::time::Duration;

use azmon_core::text::{format_value, write_labels};
use regex::Regex;
use reqwest::Url;
use reqwest::header::HeaderMap;

static SUBSCRIPTION_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^/subscriptions/([^/]+)/?.*$").expect("static regex is valid")
});

/// `(header, scope, type)` triples recorded on every response.
const RATE_LIMIT_HEADERS: &[(&str, &str, &str)] = &[
    ("x-ms-ratelimit-remaining-microsoft.consumption-tenant-requests", "consumption", "tenant-requests"),
    ("x-ms-ratelimit-remaining-subscription-reads", "subscription", "reads"),
    ("x-ms-ratelimit-remaining-subscription-writes", "subscription", "writes"),
    ("x-ms-ratelimit-remaining-subscription-resource-requests", "subscription", "resourceRequests"),
    ("x-ms-ratelimit-remaining-subscription-resource-entities-read", "subscription", "resource-entities-read"),
    ("x-ms-ratelimit-remaining-tenant-reads", "tenant", "reads"),
    ("x-ms-ratelimit-remaining-tenant-writes", "tenant", "writes"),
    ("x-ms-ratelimit-remaining-tenant-resource-requests", "tenant", "resource-requests"),
    ("x-ms-ratelimit-remaining-tenant-resource-entities-read", "tenant", "resource-entities-read"),
];

const RESOURCE_GRAPH_QUOTA_HEADER: &str = "x-ms-user-quota-remaining";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct QuotaKey {
    endpoint: String,
    subscription_id: String,
    scope: String,
    kind: String,
}

const DURATION_METRIC: &str = "azurerm_api_http_request_duration_seconds";

/// Upper bounds of the latency histogram, in seconds.
const DURATION_BUCKETS: [f64; 11] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Per-bucket counts are not cumulative; rendering sums them.
#[derive(Debug, Default, Clone, Copy)]
struct RequestStats {
    buckets: [u64; DURATION_BUCKETS.len()],
    count: u64,
    sum_seconds: f64,
}

impl RequestStats {
    fn observe(&mut self, seconds: f64) {
        if let Some(slot) = DURATION_BUCKETS.iter().position(|bound| seconds <= *bound) {
            self.buckets[slot] += 1;
        }
        self.count += 1;
        self.sum_seconds += seconds;
    }
}

/// Collects quota gauges and request statistics from API responses.
#[derive(Debug, Default)]
pub struct RateLimitRecorder {
    quotas: Mutex<BTreeMap<QuotaKey, f64>>,
    requests: Mutex<BTreeMap<(String, String), RequestStats>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl RateLimitRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed response.
    pub fn observe(&self, method: &str, url: &Url, status: u16, headers: &HeaderMap, elapsed: Duration) {
        self.count_request(method, &status.to_string(), elapsed);

        let endpoint = short_hostname(url.host_str().unwrap_or_default());
        let subscription_id = SUBSCRIPTION_PATH
            .captures(url.path())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();

        if url
            .path()
            .to_lowercase()
            .starts_with("/providers/microsoft.resourcegraph/")
        {
            self.record_header(headers, RESOURCE_GRAPH_QUOTA_HEADER, &endpoint, &subscription_id, "resourcegraph", "quota");
        }

        for (header, scope, kind) in RATE_LIMIT_HEADERS {
            self.record_header(headers, header, &endpoint, &subscription_id, scope, kind);
        }
    }

    /// Record a request that failed before a response arrived.
    pub fn observe_failure(&self, method: &str, elapsed: Duration) {
        self.count_request(method, "error", elapsed);
    }

    fn count_request(&self, method: &str, code: &str, elapsed: Duration) {
        let mut requests = lock(&self.requests);
        requests
            .entry((method.to_string(), code.to_string()))
            .or_default()
            .observe(elapsed.as_secs_f64());
    }

    fn record_header(
        &self,
        headers: &HeaderMap,
        header: &str,
        endpoint: &str,
        subscription_id: &str,
        scope: &str,
        kind: &str,
    ) {
        let Some(raw) = headers.get(header).and_then(|v| v.to_str().ok()) else {
            return;
        };

        let mut quotas = lock(&self.quotas);
        let mut set = |kind: String, value: i64| {
            quotas.insert(
                QuotaKey {
                    endpoint: endpoint.to_string(),
                    subscription_id: subscription_id.to_string(),
                    scope: scope.to_string(),
                    kind,
                },
                value as f64,
            );
        };

        if let Ok(value) = raw.trim().parse::<i64>() {
            set(kind.to_string(), value);
        } else if raw.contains(':') {
            // e.g. "QueriesPerHour:496,QueriesPerMin:37,QueriesPer10Sec:11"
            for part in raw.split(',') {
                if let Some((name, value)) = part.split_once(':')
                    && let Ok(value) = value.trim().parse::<i64>()
                {
                    set(format!("{kind}.{}", name.trim()), value);
                }
            }
        }
    }

    /// Latest value of one quota gauge.
    pub fn quota(&self, endpoint: &str, subscription_id: &str, scope: &str, kind: &str) -> Option<f64> {
        lock(&self.quotas)
            .get(&QuotaKey {
                endpoint: endpoint.to_string(),
                subscription_id: subscription_id.to_string(),
                scope: scope.to_string(),
                kind: kind.to_string(),
            })
            .copied()
    }

    /// Render all gauges and counters in the text exposition format.
    pub fn render_prometheus(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP azurerm_api_ratelimit AzureRM API ratelimit\n");
        out.push_str("# TYPE azurerm_api_ratelimit gauge\n");
        for (key, value) in lock(&self.quotas).iter() {
            out.push_str("azurerm_api_ratelimit");
            write_labels(
                &mut out,
                [
                    ("endpoint", key.endpoint.as_str()),
                    ("scope", key.scope.as_str()),
                    ("subscriptionID", key.subscription_id.as_str()),
                    ("type", key.kind.as_str()),
                ],
            );
            let _ = writeln!(out, " {}", format_value(*value));
        }

        let _ = writeln!(out, "# HELP {DURATION_METRIC} A histogram of request latencies.");
        let _ = writeln!(out, "# TYPE {DURATION_METRIC} histogram");
        for ((method, code), stats) in lock(&self.requests).iter() {
            let mut cumulative = 0;
            for (bound, hits) in DURATION_BUCKETS.iter().zip(stats.buckets) {
                cumulative += hits;
                let le = format_value(*bound);
                let _ = write!(out, "{DURATION_METRIC}_bucket");
                write_labels(&mut out, [("code", code.as_str()), ("method", method.as_str()), ("le", le.as_str())]);
                let _ = writeln!(out, " {cumulative}");
            }
            let _ = write!(out, "{DURATION_METRIC}_bucket");
            write_labels(&mut out, [("code", code.as_str()), ("method", method.as_str()), ("le", "+Inf")]);
            let _ = writeln!(out, " {}", stats.count);

            let _ = write!(out, "{DURATION_METRIC}_sum");
            write_labels(&mut out, [("code", code.as_str()), ("method", method.as_str())]);
            let _ = writeln!(out, " {}", format_value(stats.sum_seconds));

            let _ = write!(out, "{DURATION_METRIC}_count");
            write_labels(&mut out, [("code", code.as_str()), ("method", method.as_str())]);
            let _ = writeln!(out, " {}", stats.count);
        }

        out
    }
}

/// Shorten a hostname to its last three labels. IP literals are kept whole.
fn short_hostname(host: &str) -> String {
    let host = host.to_lowercase();
    if host
        .trim_matches(|c| c == '[' || c == ']')
        .parse::<std::net::IpAddr>()
        .is_ok()
    {
        return host;
    }
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() > 3 {
        parts[parts.len() - 3..].join(".")
    } else {
        host
    }
}
