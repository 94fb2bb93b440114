//! Prometheus text exposition of probe samples.

use std::collections::{HashMap, HashSet};
use std::fmt::Write;

use azmon_core::text::{escape_help, format_value, write_labels};

use crate::sample::{Gauge, Sample};

/// Content type of [`render`] output.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Render samples as exposition text.
///
/// Gauges are grouped by name in first-seen order. Invalid markers become
/// `# ERROR` comment lines ahead of the families. A repeated (name, labels)
/// pair keeps its first sample.
pub fn render(samples: &[Sample]) -> String {
    let mut out = String::new();
    let mut order: Vec<&str> = Vec::new();
    let mut families: HashMap<&str, Vec<&Gauge>> = HashMap::new();
    let mut seen: HashSet<(&str, Vec<(&str, &str)>)> = HashSet::new();

    for sample in samples {
        match sample {
            Sample::Invalid(message) => {
                let _ = writeln!(out, "# ERROR {}", message.replace('\n', " "));
            }
            Sample::Gauge(gauge) => {
                let identity = (
                    gauge.name.as_str(),
                    gauge
                        .labels
                        .iter()
                        .map(|(k, v)| (k.as_str(), v.as_str()))
                        .collect(),
                );
                if !seen.insert(identity) {
                    continue;
                }
                families
                    .entry(gauge.name.as_str())
                    .or_insert_with(|| {
                        order.push(gauge.name.as_str());
                        Vec::new()
                    })
                    .push(gauge);
            }
        }
    }

    for name in order {
        let Some(gauges) = families.get(name) else {
            continue;
        };
        let help = gauges.first().map(|g| g.help.as_str()).unwrap_or_default();
        let _ = writeln!(out, "# HELP {name} {}", escape_help(help));
        let _ = writeln!(out, "# TYPE {name} gauge");
        for gauge in gauges {
            out.push_str(name);
            write_labels(&mut out, gauge.labels.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            let _ = writeln!(out, " {}", format_value(gauge.value));
        }
    }

    out
}
