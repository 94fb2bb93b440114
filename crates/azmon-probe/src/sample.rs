//! Samples produced by a probe and the sink they are pushed into.

use std::collections::BTreeMap;

use azmon_core::Aggregation;

/// Label name → value, sorted by name.
pub type Labels = BTreeMap<String, String>;

/// Source identity of a gauge synthesized from metric data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricIdentity {
    pub namespace: String,
    pub metric: String,
    pub aggregation: Aggregation,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gauge {
    pub name: String,
    pub help: String,
    pub labels: Labels,
    pub value: f64,
    /// `None` for meta-metrics such as scrape duration.
    pub identity: Option<MetricIdentity>,
}

impl Gauge {
    pub fn new(name: impl Into<String>, help: impl Into<String>, labels: Labels, value: f64) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            labels,
            value,
            identity: None,
        }
    }

    pub fn with_identity(mut self, identity: MetricIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// One output of a probe.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    Gauge(Gauge),
    /// A phase failure, rendered as a comment line.
    Invalid(String),
}

impl Sample {
    pub fn as_gauge(&self) -> Option<&Gauge> {
        match self {
            Sample::Gauge(g) => Some(g),
            Sample::Invalid(_) => None,
        }
    }
}

/// Receives samples as a probe produces them.
pub trait SampleSink {
    fn push(&mut self, sample: Sample);

    fn gauge(&mut self, gauge: Gauge) {
        self.push(Sample::Gauge(gauge));
    }

    fn invalid(&mut self, message: String) {
        self.push(Sample::Invalid(message));
    }
}

impl SampleSink for Vec<Sample> {
    fn push(&mut self, sample: Sample) {
        Vec::push(self, sample);
    }
}
