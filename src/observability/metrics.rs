//! Metrics collection.
//!
//! # Metrics
//! - `http.server.request.count` (counter): requests by method, route, status
//! - `http.server.request.duration` (histogram, ms): request latency
//! - `vessel.diagnostics.count` (counter): diagnostic runs by result
//! - `vessel.simulated.failures` (counter): injected failures by route, type
//!
//! # Design Decisions
//! - Observations are plain values fanned out to every configured sink
//! - Sinks swallow their own failures; recording never fails

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

pub const REQUEST_COUNT: &str = "http.server.request.count";
pub const REQUEST_DURATION: &str = "http.server.request.duration";
pub const DIAGNOSTICS_COUNT: &str = "vessel.diagnostics.count";
pub const SIMULATED_FAILURES: &str = "vessel.simulated.failures";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentKind {
    Counter,
    Histogram,
}

/// Static description of an instrument.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentDef {
    pub name: &'static str,
    pub kind: InstrumentKind,
    pub description: &'static str,
    pub unit: &'static str,
}

pub const INSTRUMENTS: &[InstrumentDef] = &[
    InstrumentDef {
        name: REQUEST_COUNT,
        kind: InstrumentKind::Counter,
        description: "Total number of HTTP requests",
        unit: "{request}",
    },
    InstrumentDef {
        name: REQUEST_DURATION,
        kind: InstrumentKind::Histogram,
        description: "HTTP request duration",
        unit: "ms",
    },
    InstrumentDef {
        name: DIAGNOSTICS_COUNT,
        kind: InstrumentKind::Counter,
        description: "Total number of diagnostic runs",
        unit: "{diagnostic}",
    },
    InstrumentDef {
        name: SIMULATED_FAILURES,
        kind: InstrumentKind::Counter,
        description: "Total number of injected failures",
        unit: "{failure}",
    },
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Histogram(f64),
}

/// One (name, value, labels) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricObservation {
    pub name: &'static str,
    pub value: MetricValue,
    pub labels: Vec<(&'static str, String)>,
}

impl MetricObservation {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    fn key_values(&self) -> Vec<KeyValue> {
        self.labels
            .iter()
            .map(|(k, v)| KeyValue::new(*k, v.clone()))
            .collect()
    }
}

/// Metrics backend.
pub trait MetricsSink: Send + Sync {
    fn record(&self, observation: &MetricObservation);
}

#[derive(Debug, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn record(&self, _observation: &MetricObservation) {}
}

/// Keeps every observation in memory.
#[derive(Debug, Default)]
pub struct InMemoryMetricsSink {
    observations: Mutex<Vec<MetricObservation>>,
}

impl InMemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<MetricObservation> {
        self.observations
            .lock()
            .expect("metrics sink mutex poisoned")
            .clone()
    }

    pub fn named(&self, name: &str) -> Vec<MetricObservation> {
        self.observations()
            .into_iter()
            .filter(|o| o.name == name)
            .collect()
    }
}

impl MetricsSink for InMemoryMetricsSink {
    fn record(&self, observation: &MetricObservation) {
        self.observations
            .lock()
            .expect("metrics sink mutex poisoned")
            .push(observation.clone());
    }
}

/// Forwards observations to OpenTelemetry instruments.
pub struct OtlpMetricsSink {
    counters: HashMap<&'static str, Counter<u64>>,
    histograms: HashMap<&'static str, Histogram<f64>>,
}

impl OtlpMetricsSink {
    pub fn new(meter: &Meter) -> Self {
        let mut counters = HashMap::new();
        let mut histograms = HashMap::new();
        for def in INSTRUMENTS {
            match def.kind {
                InstrumentKind::Counter => {
                    let counter = meter
                        .u64_counter(def.name)
                        .with_description(def.description)
                        .with_unit(def.unit)
                        .init();
                    counters.insert(def.name, counter);
                }
                InstrumentKind::Histogram => {
                    let histogram = meter
                        .f64_histogram(def.name)
                        .with_description(def.description)
                        .with_unit(def.unit)
                        .init();
                    histograms.insert(def.name, histogram);
                }
            }
        }
        Self {
            counters,
            histograms,
        }
    }
}

impl MetricsSink for OtlpMetricsSink {
    fn record(&self, observation: &MetricObservation) {
        let attrs = observation.key_values();
        match observation.value {
            MetricValue::Counter(n) => match self.counters.get(observation.name) {
                Some(counter) => counter.add(n, &attrs),
                None => tracing::debug!(metric = observation.name, "Unknown counter dropped"),
            },
            MetricValue::Histogram(v) => match self.histograms.get(observation.name) {
                Some(histogram) => histogram.record(v, &attrs),
                None => tracing::debug!(metric = observation.name, "Unknown histogram dropped"),
            },
        }
    }
}

/// Records through a Prometheus recorder that is never installed globally.
pub struct PrometheusMetricsSink {
    recorder: metrics_exporter_prometheus::PrometheusRecorder,
}

static PROMETHEUS_METADATA: metrics::Metadata<'static> =
    metrics::Metadata::new(module_path!(), metrics::Level::INFO, Some(module_path!()));

impl PrometheusMetricsSink {
    pub fn new(recorder: metrics_exporter_prometheus::PrometheusRecorder) -> Self {
        Self { recorder }
    }

    pub fn handle(&self) -> metrics_exporter_prometheus::PrometheusHandle {
        self.recorder.handle()
    }
}

impl MetricsSink for PrometheusMetricsSink {
    fn record(&self, observation: &MetricObservation) {
        use metrics::Recorder;

        // Prometheus names and label keys cannot contain dots.
        let name = observation.name.replace('.', "_");
        let labels: Vec<metrics::Label> = observation
            .labels
            .iter()
            .map(|(k, v)| metrics::Label::new(k.replace('.', "_"), v.clone()))
            .collect();
        let key = metrics::Key::from_parts(name, labels);
        match observation.value {
            MetricValue::Counter(n) => self
                .recorder
                .register_counter(&key, &PROMETHEUS_METADATA)
                .increment(n),
            MetricValue::Histogram(v) => self
                .recorder
                .register_histogram(&key, &PROMETHEUS_METADATA)
                .record(v),
        }
    }
}

/// HTTP status class label, e.g. `2xx`.
pub fn status_class(status: u16) -> String {
    format!("{}xx", status / 100)
}

/// Fans observations out to the configured sinks.
#[derive(Clone)]
pub struct MetricsRecorder {
    sinks: Arc<[Arc<dyn MetricsSink>]>,
}

impl MetricsRecorder {
    pub fn new(sinks: Vec<Arc<dyn MetricsSink>>) -> Self {
        Self {
            sinks: sinks.into(),
        }
    }

    pub fn noop() -> Self {
        Self::new(Vec::new())
    }

    pub fn record(&self, observation: MetricObservation) {
        for sink in self.sinks.iter() {
            sink.record(&observation);
        }
    }

    /// Count and time one completed request.
    pub fn record_request(&self, method: &str, route: &str, status: u16, duration: Duration) {
        let labels = vec![
            ("http.method", method.to_string()),
            ("http.route", route.to_string()),
            ("http.status_code", status.to_string()),
            ("http.status_class", status_class(status)),
        ];
        self.record(MetricObservation {
            name: REQUEST_COUNT,
            value: MetricValue::Counter(1),
            labels: labels.clone(),
        });
        self.record(MetricObservation {
            name: REQUEST_DURATION,
            value: MetricValue::Histogram(duration.as_secs_f64() * 1000.0),
            labels,
        });
    }

    pub fn record_diagnostic(&self, result: &str, complex_analysis: bool) {
        self.record(MetricObservation {
            name: DIAGNOSTICS_COUNT,
            value: MetricValue::Counter(1),
            labels: vec![
                ("result", result.to_string()),
                ("complex_analysis", complex_analysis.to_string()),
            ],
        });
    }

    pub fn record_simulated_failure(&self, route: &str, error_type: &str) {
        self.record(MetricObservation {
            name: SIMULATED_FAILURES,
            value: MetricValue::Counter(1),
            labels: vec![
                ("http.route", route.to_string()),
                ("error.type", error_type.to_string()),
            ],
        });
    }
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
