//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! inbound headers
//!     → context.rs (traceparent / baggage extraction)
//!     → spans.rs (request span, handler sub-spans)
//!     → metrics.rs (request count, duration, domain counters)
//!     → logging.rs (records correlated with the active span)
//!
//! Consumers (export.rs):
//!     → OTLP collector (traces and metrics, batched)
//!     → Prometheus scrape output (optional)
//!     → in-memory sinks (tests)
//! ```
//!
//! # Design Decisions
//! - Collaborators are passed explicitly through [`Telemetry`]; no globals
//!   apart from the `tracing` subscriber
//! - Export never sits on the request path

pub mod context;
pub mod export;
pub mod logging;
pub mod metrics;
pub mod spans;

use std::sync::Arc;

use context::Propagation;
use metrics::MetricsRecorder;
use spans::SpanRecorder;

/// The telemetry collaborators shared by every request.
#[derive(Debug, Clone)]
pub struct Telemetry {
    spans: SpanRecorder,
    metrics: MetricsRecorder,
    propagation: Arc<Propagation>,
}

impl Telemetry {
    pub fn new(spans: SpanRecorder, metrics: MetricsRecorder) -> Self {
        Self {
            spans,
            metrics,
            propagation: Arc::new(Propagation::w3c()),
        }
    }

    /// Discards all telemetry.
    pub fn noop() -> Self {
        Self::new(SpanRecorder::noop(), MetricsRecorder::noop())
    }

    pub fn spans(&self) -> &SpanRecorder {
        &self.spans
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn propagation(&self) -> &Propagation {
        &self.propagation
    }
}
