//! Telemetry backends.
//!
//! # Responsibilities
//! - Build the OTLP trace and metric pipelines for the collector endpoint
//! - Build the Prometheus recorder when scraping is enabled
//! - Flush and stop exporters on shutdown
//!
//! # Design Decisions
//! - Export runs on background batch processors; a slow or unreachable
//!   collector never blocks a request
//! - Nothing is registered globally: providers live in [`ExportPipeline`]

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::metrics::MeterProvider as _;
use opentelemetry::trace::{Span as _, TraceContextExt, Tracer as _, TracerProvider as _};
use opentelemetry::{Context, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::{Sampler, Tracer, TracerProvider};
use opentelemetry_sdk::{runtime, Resource};
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};

use crate::config::TelemetryConfig;
use crate::error::StartupError;
use crate::observability::metrics::{MetricsRecorder, MetricsSink, OtlpMetricsSink, PrometheusMetricsSink};
use crate::observability::spans::{NoopSpanSink, SpanData, SpanRecorder, SpanSink};
use crate::observability::Telemetry;

/// Latency buckets in milliseconds, spanning fast reads to complex analysis.
/// Instrumentation scope for every meter this service creates.
const METER_SCOPE: &str = env!("CARGO_PKG_NAME");

const DURATION_BUCKETS_MS: &[f64] = &[
    5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 1500.0, 2500.0, 5000.0,
];

/// Re-emits finished spans through an OpenTelemetry SDK tracer.
pub struct OtlpSpanSink {
    tracer: Tracer,
}

impl OtlpSpanSink {
    pub fn new(tracer: Tracer) -> Self {
        Self { tracer }
    }
}

impl SpanSink for OtlpSpanSink {
    fn on_end(&self, span: SpanData) {
        let parent_cx = match span.parent {
            Some(parent) => Context::new().with_remote_span_context(parent),
            None => Context::new(),
        };
        let end_time = span.end_time.unwrap_or_else(std::time::SystemTime::now);
        let mut exported = self
            .tracer
            .span_builder(span.name)
            .with_kind(span.kind)
            .with_trace_id(span.context.trace_id())
            .with_span_id(span.context.span_id())
            .with_start_time(span.start_time)
            .with_attributes(span.attributes)
            .with_status(span.status)
            .start_with_context(&self.tracer, &parent_cx);
        exported.end_with_timestamp(end_time);
    }
}

/// Owns the exporter providers for the lifetime of the process.
#[derive(Default)]
pub struct ExportPipeline {
    tracer_provider: Option<TracerProvider>,
    meter_provider: Option<SdkMeterProvider>,
    prometheus: Option<PrometheusHandle>,
}

impl ExportPipeline {
    pub fn prometheus_handle(&self) -> Option<PrometheusHandle> {
        self.prometheus.clone()
    }

    /// Flush pending telemetry and stop the exporters. Failures are logged.
    pub fn shutdown(self) {
        if let Some(provider) = self.tracer_provider {
            if let Err(e) = provider.shutdown() {
                tracing::error!(error = %e, "Failed to shut down tracer provider");
            }
        }
        if let Some(provider) = self.meter_provider {
            if let Err(e) = provider.shutdown() {
                tracing::error!(error = %e, "Failed to shut down meter provider");
            }
        }
        tracing::info!("Telemetry export stopped");
    }
}

fn resource(config: &TelemetryConfig) -> Resource {
    Resource::new(vec![
        KeyValue::new(SERVICE_NAME, config.service_name.clone()),
        KeyValue::new(SERVICE_VERSION, config.service_version.clone()),
        KeyValue::new("deployment.environment", config.environment.clone()),
    ])
}

/// Build the telemetry collaborators described by `config`.
///
/// Must run inside a Tokio runtime: the batch processors spawn onto it.
pub fn install(config: &TelemetryConfig) -> Result<(Telemetry, ExportPipeline), StartupError> {
    let mut pipeline = ExportPipeline::default();
    let mut metric_sinks: Vec<Arc<dyn MetricsSink>> = Vec::new();
    let mut span_sink: Arc<dyn SpanSink> = Arc::new(NoopSpanSink);

    if config.export_enabled {
        let resource = resource(config);
        let endpoint = config.otlp_endpoint.clone();

        let tracer_provider = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint.clone()),
            )
            .with_trace_config(
                opentelemetry_sdk::trace::Config::default()
                    .with_sampler(Sampler::AlwaysOn)
                    .with_resource(resource.clone()),
            )
            .install_batch(runtime::Tokio)?;
        let tracer = tracer_provider.tracer(Cow::Owned(config.service_name.clone()));
        span_sink = Arc::new(OtlpSpanSink::new(tracer));
        pipeline.tracer_provider = Some(tracer_provider);

        let meter_provider = opentelemetry_otlp::new_pipeline()
            .metrics(runtime::Tokio)
            .with_exporter(
                opentelemetry_otlp::new_exporter()
                    .tonic()
                    .with_endpoint(endpoint.clone()),
            )
            .with_period(Duration::from_secs(config.export_interval_secs))
            .with_resource(resource)
            .build()?;
        let meter = meter_provider.meter(METER_SCOPE);
        metric_sinks.push(Arc::new(OtlpMetricsSink::new(&meter)));
        pipeline.meter_provider = Some(meter_provider);

        tracing::info!(endpoint = %endpoint, "OTLP trace and metric export configured");
    } else {
        tracing::info!("Telemetry export disabled");
    }

    if config.prometheus_enabled {
        let recorder = PrometheusBuilder::new()
            .set_buckets(DURATION_BUCKETS_MS)?
            .build_recorder();
        let sink = PrometheusMetricsSink::new(recorder);
        pipeline.prometheus = Some(sink.handle());
        metric_sinks.push(Arc::new(sink));
        tracing::info!("Prometheus scrape output enabled at /metrics");
    }

    let telemetry = Telemetry::new(SpanRecorder::new(span_sink), MetricsRecorder::new(metric_sinks));
    Ok((telemetry, pipeline))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::REQUEST_COUNT;

    #[tokio::test]
    async fn test_disabled_export_uses_noop_backends() {
        let config = TelemetryConfig {
            export_enabled: false,
            ..Default::default()
        };
        let (telemetry, pipeline) = install(&config).unwrap();
        assert!(pipeline.prometheus_handle().is_none());

        let span = telemetry.spans().start(
            "noop",
            opentelemetry::trace::SpanKind::Server,
            None,
            Vec::new(),
        );
        span.end();
        telemetry
            .metrics()
            .record_request("GET", "/health", 200, Duration::from_millis(1));
        pipeline.shutdown();
    }

    #[tokio::test]
    async fn test_prometheus_only_pipeline() {
        let config = TelemetryConfig {
            export_enabled: false,
            prometheus_enabled: true,
            ..Default::default()
        };
        let (telemetry, pipeline) = install(&config).unwrap();
        telemetry
            .metrics()
            .record_request("GET", "/health", 200, Duration::from_millis(1));
        let rendered = pipeline.prometheus_handle().unwrap().render();
        assert!(rendered.contains(&REQUEST_COUNT.replace('.', "_")));
        pipeline.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unreachable_collector_does_not_block_spans() {
        let config = TelemetryConfig {
            otlp_endpoint: "http://127.0.0.1:1".to_string(),
            export_interval_secs: 60,
            ..Default::default()
        };
        let (telemetry, pipeline) = install(&config).unwrap();
        for _ in 0..100 {
            let span = telemetry.spans().start(
                "unexported",
                opentelemetry::trace::SpanKind::Internal,
                None,
                Vec::new(),
            );
            span.end();
        }
        telemetry
            .metrics()
            .record_diagnostic("completed", false);
        assert_eq!(METER_SCOPE, "vessel-monitor");
        drop(pipeline);
    }
}
