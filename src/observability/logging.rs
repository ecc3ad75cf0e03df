//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the `tracing` subscriber (stdout and optional file sink)
//! - Tag request logs with the trace/span ids of the active span
//!
//! # Design Decisions
//! - JSON with flattened fields in production, pretty format for development
//! - `RUST_LOG` wins over the configured level
//! - Correlation fields are explicit event fields, so each record carries
//!   exactly the ids of the span it was emitted for

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use opentelemetry::trace::SpanContext;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::StartupError;

/// Install the global subscriber.
///
/// Fails if the filter is malformed, the log file cannot be opened, or a
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), StartupError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| StartupError::Logging(e.to_string()))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(match config.format {
        LogFormat::Json => fmt::layer().json().flatten_event(true).boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
    });

    if let Some(path) = &config.file {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StartupError::LogFile {
                path: path.clone(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| StartupError::LogFile {
                path: path.clone(),
                source,
            })?;
        layers.push(
            fmt::layer()
                .json()
                .flatten_event(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| StartupError::Logging(e.to_string()))
}

/// Logger bound to one span of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelatedLogger {
    trace_id: String,
    span_id: String,
    method: String,
    path: String,
    request_id: Option<String>,
}

impl CorrelatedLogger {
    pub fn new(span: &SpanContext, method: &str, path: &str, request_id: Option<String>) -> Self {
        Self {
            trace_id: span.trace_id().to_string(),
            span_id: span.span_id().to_string(),
            method: method.to_string(),
            path: path.to_string(),
            request_id,
        }
    }

    /// Same request, different active span.
    pub fn for_span(&self, span: &SpanContext) -> Self {
        Self {
            trace_id: span.trace_id().to_string(),
            span_id: span.span_id().to_string(),
            ..self.clone()
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }
}

/// Emit a `tracing` event carrying the correlation fields of a
/// [`CorrelatedLogger`].
///
/// ```ignore
/// correlated!(info, logger, status = 200u16, "Request completed");
/// ```
#[macro_export]
macro_rules! correlated {
    ($level:ident, $logger:expr, $($arg:tt)+) => {{
        let logger: &$crate::observability::logging::CorrelatedLogger = &$logger;
        ::tracing::$level!(
            trace_id = logger.trace_id(),
            span_id = logger.span_id(),
            method = logger.method(),
            path = logger.path(),
            request_id = logger.request_id(),
            $($arg)+
        )
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;

    use opentelemetry::trace::{SpanId, TraceFlags, TraceId, TraceState};
    use serde_json::Value;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Buffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn span(span_id: &str) -> SpanContext {
        SpanContext::new(
            TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            SpanId::from_hex(span_id).unwrap(),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        )
    }

    fn capture(f: impl FnOnce()) -> Vec<Value> {
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_writer(buffer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_records_carry_correlation_fields() {
        let logger = CorrelatedLogger::new(
            &span("00f067aa0ba902b7"),
            "GET",
            "/api/sensors/engine",
            Some("req-1".into()),
        );
        let records = capture(|| {
            crate::correlated!(info, logger, "Handling request");
            crate::correlated!(warn, logger, latency_ms = 1200u64, "Slow");
        });

        assert_eq!(records.len(), 2);
        let first = &records[0];
        assert_eq!(first["trace_id"], "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(first["span_id"], "00f067aa0ba902b7");
        assert_eq!(first["method"], "GET");
        assert_eq!(first["path"], "/api/sensors/engine");
        assert_eq!(first["request_id"], "req-1");
        assert_eq!(first["message"], "Handling request");
        assert_eq!(records[1]["latency_ms"], 1200);
        assert_eq!(records[1]["level"], "WARN");
    }

    #[test]
    fn test_for_span_rebinds_span_id_only() {
        let logger = CorrelatedLogger::new(&span("00f067aa0ba902b7"), "GET", "/x", None);
        let child = logger.for_span(&span("b7ad6b7169203331"));
        assert_eq!(child.trace_id(), logger.trace_id());
        assert_eq!(child.span_id(), "b7ad6b7169203331");
        assert_eq!(child.path(), "/x");

        let records = capture(|| crate::correlated!(error, child, "Failed"));
        assert_eq!(records[0]["span_id"], "b7ad6b7169203331");
        assert!(records[0].get("request_id").is_none());
    }
}
