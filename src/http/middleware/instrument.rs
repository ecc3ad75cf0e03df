//! Request instrumentation middleware.
//!
//! Wraps every route with:
//! 1. trace-context extraction (fails open to a fresh root trace)
//! 2. a server span named after the matched route
//! 3. a correlated "Handling request" log record
//! 4. the handler, bounded by the request deadline
//! 5. request count and duration metrics
//! 6. span status from the final HTTP status
//! 7. a correlated "Request completed" log record
//! 8. span end
//!
//! Steps 5 to 8 run on every exit path. A handler panic becomes a 500, an
//! expired deadline a 504, and a request dropped by the client is recorded
//! as 499 with a cancelled span.

use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use futures_util::FutureExt;
use opentelemetry::trace::{SpanKind, Status};
use opentelemetry::KeyValue;

use crate::correlated;
use crate::http::request::request_id;
use crate::http::response::json_error;
use crate::observability::context::RequestContext;
use crate::observability::logging::CorrelatedLogger;
use crate::observability::metrics::MetricsRecorder;
use crate::observability::spans::ActiveSpan;
use crate::observability::Telemetry;

/// Status recorded for requests the client abandoned.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Collaborators of the instrumentation layer, built once at router setup.
#[derive(Debug, Clone)]
pub struct Instrumentation {
    telemetry: Telemetry,
    request_timeout: Duration,
}

impl Instrumentation {
    pub fn new(telemetry: Telemetry, request_timeout: Duration) -> Self {
        Self {
            telemetry,
            request_timeout,
        }
    }
}

/// Completion bookkeeping for one request.
///
/// If the request future is dropped before [`InFlight::complete`] runs, the
/// drop records the request as cancelled.
struct InFlight {
    span: Option<ActiveSpan>,
    logger: CorrelatedLogger,
    metrics: MetricsRecorder,
    method: String,
    route: String,
    started: Instant,
}

impl InFlight {
    fn complete(mut self, status: u16) {
        self.finish(status, false);
    }

    fn finish(&mut self, status: u16, cancelled: bool) {
        let Some(mut span) = self.span.take() else {
            return;
        };
        let elapsed = self.started.elapsed();
        self.metrics
            .record_request(&self.method, &self.route, status, elapsed);

        span.set_attribute(KeyValue::new("http.status_code", i64::from(status)));
        if status >= 400 {
            span.set_status(Status::error(format!("HTTP {status}")));
        } else {
            span.set_status(Status::Ok);
        }

        let duration_ms = elapsed.as_millis() as u64;
        if cancelled {
            correlated!(warn, self.logger, status, duration_ms, "Request cancelled by client");
            // Dropping marks the span cancelled.
            drop(span);
        } else {
            correlated!(info, self.logger, status, duration_ms, "Request completed");
            span.end();
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.finish(CLIENT_CLOSED_REQUEST, true);
    }
}

/// Roughly 30 years; stands in for "no deadline" when the timeout overflows.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(timeout: Duration) -> tokio::time::Instant {
    let now = tokio::time::Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

/// Instrument one request. Install with
/// `axum::middleware::from_fn_with_state` as a route layer so the matched
/// route template is available.
pub async fn instrument(
    State(instrumentation): State<Instrumentation>,
    mut request: Request,
    next: Next,
) -> Response {
    let telemetry = &instrumentation.telemetry;
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| path.clone());

    let propagated = telemetry.propagation().extract(request.headers());
    let span = telemetry.spans().start(
        route.clone(),
        SpanKind::Server,
        propagated.parent.as_ref(),
        vec![
            KeyValue::new("http.method", method.clone()),
            KeyValue::new("http.url", request.uri().to_string()),
            KeyValue::new("http.route", route.clone()),
        ],
    );
    let logger = CorrelatedLogger::new(span.context(), &method, &path, request_id(request.headers()));
    correlated!(info, logger, "Handling request");

    let deadline = deadline_after(instrumentation.request_timeout);
    let context = RequestContext::new(span.context().clone(), propagated, logger.clone(), deadline);
    let trace_id = context.trace_id();
    request.extensions_mut().insert(context);

    let in_flight = InFlight {
        span: Some(span),
        logger,
        metrics: telemetry.metrics().clone(),
        method,
        route,
        started: Instant::now(),
    };

    let outcome = tokio::time::timeout_at(deadline, AssertUnwindSafe(next.run(request)).catch_unwind()).await;
    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(_panic)) => {
            correlated!(error, in_flight.logger, "Handler panicked");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error",
                trace_id,
                "The handler failed unexpectedly",
            )
        }
        Err(_elapsed) => {
            correlated!(
                warn,
                in_flight.logger,
                timeout_ms = instrumentation.request_timeout.as_millis() as u64,
                "Request deadline exceeded"
            );
            json_error(
                StatusCode::GATEWAY_TIMEOUT,
                "request deadline exceeded",
                trace_id,
                &format!(
                    "No response within {} ms",
                    instrumentation.request_timeout.as_millis()
                ),
            )
        }
    };

    in_flight.complete(response.status().as_u16());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use crate::observability::metrics::{
        InMemoryMetricsSink, MetricValue, MetricsSink, REQUEST_COUNT,
    };
    use crate::observability::spans::{InMemorySpanSink, SpanRecorder};

    fn harness(timeout: Duration) -> (Router, Arc<InMemorySpanSink>, Arc<InMemoryMetricsSink>) {
        let spans = Arc::new(InMemorySpanSink::new());
        let metrics = Arc::new(InMemoryMetricsSink::new());
        let telemetry = Telemetry::new(
            SpanRecorder::new(spans.clone()),
            MetricsRecorder::new(vec![metrics.clone() as Arc<dyn MetricsSink>]),
        );
        let router = Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route(
                "/teapot",
                get(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .route(
                "/panic",
                get(|| async {
                    if true {
                        panic!("handler exploded");
                    }
                    "unreachable"
                }),
            )
            .route(
                "/items/{id}",
                get(|request: Request| async move {
                    let context = request.extensions().get::<RequestContext>().cloned();
                    context.map(|c| c.trace_id()).unwrap_or_default()
                }),
            )
            .route_layer(from_fn_with_state(
                Instrumentation::new(telemetry, timeout),
                instrument,
            ));
        (router, spans, metrics)
    }

    fn get_request(uri: &str) -> Request {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_success_records_span_and_metrics() {
        let (router, spans, metrics) = harness(Duration::from_secs(1));
        let response = router.oneshot(get_request("/ok")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let finished = spans.finished_named("/ok");
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, Status::Ok);
        assert_eq!(finished[0].kind, SpanKind::Server);
        assert!(spans.is_balanced());

        let count = &metrics.named(REQUEST_COUNT)[0];
        assert_eq!(count.value, MetricValue::Counter(1));
        assert_eq!(count.label("http.status_code"), Some("200"));
        assert_eq!(count.label("http.route"), Some("/ok"));
    }

    #[tokio::test]
    async fn test_client_error_status_marks_span() {
        let (router, spans, metrics) = harness(Duration::from_secs(1));
        let response = router.oneshot(get_request("/teapot")).await.unwrap();
        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);

        let span = &spans.finished()[0];
        assert_eq!(span.status, Status::error("HTTP 418"));
        assert!(!span.is_cancelled());
        assert_eq!(
            metrics.named(REQUEST_COUNT)[0].label("http.status_class"),
            Some("4xx")
        );
    }

    #[tokio::test]
    async fn test_route_template_names_span() {
        let (router, spans, _metrics) = harness(Duration::from_secs(1));
        let response = router.oneshot(get_request("/items/42")).await.unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();

        let span = &spans.finished_named("/items/{id}")[0];
        assert_eq!(String::from_utf8(bytes.to_vec()).unwrap(), span.context.trace_id().to_string());
    }

    #[tokio::test]
    async fn test_remote_parent_is_continued() {
        let (router, spans, _metrics) = harness(Duration::from_secs(1));
        let request = Request::builder()
            .uri("/ok")
            .header(
                "traceparent",
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            )
            .body(Body::empty())
            .unwrap();
        router.oneshot(request).await.unwrap();

        let span = &spans.finished()[0];
        assert_eq!(
            span.context.trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );
        assert_eq!(
            span.parent.as_ref().unwrap().span_id().to_string(),
            "00f067aa0ba902b7"
        );
    }

    #[tokio::test]
    async fn test_oversized_timeout_does_not_overflow() {
        let (router, spans, _metrics) = harness(Duration::from_secs(u64::MAX));
        let response = router.oneshot(get_request("/ok")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(spans.is_balanced());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_yields_gateway_timeout() {
        let (router, spans, metrics) = harness(Duration::from_millis(100));
        let response = router.oneshot(get_request("/slow")).await.unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let span = &spans.finished()[0];
        assert_eq!(span.status, Status::error("HTTP 504"));
        assert_eq!(
            metrics.named(REQUEST_COUNT)[0].label("http.status_code"),
            Some("504")
        );
        assert!(spans.is_balanced());
    }

    #[tokio::test]
    async fn test_panic_yields_internal_error() {
        let (router, spans, _metrics) = harness(Duration::from_secs(1));
        let response = router.oneshot(get_request("/panic")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(spans.finished()[0].is_error());
        assert!(spans.is_balanced());
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_drop_records_cancellation() {
        let (router, spans, metrics) = harness(Duration::from_secs(10));
        let pending = router.oneshot(get_request("/slow"));
        let _ = tokio::time::timeout(Duration::from_millis(50), pending).await;

        let span = &spans.finished()[0];
        assert!(span.is_cancelled());
        assert!(span.is_error());
        assert_eq!(
            metrics.named(REQUEST_COUNT)[0].label("http.status_code"),
            Some("499")
        );
        assert!(spans.is_balanced());
    }
}
