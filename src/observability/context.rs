//! Request-scoped trace context.
//!
//! # Responsibilities
//! - Extract W3C `traceparent` / `baggage` from inbound headers
//! - Inject the same headers into outbound requests
//! - Carry the active span, correlated logger and deadline for one request
//!
//! # Design Decisions
//! - Extraction fails open: malformed or missing headers yield no parent
//! - The context is a value threaded through extensions, never a global

use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::baggage::BaggageExt;
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry::trace::{SpanContext, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use tokio::time::Instant;

use crate::observability::logging::CorrelatedLogger;

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

struct HeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            self.0.insert(name, value);
        }
    }
}

/// Trace identity received from the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagatedContext {
    /// Remote parent span, if the caller sent a valid `traceparent`.
    pub parent: Option<SpanContext>,
    /// Baggage entries, sorted by key.
    pub baggage: Vec<(String, String)>,
}

/// W3C trace-context and baggage propagation.
pub struct Propagation {
    inner: TextMapCompositePropagator,
}

impl Propagation {
    pub fn w3c() -> Self {
        Self {
            inner: TextMapCompositePropagator::new(vec![
                Box::new(TraceContextPropagator::new()),
                Box::new(BaggagePropagator::new()),
            ]),
        }
    }

    pub fn extract(&self, headers: &HeaderMap) -> PropagatedContext {
        let cx = self.inner.extract(&HeaderExtractor(headers));
        let span_context = cx.span().span_context().clone();
        let parent = span_context.is_valid().then_some(span_context);

        let mut baggage: Vec<(String, String)> = cx
            .baggage()
            .iter()
            .map(|(key, (value, _))| (key.as_str().to_owned(), value.as_str().into_owned()))
            .collect();
        baggage.sort();

        PropagatedContext { parent, baggage }
    }

    pub fn inject(&self, span: &SpanContext, baggage: &[(String, String)], headers: &mut HeaderMap) {
        let mut cx = Context::new().with_remote_span_context(span.clone());
        if !baggage.is_empty() {
            cx = cx.with_baggage(
                baggage
                    .iter()
                    .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
            );
        }
        self.inner.inject_context(&cx, &mut HeaderInjector(headers));
    }
}

impl Default for Propagation {
    fn default() -> Self {
        Self::w3c()
    }
}

impl std::fmt::Debug for Propagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagation").finish_non_exhaustive()
    }
}

/// Everything a handler needs to know about the request it serves.
///
/// Created by the instrumentation middleware and dropped with the response.
#[derive(Debug, Clone)]
pub struct RequestContext {
    span: SpanContext,
    propagated: PropagatedContext,
    logger: CorrelatedLogger,
    deadline: Instant,
}

impl RequestContext {
    pub fn new(
        span: SpanContext,
        propagated: PropagatedContext,
        logger: CorrelatedLogger,
        deadline: Instant,
    ) -> Self {
        Self {
            span,
            propagated,
            logger,
            deadline,
        }
    }

    /// The request-level span. Handlers parent their sub-spans on it.
    pub fn span(&self) -> &SpanContext {
        &self.span
    }

    pub fn trace_id(&self) -> String {
        self.span.trace_id().to_string()
    }

    pub fn remote_parent(&self) -> Option<&SpanContext> {
        self.propagated.parent.as_ref()
    }

    pub fn baggage(&self) -> &[(String, String)] {
        &self.propagated.baggage
    }

    pub fn logger(&self) -> &CorrelatedLogger {
        &self.logger
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}
