//! Span lifecycle.
//!
//! # Responsibilities
//! - Allocate trace/span ids and parent spans on a propagated or local context
//! - Collect attributes and status while the unit of work runs
//! - Hand every finished span to a pluggable [`SpanSink`]
//!
//! # Design Decisions
//! - [`ActiveSpan`] is a guard: a span that is never explicitly ended is
//!   ended on drop with an error status, so cancelled futures cannot leak
//!   open spans
//! - Sinks are infallible from the caller's point of view

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use opentelemetry::trace::{
    SpanContext, SpanId, SpanKind, Status, TraceFlags, TraceId, TraceState,
};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::{IdGenerator, RandomIdGenerator};

/// Attribute attached to spans that were ended by drop.
pub const CANCELLED_ATTRIBUTE: &str = "cancelled";

/// A unit of work, either in flight or finished.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanData {
    pub name: Cow<'static, str>,
    pub kind: SpanKind,
    pub context: SpanContext,
    pub parent: Option<SpanContext>,
    pub start_time: SystemTime,
    pub end_time: Option<SystemTime>,
    pub attributes: Vec<KeyValue>,
    pub status: Status,
}

impl SpanData {
    pub fn attribute(&self, key: &str) -> Option<&opentelemetry::Value> {
        self.attributes
            .iter()
            .rev()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.status, Status::Error { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        self.attribute(CANCELLED_ATTRIBUTE).is_some()
    }
}

/// Receives span lifecycle events.
pub trait SpanSink: Send + Sync {
    fn on_start(&self, _span: &SpanData) {}

    fn on_end(&self, span: SpanData);
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NoopSpanSink;

impl SpanSink for NoopSpanSink {
    fn on_end(&self, _span: SpanData) {}
}

/// Keeps every span in memory. Used by tests and local inspection.
#[derive(Debug, Default)]
pub struct InMemorySpanSink {
    started: Mutex<Vec<SpanId>>,
    finished: Mutex<Vec<SpanData>>,
}

impl InMemorySpanSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<SpanId> {
        self.started.lock().expect("span sink mutex poisoned").clone()
    }

    pub fn finished(&self) -> Vec<SpanData> {
        self.finished.lock().expect("span sink mutex poisoned").clone()
    }

    pub fn finished_named(&self, name: &str) -> Vec<SpanData> {
        self.finished()
            .into_iter()
            .filter(|s| s.name == name)
            .collect()
    }

    /// True when every started span was ended exactly once.
    pub fn is_balanced(&self) -> bool {
        let started = self.started();
        let finished = self.finished();
        let ended: Vec<SpanId> = finished.iter().map(|s| s.context.span_id()).collect();
        let unique: HashSet<SpanId> = ended.iter().copied().collect();
        unique.len() == ended.len()
            && started.len() == ended.len()
            && started.iter().all(|id| unique.contains(id))
    }
}

impl SpanSink for InMemorySpanSink {
    fn on_start(&self, span: &SpanData) {
        self.started
            .lock()
            .expect("span sink mutex poisoned")
            .push(span.context.span_id());
    }

    fn on_end(&self, span: SpanData) {
        self.finished
            .lock()
            .expect("span sink mutex poisoned")
            .push(span);
    }
}

/// Starts spans and routes them to a sink.
#[derive(Clone)]
pub struct SpanRecorder {
    sink: Arc<dyn SpanSink>,
    ids: Arc<RandomIdGenerator>,
}

impl SpanRecorder {
    pub fn new(sink: Arc<dyn SpanSink>) -> Self {
        Self {
            sink,
            ids: Arc::new(RandomIdGenerator::default()),
        }
    }

    pub fn noop() -> Self {
        Self::new(Arc::new(NoopSpanSink))
    }

    /// Start a span. A valid `parent` continues its trace, otherwise a new
    /// root trace is created.
    pub fn start(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        parent: Option<&SpanContext>,
        attributes: Vec<KeyValue>,
    ) -> ActiveSpan {
        let parent = parent.filter(|p| p.is_valid()).cloned();
        let (trace_id, trace_flags, trace_state) = match &parent {
            Some(p) => (p.trace_id(), p.trace_flags(), p.trace_state().clone()),
            None => (
                self.ids.new_trace_id(),
                TraceFlags::SAMPLED,
                TraceState::default(),
            ),
        };
        let context = SpanContext::new(
            trace_id,
            self.ids.new_span_id(),
            trace_flags,
            false,
            trace_state,
        );
        let data = SpanData {
            name: name.into(),
            kind,
            context: context.clone(),
            parent,
            start_time: SystemTime::now(),
            end_time: None,
            attributes,
            status: Status::Unset,
        };
        self.sink.on_start(&data);

        ActiveSpan {
            context,
            data: Some(data),
            sink: self.sink.clone(),
        }
    }

    /// Start an internal span below `parent`.
    pub fn start_child(&self, name: impl Into<Cow<'static, str>>, parent: &SpanContext) -> ActiveSpan {
        self.start(name, SpanKind::Internal, Some(parent), Vec::new())
    }
}

impl std::fmt::Debug for SpanRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanRecorder").finish_non_exhaustive()
    }
}

/// A started span. Ends exactly once: via [`ActiveSpan::end`] or on drop.
pub struct ActiveSpan {
    context: SpanContext,
    data: Option<SpanData>,
    sink: Arc<dyn SpanSink>,
}

impl ActiveSpan {
    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    pub fn trace_id(&self) -> TraceId {
        self.context.trace_id()
    }

    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if let Some(data) = self.data.as_mut() {
            data.attributes.push(attribute);
        }
    }

    pub fn set_status(&mut self, status: Status) {
        if let Some(data) = self.data.as_mut() {
            data.status = status;
        }
    }

    pub fn end(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(mut data) = self.data.take() {
            data.end_time = Some(SystemTime::now());
            self.sink.on_end(data);
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        if let Some(data) = self.data.as_mut() {
            if !data.is_error() {
                data.status = Status::error("cancelled");
            }
            data.attributes.push(KeyValue::new(CANCELLED_ATTRIBUTE, true));
        }
        self.finish();
    }
}

impl std::fmt::Debug for ActiveSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSpan")
            .field("context", &self.context)
            .field("ended", &self.data.is_none())
            .finish()
    }
}
