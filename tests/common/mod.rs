//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;

use vessel_monitor::observability::metrics::{InMemoryMetricsSink, MetricsRecorder, MetricsSink};
use vessel_monitor::observability::spans::{InMemorySpanSink, SpanRecorder};
use vessel_monitor::simulation::LatencyWindow;
use vessel_monitor::{HttpServer, ServiceConfig, Shutdown, Telemetry};

/// Default configuration with short latency windows and export disabled.
pub fn fast_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.telemetry.export_enabled = false;

    let sim = &mut config.simulation;
    sim.engine.latency = LatencyWindow::new(20, 40);
    sim.navigation.latency = LatencyWindow::new(20, 40);
    sim.diagnostics.latency = LatencyWindow::new(20, 40);
    sim.diagnostics.complex_latency = LatencyWindow::new(60, 80);
    sim.alerts.latency = LatencyWindow::new(10, 20);
    sim.noise.high_latency = LatencyWindow::new(50, 50);
    config
}

/// Telemetry backed by in-memory sinks.
pub fn in_memory_telemetry() -> (Telemetry, Arc<InMemorySpanSink>, Arc<InMemoryMetricsSink>) {
    let spans = Arc::new(InMemorySpanSink::new());
    let metrics = Arc::new(InMemoryMetricsSink::new());
    let telemetry = Telemetry::new(
        SpanRecorder::new(spans.clone()),
        MetricsRecorder::new(vec![metrics.clone() as Arc<dyn MetricsSink>]),
    );
    (telemetry, spans, metrics)
}

/// The full router wired to in-memory telemetry, driven in-process.
pub struct TestApp {
    pub router: Router,
    pub spans: Arc<InMemorySpanSink>,
    pub metrics: Arc<InMemoryMetricsSink>,
}

impl TestApp {
    pub fn new(config: ServiceConfig) -> Self {
        let (telemetry, spans, metrics) = in_memory_telemetry();
        let router = HttpServer::new(config, telemetry).router();
        Self {
            router,
            spans,
            metrics,
        }
    }

    pub async fn get(&self, uri: &str) -> Response {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// A server running on an ephemeral local port.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub async fn spawn_server(config: ServiceConfig, telemetry: Telemetry) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, telemetry);
    let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
    RunningServer {
        addr,
        shutdown,
        handle,
    }
}

/// Collects JSON log lines written by a `tracing` subscriber.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// A JSON subscriber writing into this capture.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_writer(self.clone())
            .finish()
    }

    pub fn records(&self) -> Vec<serde_json::Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    pub fn with_message(&self, message: &str) -> Vec<serde_json::Value> {
        self.records()
            .into_iter()
            .filter(|r| r["message"] == message)
            .collect()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
