//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (request ID, instrumentation)
//! - Serve Prometheus scrape output when enabled
//! - Bind server to listener and drain in-flight requests on shutdown

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::{middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};
use tower::ServiceBuilder;

use crate::config::ServiceConfig;
use crate::http::handlers;
use crate::http::middleware::{instrument, Instrumentation};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::observability::Telemetry;
use crate::simulation::OutcomeSampler;

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub telemetry: Telemetry,
    pub sampler: Arc<OutcomeSampler>,
}

/// HTTP server for the vessel endpoints.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and telemetry
    /// collaborators.
    pub fn new(config: ServiceConfig, telemetry: Telemetry) -> Self {
        let state = AppState {
            telemetry: telemetry.clone(),
            sampler: Arc::new(OutcomeSampler::new(config.simulation.clone())),
        };
        let instrumentation = Instrumentation::new(
            telemetry,
            Duration::from_secs(config.timeouts.request_secs),
        );
        let router = Self::build_router(state, instrumentation);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, instrumentation: Instrumentation) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/sensors/engine", get(handlers::engine_sensors))
            .route("/api/sensors/navigation", get(handlers::navigation_sensors))
            .route("/api/analytics/diagnostics", get(handlers::diagnostics))
            .route(handlers::ALERTS_ROUTE, get(handlers::system_alerts))
            .route(handlers::NOISE_ROUTE, get(handlers::noise))
            .route_layer(middleware::from_fn_with_state(instrumentation, instrument))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(propagate_request_id_layer()),
            )
    }

    /// Serve `/metrics` from the given Prometheus handle. The route is not
    /// instrumented.
    pub fn with_prometheus(mut self, handle: Option<PrometheusHandle>) -> Self {
        if let Some(handle) = handle {
            let metrics = Router::new()
                .route("/metrics", get(render_metrics))
                .with_state(handle);
            self.router = self.router.merge(metrics);
        }
        self
    }

    /// The fully layered router, for in-process testing.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires, then stop accepting and wait
    /// up to `timeouts.shutdown_secs` for in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let draining = Arc::new(Notify::new());
        let signal = draining.clone();
        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining in-flight requests");
                signal.notify_one();
            })
            .into_future();

        let grace = Duration::from_secs(self.config.timeouts.shutdown_secs);
        tokio::select! {
            result = serve => result?,
            _ = async {
                draining.notified().await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "Drain timeout elapsed, abandoning in-flight requests"
                );
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn render_metrics(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.run_upkeep();
    handle.render()
}
