//! Simulated vessel endpoints.
//!
//! Each handler opens a sub-span below the request span, draws an outcome
//! for its category, waits out the sampled latency and answers with a
//! payload shaped by the outcome. The random source is scoped to the
//! sampling block and never held across the wait.

use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use opentelemetry::trace::Status;
use opentelemetry::KeyValue;

use crate::correlated;
use crate::http::response::json_error;
use crate::http::server::AppState;
use crate::observability::context::RequestContext;
use crate::observability::spans::ActiveSpan;
use crate::simulation::payload::{
    AlertReport, DiagnosticResults, DiagnosticsResponse, EngineReading, HealthStatus,
    NavigationReading, NoiseResponse, SensorResponse,
};
use crate::simulation::{AlertLevel, Branch, Category, OutcomeSample, PayloadVariant};

pub const ALERTS_ROUTE: &str = "/api/alerts/system";
pub const NOISE_ROUTE: &str = "/noise";

pub const SENSOR_FAILURE: &str = "sensor communication failure";
pub const SENSOR_FAILURE_DETAILS: &str = "Failed to read bilge pump sensor data";
pub const SIMULATED_ERROR: &str = "simulated internal error";

/// The only suspension point inside a handler. Dropping the request future
/// cancels the wait.
async fn simulate_latency(span: &mut ActiveSpan, sample: &OutcomeSample) {
    span.set_attribute(KeyValue::new("latency_ms", sample.latency_ms as i64));
    tokio::time::sleep(Duration::from_millis(sample.latency_ms)).await;
}

/// Liveness probe: no sampling, always 200.
pub async fn health() -> Json<HealthStatus> {
    Json(HealthStatus::healthy())
}

pub async fn engine_sensors(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    let mut span = state.telemetry.spans().start_child("read-engine-sensors", ctx.span());
    let (sample, reading) = {
        let mut rng = rand::thread_rng();
        let sample = state.sampler.sample(Category::EngineSensors, &mut rng);
        (sample, EngineReading::generate(&mut rng))
    };
    simulate_latency(&mut span, &sample).await;

    span.set_status(Status::Ok);
    span.end();
    Json(SensorResponse::normal("engine", reading)).into_response()
}

pub async fn navigation_sensors(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    let mut span = state
        .telemetry
        .spans()
        .start_child("read-navigation-sensors", ctx.span());
    let (sample, reading) = {
        let mut rng = rand::thread_rng();
        let sample = state.sampler.sample(Category::NavigationSensors, &mut rng);
        (sample, NavigationReading::generate(&mut rng))
    };
    simulate_latency(&mut span, &sample).await;

    span.set_status(Status::Ok);
    span.end();
    Json(SensorResponse::normal("navigation", reading)).into_response()
}

pub async fn diagnostics(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    let mut span = state
        .telemetry
        .spans()
        .start_child("run-engine-diagnostics", ctx.span());
    let logger = ctx.logger().for_span(span.context());
    let (sample, results) = {
        let mut rng = rand::thread_rng();
        let sample = state.sampler.sample(Category::Diagnostics, &mut rng);
        let with_warning = sample.variant == PayloadVariant::WithWarning;
        (sample, DiagnosticResults::generate(&mut rng, with_warning))
    };

    let complex = sample.branch == Branch::Slow;
    if complex {
        span.set_attribute(KeyValue::new("complex_analysis", true));
        correlated!(
            warn,
            logger,
            latency_ms = sample.latency_ms,
            "Complex diagnostic analysis detected"
        );
    }
    simulate_latency(&mut span, &sample).await;

    state.telemetry.metrics().record_diagnostic("completed", complex);
    span.set_status(Status::Ok);
    span.end();
    Json(DiagnosticsResponse::completed(sample.latency_ms, results)).into_response()
}

pub async fn system_alerts(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    let mut span = state
        .telemetry
        .spans()
        .start_child("report-system-alert", ctx.span());
    let (sample, report) = {
        let mut rng = rand::thread_rng();
        let sample = state.sampler.sample(Category::SystemAlerts, &mut rng);
        let level = match sample.variant {
            PayloadVariant::Alert(level) => level,
            _ => AlertLevel::Normal,
        };
        (sample, AlertReport::generate(&mut rng, level))
    };
    simulate_latency(&mut span, &sample).await;

    if sample.branch == Branch::Error {
        let logger = ctx.logger().for_span(span.context());
        span.set_status(Status::error(SENSOR_FAILURE));
        span.set_attribute(KeyValue::new("error.type", "sensor_failure"));
        state
            .telemetry
            .metrics()
            .record_simulated_failure(ALERTS_ROUTE, "sensor_failure");
        correlated!(error, logger, error = SENSOR_FAILURE, "Alert system failed");
        span.end();
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            SENSOR_FAILURE,
            ctx.trace_id(),
            SENSOR_FAILURE_DETAILS,
        );
    }

    span.set_attribute(KeyValue::new("alert.type", report.kind.clone()));
    span.set_status(Status::Ok);
    span.end();
    Json(report).into_response()
}

/// Mixed scenario endpoint used as the self-traffic target.
pub async fn noise(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    let mut span = state.telemetry.spans().start_child("handle-request", ctx.span());
    let sample = state
        .sampler
        .sample(Category::Noise, &mut rand::thread_rng());
    let scenario = match sample.branch {
        Branch::Slow => "high_latency",
        Branch::Error => "error",
        Branch::Normal => "success",
    };
    span.set_attribute(KeyValue::new("scenario", scenario));
    simulate_latency(&mut span, &sample).await;

    let logger = ctx.logger().for_span(span.context());
    match sample.branch {
        Branch::Error => {
            span.set_status(Status::error(SIMULATED_ERROR));
            state
                .telemetry
                .metrics()
                .record_simulated_failure(NOISE_ROUTE, "simulated_error");
            correlated!(error, logger, scenario, "Simulated internal error");
            span.end();
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                SIMULATED_ERROR,
                ctx.trace_id(),
                "Internal Server Error",
            )
        }
        Branch::Slow => {
            correlated!(warn, logger, scenario, latency_ms = sample.latency_ms, "High latency response");
            span.set_status(Status::Ok);
            span.end();
            Json(NoiseResponse::new(scenario, "High Latency Response")).into_response()
        }
        Branch::Normal => {
            span.set_status(Status::Ok);
            span.end();
            Json(NoiseResponse::new(scenario, "Success Response")).into_response()
        }
    }
}
