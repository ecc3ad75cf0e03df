//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, probabilities within [0, 1])
//! - Check addresses and endpoints parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ServiceConfig;
use crate::simulation::LatencyWindow;

/// A single semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// One day.
pub const MAX_REQUEST_SECS: u64 = 86_400;

fn check_window(errors: &mut Vec<ValidationError>, field: &str, window: &LatencyWindow) {
    if window.min_ms > window.max_ms {
        errors.push(ValidationError::new(
            field,
            format!("min_ms ({}) exceeds max_ms ({})", window.min_ms, window.max_ms),
        ));
    }
}

fn check_probability(errors: &mut Vec<ValidationError>, field: &str, p: f64) {
    if !(0.0..=1.0).contains(&p) {
        errors.push(ValidationError::new(field, format!("{p} is outside [0, 1]")));
    }
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    } else if config.timeouts.request_secs > MAX_REQUEST_SECS {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            format!("must be at most {MAX_REQUEST_SECS}"),
        ));
    }

    let sim = &config.simulation;
    check_window(&mut errors, "simulation.engine.latency", &sim.engine.latency);
    check_window(&mut errors, "simulation.navigation.latency", &sim.navigation.latency);
    check_window(&mut errors, "simulation.diagnostics.latency", &sim.diagnostics.latency);
    check_window(
        &mut errors,
        "simulation.diagnostics.complex_latency",
        &sim.diagnostics.complex_latency,
    );
    check_window(&mut errors, "simulation.alerts.latency", &sim.alerts.latency);
    check_window(&mut errors, "simulation.noise.latency", &sim.noise.latency);
    check_window(&mut errors, "simulation.noise.high_latency", &sim.noise.high_latency);

    check_probability(
        &mut errors,
        "simulation.diagnostics.complex_probability",
        sim.diagnostics.complex_probability,
    );
    check_probability(
        &mut errors,
        "simulation.diagnostics.warning_probability",
        sim.diagnostics.warning_probability,
    );
    check_probability(
        &mut errors,
        "simulation.alerts.error_probability",
        sim.alerts.error_probability,
    );
    check_probability(
        &mut errors,
        "simulation.noise.high_latency_probability",
        sim.noise.high_latency_probability,
    );
    check_probability(
        &mut errors,
        "simulation.noise.error_probability",
        sim.noise.error_probability,
    );
    if sim.noise.high_latency_probability + sim.noise.error_probability > 1.0 {
        errors.push(ValidationError::new(
            "simulation.noise",
            "high_latency_probability + error_probability exceeds 1",
        ));
    }

    if config.telemetry.export_enabled {
        match Url::parse(&config.telemetry.otlp_endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::new(
                "telemetry.otlp_endpoint",
                format!("unsupported scheme '{}'", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(
                "telemetry.otlp_endpoint",
                format!("'{}' is not a URL: {e}", config.telemetry.otlp_endpoint),
            )),
        }
        if config.telemetry.export_interval_secs == 0 {
            errors.push(ValidationError::new(
                "telemetry.export_interval_secs",
                "must be greater than 0",
            ));
        }
    }

    let traffic = &config.self_traffic;
    if traffic.enabled {
        if traffic.interval_ms == 0 {
            errors.push(ValidationError::new("self_traffic.interval_ms", "must be greater than 0"));
        }
        if traffic.paths.is_empty() {
            errors.push(ValidationError::new("self_traffic.paths", "must not be empty"));
        }
        if let Some(base) = &traffic.base_url {
            if Url::parse(base).is_err() {
                errors.push(ValidationError::new(
                    "self_traffic.base_url",
                    format!("'{base}' is not a URL"),
                ));
            }
        }
    }
    for path in &traffic.paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::new(
                "self_traffic.paths",
                format!("'{path}' must start with '/'"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
