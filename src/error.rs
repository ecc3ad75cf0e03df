//! Startup error taxonomy.
//!
//! Request handling has no error type of its own: simulated failures are
//! ordinary responses and exporter failures stay inside the telemetry
//! backends. Everything here is fatal and happens before traffic is served.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that abort the process before the listener accepts traffic.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to initialize logging: {0}")]
    Logging(String),

    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build trace exporter: {0}")]
    TraceExporter(#[from] opentelemetry::trace::TraceError),

    #[error("failed to build metrics exporter: {0}")]
    MetricsExporter(#[from] opentelemetry::metrics::MetricsError),

    #[error("failed to build prometheus recorder: {0}")]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to build self-traffic client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
