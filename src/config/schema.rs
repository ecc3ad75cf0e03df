//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section has defaults, so an empty file is a valid configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::simulation::SimulationConfig;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Request deadline and shutdown drain bound.
    pub timeouts: TimeoutConfig,

    /// Service identity and export backends.
    pub telemetry: TelemetryConfig,

    /// Log level, format and optional file sink.
    pub logging: LoggingConfig,

    /// Outcome sampling constants for the simulated endpoints.
    pub simulation: SimulationConfig,

    /// Background traffic against the service's own endpoints.
    pub self_traffic: SelfTrafficConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-request deadline in seconds.
    pub request_secs: u64,

    /// Upper bound on draining in-flight requests at shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 15,
            shutdown_secs: 30,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,

    /// Reported as `deployment.environment`.
    pub environment: String,

    /// OTLP/gRPC collector endpoint.
    pub otlp_endpoint: String,

    /// Export traces and metrics over OTLP.
    pub export_enabled: bool,

    /// Metric export period in seconds.
    pub export_interval_secs: u64,

    /// Serve Prometheus scrape output at `/metrics`.
    pub prometheus_enabled: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "edge-demo-app".to_string(),
            service_version: "1.0.0".to_string(),
            environment: "edge".to_string(),
            otlp_endpoint: "http://otel-collector.observability.svc.cluster.local:4317".to_string(),
            export_enabled: true,
            export_interval_secs: 10,
            prometheus_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` string). `RUST_LOG` overrides it.
    pub level: String,

    pub format: LogFormat,

    /// Additional JSON log file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
            file: None,
        }
    }
}

/// Self-traffic generator configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SelfTrafficConfig {
    pub enabled: bool,

    /// Delay between requests in milliseconds.
    pub interval_ms: u64,

    /// Paths requested in round-robin order.
    pub paths: Vec<String>,

    /// Target base URL. Defaults to the bound listener address.
    pub base_url: Option<String>,

    /// Per-request client timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for SelfTrafficConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 100,
            paths: vec!["/noise".to_string()],
            base_url: None,
            request_timeout_ms: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_default() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.listener.bind_address, "0.0.0.0:8080");
        assert_eq!(config.timeouts.request_secs, 15);
        assert_eq!(config.telemetry.service_name, "edge-demo-app");
        assert!(config.telemetry.export_enabled);
        assert!(!config.self_traffic.enabled);
    }

    #[test]
    fn test_partial_sections() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [logging]
            format = "pretty"

            [simulation.alerts]
            error_probability = 0.5

            [self_traffic]
            enabled = true
            paths = ["/noise", "/api/alerts/system"]
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.simulation.alerts.error_probability, 0.5);
        assert_eq!(config.simulation.alerts.latency.min_ms, 80);
        assert_eq!(config.self_traffic.paths.len(), 2);
        assert_eq!(config.self_traffic.interval_ms, 100);
    }
}
