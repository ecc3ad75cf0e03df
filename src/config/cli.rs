//! Command-line and environment overrides.

use std::path::PathBuf;

use clap::Parser;

/// Vessel monitor: synthetic sensor endpoints with full telemetry.
#[derive(Parser, Debug, Clone, Default, PartialEq)]
#[command(name = "vessel-monitor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "VESSEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind the HTTP listener to
    #[arg(long, env = "VESSEL_BIND_ADDRESS")]
    pub bind: Option<String>,

    /// OTLP/gRPC collector endpoint
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Service name reported in telemetry
    #[arg(long, env = "OTEL_SERVICE_NAME")]
    pub service_name: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "VESSEL_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Also write JSON logs to this file
    #[arg(long, env = "VESSEL_LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Do not export traces or metrics over OTLP
    #[arg(long)]
    pub disable_export: bool,

    /// Generate background traffic against our own endpoints
    #[arg(long, env = "VESSEL_SELF_TRAFFIC")]
    pub self_traffic: bool,
}

impl Cli {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
