//! Vessel monitor service.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                VESSEL MONITOR                │
//!   Client / self-traffic │  ┌────────────┐   ┌──────────────────────┐   │
//!   ──────────────────────┼─▶│ request id │──▶│   instrumentation    │   │
//!                         │  └────────────┘   │ span · logs · metrics│   │
//!                         │                   └──────────┬───────────┘   │
//!                         │                              ▼               │
//!                         │                   ┌──────────────────────┐   │
//!                         │                   │ simulated handlers   │   │
//!                         │                   │ sampler · payloads   │   │
//!                         │                   └──────────────────────┘   │
//!                         │                                              │
//!                         │   export: OTLP traces/metrics, Prometheus    │
//!                         └──────────────────────────────────────────────┘
//! ```

use tokio::net::TcpListener;

use vessel_monitor::config::Cli;
use vessel_monitor::error::StartupError;
use vessel_monitor::lifecycle::{listen_for_shutdown, Shutdown};
use vessel_monitor::observability::{export, logging};
use vessel_monitor::traffic::{local_base_url, SelfTrafficGenerator};
use vessel_monitor::{HttpServer, ServiceConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();
    let config = ServiceConfig::resolve(&cli).map_err(StartupError::from)?;

    logging::init_logging(&config.logging)?;

    tracing::info!(
        service = %config.telemetry.service_name,
        version = env!("CARGO_PKG_VERSION"),
        "vessel-monitor starting"
    );
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        export_enabled = config.telemetry.export_enabled,
        otlp_endpoint = %config.telemetry.otlp_endpoint,
        self_traffic = config.self_traffic.enabled,
        "Configuration loaded"
    );

    let (telemetry, pipeline) = export::install(&config.telemetry)?;

    // Bind TCP listener
    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(|source| StartupError::Bind {
            address: config.listener.bind_address.clone(),
            source,
        })?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let shutdown = Shutdown::new();
    tokio::spawn(listen_for_shutdown(shutdown.clone()));

    let traffic = if config.self_traffic.enabled {
        let generator = SelfTrafficGenerator::new(
            &config.self_traffic,
            local_base_url(local_addr),
            telemetry.clone(),
        )?;
        Some(tokio::spawn(generator.run(shutdown.subscribe())))
    } else {
        None
    };

    let server = HttpServer::new(config, telemetry).with_prometheus(pipeline.prometheus_handle());
    let result = server.run(listener, shutdown.subscribe()).await;

    // The server also stops on its own I/O error; make sure background tasks follow.
    shutdown.trigger();
    if let Some(task) = traffic {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Self-traffic task failed");
        }
    }

    pipeline.shutdown();
    result?;

    tracing::info!("Shutdown complete");
    Ok(())
}
