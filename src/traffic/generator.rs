//! Self-traffic generation.
//!
//! # Responsibilities
//! - Periodically call the service's own endpoints, round-robin
//! - Trace each call with a client span and propagate it via `traceparent`
//!
//! # Design Decisions
//! - Independent task: shares nothing with request handling except the
//!   HTTP endpoint it calls
//! - Stops on the shutdown broadcast, abandoning any call in flight

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use axum::http::HeaderMap;
use opentelemetry::trace::{SpanKind, Status};
use opentelemetry::KeyValue;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::SelfTrafficConfig;
use crate::error::StartupError;
use crate::observability::Telemetry;

/// Base URL that reaches a listener bound to `addr` from this host.
/// Wildcard binds are reached over loopback.
pub fn local_base_url(addr: SocketAddr) -> String {
    let ip: IpAddr = match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => Ipv4Addr::LOCALHOST.into(),
        IpAddr::V6(ip) if ip.is_unspecified() => Ipv6Addr::LOCALHOST.into(),
        ip => ip,
    };
    format!("http://{}", SocketAddr::new(ip, addr.port()))
}

pub struct SelfTrafficGenerator {
    client: reqwest::Client,
    base_url: String,
    paths: Vec<String>,
    interval: Duration,
    telemetry: Telemetry,
}

impl SelfTrafficGenerator {
    /// `base_url` is used when the config does not name one.
    pub fn new(
        config: &SelfTrafficConfig,
        base_url: String,
        telemetry: Telemetry,
    ) -> Result<Self, StartupError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .no_proxy()
            .user_agent(concat!("vessel-monitor-self-traffic/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or(base_url)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client,
            base_url,
            paths: config.paths.clone(),
            interval: Duration::from_millis(config.interval_ms),
            telemetry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The path requested on the `n`th tick.
    pub fn path_at(&self, n: usize) -> Option<&str> {
        if self.paths.is_empty() {
            None
        } else {
            Some(&self.paths[n % self.paths.len()])
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if self.paths.is_empty() {
            tracing::warn!("Self-traffic enabled without paths, not starting");
            return;
        }

        tracing::info!(
            base_url = %self.base_url,
            interval_ms = self.interval.as_millis() as u64,
            paths = ?self.paths,
            "Self-traffic generator starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tick = 0usize;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }
            let Some(path) = self.path_at(tick) else {
                break;
            };
            tick = tick.wrapping_add(1);
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = self.ping(path) => {}
            }
        }

        tracing::info!(requests = tick, "Self-traffic generator stopped");
    }

    /// Issue one traced GET. Returns the response status, or `None` if the
    /// call failed.
    pub async fn ping(&self, path: &str) -> Option<u16> {
        let url = format!("{}{}", self.base_url, path);
        let mut span = self.telemetry.spans().start(
            "self-ping",
            SpanKind::Client,
            None,
            vec![
                KeyValue::new("http.method", "GET"),
                KeyValue::new("http.url", url.clone()),
            ],
        );

        let mut headers = HeaderMap::new();
        self.telemetry
            .propagation()
            .inject(span.context(), &[], &mut headers);

        match self.client.get(&url).headers(headers).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                span.set_attribute(KeyValue::new("http.status_code", i64::from(status)));
                if status >= 400 {
                    span.set_status(Status::error(format!("HTTP {status}")));
                } else {
                    span.set_status(Status::Ok);
                }
                tracing::debug!(url = %url, status, "Self-traffic request completed");
                span.end();
                Some(status)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Self-traffic request failed");
                span.set_status(Status::error(e.to_string()));
                span.end();
                None
            }
        }
    }
}
