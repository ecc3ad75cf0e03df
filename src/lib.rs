//! Vessel monitor library.
//!
//! Synthetic vessel sensor endpoints whose only purpose is to exercise a
//! telemetry pipeline: every request is traced, counted, timed and logged
//! with its trace identity.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod simulation;
pub mod traffic;

pub use config::ServiceConfig;
pub use error::StartupError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use observability::Telemetry;
