//! HTTP middleware.

pub mod instrument;

pub use instrument::{instrument, Instrumentation, CLIENT_CLOSED_REQUEST};
