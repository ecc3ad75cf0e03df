//! Background self-traffic.
//!
//! # Data Flow
//! ```text
//! ticker (interval_ms)
//!     → generator.rs (client span "self-ping", traceparent injection)
//!     → GET <base_url><path> against our own listener
//!     → server span continues the client's trace
//! ```

pub mod generator;

pub use generator::{local_base_url, SelfTrafficGenerator};
