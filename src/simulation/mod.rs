//! Synthetic outcome simulation.
//!
//! # Data Flow
//! ```text
//! handler
//!     → sampler.rs (category policy + caller-supplied RNG → OutcomeSample)
//!     → tokio::time::sleep(latency)   (only suspension point)
//!     → payload.rs (JSON body shaped by branch / variant)
//! ```
//!
//! # Design Decisions
//! - Policies never own an RNG; callers pass one in
//! - Sampling constants live in config with the historical values as defaults

pub mod payload;
pub mod sampler;

pub use sampler::{
    AlertLevel, Branch, Category, LatencyWindow, OutcomeSample, OutcomeSampler, PayloadVariant,
    SimulationConfig,
};
