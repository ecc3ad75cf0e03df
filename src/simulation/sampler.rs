//! Outcome sampling.
//!
//! Each endpoint category owns a policy that maps uniform draws to an
//! [`OutcomeSample`]. Policies are pure: the caller supplies the random
//! source, so a seeded `StdRng` replays the exact same outcome sequence.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Half-open latency window `[min_ms, max_ms)` in milliseconds.
///
/// A window with `min_ms == max_ms` always yields `min_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LatencyWindow {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LatencyWindow {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Draw a latency from the window.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        if self.max_ms <= self.min_ms {
            self.min_ms
        } else {
            rng.gen_range(self.min_ms..self.max_ms)
        }
    }

    /// Whether `latency_ms` could have been drawn from this window.
    pub fn contains(&self, latency_ms: u64) -> bool {
        if self.max_ms <= self.min_ms {
            latency_ms == self.min_ms
        } else {
            (self.min_ms..self.max_ms).contains(&latency_ms)
        }
    }
}

/// Simulated endpoint categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    EngineSensors,
    NavigationSensors,
    Diagnostics,
    SystemAlerts,
    Noise,
}

/// Which path of a policy produced the sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Branch {
    Normal,
    Slow,
    Error,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Normal => "normal",
            Branch::Slow => "slow",
            Branch::Error => "error",
        }
    }
}

/// Informational alert sub-types reported on successful alert reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertLevel {
    Info,
    Warning,
    Normal,
}

impl AlertLevel {
    const ALL: [AlertLevel; 3] = [AlertLevel::Info, AlertLevel::Warning, AlertLevel::Normal];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Normal => "normal",
        }
    }
}

/// Extra payload shaping decided together with the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadVariant {
    Standard,
    WithWarning,
    Alert(AlertLevel),
}

/// One simulated outcome. Drawn fresh per request and never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutcomeSample {
    pub latency_ms: u64,
    pub branch: Branch,
    pub variant: PayloadVariant,
}

/// Fast sensor reads: narrow window, always `normal`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FastReadPolicy {
    pub latency: LatencyWindow,
}

impl FastReadPolicy {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> OutcomeSample {
        OutcomeSample {
            latency_ms: self.latency.sample(rng),
            branch: Branch::Normal,
            variant: PayloadVariant::Standard,
        }
    }
}

impl Default for FastReadPolicy {
    fn default() -> Self {
        Self {
            latency: LatencyWindow::new(50, 80),
        }
    }
}

/// Slow analysis: moderate window, occasionally a much larger one.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SlowAnalysisPolicy {
    pub latency: LatencyWindow,
    pub complex_latency: LatencyWindow,
    /// Probability of drawing from `complex_latency` (flagged `slow`).
    pub complex_probability: f64,
    /// Probability that the result carries a maintenance warning.
    pub warning_probability: f64,
}

impl SlowAnalysisPolicy {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> OutcomeSample {
        let (branch, latency_ms) = if rng.gen::<f64>() < self.complex_probability {
            (Branch::Slow, self.complex_latency.sample(rng))
        } else {
            (Branch::Normal, self.latency.sample(rng))
        };
        let variant = if rng.gen::<f64>() < self.warning_probability {
            PayloadVariant::WithWarning
        } else {
            PayloadVariant::Standard
        };
        OutcomeSample {
            latency_ms,
            branch,
            variant,
        }
    }
}

impl Default for SlowAnalysisPolicy {
    fn default() -> Self {
        Self {
            latency: LatencyWindow::new(300, 600),
            complex_latency: LatencyWindow::new(1000, 1500),
            complex_probability: 0.15,
            warning_probability: 0.20,
        }
    }
}

/// Failure-prone reads: fixed window, `error` with a fixed probability.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FailurePronePolicy {
    pub latency: LatencyWindow,
    pub error_probability: f64,
}

impl FailurePronePolicy {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> OutcomeSample {
        let latency_ms = self.latency.sample(rng);
        if rng.gen::<f64>() < self.error_probability {
            return OutcomeSample {
                latency_ms,
                branch: Branch::Error,
                variant: PayloadVariant::Standard,
            };
        }
        let level = AlertLevel::ALL[rng.gen_range(0..AlertLevel::ALL.len())];
        OutcomeSample {
            latency_ms,
            branch: Branch::Normal,
            variant: PayloadVariant::Alert(level),
        }
    }
}

impl Default for FailurePronePolicy {
    fn default() -> Self {
        Self {
            latency: LatencyWindow::new(80, 160),
            error_probability: 0.20,
        }
    }
}

/// Mixed scenario: a single draw picks high latency, error or success.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MixedPolicy {
    pub latency: LatencyWindow,
    pub high_latency: LatencyWindow,
    pub high_latency_probability: f64,
    pub error_probability: f64,
}

impl MixedPolicy {
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> OutcomeSample {
        let scenario = rng.gen::<f64>();
        let (branch, latency_ms) = if scenario < self.high_latency_probability {
            (Branch::Slow, self.high_latency.sample(rng))
        } else if scenario < self.high_latency_probability + self.error_probability {
            (Branch::Error, self.latency.sample(rng))
        } else {
            (Branch::Normal, self.latency.sample(rng))
        };
        OutcomeSample {
            latency_ms,
            branch,
            variant: PayloadVariant::Standard,
        }
    }
}

impl Default for MixedPolicy {
    fn default() -> Self {
        Self {
            latency: LatencyWindow::new(0, 0),
            high_latency: LatencyWindow::new(1200, 1200),
            high_latency_probability: 0.10,
            error_probability: 0.10,
        }
    }
}

/// Sampling policies for every simulated category.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub engine: FastReadPolicy,
    pub navigation: FastReadPolicy,
    pub diagnostics: SlowAnalysisPolicy,
    pub alerts: FailurePronePolicy,
    pub noise: MixedPolicy,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            engine: FastReadPolicy::default(),
            navigation: FastReadPolicy {
                latency: LatencyWindow::new(40, 60),
            },
            diagnostics: SlowAnalysisPolicy::default(),
            alerts: FailurePronePolicy::default(),
            noise: MixedPolicy::default(),
        }
    }
}

/// Maps a category and a random source to an outcome.
#[derive(Debug, Clone, Default)]
pub struct OutcomeSampler {
    config: SimulationConfig,
}

impl OutcomeSampler {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn sample<R: Rng + ?Sized>(&self, category: Category, rng: &mut R) -> OutcomeSample {
        match category {
            Category::EngineSensors => self.config.engine.sample(rng),
            Category::NavigationSensors => self.config.navigation.sample(rng),
            Category::Diagnostics => self.config.diagnostics.sample(rng),
            Category::SystemAlerts => self.config.alerts.sample(rng),
            Category::Noise => self.config.noise.sample(rng),
        }
    }
}
