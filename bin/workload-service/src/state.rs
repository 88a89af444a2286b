use rand::Rng as _;

use crate::telemetry::ServiceMetrics;

/// Probabilities of the synthetic route failures.
#[derive(Clone, Copy, Debug)]
pub struct FailureProfile {
    /// Probability that `/api/data` fails after processing.
    pub data_processing: f64,

    /// Probability that `/api/database` fails after querying.
    pub database: f64,
}

impl FailureProfile {
    /// Draws against `probability`, returning `true` when the failure should happen.
    pub fn roll(probability: f64) -> bool {
        rand::rng().random::<f64>() < probability
    }
}

impl Default for FailureProfile {
    fn default() -> Self {
        Self {
            data_processing: 0.15,
            database: 0.08,
        }
    }
}

/// Shared state for route handlers.
#[derive(Clone)]
pub struct AppState {
    pub metrics: ServiceMetrics,
    pub failures: FailureProfile,
}

impl AppState {
    pub fn new(metrics: ServiceMetrics, failures: FailureProfile) -> Self {
        Self { metrics, failures }
    }
}
