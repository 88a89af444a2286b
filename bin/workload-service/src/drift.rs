//! Background drift of resource-style gauges.

use std::{ops::RangeInclusive, time::Duration};

use metrics::{Counter, Gauge};
use rand::{rngs::StdRng, Rng as _};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

const DRIFT_PERIOD: Duration = Duration::from_secs(15);
const WARNING_PROBABILITY: f64 = 0.03;

const CPU_USAGE: RangeInclusive<f64> = 10.0..=90.0;
const MEMORY_USAGE: RangeInclusive<f64> = 20.0..=80.0;
const ACTIVE_SESSIONS: RangeInclusive<u32> = 5..=50;

/// Handles updated on every drift tick.
pub struct DriftGauges {
    pub cpu_usage: Gauge,
    pub memory_usage: Gauge,
    pub active_sessions: Gauge,
    pub background_errors: Counter,
}

/// Values chosen by a single drift tick.
#[derive(Clone, Copy, Debug)]
pub struct DriftSample {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub active_sessions: u32,
    pub warned: bool,
}

/// Periodically moves resource gauges around, independent of request traffic.
///
/// Every tick overwrites each gauge exactly once and, occasionally, reports a background error.
pub struct DriftLoop {
    gauges: DriftGauges,
    period: Duration,
    warning_probability: f64,
    rng: StdRng,
}

impl DriftLoop {
    /// Creates a new `DriftLoop` that ticks every 15 seconds.
    pub fn new(gauges: DriftGauges, rng: StdRng) -> Self {
        Self {
            gauges,
            period: DRIFT_PERIOD,
            warning_probability: WARNING_PROBABILITY,
            rng,
        }
    }

    /// Sets the probability of reporting a background error on each tick.
    #[cfg(test)]
    pub fn with_warning_probability(mut self, probability: f64) -> Self {
        self.warning_probability = probability;
        self
    }

    /// Runs a single tick.
    pub fn tick(&mut self) -> DriftSample {
        let sample = DriftSample {
            cpu_usage: self.rng.random_range(CPU_USAGE),
            memory_usage: self.rng.random_range(MEMORY_USAGE),
            active_sessions: self.rng.random_range(ACTIVE_SESSIONS),
            warned: self.rng.random::<f64>() < self.warning_probability,
        };

        self.gauges.cpu_usage.set(sample.cpu_usage);
        self.gauges.memory_usage.set(sample.memory_usage);
        self.gauges.active_sessions.set(sample.active_sessions);

        if sample.warned {
            self.gauges.background_errors.increment(1);
            warn!("Background task warning");
        }

        sample
    }

    /// Ticks forever, starting immediately.
    pub async fn run(mut self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let sample = self.tick();
            debug!(
                cpu_usage = sample.cpu_usage,
                memory_usage = sample.memory_usage,
                active_sessions = sample.active_sessions,
                "Resource gauges drifted."
            );
        }
    }
}
