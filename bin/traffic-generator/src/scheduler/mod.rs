//! Traffic scheduling.
//!
//! Traffic is driven by two independent lanes. The regular lane issues small batches at a steady, jittered cadence
//! and stops when asked to. The burst lane occasionally fires a larger batch to simulate load spikes, and runs until
//! the process exits. Neither lane ever waits on the other.

use std::{future::Future, ops::Range, sync::Arc, time::Duration};

use obslab_app::prelude::*;
use rand::{rngs::StdRng, Rng as _, SeedableRng as _};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info};

use crate::{
    executor::{Dispatch, Outcome, TrafficEvent},
    selector::WeightedSelector,
};

mod burst;
pub use self::burst::BurstLane;

mod regular;
pub use self::regular::RegularLane;

fn uniform_duration(rng: &mut StdRng, range: Range<f64>) -> Duration {
    Duration::from_secs_f64(rng.random_range(range))
}

/// Selects an endpoint and starts a request for it in `tasks`.
fn start_request<D>(
    tasks: &mut JoinSet<TrafficEvent>, selector: &WeightedSelector, dispatcher: &Arc<D>, rng: &mut StdRng,
) where
    D: Dispatch,
{
    let endpoint = selector.select(rng).clone();
    let dispatcher = Arc::clone(dispatcher);
    tasks.spawn_traced_named("traffic-request", async move { dispatcher.dispatch(&endpoint).await });
}

fn log_batch_summary(lane: &'static str, events: &[TrafficEvent]) {
    let Some(batch_started_at) = events.iter().map(|event| event.timestamp).min() else {
        return;
    };

    let count = |outcome| events.iter().filter(|event| event.outcome() == outcome).count();
    debug!(
        lane,
        requests = events.len(),
        success = count(Outcome::Success),
        error = count(Outcome::Error),
        failure = count(Outcome::Failure),
        batch_started_at = %batch_started_at.to_rfc3339(),
        "Traffic batch completed."
    );
}

fn join_error_type(e: &JoinError) -> &'static str {
    if e.is_panic() {
        "panic"
    } else {
        "cancelled"
    }
}

/// Drives traffic against the target through both lanes.
pub struct TrafficScheduler<D> {
    target_url: String,
    regular: RegularLane<D>,
    burst: BurstLane<D>,
}

impl<D> TrafficScheduler<D>
where
    D: Dispatch,
{
    /// Creates a new `TrafficScheduler`.
    ///
    /// Both lanes share the selector and dispatcher, but draw from their own random number generators.
    pub fn new(target_url: String, selector: WeightedSelector, dispatcher: D, base_interval: Duration) -> Self {
        let dispatcher = Arc::new(dispatcher);

        Self {
            target_url,
            regular: RegularLane::new(
                selector.clone(),
                Arc::clone(&dispatcher),
                base_interval,
                StdRng::from_rng(&mut rand::rng()),
            ),
            burst: BurstLane::new(selector, dispatcher, StdRng::from_rng(&mut rand::rng())),
        }
    }

    /// Runs both lanes until `shutdown` resolves.
    ///
    /// The regular lane stops as soon as `shutdown` resolves, abandoning any in-flight batch, and the burst lane is
    /// torn down with it.
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            target_url = %self.target_url,
            request_interval = self.regular.base_interval().as_secs_f64(),
            "Traffic generator started"
        );

        let burst = spawn_traced_named("burst-lane", self.burst.run());
        self.regular.run(shutdown).await;
        burst.abort();
    }
}


#[cfg(test)]
mod tests {
    use tokio::time::{sleep, Instant};

    use super::{test_util::*, *};

    #[tokio::test(start_paused = true)]
    async fn slow_regular_batch_does_not_delay_bursts() {
        // Every request outlasts the longest wait before a burst.
        let dispatcher = RecordingDispatcher::new(Duration::from_secs(200));
        let scheduler = TrafficScheduler {
            target_url: "http://localhost:8000".to_string(),
            regular: RegularLane::new(
                selector(),
                Arc::clone(&dispatcher),
                Duration::from_secs(4),
                seeded_rng(1),
            ),
            burst: BurstLane::new(selector(), Arc::clone(&dispatcher), seeded_rng(2)),
        };

        let start = Instant::now();
        scheduler.run(sleep(Duration::from_secs(130))).await;

        let starts = dispatcher.starts();
        let (regular, burst): (Vec<_>, Vec<_>) = starts
            .iter()
            .map(|at| *at - start)
            .partition(|offset| *offset < Duration::from_secs(30));

        assert!((1..=3).contains(&regular.len()), "regular starts: {:?}", regular);
        assert!((5..=15).contains(&burst.len()), "burst starts: {:?}", burst);
        assert!(burst[0] <= Duration::from_secs(120));
    }
}
