use std::{
    future::Future,
    ops::{Range, RangeInclusive},
    sync::Arc,
    time::Duration,
};

use rand::{rngs::StdRng, Rng as _};
use tokio::{
    select,
    task::{JoinError, JoinSet},
    time::sleep,
};
use tracing::{error, info};

use super::{join_error_type, log_batch_summary, start_request, uniform_duration};
use crate::{
    executor::{Dispatch, TrafficEvent},
    selector::WeightedSelector,
};

const CONCURRENCY: RangeInclusive<usize> = 1..=3;
const STAGGER_SECS: Range<f64> = 0.1..0.3;
const JITTER_SECS: f64 = 1.0;
const MIN_CYCLE_SLEEP: Duration = Duration::from_secs(1);
const FAULT_BACKOFF: Duration = Duration::from_secs(5);

/// Returns how long to sleep between regular batches for the given base interval and jitter.
///
/// Never shorter than one second.
pub fn cycle_sleep(base_interval: Duration, jitter_secs: f64) -> Duration {
    let secs = (base_interval.as_secs_f64() + jitter_secs).max(MIN_CYCLE_SLEEP.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// Steady-cadence traffic.
///
/// Each cycle starts between one and three requests, waits for all of them to finish, and then sleeps for the base
/// interval plus up to a second of jitter in either direction.
pub struct RegularLane<D> {
    selector: WeightedSelector,
    dispatcher: Arc<D>,
    base_interval: Duration,
    rng: StdRng,
}

impl<D> RegularLane<D>
where
    D: Dispatch,
{
    /// Creates a new `RegularLane`.
    pub fn new(selector: WeightedSelector, dispatcher: Arc<D>, base_interval: Duration, rng: StdRng) -> Self {
        Self {
            selector,
            dispatcher,
            base_interval,
            rng,
        }
    }

    pub fn base_interval(&self) -> Duration {
        self.base_interval
    }

    /// Starts a batch of requests in `tasks` and waits for all of them to complete.
    ///
    /// When more than one request is started, a short pause follows each start.
    ///
    /// # Errors
    ///
    /// If any request task fails to complete, an error is returned once every other request in the batch has finished.
    pub async fn run_batch(&mut self, tasks: &mut JoinSet<TrafficEvent>) -> Result<Vec<TrafficEvent>, JoinError> {
        let concurrency = self.rng.random_range(CONCURRENCY);

        for _ in 0..concurrency {
            start_request(tasks, &self.selector, &self.dispatcher, &mut self.rng);
            if concurrency > 1 {
                sleep(uniform_duration(&mut self.rng, STAGGER_SECS)).await;
            }
        }

        let mut events = Vec::with_capacity(concurrency);
        let mut first_error = None;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(event) => events.push(event),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(events),
        }
    }

    /// Runs a single cycle: one batch, then the inter-batch sleep.
    ///
    /// Requests are started in `tasks`, so that a caller abandoning the cycle can still wait for them. Faults are
    /// logged and followed by a fixed backoff instead of the usual sleep.
    async fn run_cycle(&mut self, tasks: &mut JoinSet<TrafficEvent>) {
        match self.run_batch(tasks).await {
            Ok(events) => {
                log_batch_summary("regular", &events);

                let jitter = self.rng.random_range(-JITTER_SECS..=JITTER_SECS);
                sleep(cycle_sleep(self.base_interval, jitter)).await;
            }
            Err(e) => {
                error!(
                    error_type = join_error_type(&e),
                    "Unexpected error in traffic generator: {}", e
                );
                sleep(FAULT_BACKOFF).await;
            }
        }
    }

    /// Runs cycles until `shutdown` resolves.
    ///
    /// No new requests are started once `shutdown` resolves, but requests already in flight are waited for.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            let mut tasks = JoinSet::new();
            let stopping = select! {
                _ = &mut shutdown => true,
                _ = self.run_cycle(&mut tasks) => false,
            };

            if stopping {
                info!("Traffic generator stopping");
                drain(&mut tasks).await;
                break;
            }
        }
    }
}

/// Waits for every request left in `tasks`.
async fn drain(tasks: &mut JoinSet<TrafficEvent>) {
    while let Some(result) = tasks.join_next().await {
        if let Err(e) = result {
            error!(error_type = join_error_type(&e), "Request did not complete: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use super::*;
    use crate::scheduler::test_util::{gaps, seeded_rng, selector, RecordingDispatcher};

    #[test]
    fn cycle_sleep_applies_jitter() {
        assert_eq!(cycle_sleep(Duration::from_secs(4), -1.0), Duration::from_secs(3));
        assert_eq!(cycle_sleep(Duration::from_secs(4), 0.5), Duration::from_millis(4500));
    }

    #[test]
    fn cycle_sleep_never_drops_below_one_second() {
        assert_eq!(cycle_sleep(Duration::from_millis(500), -1.0), MIN_CYCLE_SLEEP);
        assert_eq!(cycle_sleep(Duration::ZERO, -0.2), MIN_CYCLE_SLEEP);
        assert_eq!(cycle_sleep(Duration::from_secs(1), -1.0), MIN_CYCLE_SLEEP);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_joins_every_request_it_starts() {
        for seed in 0..20 {
            let dispatcher = RecordingDispatcher::new(Duration::from_millis(750));
            let mut lane = RegularLane::new(
                selector(),
                Arc::clone(&dispatcher),
                Duration::from_secs(4),
                seeded_rng(seed),
            );

            let events = lane.run_batch(&mut JoinSet::new()).await.unwrap();
            assert!(CONCURRENCY.contains(&events.len()));
            assert_eq!(dispatcher.starts().len(), events.len());
            assert_eq!(dispatcher.completed(), events.len());

            // Timer resolution is one millisecond, so allow for rounding up.
            for gap in gaps(&dispatcher.starts()) {
                assert!(gap >= Duration::from_millis(100) && gap <= Duration::from_millis(301), "gap: {:?}", gap);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn lane_stops_when_shutdown_resolves() {
        let dispatcher = RecordingDispatcher::new(Duration::from_millis(50));
        let lane = RegularLane::new(
            selector(),
            Arc::clone(&dispatcher),
            Duration::from_secs(4),
            seeded_rng(1),
        );

        let start = Instant::now();
        lane.run(sleep(Duration::from_secs(30))).await;
        assert!(start.elapsed() >= Duration::from_secs(30));

        // Cycles are at least three seconds apart with a four second base interval.
        let starts = dispatcher.starts();
        assert!(!starts.is_empty());
        assert!(starts.len() <= 3 * 11, "too many requests: {}", starts.len());
        assert!(starts.iter().all(|at| *at < start + Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_requests_in_flight() {
        for seed in 0..10 {
            let dispatcher = RecordingDispatcher::new(Duration::from_secs(10));
            let lane = RegularLane::new(
                selector(),
                Arc::clone(&dispatcher),
                Duration::from_secs(4),
                seeded_rng(seed),
            );

            let start = Instant::now();
            lane.run(sleep(Duration::from_secs(2))).await;

            // Every request was started before the stop, and finished before `run` returned.
            let starts = dispatcher.starts();
            assert!(!starts.is_empty());
            assert!(starts.iter().all(|at| *at - start < Duration::from_secs(2)));
            assert_eq!(dispatcher.completed(), starts.len());
            assert!(start.elapsed() >= Duration::from_secs(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn faulted_batch_still_finishes_its_other_requests() {
        for seed in 0..20 {
            let dispatcher = RecordingDispatcher::panicking_first(Duration::from_secs(1));
            let mut lane = RegularLane::new(selector(), Arc::clone(&dispatcher), Duration::ZERO, seeded_rng(seed));

            assert!(lane.run_batch(&mut JoinSet::new()).await.is_err());
            assert_eq!(dispatcher.completed(), dispatcher.starts().len() - 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn faults_back_off_before_retrying() {
        let dispatcher = RecordingDispatcher::panicking();
        let lane = RegularLane::new(selector(), Arc::clone(&dispatcher), Duration::ZERO, seeded_rng(2));

        let start = Instant::now();
        lane.run(sleep(Duration::from_millis(4500))).await;

        // Without the backoff, a zero base interval would start a new batch every second or so.
        let starts = dispatcher.starts();
        assert!(!starts.is_empty());
        assert!(starts.iter().all(|at| *at - start < Duration::from_secs(1)), "{:?}", gaps(&starts));
    }

    #[tokio::test(start_paused = true)]
    async fn healthy_lane_with_short_interval_keeps_cycling() {
        let dispatcher = RecordingDispatcher::new(Duration::ZERO);
        let lane = RegularLane::new(selector(), Arc::clone(&dispatcher), Duration::ZERO, seeded_rng(2));

        let start = Instant::now();
        lane.run(sleep(Duration::from_millis(4500))).await;

        let starts = dispatcher.starts();
        assert!(starts.iter().any(|at| *at - start >= Duration::from_secs(1)));
    }
}
