use std::{
    ops::{Range, RangeInclusive},
    sync::Arc,
    time::Duration,
};

use rand::{rngs::StdRng, Rng as _};
use tokio::{task::JoinSet, time::sleep};
use tracing::{error, info};

use super::{join_error_type, log_batch_summary, start_request, uniform_duration};
use crate::{
    executor::{Dispatch, TrafficEvent},
    selector::WeightedSelector,
};

const DELAY_SECS: RangeInclusive<u64> = 30..=120;
const BURST_SIZE: RangeInclusive<usize> = 5..=15;
const STAGGER_SECS: Range<f64> = 0.1..0.5;

/// Occasional spikes of traffic.
///
/// Waits somewhere between 30 seconds and two minutes, fires a burst of 5 to 15 requests, waits for the whole burst to
/// complete, and repeats.
pub struct BurstLane<D> {
    selector: WeightedSelector,
    dispatcher: Arc<D>,
    rng: StdRng,
}

impl<D> BurstLane<D>
where
    D: Dispatch,
{
    /// Creates a new `BurstLane`.
    pub fn new(selector: WeightedSelector, dispatcher: Arc<D>, rng: StdRng) -> Self {
        Self {
            selector,
            dispatcher,
            rng,
        }
    }

    /// Fires a burst of `size` requests, pausing briefly after starting each one, and waits for all of them.
    ///
    /// Requests whose task fails to complete are logged and left out of the returned events.
    pub async fn run_burst(&mut self, size: usize) -> Vec<TrafficEvent> {
        info!(burst_size = size, "Generating traffic burst");

        let mut tasks = JoinSet::new();
        for _ in 0..size {
            start_request(&mut tasks, &self.selector, &self.dispatcher, &mut self.rng);
            sleep(uniform_duration(&mut self.rng, STAGGER_SECS)).await;
        }

        let mut events = Vec::with_capacity(size);
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(event) => events.push(event),
                Err(e) => error!(error_type = join_error_type(&e), "Burst request did not complete: {}", e),
            }
        }

        events
    }

    /// Fires bursts for as long as the lane is polled.
    pub async fn run(mut self) {
        loop {
            let delay = self.rng.random_range(DELAY_SECS);
            sleep(Duration::from_secs(delay)).await;

            let size = self.rng.random_range(BURST_SIZE);
            let events = self.run_burst(size).await;
            log_batch_summary("burst", &events);
        }
    }
}
