use std::{
    ops::{Range, RangeInclusive},
    time::Duration,
};

use axum::{extract::State, Extension, Json};
use rand::{rngs::StdRng, Rng, SeedableRng as _};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, info_span, Instrument as _};

use super::{round_to, timestamp_now};
use crate::{state::AppState, trace_context::TraceContext};

const ITERATIONS: RangeInclusive<u32> = 1000..=5000;
const TARGET_SECS: Range<f64> = 1.0..3.0;
const CHECKPOINT_INTERVAL: u32 = 1000;

/// A synthetic compute workload.
///
/// The workload pauses at every checkpoint (every [`CHECKPOINT_INTERVAL`]th iteration, starting with the first) so
/// that the total pause approximates the target duration regardless of the iteration count.
#[derive(Clone, Copy, Debug)]
pub struct ComputePlan {
    iterations: u32,
    duration: Duration,
}

impl ComputePlan {
    pub fn new(iterations: u32, duration: Duration) -> Self {
        Self { iterations, duration }
    }

    fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let iterations = rng.random_range(ITERATIONS);
        let duration = Duration::from_secs_f64(rng.random_range(TARGET_SECS));
        Self::new(iterations, duration)
    }

    pub fn checkpoints(&self) -> u32 {
        self.iterations.div_ceil(CHECKPOINT_INTERVAL)
    }

    pub fn checkpoint_pause(&self) -> Duration {
        self.duration
            .mul_f64(f64::from(CHECKPOINT_INTERVAL) / f64::from(self.iterations))
    }

    /// Runs the workload, returning the accumulated value.
    pub async fn run<R: Rng>(&self, rng: &mut R) -> f64 {
        let pause = self.checkpoint_pause();

        let mut result = 0.0;
        for i in 0..self.iterations {
            result += rng.random::<f64>();
            if i % CHECKPOINT_INTERVAL == 0 {
                sleep(pause).await;
            }
        }
        result
    }
}

#[derive(Serialize)]
pub struct ComputeResponse {
    message: &'static str,
    result: f64,
    iterations: u32,
    timestamp: String,
    trace_id: String,
}

pub async fn handle_compute(
    State(state): State<AppState>, Extension(trace): Extension<TraceContext>,
) -> Json<ComputeResponse> {
    let ctx = trace.child(&mut rand::rng());
    let mut rng = StdRng::from_rng(&mut rand::rng());
    let plan = ComputePlan::random(&mut rng);

    let span = info_span!(
        "compute_task",
        span_id = %ctx.span_id_hex(),
        parent_span_id = ctx.parent_span_id_hex().as_deref(),
        compute.iterations = plan.iterations,
        compute.duration = plan.duration.as_secs_f64(),
    );

    async move {
        info!(checkpoints = plan.checkpoints(), "Compute task started");
        let result = plan.run(&mut rng).await;
        state.metrics.compute_task();

        Json(ComputeResponse {
            message: "Compute task completed",
            result: round_to(result, 2),
            iterations: plan.iterations,
            timestamp: timestamp_now(),
            trace_id: ctx.trace_id_hex(),
        })
    }
    .instrument(span)
    .await
}
