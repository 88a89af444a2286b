use std::{ops::Range, time::Duration};

use axum::{extract::State, Extension, Json};
use rand::Rng as _;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, field, info, info_span, Instrument as _, Span};

use super::{timestamp_now, Processing, RouteError};
use crate::{
    state::{AppState, FailureProfile},
    trace_context::TraceContext,
};

const PROCESSING_SECS: Range<f64> = 0.1..0.5;
const EXTERNAL_CALL_SECS: Range<f64> = 0.05..0.2;

#[derive(Serialize)]
pub struct DataResponse {
    message: &'static str,
    timestamp: String,
    trace_id: String,
    processing_time: f64,
}

pub async fn handle_data(
    State(state): State<AppState>, Extension(trace): Extension<TraceContext>,
) -> Result<Json<DataResponse>, RouteError> {
    let ctx = trace.child(&mut rand::rng());
    let span = info_span!(
        "process_data",
        span_id = %ctx.span_id_hex(),
        parent_span_id = ctx.parent_span_id_hex().as_deref(),
        processing.duration = field::Empty,
    );

    process_data(state, ctx).instrument(span).await
}

async fn process_data(state: AppState, ctx: TraceContext) -> Result<Json<DataResponse>, RouteError> {
    info!("Processing data request");

    let processing_time = rand::rng().random_range(PROCESSING_SECS);
    sleep(Duration::from_secs_f64(processing_time)).await;
    Span::current().record("processing.duration", processing_time);

    if FailureProfile::roll(state.failures.data_processing) {
        error!("Random error occurred during data processing");
        let e = Processing.build();
        state.metrics.route_error(&e);
        return Err(e);
    }

    let external_ctx = ctx.child(&mut rand::rng());
    let external_time = rand::rng().random_range(EXTERNAL_CALL_SECS);
    let external_span = info_span!(
        "external_call",
        span_id = %external_ctx.span_id_hex(),
        parent_span_id = external_ctx.parent_span_id_hex().as_deref(),
        external.duration = external_time,
    );
    sleep(Duration::from_secs_f64(external_time))
        .instrument(external_span)
        .await;

    state.metrics.data_processed();

    Ok(Json(DataResponse {
        message: "Data processed successfully",
        timestamp: timestamp_now(),
        trace_id: ctx.trace_id_hex(),
        processing_time,
    }))
}
