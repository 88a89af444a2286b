use axum::{extract::State, Extension, Json};
use serde::Serialize;
use tracing::info;

use super::timestamp_now;
use crate::{state::AppState, trace_context::TraceContext};

#[derive(Serialize)]
pub struct HealthResponse {
    message: &'static str,
    timestamp: String,
    trace_id: String,
}

pub async fn handle_health(
    State(state): State<AppState>, Extension(trace): Extension<TraceContext>,
) -> Json<HealthResponse> {
    info!("Health check requested");
    state.metrics.health_check();

    Json(HealthResponse {
        message: "App2 is healthy",
        timestamp: timestamp_now(),
        trace_id: trace.trace_id_hex(),
    })
}
