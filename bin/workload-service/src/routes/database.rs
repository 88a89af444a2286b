use std::{
    ops::{Range, RangeInclusive},
    time::Duration,
};

use axum::{extract::State, Extension, Json};
use rand::Rng as _;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument as _};

use super::{round_to, timestamp_now, DatabaseUnavailable, RouteError};
use crate::{
    state::{AppState, FailureProfile},
    trace_context::TraceContext,
};

const CONNECT_DELAY: Duration = Duration::from_millis(100);
const QUERY_SECS: Range<f64> = 0.2..1.0;
const ROWS_AFFECTED: RangeInclusive<u32> = 10..=100;
const QUERY_STATEMENT: &str = "SELECT * FROM users WHERE active = true";

#[derive(Serialize)]
pub struct DatabaseResponse {
    message: &'static str,
    query_time: f64,
    timestamp: String,
    trace_id: String,
}

pub async fn handle_database(
    State(state): State<AppState>, Extension(trace): Extension<TraceContext>,
) -> Result<Json<DatabaseResponse>, RouteError> {
    let ctx = trace.child(&mut rand::rng());
    let span = info_span!(
        "database_operation",
        span_id = %ctx.span_id_hex(),
        parent_span_id = ctx.parent_span_id_hex().as_deref(),
    );

    run_operation(state, ctx).instrument(span).await
}

async fn run_operation(state: AppState, ctx: TraceContext) -> Result<Json<DatabaseResponse>, RouteError> {
    info!("Database operation started");

    let connect_ctx = ctx.child(&mut rand::rng());
    let connect_span = info_span!(
        "db_connect",
        span_id = %connect_ctx.span_id_hex(),
        parent_span_id = connect_ctx.parent_span_id_hex().as_deref(),
        db.connection = "postgresql",
    );
    sleep(CONNECT_DELAY).instrument(connect_span).await;

    let query_ctx = ctx.child(&mut rand::rng());
    let (query_time, rows_affected) = {
        let mut rng = rand::rng();
        (rng.random_range(QUERY_SECS), rng.random_range(ROWS_AFFECTED))
    };
    let query_span = info_span!(
        "db_query",
        span_id = %query_ctx.span_id_hex(),
        parent_span_id = query_ctx.parent_span_id_hex().as_deref(),
        db.statement = QUERY_STATEMENT,
        db.rows_affected = rows_affected,
    );
    sleep(Duration::from_secs_f64(query_time))
        .instrument(query_span)
        .await;

    if FailureProfile::roll(state.failures.database) {
        error!("Database connection timeout");
        let e = DatabaseUnavailable.build();
        state.metrics.route_error(&e);
        return Err(e);
    }

    state.metrics.db_operation();

    Ok(Json(DatabaseResponse {
        message: "Database operation completed",
        query_time: round_to(query_time, 3),
        timestamp: timestamp_now(),
        trace_id: ctx.trace_id_hex(),
    }))
}
