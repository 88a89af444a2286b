use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;
use tracing::{info_span, Instrument as _};

use crate::{state::AppState, trace_context::TraceContext};

/// Opens the root span for a request.
///
/// A fresh [`TraceContext`] is generated per request and made available to handlers as a request extension. Its trace
/// ID is recorded on the span, so every log line emitted while handling the request carries it.
pub async fn trace_requests(mut request: Request, next: Next) -> Response {
    let trace = TraceContext::new_root(&mut rand::rng());
    let span = info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        trace_id = %trace.trace_id_hex(),
        span_id = %trace.span_id_hex(),
    );

    request.extensions_mut().insert(trace);
    next.run(request).instrument(span).await
}

/// Counts and times every request, labeled by method, path, and response status.
pub async fn record_http_metrics(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let endpoint = request.uri().path().to_string();

    let start = Instant::now();
    let response = next.run(request).await;

    state
        .metrics
        .record_request(&method, &endpoint, response.status().as_u16(), start.elapsed());
    response
}
