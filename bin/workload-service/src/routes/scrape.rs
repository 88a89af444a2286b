use axum::{extract::State, http::header::CONTENT_TYPE, response::IntoResponse};

use crate::state::AppState;

const PROMETHEUS_TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Renders every registered series in the Prometheus text exposition format.
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    ([(CONTENT_TYPE, PROMETHEUS_TEXT_FORMAT)], state.metrics.registry().render())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::routes::test_util::*;

    #[tokio::test(start_paused = true)]
    async fn scrape_includes_request_and_business_series() {
        let state = test_state(NEVER_FAIL);
        get_json(&state, "/health").await;

        let (status, body) = get_raw(&state, "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("# TYPE http_requests_total counter"));
        assert!(body.contains("http_requests_total{endpoint=\"/health\",method=\"GET\",status_code=\"200\"} 1"));
        assert!(body.contains("# TYPE http_request_duration_seconds histogram"));
        assert!(body.contains("http_request_duration_seconds_count{endpoint=\"/health\",method=\"GET\"} 1"));
        assert!(body.contains("app2_business_metric{type=\"health_checks\"} 1"));
    }
}
