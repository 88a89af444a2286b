//! HTTP routes.
//!
//! Every simulated route follows the same shape: open an operation span, spend some synthetic time (optionally in
//! nested sub-operation spans), maybe fail, and otherwise respond with a small JSON payload carrying the request's
//! trace ID and a UTC timestamp.

use axum::{
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use snafu::Snafu;

use crate::state::AppState;

mod compute;
mod data;
mod database;
mod health;
mod middleware;
mod scrape;

/// Builds the service router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::handle_health))
        .route("/api/data", get(data::handle_data))
        .route("/api/compute", get(compute::handle_compute))
        .route("/api/database", get(database::handle_database))
        .route("/metrics", get(scrape::handle_metrics))
        .layer(from_fn_with_state(state.clone(), middleware::record_http_metrics))
        .layer(from_fn(middleware::trace_requests))
        .with_state(state)
}

/// A synthetic route failure.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum RouteError {
    #[snafu(display("Internal processing error"))]
    Processing,

    #[snafu(display("Database temporarily unavailable"))]
    DatabaseUnavailable,
}

impl RouteError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Processing => StatusCode::INTERNAL_SERVER_ERROR,
            Self::DatabaseUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let body = ErrorBody { detail: self.to_string() };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Returns the current time as an RFC 3339 UTC timestamp.
fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::{
        collections::HashMap,
        fmt,
        sync::{Arc, Mutex},
    };

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use obslab_app::{logging::TraceIdLayer, metrics::MetricsRegistry};
    use serde_json::Value;
    use tower::ServiceExt as _;
    use tracing::{
        field,
        span::{Attributes, Id, Record},
        subscriber::DefaultGuard,
        Subscriber,
    };
    use tracing_subscriber::{
        layer::{Context, SubscriberExt as _},
        registry::LookupSpan,
        Layer,
    };

    use super::*;
    use crate::{state::FailureProfile, telemetry::ServiceMetrics};

    pub const NEVER_FAIL: FailureProfile = FailureProfile {
        data_processing: 0.0,
        database: 0.0,
    };

    pub const ALWAYS_FAIL: FailureProfile = FailureProfile {
        data_processing: 1.0,
        database: 1.0,
    };

    pub fn test_state(failures: FailureProfile) -> AppState {
        AppState::new(ServiceMetrics::new(MetricsRegistry::new()), failures)
    }

    /// Sends a `GET` for `uri` through the router, returning the status and raw body.
    pub async fn get_raw(state: &AppState, uri: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = build_router(state.clone()).oneshot(request).await.unwrap();

        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    /// Sends a `GET` for `uri` through the router, returning the status and JSON body.
    pub async fn get_json(state: &AppState, uri: &str) -> (StatusCode, Value) {
        let (status, body) = get_raw(state, uri).await;
        (status, serde_json::from_str(&body).unwrap())
    }

    /// A span seen by [`SpanCapture`], along with every field recorded on it.
    #[derive(Clone, Debug)]
    pub struct CapturedSpan {
        pub name: &'static str,
        pub parent: Option<&'static str>,
        pub fields: HashMap<String, String>,
    }

    struct CaptureIndex(usize);

    #[derive(Default)]
    struct FieldMap(HashMap<String, String>);

    impl field::Visit for FieldMap {
        fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
            self.0.insert(field.name().to_string(), format!("{:?}", value));
        }

        fn record_str(&mut self, field: &field::Field, value: &str) {
            self.0.insert(field.name().to_string(), value.to_string());
        }
    }

    /// Layer that records every span created while it is installed.
    #[derive(Clone, Default)]
    pub struct SpanCapture {
        spans: Arc<Mutex<Vec<CapturedSpan>>>,
    }

    impl SpanCapture {
        /// Installs the capture layer as the default subscriber for the current thread.
        pub fn install() -> (Self, DefaultGuard) {
            let capture = Self::default();
            let subscriber = tracing_subscriber::registry()
                .with(TraceIdLayer)
                .with(capture.clone());
            let guard = tracing::subscriber::set_default(subscriber);
            (capture, guard)
        }

        pub fn names(&self) -> Vec<&'static str> {
            self.spans.lock().unwrap().iter().map(|span| span.name).collect()
        }

        pub fn find(&self, name: &str) -> Option<CapturedSpan> {
            self.spans.lock().unwrap().iter().find(|span| span.name == name).cloned()
        }
    }

    impl<S> Layer<S> for SpanCapture
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
            let mut fields = FieldMap::default();
            attrs.record(&mut fields);

            let Some(span) = ctx.span(id) else { return };
            let parent = span.parent().map(|parent| parent.name());

            let mut spans = self.spans.lock().unwrap();
            spans.push(CapturedSpan {
                name: attrs.metadata().name(),
                parent,
                fields: fields.0,
            });
            span.extensions_mut().insert(CaptureIndex(spans.len() - 1));
        }

        fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
            let Some(span) = ctx.span(id) else { return };
            let extensions = span.extensions();
            let Some(CaptureIndex(index)) = extensions.get::<CaptureIndex>() else {
                return;
            };

            let mut fields = FieldMap::default();
            values.record(&mut fields);
            self.spans.lock().unwrap()[*index].fields.extend(fields.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{test_util::*, *};

    #[test]
    fn route_errors_map_to_status() {
        assert_eq!(RouteError::Processing.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(RouteError::DatabaseUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(0.98765, 3), 0.988);
    }

    #[tokio::test(start_paused = true)]
    async fn every_request_is_counted_and_timed() {
        let state = test_state(NEVER_FAIL);

        get_json(&state, "/health").await;
        get_json(&state, "/health").await;
        let (status, _) = get_raw(&state, "/does-not-exist").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let registry = state.metrics.registry();
        let health = [("method", "GET"), ("endpoint", "/health"), ("status_code", "200")];
        assert_eq!(registry.counter_value("http_requests_total", &health), Some(2));

        let missing = [("method", "GET"), ("endpoint", "/does-not-exist"), ("status_code", "404")];
        assert_eq!(registry.counter_value("http_requests_total", &missing), Some(1));

        let timing = [("method", "GET"), ("endpoint", "/health")];
        assert_eq!(registry.histogram_count("http_request_duration_seconds", &timing), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn failures_respond_with_detail() {
        let state = test_state(ALWAYS_FAIL);

        let (status, body) = get_json(&state, "/api/data").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Internal processing error");

        let (status, body) = get_json(&state, "/api/database").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["detail"], "Database temporarily unavailable");

        let registry = state.metrics.registry();
        let failed_data = [("method", "GET"), ("endpoint", "/api/data"), ("status_code", "500")];
        assert_eq!(registry.counter_value("http_requests_total", &failed_data), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn request_span_carries_trace_id_returned_to_client() {
        let (capture, _guard) = SpanCapture::install();
        let state = test_state(NEVER_FAIL);

        let (_, body) = get_json(&state, "/health").await;
        let trace_id = body["trace_id"].as_str().unwrap();

        let request = capture.find("request").unwrap();
        assert_eq!(request.fields["trace_id"], trace_id);
        assert_eq!(request.fields["path"], "/health");
    }
}
