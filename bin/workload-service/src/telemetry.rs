//! Service metrics.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Counter, Gauge};
use obslab_app::metrics::MetricsRegistry;

use crate::{drift::DriftGauges, routes::RouteError};

const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
const BUSINESS_METRIC: &str = "app2_business_metric";
const ERRORS_TOTAL: &str = "app2_errors_total";

/// Source of a synthetic error, used as the `type` label of the error counter.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorType {
    Processing,
    Database,
    Background,
}

impl ErrorType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Database => "database",
            Self::Background => "background",
        }
    }
}

fn business_metric(kind: &'static str) -> Gauge {
    gauge!(BUSINESS_METRIC, "type" => kind)
}

fn errors_total(error_type: ErrorType) -> Counter {
    counter!(ERRORS_TOTAL, "type" => error_type.as_str())
}

/// Handles for every series the service reports.
///
/// Per-request series are labeled with the request path, so they are registered on demand. Everything else is
/// registered once, up front.
#[derive(Clone)]
pub struct ServiceMetrics {
    registry: MetricsRegistry,
    health_checks: Gauge,
    data_processed: Gauge,
    compute_tasks: Gauge,
    db_operations: Gauge,
    processing_errors: Counter,
    database_errors: Counter,
}

impl ServiceMetrics {
    /// Creates a new `ServiceMetrics`, registering its series in `registry`.
    pub fn new(registry: MetricsRegistry) -> Self {
        registry.scoped(|| {
            describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
            describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
            describe_gauge!(BUSINESS_METRIC, "Business metrics for app2");
            describe_counter!(ERRORS_TOTAL, "Total errors in app2");

            Self {
                registry: registry.clone(),
                health_checks: business_metric("health_checks"),
                data_processed: business_metric("data_processed"),
                compute_tasks: business_metric("compute_tasks"),
                db_operations: business_metric("db_operations"),
                processing_errors: errors_total(ErrorType::Processing),
                database_errors: errors_total(ErrorType::Database),
            }
        })
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// Creates the handles updated by the background drift loop.
    pub fn drift_gauges(&self) -> DriftGauges {
        self.registry.scoped(|| DriftGauges {
            cpu_usage: business_metric("cpu_usage"),
            memory_usage: business_metric("memory_usage"),
            active_sessions: business_metric("active_sessions"),
            background_errors: errors_total(ErrorType::Background),
        })
    }

    pub fn health_check(&self) {
        self.health_checks.increment(1.0);
    }

    pub fn data_processed(&self) {
        self.data_processed.increment(1.0);
    }

    pub fn compute_task(&self) {
        self.compute_tasks.increment(1.0);
    }

    pub fn db_operation(&self) {
        self.db_operations.increment(1.0);
    }

    /// Counts a synthetic route failure.
    pub fn route_error(&self, error: &RouteError) {
        match error {
            RouteError::Processing => self.processing_errors.increment(1),
            RouteError::DatabaseUnavailable => self.database_errors.increment(1),
        }
    }

    /// Records a completed HTTP request.
    pub fn record_request(&self, method: &str, endpoint: &str, status_code: u16, duration: Duration) {
        self.registry.scoped(|| {
            counter!(
                HTTP_REQUESTS_TOTAL,
                "method" => method.to_string(),
                "endpoint" => endpoint.to_string(),
                "status_code" => status_code.to_string()
            )
            .increment(1);

            histogram!(
                HTTP_REQUEST_DURATION_SECONDS,
                "method" => method.to_string(),
                "endpoint" => endpoint.to_string()
            )
            .record(duration.as_secs_f64());
        });
    }
}
