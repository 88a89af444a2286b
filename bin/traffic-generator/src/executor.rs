use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::{Method, StatusCode};
use obslab_error::{ErrorContext as _, GenericError};
use tokio::time::Instant;
use tracing::{error, info};

use crate::catalog::EndpointDescriptor;

/// Overall result of a single request attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The target answered with a status code below 400.
    Success,

    /// The target answered with a status code of 400 or above.
    Error,

    /// No response was received.
    Failure,
}

impl Outcome {
    /// Classifies a response status code.
    pub fn from_status(status: StatusCode) -> Self {
        if status.as_u16() < 400 {
            Self::Success
        } else {
            Self::Error
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Failure => "failure",
        }
    }
}

/// Classification of a transport-level failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Redirect,
    Body,
    Decode,
    Builder,
    Request,
    Unknown,
}

impl TransportErrorKind {
    fn classify(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect
        } else if e.is_redirect() {
            Self::Redirect
        } else if e.is_body() {
            Self::Body
        } else if e.is_decode() {
            Self::Decode
        } else if e.is_builder() {
            Self::Builder
        } else if e.is_request() {
            Self::Request
        } else {
            Self::Unknown
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Redirect => "redirect",
            Self::Body => "body",
            Self::Decode => "decode",
            Self::Builder => "builder",
            Self::Request => "request",
            Self::Unknown => "unknown",
        }
    }
}

/// What was observed for a request attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Observation {
    /// The target responded with the given status.
    Status(StatusCode),

    /// The request failed before a response was received.
    TransportError(TransportErrorKind),
}

/// A single request attempt against the target.
#[derive(Clone, Debug)]
pub struct TrafficEvent {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub method: Method,
    pub observation: Observation,
    pub duration: Duration,
}

impl TrafficEvent {
    pub fn outcome(&self) -> Outcome {
        match self.observation {
            Observation::Status(status) => Outcome::from_status(status),
            Observation::TransportError(_) => Outcome::Failure,
        }
    }

    /// Returns the request duration in milliseconds, rounded to two decimal places.
    pub fn duration_ms(&self) -> f64 {
        (self.duration.as_secs_f64() * 100_000.0).round() / 100.0
    }
}

/// Issues requests for endpoints.
///
/// Implementations must never fail: every call produces exactly one [`TrafficEvent`], whatever happened on the wire.
#[async_trait]
pub trait Dispatch: Send + Sync + 'static {
    /// Issues a single request for `endpoint`.
    async fn dispatch(&self, endpoint: &EndpointDescriptor) -> TrafficEvent;
}

/// Issues HTTP requests against the target service, logging the outcome of each.
pub struct RequestExecutor {
    client: reqwest::Client,
    target_url: String,
}

impl RequestExecutor {
    /// Creates a new `RequestExecutor` for the given target, with the given per-request timeout.
    ///
    /// # Errors
    ///
    /// If the HTTP client cannot be created, an error is returned.
    pub fn new(target_url: &str, timeout: Duration) -> Result<Self, GenericError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .error_context("Failed to build HTTP client.")?;

        Ok(Self {
            client,
            target_url: target_url.trim_end_matches('/').to_string(),
        })
    }

    /// Issues a single request for `endpoint`, and logs what happened.
    pub async fn execute(&self, endpoint: &EndpointDescriptor) -> TrafficEvent {
        let url = format!("{}{}", self.target_url, endpoint.path);
        let timestamp = Utc::now();
        let start = Instant::now();

        let result = match self.client.request(endpoint.method.clone(), &url).send().await {
            // Read the body so that timing covers the full response and the connection can be reused.
            Ok(response) => {
                let status = response.status();
                response.bytes().await.map(|_| status)
            }
            Err(e) => Err(e),
        };

        let event = TrafficEvent {
            timestamp,
            endpoint: endpoint.path.clone(),
            method: endpoint.method.clone(),
            observation: match &result {
                Ok(status) => Observation::Status(*status),
                Err(e) => Observation::TransportError(TransportErrorKind::classify(e)),
            },
            duration: start.elapsed(),
        };

        match result {
            Ok(status) => info!(
                endpoint = %event.endpoint,
                method = %event.method,
                status_code = status.as_u16(),
                duration_ms = event.duration_ms(),
                status = event.outcome().as_str(),
                "Request completed"
            ),
            Err(e) => error!(
                endpoint = %event.endpoint,
                method = %event.method,
                error_type = TransportErrorKind::classify(&e).as_str(),
                "Request failed: {}",
                e
            ),
        }

        event
    }
}

#[async_trait]
impl Dispatch for RequestExecutor {
    async fn dispatch(&self, endpoint: &EndpointDescriptor) -> TrafficEvent {
        self.execute(endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        fmt,
        sync::{Arc, Mutex},
    };

    use axum::{http::StatusCode as AxumStatusCode, routing::get, Router};
    use tokio::net::TcpListener;
    use tracing::{field, Event, Level, Subscriber};
    use tracing_subscriber::{
        layer::{Context, SubscriberExt as _},
        Layer,
    };

    use super::*;
    use crate::catalog::EndpointCatalog;

    /// An event emitted by this crate, with its fields rendered as strings.
    struct CapturedEvent {
        level: Level,
        fields: HashMap<String, String>,
    }

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

    /// Layer that keeps every event emitted by this crate.
    #[derive(Clone, Default)]
    struct EventCapture {
        events: Arc<Mutex<Vec<CapturedEvent>>>,
    }

    impl EventCapture {
        fn take(&self) -> Vec<CapturedEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl<S: Subscriber> Layer<S> for EventCapture {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if !event.metadata().target().starts_with(env!("CARGO_CRATE_NAME")) {
                return;
            }

            let mut fields = FieldMap::default();
            event.record(&mut fields);
            self.events.lock().unwrap().push(CapturedEvent {
                level: *event.metadata().level(),
                fields: fields.0,
            });
        }
    }

    async fn spawn_target() -> String {
        let app = Router::new()
            .route("/health", get(|| async { "ok" }))
            .route(
                "/api/database",
                get(|| async { (AxumStatusCode::SERVICE_UNAVAILABLE, "unavailable") }),
            )
            .route(
                "/api/compute",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "slow"
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        format!("http://{}", addr)
    }

    fn endpoint(path: &str) -> EndpointDescriptor {
        EndpointCatalog::default()
            .entries()
            .iter()
            .find(|e| e.path == path)
            .cloned()
            .unwrap()
    }

    #[test]
    fn outcome_from_status() {
        assert_eq!(Outcome::from_status(StatusCode::OK), Outcome::Success);
        assert_eq!(Outcome::from_status(StatusCode::PERMANENT_REDIRECT), Outcome::Success);
        assert_eq!(Outcome::from_status(StatusCode::BAD_REQUEST), Outcome::Error);
        assert_eq!(Outcome::from_status(StatusCode::SERVICE_UNAVAILABLE), Outcome::Error);
    }

    #[test]
    fn duration_is_rounded_to_two_decimals() {
        let event = TrafficEvent {
            timestamp: Utc::now(),
            endpoint: "/health".to_string(),
            method: Method::GET,
            observation: Observation::Status(StatusCode::OK),
            duration: Duration::from_micros(12_345_678),
        };
        assert_eq!(event.duration_ms(), 12345.68);
    }

    #[tokio::test]
    async fn successful_and_error_responses() {
        let target = spawn_target().await;
        let executor = RequestExecutor::new(&target, Duration::from_secs(10)).unwrap();

        let event = executor.execute(&endpoint("/health")).await;
        assert_eq!(event.observation, Observation::Status(StatusCode::OK));
        assert_eq!(event.outcome(), Outcome::Success);
        assert_eq!(event.endpoint, "/health");

        let event = executor.execute(&endpoint("/api/database")).await;
        assert_eq!(event.observation, Observation::Status(StatusCode::SERVICE_UNAVAILABLE));
        assert_eq!(event.outcome(), Outcome::Error);
    }

    #[tokio::test]
    async fn every_request_logs_exactly_one_line() {
        let capture = EventCapture::default();
        let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(capture.clone()));

        let target = spawn_target().await;
        let executor = RequestExecutor::new(&target, Duration::from_secs(10)).unwrap();

        executor.execute(&endpoint("/health")).await;
        let events = capture.take();
        assert_eq!(events.len(), 1);
        let completed = &events[0];
        assert_eq!(completed.level, Level::INFO);
        assert_eq!(completed.fields["message"], "Request completed");
        assert_eq!(completed.fields["endpoint"], "/health");
        assert_eq!(completed.fields["method"], "GET");
        assert_eq!(completed.fields["status_code"], "200");
        assert_eq!(completed.fields["status"], "success");
        assert!(completed.fields["duration_ms"].parse::<f64>().unwrap() >= 0.0);

        executor.execute(&endpoint("/api/database")).await;
        let events = capture.take();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::INFO);
        assert_eq!(events[0].fields["status_code"], "503");
        assert_eq!(events[0].fields["status"], "error");

        let unreachable = RequestExecutor::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap();
        unreachable.execute(&endpoint("/api/data")).await;
        let events = capture.take();
        assert_eq!(events.len(), 1);
        let failed = &events[0];
        assert_eq!(failed.level, Level::ERROR);
        assert!(failed.fields["message"].starts_with("Request failed: "));
        assert_eq!(failed.fields["endpoint"], "/api/data");
        assert_eq!(failed.fields["method"], "GET");
        assert_eq!(failed.fields["error_type"], "connect");
        assert!(!failed.fields.contains_key("status_code"));
    }

    #[tokio::test]
    async fn refused_connection_is_a_failure() {
        // Nothing listens on port 1.
        let executor = RequestExecutor::new("http://127.0.0.1:1", Duration::from_secs(5)).unwrap();

        let event = executor.execute(&endpoint("/health")).await;
        assert_eq!(event.outcome(), Outcome::Failure);
        assert_eq!(
            event.observation,
            Observation::TransportError(TransportErrorKind::Connect)
        );
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let target = spawn_target().await;
        let executor = RequestExecutor::new(&target, Duration::from_millis(100)).unwrap();

        let event = executor.execute(&endpoint("/api/compute")).await;
        assert_eq!(
            event.observation,
            Observation::TransportError(TransportErrorKind::Timeout)
        );
    }
}
