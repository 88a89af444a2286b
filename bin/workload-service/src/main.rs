//! A simulated workload service that serves traced, occasionally failing routes while its resource gauges drift in
//! the background.

#![deny(missing_docs)]

use std::net::SocketAddr;

use clap::Parser as _;
use obslab_app::prelude::*;
use obslab_error::{ErrorContext as _, GenericError};
use rand::{rngs::StdRng, SeedableRng as _};
use tokio::net::TcpListener;
use tracing::{error, info};

mod config;
use self::config::{Cli, ServiceConfig};

mod drift;
use self::drift::DriftLoop;

mod routes;
use self::routes::build_router;

mod state;
use self::state::{AppState, FailureProfile};

mod telemetry;
use self::telemetry::ServiceMetrics;

mod trace_context;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging is tagged with the configured service name, so configuration has to be loaded first.
    let config = match ServiceConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            fatal_and_exit(format!("failed to load configuration: {:?}", e));
            return;
        }
    };

    if let Err(e) = initialize_logging(config.service_name.clone()) {
        fatal_and_exit(format!("failed to initialize logging: {}", e));
    }

    match run(config).await {
        Ok(()) => info!("workload-service stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

async fn run(config: ServiceConfig) -> Result<(), GenericError> {
    let metrics = ServiceMetrics::new(MetricsRegistry::new());

    let drift = DriftLoop::new(metrics.drift_gauges(), StdRng::from_rng(&mut rand::rng()));
    let _drift = spawn_traced_named("drift-loop", drift.run());

    let state = AppState::new(metrics, FailureProfile::default());
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_error_context(|| format!("Failed to bind to {}.", addr))?;

    info!(port = config.port, "App2 starting on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .error_context("HTTP server failed.")?;

    Ok(())
}

/// Resolves once the process receives an interrupt.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a working signal handler, keep serving until the process is killed.
        error!(error = %e, "Failed to listen for interrupt signal.");
        std::future::pending::<()>().await;
    }
}
