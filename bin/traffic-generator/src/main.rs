//! A traffic generator that drives weighted, jittered, and occasionally bursty HTTP load against the workload service.

#![deny(missing_docs)]

use clap::Parser as _;
use obslab_app::prelude::*;
use obslab_error::{ErrorContext as _, GenericError};
use tracing::{debug, error, info};

mod catalog;

mod config;
use self::config::{Cli, GeneratorConfig};

mod executor;
use self::executor::RequestExecutor;

mod scheduler;
use self::scheduler::TrafficScheduler;

mod selector;
use self::selector::WeightedSelector;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging is tagged with the configured service name, so configuration has to be loaded first.
    let config = match GeneratorConfig::load(cli.config.as_deref()) {
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
        Ok(()) => info!("traffic-generator stopped."),
        Err(e) => {
            error!("{:?}", e);
            std::process::exit(1);
        }
    }
}

async fn run(config: GeneratorConfig) -> Result<(), GenericError> {
    let catalog = config.catalog().error_context("Invalid endpoint catalog.")?;
    let base_interval = config.request_interval()?;
    let executor = RequestExecutor::new(&config.target_url, config.request_timeout()?)?;

    debug!(
        error_rate = config.error_rate,
        endpoints = catalog.entries().len(),
        "Error rate is accepted but does not influence generated traffic."
    );

    let scheduler = TrafficScheduler::new(
        config.target_url,
        WeightedSelector::new(catalog),
        executor,
        base_interval,
    );
    scheduler.run(shutdown_signal()).await;

    Ok(())
}

/// Resolves once the process receives an interrupt.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        // Without a working signal handler, keep generating traffic until the process is killed.
        error!(error = %e, "Failed to listen for interrupt signal.");
        std::future::pending::<()>().await;
    }
}
