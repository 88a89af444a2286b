use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use clap::Parser;
use obslab_config::ConfigurationLoader;
use obslab_error::{generic_error, ErrorContext as _, GenericError};
use serde::Deserialize;

use crate::catalog::{CatalogError, EndpointCatalog, EndpointEntry};

/// Environment variables that override configuration file values.
const ENVIRONMENT_KEYS: &[&str] = &[
    "target_url",
    "request_interval",
    "error_rate",
    "request_timeout",
    "service_name",
];

#[derive(Parser)]
#[command(about)]
pub struct Cli {
    /// Path to a YAML configuration file.
    ///
    /// Environment variables take precedence over values in the file.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

fn default_target_url() -> String {
    "http://app2-service:8000".to_string()
}

const fn default_request_interval() -> f64 {
    4.0
}

const fn default_error_rate() -> f64 {
    0.12
}

const fn default_request_timeout() -> f64 {
    10.0
}

fn default_service_name() -> String {
    "app2-traffic-generator".to_string()
}

#[derive(Deserialize)]
pub struct GeneratorConfig {
    /// Base URL of the service to send traffic to.
    #[serde(default = "default_target_url")]
    pub target_url: String,

    /// Base interval between regular batches, in seconds.
    #[serde(default = "default_request_interval")]
    pub request_interval: f64,

    /// Accepted for compatibility with existing deployments, but does not affect the generated traffic.
    #[serde(default = "default_error_rate")]
    pub error_rate: f64,

    /// Per-request timeout, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: f64,

    /// Value of the `service` field on every log line.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Endpoints to exercise, replacing the default catalog when set.
    #[serde(default)]
    pub endpoints: Option<Vec<EndpointEntry>>,
}

impl GeneratorConfig {
    /// Loads the configuration from the given YAML file, if any, and the environment.
    ///
    /// # Errors
    ///
    /// If the file cannot be read, or any value has the wrong type, an error is returned.
    pub fn load(path: Option<&Path>) -> Result<Self, GenericError> {
        let mut loader = ConfigurationLoader::default();
        if let Some(path) = path {
            loader = loader.from_yaml(path)?;
        }

        let config = loader
            .from_environment(ENVIRONMENT_KEYS)?
            .into_typed()
            .error_context("Failed to load traffic generator configuration.")?;
        Ok(config)
    }

    /// Builds the endpoint catalog.
    ///
    /// # Errors
    ///
    /// If endpoints were configured but are invalid, an error is returned.
    pub fn catalog(&self) -> Result<EndpointCatalog, CatalogError> {
        match &self.endpoints {
            Some(entries) => EndpointCatalog::from_entries(entries.clone()),
            None => Ok(EndpointCatalog::default()),
        }
    }

    /// Returns the base interval between regular batches.
    ///
    /// # Errors
    ///
    /// If the configured interval is negative or not finite, an error is returned.
    pub fn request_interval(&self) -> Result<Duration, GenericError> {
        Duration::try_from_secs_f64(self.request_interval)
            .with_error_context(|| format!("Invalid request interval '{}'.", self.request_interval))
    }

    /// Returns the per-request timeout.
    ///
    /// # Errors
    ///
    /// If the configured timeout is not a positive, finite number of seconds, an error is returned.
    pub fn request_timeout(&self) -> Result<Duration, GenericError> {
        let timeout = Duration::try_from_secs_f64(self.request_timeout)
            .with_error_context(|| format!("Invalid request timeout '{}'.", self.request_timeout))?;
        if timeout.is_zero() {
            return Err(generic_error!("Request timeout must be greater than zero."));
        }

        Ok(timeout)
    }
}
