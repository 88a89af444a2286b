use std::path::{Path, PathBuf};

use clap::Parser;
use obslab_config::ConfigurationLoader;
use obslab_error::{ErrorContext as _, GenericError};
use serde::Deserialize;

/// Environment variables that override configuration file values.
const ENVIRONMENT_KEYS: &[&str] = &["port", "service_name"];

#[derive(Parser)]
#[command(about)]
pub struct Cli {
    /// Path to a YAML configuration file.
    ///
    /// Environment variables take precedence over values in the file.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

const fn default_port() -> u16 {
    8000
}

fn default_service_name() -> String {
    "app2".to_string()
}

#[derive(Deserialize)]
pub struct ServiceConfig {
    /// Port to listen on, on all interfaces.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Value of the `service` field on every log line.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl ServiceConfig {
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
            .error_context("Failed to load workload service configuration.")?;
        Ok(config)
    }
}
