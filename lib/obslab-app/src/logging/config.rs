use obslab_config::ConfigurationLoader;
use obslab_error::{generic_error, ErrorContext as _, GenericError};
use serde::Deserialize;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

fn default_log_level() -> LogLevel {
    LevelFilter::INFO.into()
}

const fn default_true() -> bool {
    true
}

/// Environment keys read by [`LoggingConfiguration::from_environment`].
const LOGGING_KEYS: &[&str] = &["log_level", "log_format_json"];

#[derive(Deserialize)]
pub(crate) struct LoggingConfiguration {
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,

    #[serde(default = "default_true")]
    pub log_format_json: bool,
}

impl LoggingConfiguration {
    /// Reads the logging configuration from `LOG_LEVEL` and `LOG_FORMAT_JSON`.
    ///
    /// # Errors
    ///
    /// If either variable holds an invalid value, an error is returned.
    pub fn from_environment() -> Result<Self, GenericError> {
        let config = ConfigurationLoader::default()
            .from_environment(LOGGING_KEYS)?
            .into_typed()
            .error_context("Failed to load logging configuration.")?;
        Ok(config)
    }
}

#[derive(Deserialize)]
#[serde(try_from = "String")]
pub(crate) struct LogLevel(EnvFilter);

impl LogLevel {
    pub fn as_env_filter(&self) -> EnvFilter {
        self.0.clone()
    }
}

impl From<LevelFilter> for LogLevel {
    fn from(level: LevelFilter) -> Self {
        Self(EnvFilter::default().add_directive(level.into()))
    }
}

impl TryFrom<String> for LogLevel {
    type Error = GenericError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(generic_error!("Log level cannot be empty."));
        }

        EnvFilter::builder()
            .parse(value)
            .map(Self)
            .error_context("Failed to parse valid log level.")
    }
}
