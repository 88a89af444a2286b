//! Logging.

use obslab_error::GenericError;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, Layer as _};

mod config;
use self::config::LoggingConfiguration;

mod layer;
use self::layer::build_formatting_layer;
pub use self::layer::TraceIdLayer;

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Initializes the logging subsystem for `tracing`.
///
/// This function reads the `LOG_LEVEL` environment variable to determine the log filtering directives to use. If the
/// environment variable is not set, the default log level is `INFO`. Additionally, it reads the `LOG_FORMAT_JSON`
/// environment variable to determine which output format to use: JSON lines when unset or `true`, and a
/// human-readable, pipe-separated format when `false`.
///
/// Every line is tagged with the given service name. Events emitted inside a span that declares a `trace_id` field
/// carry that identifier as well.
///
/// # Errors
///
/// If the environment holds invalid logging settings, or if the logging subsystem was already initialized, an error
/// will be returned.
pub fn initialize_logging<S>(service_name: S) -> Result<(), GenericError>
where
    S: Into<String>,
{
    let config = LoggingConfiguration::from_environment()?;
    let formatting_layer = build_formatting_layer(config.log_format_json, service_name.into(), std::io::stdout)
        .with_filter(config.log_level.as_env_filter());

    tracing_subscriber::registry()
        .with(TraceIdLayer)
        .with(formatting_layer)
        .try_init()?;

    Ok(())
}
