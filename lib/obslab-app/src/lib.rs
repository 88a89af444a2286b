//! Application bootstrap primitives.
//!
//! Everything a lab binary sets up before doing real work lives here: logging, the metrics registry that backs the
//! scrape endpoint, and helpers for spawning tasks that stay attached to the current tracing span.
#![deny(warnings)]
#![deny(missing_docs)]

#[cfg(feature = "logging")]
pub mod logging;

#[cfg(feature = "metrics")]
pub mod metrics;

pub mod task;

/// Common imports.
pub mod prelude {
    #[cfg(feature = "logging")]
    pub use super::logging::{fatal_and_exit, initialize_logging};
    #[cfg(feature = "metrics")]
    pub use super::metrics::MetricsRegistry;
    pub use super::task::{spawn_traced_named, JoinSetExt};
}
