use std::sync::Arc;

use http::Method;
use serde::Deserialize;
use snafu::{ensure, ResultExt as _, Snafu};

/// A catalog validation error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum CatalogError {
    #[snafu(display("Endpoint catalog must contain at least one endpoint."))]
    Empty,

    #[snafu(display("Endpoint '{}' has weight {}, which is outside of (0, 1].", path, weight))]
    InvalidWeight { path: String, weight: f64 },

    #[snafu(display("Endpoint path '{}' must start with '/'.", path))]
    InvalidPath { path: String },

    #[snafu(display("Endpoint '{}' has invalid HTTP method '{}'.", path, method))]
    InvalidMethod {
        path: String,
        method: String,
        source: http::method::InvalidMethod,
    },
}

fn default_method() -> String {
    "GET".to_string()
}

/// Raw endpoint definition, as it appears in a configuration file.
#[derive(Clone, Debug, Deserialize)]
pub struct EndpointEntry {
    pub path: String,

    #[serde(default = "default_method")]
    pub method: String,

    pub weight: f64,
}

/// A route to exercise, and how often to exercise it relative to the other routes.
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointDescriptor {
    pub path: String,
    pub method: Method,
    pub weight: f64,
}

impl EndpointDescriptor {
    fn get(path: &str, weight: f64) -> Self {
        Self {
            path: path.to_string(),
            method: Method::GET,
            weight,
        }
    }
}

impl TryFrom<EndpointEntry> for EndpointDescriptor {
    type Error = CatalogError;

    fn try_from(entry: EndpointEntry) -> Result<Self, Self::Error> {
        let EndpointEntry { path, method, weight } = entry;

        ensure!(weight > 0.0 && weight <= 1.0, InvalidWeight { path, weight });
        ensure!(path.starts_with('/'), InvalidPath { path });

        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes()).context(InvalidMethod {
            path: path.clone(),
            method,
        })?;

        Ok(Self { path, method, weight })
    }
}

/// Ordered, weighted list of endpoints.
///
/// A catalog always holds at least one endpoint, and is cheap to clone.
#[derive(Clone, Debug)]
pub struct EndpointCatalog {
    entries: Arc<[EndpointDescriptor]>,
}

impl EndpointCatalog {
    /// Builds a catalog from raw entries, validating each of them.
    ///
    /// # Errors
    ///
    /// If no entries are given, or any entry has an out-of-range weight, a path not starting with `/`, or an invalid
    /// HTTP method, an error is returned.
    pub fn from_entries(entries: Vec<EndpointEntry>) -> Result<Self, CatalogError> {
        ensure!(!entries.is_empty(), Empty);

        let entries = entries
            .into_iter()
            .map(EndpointDescriptor::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { entries: entries.into() })
    }

    /// Returns the catalog entries, in order.
    pub fn entries(&self) -> &[EndpointDescriptor] {
        &self.entries
    }
}

impl Default for EndpointCatalog {
    fn default() -> Self {
        let entries = vec![
            EndpointDescriptor::get("/health", 0.3),
            EndpointDescriptor::get("/api/data", 0.4),
            EndpointDescriptor::get("/api/compute", 0.2),
            EndpointDescriptor::get("/api/database", 0.1),
        ];

        Self { entries: entries.into() }
    }
}
