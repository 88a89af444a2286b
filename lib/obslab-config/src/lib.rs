//! Layered configuration loading.
//!
//! Both lab binaries are configured the same way: an optional YAML file provides a base layer, and environment
//! variables are layered on top of it. Values are then deserialized into a typed configuration struct, with `serde`
//! defaults filling in anything neither layer specified.
#![deny(warnings)]
#![deny(missing_docs)]

use std::path::{Path, PathBuf};

use figment::{
    error::Kind,
    providers::{Env, Serialized},
    value::Dict,
    Figment, Profile, Provider,
};
use obslab_error::GenericError;
use serde::de::DeserializeOwned;
use snafu::{ResultExt as _, Snafu};

/// A configuration error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ConfigurationError {
    /// The configuration file could not be read.
    #[snafu(display("Failed to read configuration file '{}'.", path.display()))]
    ReadFile {
        /// Path to the configuration file.
        path: PathBuf,

        /// Error source.
        source: std::io::Error,
    },

    /// The configuration file was not valid YAML, or its top level was not a mapping.
    #[snafu(display("Failed to parse configuration file '{}'.", path.display()))]
    ParseFile {
        /// Path to the configuration file.
        path: PathBuf,

        /// Error source.
        source: serde_yaml::Error,
    },

    /// A field held a value of the wrong type.
    #[snafu(display(
        "Expected value for field '{}' to be '{}', got '{}' instead.",
        field,
        expected_ty,
        actual_ty
    ))]
    InvalidFieldType {
        /// Period-separated path to the field.
        field: String,

        /// Expected data type.
        expected_ty: String,

        /// Actual data type.
        actual_ty: String,
    },

    /// Any other failure while extracting configuration.
    #[snafu(display("Failed to query configuration."))]
    Generic {
        /// Error source.
        source: GenericError,
    },
}

impl From<figment::Error> for ConfigurationError {
    fn from(e: figment::Error) -> Self {
        match e.kind {
            Kind::InvalidType(actual_ty, expected_ty) => Self::InvalidFieldType {
                field: e.path.join("."),
                expected_ty,
                actual_ty: actual_ty.to_string(),
            },
            _ => Self::Generic { source: e.into() },
        }
    }
}

/// Loads configuration from a YAML file and/or the process environment.
///
/// Sources added later take precedence over sources added earlier, so the usual order is
/// [`from_yaml`][Self::from_yaml] followed by [`from_environment`][Self::from_environment].
#[derive(Default)]
pub struct ConfigurationLoader {
    layers: Vec<Dict>,
}

impl ConfigurationLoader {
    /// Loads the given YAML configuration file.
    ///
    /// # Errors
    ///
    /// If the file cannot be read, or is not a YAML mapping, an error is returned.
    pub fn from_yaml<P>(mut self, path: P) -> Result<Self, ConfigurationError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).context(ReadFile { path })?;
        let values: Dict = serde_yaml::from_str(&raw).context(ParseFile { path })?;

        self.layers.push(values);
        Ok(self)
    }

    /// Loads the given keys from environment variables.
    ///
    /// Keys are matched case-insensitively and without any prefix, so a key of `target_url` is read from
    /// `TARGET_URL`. Variables that are not listed are ignored.
    ///
    /// # Errors
    ///
    /// If the environment cannot be read, an error is returned.
    pub fn from_environment(mut self, keys: &[&str]) -> Result<Self, ConfigurationError> {
        // `Env` isn't `Send`/`Sync`, so snapshot its values now rather than holding onto the provider.
        let env = Env::raw().only(keys);
        let mut values = env.data()?;
        if let Some(dict) = values.remove(&Profile::Default) {
            self.layers.push(dict);
        }

        Ok(self)
    }

    /// Consumes the loader, deserializing the merged layers as `T`.
    ///
    /// # Errors
    ///
    /// If the merged configuration cannot be deserialized into `T`, an error is returned.
    pub fn into_typed<T>(self) -> Result<T, ConfigurationError>
    where
        T: DeserializeOwned,
    {
        self.layers
            .into_iter()
            .fold(Figment::new(), |figment, layer| figment.merge(Serialized::defaults(layer)))
            .extract()
            .map_err(Into::into)
    }
}
