//! Configuration Error Types
//!
//! Errors raised while loading bundle configuration from files and the
//! environment. Threshold values themselves never fail validation; they fall
//! back to defaults with a warning (see [`super::ThresholdPolicy`]).

use thiserror::Error;

/// Configuration-related errors with detailed context
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Configuration file was named explicitly but does not exist
    #[error("Configuration file not found: {file_path}")]
    FileNotFound { file_path: String },

    /// The `config` crate could not read or merge a source
    #[error("Failed to load configuration from {source_name}: {error}")]
    LoadError { source_name: String, error: String },

    /// Merged sources could not be deserialized into `BundleConfig`
    #[error("Failed to deserialize configuration: {error}")]
    DeserializeError { error: String },
}

impl ConfigurationError {
    /// Create a file not found error
    pub fn file_not_found<P: Into<String>>(file_path: P) -> Self {
        Self::FileNotFound {
            file_path: file_path.into(),
        }
    }

    /// Create a load error for the named source
    pub fn load_error<S: Into<String>, E: std::fmt::Display>(source_name: S, error: E) -> Self {
        Self::LoadError {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }

    /// Create a deserialization error
    pub fn deserialize_error<E: std::fmt::Display>(error: E) -> Self {
        Self::DeserializeError {
            error: error.to_string(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
