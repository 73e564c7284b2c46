//! Error types for the bundling coordinator.

use thiserror::Error;

use crate::config::ConfigurationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BundleError {
    #[error("Execution unit {operation} failed: {reason}")]
    ExecutionUnit { operation: String, reason: String },
    #[error("Sink error: {0}")]
    Sink(String),
    #[error("Timer error: {0}")]
    Timer(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Shutdown failed: {}", failures.join("; "))]
    ShutdownFailed { failures: Vec<String> },
}

impl BundleError {
    /// Build an execution unit failure for the named operation
    pub fn execution_unit(operation: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ExecutionUnit {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error came from the execution unit itself
    pub fn is_execution_unit_failure(&self) -> bool {
        matches!(self, Self::ExecutionUnit { .. })
    }
}

impl From<ConfigurationError> for BundleError {
    fn from(error: ConfigurationError) -> Self {
        BundleError::Configuration(error.to_string())
    }
}

pub type BundleResult<T> = std::result::Result<T, BundleError>;
