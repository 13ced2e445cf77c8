//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Adapter configuration deserialization failed.
    #[error("Failed to deserialize adapter config: {0}")]
    AdapterConfigDeserialize(String),

    /// Adapter error.
    #[error("Adapter error: {0}")]
    Adapter(#[from] conflux_core::AdapterError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No adapter registered under this name.
    #[error("Adapter not found: {0}")]
    AdapterNotFound(String),

    /// An adapter with this name is already registered.
    #[error("Adapter already registered: {0}")]
    AdapterExists(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
