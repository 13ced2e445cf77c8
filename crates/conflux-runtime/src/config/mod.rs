//! Configuration module for the Conflux runtime.
//!
//! Layered loading (defaults, files, environment), the root schema and
//! validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{ConfluxConfig, LogFormat, LogLevel, LogOutput, LoggingConfig};
pub use validation::validate_config;
