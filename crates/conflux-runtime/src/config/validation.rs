//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ConfluxConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
///
/// Adapter tables are opaque here; each adapter validates its own options
/// when it is constructed.
pub fn validate_config(config: &ConfluxConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;

    for name in config.adapters.keys() {
        if name.trim().is_empty() {
            return Err(ConfigError::validation("Adapter name cannot be empty"));
        }
    }

    for (adapter, channels) in &config.channels {
        if adapter.trim().is_empty() {
            return Err(ConfigError::validation(
                "Channel list must name an adapter",
            ));
        }
        if channels.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::validation(format!(
                "Empty channel name in channels.{adapter}"
            )));
        }
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    if logging.filters.keys().any(|module| module.trim().is_empty()) {
        return Err(ConfigError::validation(
            "Logging filter module name cannot be empty",
        ));
    }
    Ok(())
}
