//! Conflux Runtime - configuration, logging and adapter lifecycle.
//!
//! This crate provides:
//! - Layered configuration loading ([`ConfigLoader`])
//! - Logging initialisation ([`LoggingBuilder`])
//! - Adapter orchestration ([`ConfluxRuntime`]): connect, join configured
//!   channels, route sends, disconnect on shutdown
//!
//! ```ignore
//! use std::sync::Arc;
//! use conflux_core::ChannelRelay;
//! use conflux_runtime::ConfluxRuntime;
//!
//! #[tokio::main]
//! async fn main() -> conflux_runtime::RuntimeResult<()> {
//!     let (relay, mut inbound) = ChannelRelay::new();
//!     let runtime = ConfluxRuntime::new(Arc::new(relay))?;
//!     runtime.register_adapter::<SlackAdapter>().await?;
//!     runtime.run().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, ConfluxConfig, LoggingConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::ConfluxRuntime;

pub use tracing;
