//! # Conflux Transport
//!
//! Network plumbing shared by Conflux adapters. Adapters own the protocol;
//! this crate owns sockets, HTTP clients and listener lifecycles.
//!
//! ## Features
//!
//! - `http-client`: reqwest client construction
//! - `http-server`: axum listener with graceful shutdown
//! - `webhook`: legacy webhook client and listener (implies both)
//! - `full`: everything
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Adapter Layer      │  (Slack, ...)
//! ├─────────────────────┤
//! │  conflux-transport  │  <- This crate
//! ├─────────────────────┤
//! │  Network (TCP/HTTP) │
//! └─────────────────────┘
//! ```

#[cfg(any(feature = "http-client", feature = "http-server"))]
pub mod http;

#[cfg(feature = "webhook")]
pub mod webhook;

#[cfg(feature = "http-client")]
pub use http::{HttpClientOptions, build_client};

#[cfg(feature = "http-server")]
pub use http::serve;

#[cfg(feature = "webhook")]
pub use webhook::{IncomingWebhook, WebhookClient, WebhookListener};
