//! HTTP transport.
//!
//! This module provides the HTTP client builder and the HTTP listener.

#[cfg(feature = "http-client")]
mod client;
#[cfg(feature = "http-client")]
pub use client::{HttpClientOptions, build_client};

#[cfg(feature = "http-server")]
mod server;
#[cfg(feature = "http-server")]
pub use server::serve;
