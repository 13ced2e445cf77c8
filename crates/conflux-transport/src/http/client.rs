//! HTTP client construction.

use std::time::Duration;

use conflux_core::{TransportError, TransportResult};
use reqwest::{Client, ClientBuilder};
use tracing::warn;

/// Options for building an HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    /// Overall request timeout.
    pub timeout: Duration,
    /// Accept invalid TLS certificates.
    pub skip_tls_verify: bool,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            skip_tls_verify: false,
        }
    }
}

/// Builds a reqwest client from `options`.
pub fn build_client(options: &HttpClientOptions) -> TransportResult<Client> {
    if options.skip_tls_verify {
        warn!("TLS certificate verification is disabled");
    }
    ClientBuilder::new()
        .timeout(options.timeout)
        .danger_accept_invalid_certs(options.skip_tls_verify)
        .build()
        .map_err(|e| TransportError::InvalidConfig(format!("failed to create HTTP client: {e}")))
}
