//! HTTP listener.

use axum::Router;
use conflux_core::{ListenerHandle, TransportError, TransportResult};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

/// Binds `addr` and serves `router` until the returned handle is stopped.
///
/// Stopping the handle shuts the server down gracefully: in-flight requests
/// are allowed to finish. The handle's `id` is the actually bound address, so
/// binding port 0 is useful in tests.
pub async fn serve(addr: &str, router: Router) -> TransportResult<ListenerHandle> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| TransportError::BindFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
    let actual_addr = listener.local_addr()?;

    info!(addr = %actual_addr, "HTTP server listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await;
        match result {
            Ok(()) => info!(addr = %actual_addr, "HTTP server stopped"),
            Err(e) => error!(addr = %actual_addr, error = %e, "HTTP server error"),
        }
    });

    Ok(ListenerHandle::new(actual_addr.to_string(), shutdown_tx))
}
