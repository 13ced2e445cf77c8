//! Listener lifecycle handle.

use tokio::sync::oneshot;

/// Handle to a running listener (server).
///
/// Dropping this handle stops the listener. Stopping is idempotent.
#[derive(Debug)]
pub struct ListenerHandle {
    /// Identifier of this listener (usually the bound address).
    pub id: String,
    /// Shutdown signal sender.
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ListenerHandle {
    /// Creates a new listener handle.
    pub fn new(id: impl Into<String>, shutdown_tx: oneshot::Sender<()>) -> Self {
        Self {
            id: id.into(),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Signals the listener to shut down gracefully.
    ///
    /// Returns `false` if it was already stopped.
    pub fn stop(&mut self) -> bool {
        match self.shutdown_tx.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Returns `true` until [`stop`](Self::stop) has been called.
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
