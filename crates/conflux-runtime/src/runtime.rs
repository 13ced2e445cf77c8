//! Adapter lifecycle orchestration.
//!
//! The runtime owns the registered adapters and drives them through their
//! lifecycle: connect, join the configured channels, and disconnect on
//! shutdown. A failure while starting one adapter is logged and only takes
//! that adapter out; the others keep running.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use conflux_core::{BoxedAdapter, ConfigurableAdapter, Message, Relay};
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, ConfluxConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// The Conflux runtime.
pub struct ConfluxRuntime {
    config: ConfluxConfig,
    relay: Arc<dyn Relay>,
    /// Registered adapters by name.
    adapters: RwLock<HashMap<String, BoxedAdapter>>,
    /// Names of adapters that connected successfully.
    connected: RwLock<Vec<String>>,
    running: AtomicBool,
}

impl ConfluxRuntime {
    /// Loads configuration from the default locations and creates a runtime
    /// delivering inbound messages to `relay`.
    pub fn new(relay: Arc<dyn Relay>) -> RuntimeResult<Self> {
        let config = ConfigLoader::new().load()?;
        Self::from_config(config, relay)
    }

    /// Creates a runtime from an already loaded configuration.
    ///
    /// Validates the configuration and initializes logging from it.
    pub fn from_config(config: ConfluxConfig, relay: Arc<dyn Relay>) -> RuntimeResult<Self> {
        validate_config(&config)?;
        logging::init_from_config(&config.logging);

        info!(
            log_level = %config.logging.level,
            adapters = config.adapters.len(),
            "Runtime initialized from configuration"
        );

        Ok(Self {
            config,
            relay,
            adapters: RwLock::new(HashMap::new()),
            connected: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &ConfluxConfig {
        &self.config
    }

    /// Deserializes the `adapters.<name>` table into `C`, or returns
    /// `C::default()` if there is none.
    pub fn adapter_config<C>(&self, name: &str) -> RuntimeResult<C>
    where
        C: serde::de::DeserializeOwned + Default,
    {
        match self.config.adapters.get(name) {
            Some(value) => value.deserialize().map_err(|e| {
                RuntimeError::AdapterConfigDeserialize(format!("adapter '{name}': {e}"))
            }),
            None => {
                warn!(adapter = name, "No configuration found for adapter, using default");
                Ok(C::default())
            }
        }
    }

    /// Builds an adapter from its configuration table and registers it
    /// under [`ConfigurableAdapter::name`].
    pub async fn register_adapter<A>(&self) -> RuntimeResult<()>
    where
        A: ConfigurableAdapter + 'static,
    {
        let name = A::name();
        let config = self.adapter_config::<A::Config>(name)?;
        let adapter = A::from_config(config)?;
        self.add_adapter(name, Arc::new(adapter)).await
    }

    /// Registers an already constructed adapter.
    pub async fn add_adapter(
        &self,
        name: impl Into<String>,
        adapter: BoxedAdapter,
    ) -> RuntimeResult<()> {
        let name = name.into();
        let mut adapters = self.adapters.write().await;
        if adapters.contains_key(&name) {
            return Err(RuntimeError::AdapterExists(name));
        }
        info!(adapter = %name, protocol = adapter.protocol(), "Registered adapter");
        adapters.insert(name, adapter);
        Ok(())
    }

    /// Returns `true` while the runtime is started.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the names of the adapters that connected.
    pub async fn connected_adapters(&self) -> Vec<String> {
        self.connected.read().await.clone()
    }

    /// Connects every registered adapter and joins its configured channels.
    pub async fn start(&self) -> RuntimeResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Runtime is already running");
            return Ok(());
        }

        info!("Starting Conflux runtime");

        let adapters = self.adapters.read().await;
        let mut connected = self.connected.write().await;

        for (name, adapter) in adapters.iter() {
            if let Err(e) = adapter.connect(self.relay.clone()).await {
                error!(adapter = %name, error = %e, "Failed to connect adapter");
                continue;
            }
            info!(adapter = %name, account = adapter.account(), "Adapter connected");
            connected.push(name.clone());

            for channel in self.config.channels.get(name).into_iter().flatten() {
                match adapter.join_channel(channel).await {
                    Ok(()) => info!(adapter = %name, channel = %channel, "Joined channel"),
                    Err(e) => {
                        error!(adapter = %name, channel = %channel, error = %e, "Failed to join channel")
                    }
                }
            }
        }

        info!(connected = connected.len(), "Runtime started");
        Ok(())
    }

    /// Sends `msg` through the adapter registered as `adapter`.
    pub async fn send(&self, adapter: &str, msg: Message) -> RuntimeResult<String> {
        let target = self
            .adapters
            .read()
            .await
            .get(adapter)
            .cloned()
            .ok_or_else(|| RuntimeError::AdapterNotFound(adapter.to_string()))?;
        debug!(adapter, channel = %msg.channel, "Sending message");
        Ok(target.send(msg).await?)
    }

    /// Disconnects every connected adapter.
    pub async fn stop(&self) -> RuntimeResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Runtime is not running");
            return Ok(());
        }

        info!("Stopping Conflux runtime");

        let adapters = self.adapters.read().await;
        let mut connected = self.connected.write().await;
        for name in connected.drain(..) {
            if let Some(adapter) = adapters.get(&name)
                && let Err(e) = adapter.disconnect().await
            {
                error!(adapter = %name, error = %e, "Error during adapter disconnect");
            }
        }

        info!("Runtime stopped");
        Ok(())
    }

    /// Runs until Ctrl+C (or SIGTERM on Unix).
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: std::future::Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        self.stop().await
    }
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
    }
    info!("Received Ctrl+C, shutting down");
}
