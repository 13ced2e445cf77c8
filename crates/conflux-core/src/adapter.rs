//! Adapter trait.
//!
//! An adapter connects one chat platform to the relay. It owns its own
//! transports, turns platform events into canonical messages for the
//! [`Relay`], and turns canonical messages from the relay into platform
//! calls.
//!
//! # Lifecycle
//!
//! ```text
//! from_config ──▶ connect(relay) ──▶ join_channel(..)* ──▶ send(..)* ──▶ disconnect
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::bridge::Relay;
use crate::error::AdapterResult;
use crate::message::Message;

/// The core adapter trait.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Protocol name, e.g. `"slack"`.
    fn protocol(&self) -> &'static str;

    /// Account label of this instance (`<protocol>.<name>`).
    fn account(&self) -> &str;

    /// Sets up transports and starts inbound processing.
    ///
    /// Inbound messages are delivered to `relay` from then on.
    async fn connect(&self, relay: Arc<dyn Relay>) -> AdapterResult<()>;

    /// Stops inbound listeners. Calling it twice, or before `connect`, is a
    /// no-op.
    async fn disconnect(&self) -> AdapterResult<()>;

    /// Makes the adapter ready to relay a channel.
    async fn join_channel(&self, channel: &str) -> AdapterResult<()>;

    /// Delivers one canonical message to the platform.
    ///
    /// Returns the platform-assigned ID, or an empty string for sends that do
    /// not produce one (events, swallowed messages).
    async fn send(&self, msg: Message) -> AdapterResult<String>;
}

/// A shared adapter trait object.
pub type BoxedAdapter = Arc<dyn Adapter>;

/// Trait for adapters that can be created from configuration.
///
/// Separates compile-time concerns (`Config` type, `from_config()`)
/// from the object-safe [`Adapter`] trait.
pub trait ConfigurableAdapter: Adapter {
    /// The configuration type, deserialized from the adapter's config table.
    type Config: serde::de::DeserializeOwned + Default;

    /// Returns the adapter name used as the config key.
    fn name() -> &'static str
    where
        Self: Sized;

    /// Creates an adapter instance from its deserialized configuration.
    fn from_config(config: Self::Config) -> AdapterResult<Self>
    where
        Self: Sized;
}
