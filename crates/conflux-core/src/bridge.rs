//! The relay boundary.
//!
//! Adapters never talk to the relay directly; they hold an
//! `Arc<dyn Relay>` and hand it finished canonical messages. The relay decides
//! where they go next.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::message::Message;

/// Inbound sink of the relay.
///
/// Implementations must be cheap to call concurrently: every inbound path of
/// every adapter delivers through the same relay.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Hands one canonical message to the relay.
    async fn deliver(&self, msg: Message);
}

/// A [`Relay`] backed by an unbounded channel.
///
/// This is what the runtime uses to collect messages from all adapters into
/// one stream.
#[derive(Debug, Clone)]
pub struct ChannelRelay {
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelRelay {
    /// Creates a relay together with the receiving end of its stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Relay for ChannelRelay {
    async fn deliver(&self, msg: Message) {
        if self.tx.send(msg).is_err() {
            warn!("Relay stream closed, dropping message");
        }
    }
}
