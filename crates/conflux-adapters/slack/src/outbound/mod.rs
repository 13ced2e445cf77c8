//! Outbound delivery.
//!
//! [`OutboundDispatcher`] prepares every message the relay hands us and
//! passes it to the [`MessageSender`] chosen at connect time:
//!
//! | Sender | Used when | Capabilities |
//! |--------|-----------|--------------|
//! | [`ApiSender`] | a token is configured | post, edit, delete, upload, topic sync |
//! | [`WebhookSender`] | only an outgoing webhook URL is configured | plain posts |

pub mod api;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use conflux_core::{AdapterResult, EventKind, Message, clip_message};
use tracing::debug;

use crate::config::SlackConfig;
use crate::format;

pub use api::ApiSender;
pub use webhook::{WebhookPayload, WebhookSender};

/// Longest text sent to Slack, in bytes.
pub const MESSAGE_LENGTH: usize = 3000;

/// One outbound delivery strategy.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Delivers a prepared message and returns the platform ID, if any.
    async fn send(&self, msg: Message) -> AdapterResult<String>;
}

/// Which sender outbound messages go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Api,
    Webhook,
}

/// The webhook is used only when it is configured and no token is.
pub fn select_route(config: &SlackConfig) -> Route {
    if config.uses_outgoing_webhook() {
        Route::Webhook
    } else {
        Route::Api
    }
}

/// Prepares outgoing text and hands messages to the active sender.
pub struct OutboundDispatcher {
    config: Arc<SlackConfig>,
    sender: Arc<dyn MessageSender>,
}

impl OutboundDispatcher {
    pub fn new(config: Arc<SlackConfig>, sender: Arc<dyn MessageSender>) -> Self {
        Self { config, sender }
    }

    /// Clips the text, fixes code fences and renders `/me` actions.
    pub fn prepare(&self, msg: &mut Message) {
        msg.text = clip_message(&msg.text, MESSAGE_LENGTH, &self.config.message_clipped);
        msg.text = format::replace_code_fence(&msg.text);
        if msg.is_event(EventKind::UserAction) {
            msg.text = format!("_{}_", msg.text);
        }
    }

    pub async fn send(&self, mut msg: Message) -> AdapterResult<String> {
        // typing notifications are too frequent to log
        if !msg.is_event(EventKind::UserTyping) {
            debug!(
                channel = %msg.channel,
                username = %msg.username,
                event = ?msg.event,
                "Sending message to Slack"
            );
        }
        self.prepare(&mut msg);
        self.sender.send(msg).await
    }
}
