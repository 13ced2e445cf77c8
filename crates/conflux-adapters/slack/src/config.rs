//! Configuration types for the Slack adapter.
//!
//! Loaded from the `[adapters.slack]` table of the global configuration.
//!
//! # Example Configuration
//!
//! ```toml
//! [adapters.slack]
//! account = "slack.work"
//! token = "xoxb-..."
//! events_bind_address = "0.0.0.0:3000"
//! sync_topic = true
//! prefix_messages_with_nick = false
//! edit_suffix = " (edited)"
//! icon_url = "https://robohash.org/{NICK}.png"
//! media_download_blacklist = ['\.exe$']
//!
//! # Legacy webhook mode (no token)
//! # webhook_url = "https://hooks.slack.com/services/..."
//! # webhook_bind_address = "0.0.0.0:9999"
//! ```

use serde::{Deserialize, Serialize};

use conflux_core::{AdapterError, AdapterResult};

/// Required prefix of bot tokens.
pub const BOT_TOKEN_PREFIX: &str = "xoxb-";

/// Slack adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Relay account label (`slack.<name>`).
    pub account: String,

    /// Bot token. Enables the Web API + Events transport.
    pub token: Option<String>,
    /// Bind address of the legacy incoming-webhook listener. Ignored when a
    /// token is set.
    pub webhook_bind_address: Option<String>,
    /// Legacy outgoing-webhook URL. Ignored when a token is set.
    pub webhook_url: Option<String>,
    /// Accept invalid TLS certificates.
    pub skip_tls_verify: bool,

    /// Bind address of the Events API listener.
    pub events_bind_address: String,
    /// Path of the Events API endpoint.
    pub events_path: String,

    /// Prepend the username to outgoing text.
    pub prefix_messages_with_nick: bool,
    /// Relay inbound edits as new messages rather than updates.
    pub edit_disable: bool,
    /// Appended to inbound edited text.
    pub edit_suffix: String,
    /// Avatar URL template (`{NICK}`, `{BRIDGE}`, `{PROTOCOL}`).
    pub icon_url: String,
    /// Suppress inbound join/leave messages.
    #[serde(alias = "nosendjoinpart")]
    pub no_send_join_part: bool,
    /// Push outbound topic changes to the channel topic/purpose.
    pub sync_topic: bool,
    /// Post outbound topic changes as plain messages.
    pub show_topic_change: bool,
    /// Relay inbound typing notifications.
    pub show_user_typing: bool,
    /// Notice appended to clipped messages.
    pub message_clipped: String,
    /// Try `conversations.join` before resolving a channel.
    pub legacy_join: bool,

    /// Largest inbound file downloaded, in bytes.
    pub media_download_size: u64,
    /// File name patterns never downloaded.
    pub media_download_blacklist: Vec<String>,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            account: "slack.default".to_string(),
            token: None,
            webhook_bind_address: None,
            webhook_url: None,
            skip_tls_verify: false,
            events_bind_address: "0.0.0.0:3000".to_string(),
            events_path: "/slack/events".to_string(),
            prefix_messages_with_nick: false,
            edit_disable: false,
            edit_suffix: String::new(),
            icon_url: String::new(),
            no_send_join_part: false,
            sync_topic: false,
            show_topic_change: false,
            show_user_typing: false,
            message_clipped: String::new(),
            legacy_join: false,
            media_download_size: 1_000_000,
            media_download_blacklist: Vec::new(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

impl SlackConfig {
    /// The bot token, if configured and non-empty.
    pub fn token(&self) -> Option<&str> {
        non_empty(&self.token)
    }

    /// The outgoing webhook URL, if configured and non-empty.
    pub fn webhook_url(&self) -> Option<&str> {
        non_empty(&self.webhook_url)
    }

    /// The incoming webhook bind address, if configured and non-empty.
    pub fn webhook_bind_address(&self) -> Option<&str> {
        non_empty(&self.webhook_bind_address)
    }

    /// Outbound messages go through the outgoing webhook only when it is set
    /// and no token is.
    pub fn uses_outgoing_webhook(&self) -> bool {
        self.webhook_url().is_some() && self.token().is_none()
    }

    /// Checks the token format.
    pub fn validate(&self) -> AdapterResult<()> {
        if let Some(token) = self.token()
            && !token.starts_with(BOT_TOKEN_PREFIX)
        {
            return Err(AdapterError::config(
                "legacy user tokens are no longer supported, please use a bot token (xoxb-...)",
            ));
        }
        Ok(())
    }

    /// Fails unless at least one transport is configured.
    pub fn require_transport(&self) -> AdapterResult<()> {
        if self.token().is_none()
            && self.webhook_url().is_none()
            && self.webhook_bind_address().is_none()
        {
            return Err(AdapterError::config(
                "no connection method found: webhook_bind_address, webhook_url or token need to be configured",
            ));
        }
        Ok(())
    }
}
