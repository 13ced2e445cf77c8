//! Slack Echo Example
//!
//! Connects the Slack adapter through the runtime and answers `!echo <text>`
//! in whatever channel it was said.
//!
//! # Usage
//!
//! ```bash
//! CONFLUX_ADAPTERS__SLACK__TOKEN=xoxb-... cargo run --package slack-echo
//! ```
//!
//! Channels to watch come from the `[channels]` table of `conflux.toml`.

use std::sync::Arc;

use conflux_adapter_slack::SlackAdapter;
use conflux_core::{ChannelRelay, ConfigurableAdapter, Message};
use conflux_runtime::{ConfluxRuntime, RuntimeResult};
use tracing::{error, info};

const ECHO_PREFIX: &str = "!echo ";

/// Builds the reply to `msg`, if it asks for one.
fn echo_reply(msg: &Message) -> Option<Message> {
    if msg.event.is_some() {
        return None;
    }
    let content = msg.text.strip_prefix(ECHO_PREFIX)?;
    Some(Message {
        channel: msg.channel.clone(),
        parent_id: msg.parent_id.clone(),
        username: "echo".to_string(),
        text: content.to_string(),
        account: msg.account.clone(),
        ..Default::default()
    })
}

#[tokio::main]
async fn main() -> RuntimeResult<()> {
    let (relay, mut inbound) = ChannelRelay::new();
    let runtime = Arc::new(ConfluxRuntime::new(Arc::new(relay))?);
    runtime.register_adapter::<SlackAdapter>().await?;

    let echo_runtime = runtime.clone();
    tokio::spawn(async move {
        while let Some(msg) = inbound.recv().await {
            info!(channel = %msg.channel, username = %msg.username, text = %msg.text, "Inbound");
            let Some(reply) = echo_reply(&msg) else {
                continue;
            };
            if let Err(e) = echo_runtime.send(SlackAdapter::name(), reply).await {
                error!(error = %e, "Failed to send echo reply");
            }
        }
    });

    runtime.run().await
}
