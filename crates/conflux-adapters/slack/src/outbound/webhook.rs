//! Delivery through a legacy outgoing webhook.

use std::sync::Arc;

use async_trait::async_trait;
use conflux_core::{AdapterResult, Attachment, Message, icon_url, side_payload_notices};
use conflux_transport::WebhookClient;
use serde::Serialize;
use tracing::error;

use super::MessageSender;
use crate::config::SlackConfig;

/// JSON body accepted by Slack incoming-webhook URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub channel: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

/// Posts plain text. Events, edits and deletes cannot be expressed and are
/// dropped.
pub struct WebhookSender {
    config: Arc<SlackConfig>,
    client: WebhookClient,
}

impl WebhookSender {
    pub fn new(config: Arc<SlackConfig>, client: WebhookClient) -> Self {
        Self { config, client }
    }

    fn payload(&self, msg: &Message) -> WebhookPayload {
        let icon_url = if msg.avatar.is_empty() {
            icon_url(msg, &self.config.icon_url)
        } else {
            msg.avatar.clone()
        };
        WebhookPayload {
            text: msg.text.clone(),
            channel: msg.channel.clone(),
            username: msg.username.clone(),
            icon_url,
            attachments: msg.attachments(),
        }
    }
}

#[async_trait]
impl MessageSender for WebhookSender {
    async fn send(&self, mut msg: Message) -> AdapterResult<String> {
        if msg.event.is_some() {
            return Ok(String::new());
        }

        if self.config.prefix_messages_with_nick {
            msg.text = format!("{}{}", msg.username, msg.text);
        }

        for notice in side_payload_notices(&msg) {
            if let Err(e) = self.client.send(&self.payload(&notice)).await {
                error!(error = %e, "Failed to post file notice through webhook");
            }
        }

        // files are linked, never uploaded
        let urls: Vec<String> = msg
            .files()
            .filter(|f| !f.url.is_empty())
            .map(|f| f.url.clone())
            .collect();
        for url in urls {
            msg.text = format!("{} {url}", msg.text);
        }

        self.client.send(&self.payload(&msg)).await?;
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use conflux_core::{EventKind, FileFailure, FileInfo, Payload, SYSTEM_NOTICE_USERNAME};
    use conflux_transport::HttpClientOptions;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    async fn sender(server: &MockServer, config: SlackConfig) -> WebhookSender {
        let client = WebhookClient::new(server.uri(), &HttpClientOptions::default()).unwrap();
        WebhookSender::new(Arc::new(config), client)
    }

    fn msg(text: &str) -> Message {
        Message {
            channel: "general".into(),
            username: "alice".into(),
            text: text.into(),
            account: "irc.libera".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_payload_skips_empty_fields() {
        let payload = WebhookPayload {
            text: "hi".into(),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({ "text": "hi" })
        );
    }

    #[tokio::test]
    async fn test_plain_post_with_icon_template() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({
                "text": "hello",
                "channel": "general",
                "username": "alice",
                "icon_url": "https://icons.example/irc/alice.png",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender = sender(
            &server,
            SlackConfig {
                icon_url: "https://icons.example/{PROTOCOL}/{NICK}.png".into(),
                ..Default::default()
            },
        )
        .await;
        assert_eq!(sender.send(msg("hello")).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_events_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let sender = sender(&server, SlackConfig::default()).await;
        let delete = Message {
            id: "1.0".into(),
            event: Some(EventKind::MsgDelete),
            ..msg("")
        };
        assert_eq!(sender.send(delete).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_notices_and_file_links() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({
                "text": "file big.mov too big to download (20 > allowed size: 10)",
                "channel": "general",
                "username": SYSTEM_NOTICE_USERNAME,
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({
                "text": "alicelook https://files.example/cat.png",
                "channel": "general",
                "username": "alice",
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sender = sender(
            &server,
            SlackConfig {
                prefix_messages_with_nick: true,
                ..Default::default()
            },
        )
        .await;
        let message = Message {
            extra: vec![
                Payload::FileTooLarge(FileFailure {
                    name: "big.mov".into(),
                    size: 20,
                    limit: 10,
                    comment: String::new(),
                }),
                Payload::File(FileInfo {
                    name: "cat.png".into(),
                    url: "https://files.example/cat.png".into(),
                    ..Default::default()
                }),
            ],
            ..msg("look")
        };
        sender.send(message).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_failure_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
            .mount(&server)
            .await;

        let sender = sender(&server, SlackConfig::default()).await;
        let err = sender.send(msg("hi")).await.unwrap_err();
        assert!(matches!(
            err,
            conflux_core::AdapterError::Transport(conflux_core::TransportError::HttpStatus {
                status: 404,
                ..
            })
        ));
    }
}
