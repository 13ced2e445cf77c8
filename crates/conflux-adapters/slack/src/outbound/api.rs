//! Delivery through the Slack Web API.

use std::sync::Arc;

use async_trait::async_trait;
use conflux_core::{
    AdapterResult, ApiResult, EventKind, FileInfo, Message, Payload, Relay, icon_url,
    side_payload_notices,
};
use tracing::{debug, error, warn};

use super::MessageSender;
use crate::api::SlackApi;
use crate::config::SlackConfig;
use crate::dedup::DedupCache;
use crate::directory::Directory;
use crate::format::{TopicUpdate, extract_topic_or_purpose};
use crate::model::{Channel, OutgoingMessage, UploadRequest};
use crate::origin::OriginMarker;
use crate::ratelimit::retry_rate_limited;

/// Prefix of replies whose thread could not be mapped.
pub const THREAD_FALLBACK_PREFIX: &str = "[thread]: ";

/// Sends canonical messages as Web API calls.
///
/// Evaluated in order, first match wins:
///
/// 1. member roster requests are answered from the directory, straight to
///    the relay
/// 2. the channel is resolved
/// 3. typing events are dropped
/// 4. topic changes are synced, posted or swallowed
/// 5. replies to unknown parents lose the parent and get a prefix
/// 6. deletes
/// 7. nick prefix
/// 8. edits
/// 9. side payloads (notices, uploads)
/// 10. plain post
pub struct ApiSender {
    config: Arc<SlackConfig>,
    api: Arc<dyn SlackApi>,
    directory: Arc<dyn Directory>,
    dedup: Arc<DedupCache>,
    marker: Arc<dyn OriginMarker>,
    relay: Arc<dyn Relay>,
}

impl ApiSender {
    pub fn new(
        config: Arc<SlackConfig>,
        api: Arc<dyn SlackApi>,
        directory: Arc<dyn Directory>,
        dedup: Arc<DedupCache>,
        marker: Arc<dyn OriginMarker>,
        relay: Arc<dyn Relay>,
    ) -> Self {
        Self {
            config,
            api,
            directory,
            dedup,
            marker,
            relay,
        }
    }

    async fn deliver_members(&self) {
        let members = self.directory.channel_members().await;
        debug!(count = members.len(), "Answering channel member request");
        self.relay
            .deliver(Message {
                event: Some(EventKind::GetChannelMembers),
                extra: vec![Payload::Members(members)],
                account: self.config.account.clone(),
                ..Default::default()
            })
            .await;
    }

    /// Returns `true` if the topic change is fully handled.
    async fn handle_topic(&self, msg: &Message, channel: &Channel) -> ApiResult<bool> {
        if self.config.sync_topic {
            self.update_topic_or_purpose(msg, channel).await?;
            return Ok(true);
        }
        Ok(!self.config.show_topic_change)
    }

    async fn update_topic_or_purpose(&self, msg: &Message, channel: &Channel) -> ApiResult<()> {
        match extract_topic_or_purpose(&msg.text) {
            Some(TopicUpdate::Topic(topic)) => {
                retry_rate_limited("conversations.setTopic", || {
                    self.api.set_topic(&channel.id, &topic)
                })
                .await
            }
            Some(TopicUpdate::Purpose(purpose)) => {
                retry_rate_limited("conversations.setPurpose", || {
                    self.api.set_purpose(&channel.id, &purpose)
                })
                .await
            }
            None => {
                error!(text = %msg.text, "Unrecognized topic or purpose change");
                Ok(())
            }
        }
    }

    /// The Web API form of `msg`, tagged with our origin marker.
    fn outgoing(&self, msg: &Message, channel_id: &str) -> OutgoingMessage {
        let icon_url = if msg.avatar.is_empty() {
            icon_url(msg, &self.config.icon_url)
        } else {
            msg.avatar.clone()
        };
        OutgoingMessage {
            channel: channel_id.to_string(),
            text: msg.text.clone(),
            username: msg.username.clone(),
            icon_url,
            as_user: self.config.prefix_messages_with_nick,
            link_names: true,
            thread_ts: msg.parent_id.clone(),
            attachments: msg.attachments(),
            blocks: self.marker.embed(&msg.text),
            unfurl_links: true,
            unfurl_media: true,
        }
    }

    async fn post(&self, msg: &Message, channel_id: &str) -> ApiResult<String> {
        if msg.text.is_empty() {
            return Ok(String::new());
        }
        let outgoing = self.outgoing(msg, channel_id);
        retry_rate_limited("chat.postMessage", || self.api.post_message(&outgoing)).await
    }

    async fn upload_files(&self, msg: &mut Message, channel_id: &str) -> ApiResult<String> {
        let files: Vec<FileInfo> = msg.files().cloned().collect();
        let mut message_id = String::new();

        for file in files {
            if msg.text == file.comment {
                msg.text.clear();
            }
            let Some(data) = file.data else {
                warn!(file = %file.name, "File without content, not uploading");
                continue;
            };

            // our upload notification arrives after Slack's own event for it
            self.dedup.mark_filename(&file.name);

            let mut initial_comment = format!("File from {}", msg.username);
            if !file.comment.is_empty() {
                initial_comment.push_str(&format!(" with comment: {}", file.comment));
            }
            let req = UploadRequest {
                channel_id: channel_id.to_string(),
                filename: file.name.clone(),
                data,
                initial_comment,
                thread_ts: msg.parent_id.clone(),
            };
            let uploaded =
                retry_rate_limited("files.upload", || self.api.upload_file(&req)).await?;

            if !uploaded.id.is_empty() {
                debug!(file_id = %uploaded.id, "Recording uploaded file");
                self.dedup.mark_file_id(&uploaded.id);
                if let Some(ts) = uploaded.message_ts(channel_id) {
                    message_id = ts.to_string();
                }
            }
        }
        Ok(message_id)
    }
}

#[async_trait]
impl MessageSender for ApiSender {
    async fn send(&self, mut msg: Message) -> AdapterResult<String> {
        if msg.is_event(EventKind::GetChannelMembers) {
            self.deliver_members().await;
            return Ok(String::new());
        }

        let channel = self.directory.channel_by_name(&msg.channel).await?;

        if msg.is_event(EventKind::UserTyping) {
            if self.config.show_user_typing {
                debug!("Typing notifications are not supported by the Web API");
            }
            return Ok(String::new());
        }

        if msg.is_event(EventKind::TopicChange) && self.handle_topic(&msg, &channel).await? {
            return Ok(String::new());
        }

        if msg.parent_not_found() {
            msg.parent_id.clear();
            msg.text = format!("{THREAD_FALLBACK_PREFIX}{}", msg.text);
        }

        if msg.is_event(EventKind::MsgDelete) {
            // some bridges echo deletes without an ID
            if msg.id.is_empty() {
                return Ok(String::new());
            }
            retry_rate_limited("chat.delete", || {
                self.api.delete_message(&channel.id, &msg.id)
            })
            .await?;
            return Ok(msg.id);
        }

        if self.config.prefix_messages_with_nick {
            msg.text = format!("{}{}", msg.username, msg.text);
        }

        if !msg.id.is_empty() {
            let outgoing = self.outgoing(&msg, &channel.id);
            retry_rate_limited("chat.update", || {
                self.api.update_message(&msg.id, &outgoing)
            })
            .await?;
            return Ok(msg.id);
        }

        if msg.has_file_payloads() {
            for mut notice in side_payload_notices(&msg) {
                notice.text = format!("{}{}", notice.username, notice.text);
                if let Err(e) = self.post(&notice, &channel.id).await {
                    error!(error = %e, "Failed to post file notice");
                }
            }
            return Ok(self.upload_files(&mut msg, &channel.id).await?);
        }

        Ok(self.post(&msg, &channel.id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use conflux_core::{
        AdapterError, ApiError, ChannelMember, FileFailure, PARENT_ID_NOT_FOUND,
        SYSTEM_NOTICE_USERNAME,
    };

    use super::*;
    use crate::origin::BlockIdMarker;
    use crate::testing::{ApiCall, FakeSlackApi, RecordingRelay, StaticDirectory};

    const TAG: &str = "conflux_out";

    struct Harness {
        sender: ApiSender,
        api: Arc<FakeSlackApi>,
        relay: Arc<RecordingRelay>,
        dedup: Arc<DedupCache>,
    }

    fn harness(config: SlackConfig) -> Harness {
        let api = Arc::new(FakeSlackApi::new());
        let relay = Arc::new(RecordingRelay::new());
        let dedup = Arc::new(DedupCache::new());
        let directory = Arc::new(
            StaticDirectory::new()
                .with_channel("C1", "general", true)
                .with_member(ChannelMember {
                    channel_id: "C1".into(),
                    channel_name: "general".into(),
                    user_id: "U1".into(),
                    username: "alice".into(),
                    ..Default::default()
                }),
        );
        let sender = ApiSender::new(
            Arc::new(config),
            api.clone(),
            directory,
            dedup.clone(),
            Arc::new(BlockIdMarker::with_tag(TAG)),
            relay.clone(),
        );
        Harness {
            sender,
            api,
            relay,
            dedup,
        }
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

    #[tokio::test]
    async fn test_plain_post() {
        let h = harness(SlackConfig {
            icon_url: "https://icons.example/{NICK}.png".into(),
            ..Default::default()
        });
        let id = h.sender.send(msg("hello")).await.unwrap();

        assert!(!id.is_empty());
        let posts = h.api.posts();
        assert_eq!(h.api.calls().len(), 1);
        assert_eq!(posts[0].channel, "C1");
        assert_eq!(posts[0].text, "hello");
        assert_eq!(posts[0].icon_url, "https://icons.example/alice.png");
        assert!(posts[0].link_names && posts[0].unfurl_links);
        assert!(BlockIdMarker::with_tag(TAG).recognizes(&posts[0].blocks));
    }

    #[tokio::test]
    async fn test_edit_targets_id() {
        let h = harness(SlackConfig::default());
        let id = h
            .sender
            .send(Message {
                id: "123".into(),
                ..msg("hi edited")
            })
            .await
            .unwrap();

        assert_eq!(id, "123");
        assert_eq!(h.api.calls().len(), 1);
        assert!(matches!(&h.api.calls()[0], ApiCall::Update { ts, msg } if ts == "123" && msg.text == "hi edited"));
    }

    #[tokio::test]
    async fn test_delete() {
        let h = harness(SlackConfig::default());
        let delete = |id: &str| Message {
            id: id.into(),
            event: Some(EventKind::MsgDelete),
            ..msg("")
        };

        assert_eq!(h.sender.send(delete("")).await.unwrap(), "");
        assert!(h.api.calls().is_empty());

        assert_eq!(h.sender.send(delete("7.0")).await.unwrap(), "7.0");
        assert_eq!(
            h.api.calls(),
            [ApiCall::Delete {
                channel: "C1".into(),
                ts: "7.0".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_topic_handling() {
        let topic = || Message {
            event: Some(EventKind::TopicChange),
            ..msg("@bob set the channel topic: launch")
        };

        let sync = harness(SlackConfig {
            sync_topic: true,
            show_topic_change: true,
            ..Default::default()
        });
        sync.sender.send(topic()).await.unwrap();
        assert_eq!(
            sync.api.calls(),
            [ApiCall::SetTopic {
                channel: "C1".into(),
                text: "launch".into()
            }]
        );

        let show = harness(SlackConfig {
            show_topic_change: true,
            ..Default::default()
        });
        show.sender.send(topic()).await.unwrap();
        assert_eq!(show.api.posts().len(), 1);

        let swallow = harness(SlackConfig::default());
        swallow.sender.send(topic()).await.unwrap();
        assert!(swallow.api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_parent_prefixed_once() {
        let h = harness(SlackConfig::default());
        h.sender
            .send(Message {
                parent_id: PARENT_ID_NOT_FOUND.into(),
                ..msg("reply")
            })
            .await
            .unwrap();

        let post = &h.api.posts()[0];
        assert_eq!(post.text, "[thread]: reply");
        assert_eq!(post.thread_ts, "");
    }

    #[tokio::test]
    async fn test_members_and_typing_bypass_platform() {
        let h = harness(SlackConfig::default());
        let id = h
            .sender
            .send(Message {
                event: Some(EventKind::GetChannelMembers),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(id, "");

        let delivered = h.relay.messages();
        assert!(delivered[0].is_event(EventKind::GetChannelMembers));
        assert!(matches!(&delivered[0].extra[..], [Payload::Members(m)] if m[0].user_id == "U1"));

        h.sender
            .send(Message {
                event: Some(EventKind::UserTyping),
                ..msg("")
            })
            .await
            .unwrap();
        assert!(h.api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_channel() {
        let h = harness(SlackConfig::default());
        let err = h
            .sender
            .send(Message {
                channel: "nowhere".into(),
                ..msg("hi")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::ChannelNotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_post_retried() {
        let h = harness(SlackConfig::default());
        for secs in [1, 2] {
            h.api.fail_next(ApiError::RateLimited {
                retry_after: Duration::from_secs(secs),
            });
        }
        let id = h.sender.send(msg("persist")).await.unwrap();
        assert!(!id.is_empty());
        assert_eq!(h.api.posts().len(), 3);
    }

    #[tokio::test]
    async fn test_nick_prefix() {
        let h = harness(SlackConfig {
            prefix_messages_with_nick: true,
            ..Default::default()
        });
        h.sender
            .send(Message {
                avatar: "https://a.example/me.png".into(),
                ..msg("hi")
            })
            .await
            .unwrap();
        let post = &h.api.posts()[0];
        assert_eq!(post.text, "alicehi");
        assert!(post.as_user);
        assert_eq!(post.icon_url, "https://a.example/me.png");
    }

    #[tokio::test]
    async fn test_files_and_notices() {
        let h = harness(SlackConfig::default());
        let id = h
            .sender
            .send(Message {
                parent_id: "3.0".into(),
                extra: vec![
                    Payload::FileTooLarge(FileFailure {
                        name: "big.mov".into(),
                        size: 20,
                        limit: 10,
                        comment: String::new(),
                    }),
                    Payload::File(FileInfo {
                        name: "cat.png".into(),
                        data: Some(vec![1, 2, 3]),
                        comment: "look".into(),
                        ..Default::default()
                    }),
                ],
                ..msg("look")
            })
            .await
            .unwrap();

        let posts = h.api.posts();
        assert_eq!(posts.len(), 1);
        assert_eq!(
            posts[0].text,
            format!("{SYSTEM_NOTICE_USERNAME}file big.mov too big to download (20 > allowed size: 10)")
        );

        let uploads: Vec<_> = h
            .api
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::Upload(req) => Some(req),
                _ => None,
            })
            .collect();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].initial_comment, "File from alice with comment: look");
        assert_eq!(uploads[0].thread_ts, "3.0");
        assert!(id.ends_with(".000200"));

        assert!(h.dedup.file_cached("", "cat.png"));
        assert!(h.dedup.file_cached(&format!("F{}", id.trim_end_matches(".000200")), ""));
    }
}
