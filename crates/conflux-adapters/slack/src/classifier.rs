//! Inbound message event classification.
//!
//! Every `message` event goes through three checks:
//!
//! 1. [`EventClassifier::skip`]: should the event be dropped outright (our
//!    own echo, pins, unfurls, duplicate files, ...)?
//! 2. [`EventClassifier::classify`]: which canonical event kind is it, and
//!    is the message already complete?
//! 3. [`EventClassifier::validate`]: is what we ended up with worth relaying?

use std::sync::Arc;

use conflux_core::{AdapterError, AdapterResult, EmptyMessageCause, EventKind, Message};
use tracing::warn;

use crate::config::SlackConfig;
use crate::dedup::DedupCache;
use crate::directory::Directory;
use crate::model::{MessageEvent, MessageSubtype};
use crate::origin::OriginMarker;

/// Reserved name of Slack's own system bot.
pub const SLACKBOT_USER: &str = "slackbot";

/// Username of messages authored by the platform itself.
pub const SYSTEM_USER: &str = "system";

/// Text Slack leaves behind when a thread root is deleted.
pub const DELETED_MESSAGE_NOTICE: &str = "This message was deleted.";

/// Text of canonical delete messages.
pub const MSG_DELETE_TEXT: &str = "msg_delete";

pub struct EventClassifier {
    config: Arc<SlackConfig>,
    marker: Arc<dyn OriginMarker>,
    dedup: Arc<DedupCache>,
    directory: Arc<dyn Directory>,
}

impl EventClassifier {
    pub fn new(
        config: Arc<SlackConfig>,
        marker: Arc<dyn OriginMarker>,
        dedup: Arc<DedupCache>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            config,
            marker,
            dedup,
            directory,
        }
    }

    /// Returns `true` if the event must not be relayed.
    pub fn skip(&self, ev: &MessageEvent) -> bool {
        use MessageSubtype::*;

        match ev.subtype {
            Some(ChannelJoin | ChannelLeave) => return self.config.no_send_join_part,
            Some(PinnedItem | UnpinnedItem) => return true,
            Some(ChannelTopic | ChannelPurpose) if ev.user.is_empty() || ev.user == SLACKBOT_USER => {
                return true;
            }
            _ => {}
        }

        let mut ours = self.marker.recognizes(&ev.blocks);

        if let Some(sub) = &ev.sub_message {
            // unfurls arrive as edits without an edit marker
            if sub.thread_ts != sub.ts && sub.edited.is_none() {
                return true;
            }
            // thread bookkeeping after we reply in a thread
            if ev.is(MessageReplied) && ev.hidden {
                return true;
            }
            if sub.blocks.len() == 1 {
                ours = self.marker.recognizes(&sub.blocks);
            }
        }

        if ev.username == SLACKBOT_USER || ours {
            return true;
        }

        !ev.files.is_empty()
            && ev
                .files
                .iter()
                .all(|f| self.dedup.file_cached(&f.id, &f.name))
    }

    /// Applies subtype-specific fields to `msg`.
    ///
    /// Returns `true` when the message is complete and needs no attachment
    /// handling or validation.
    pub async fn classify(&self, ev: &MessageEvent, msg: &mut Message) -> bool {
        use MessageSubtype::*;

        match ev.subtype {
            Some(ChannelJoined | MemberJoinedChannel) => true,
            Some(ChannelJoin | ChannelLeave) => {
                msg.username = SYSTEM_USER.to_string();
                msg.event = Some(EventKind::JoinLeave);
                false
            }
            Some(ChannelTopic | ChannelPurpose) => {
                if let Err(e) = self.directory.refresh(false).await {
                    warn!(error = %e, "Could not refresh channels after topic change");
                }
                msg.event = Some(EventKind::TopicChange);
                false
            }
            Some(MessageChanged) => {
                let text = ev.sub_message.as_ref().map(|s| s.text.as_str()).unwrap_or("");
                msg.text = text.to_string();
                if text == DELETED_MESSAGE_NOTICE {
                    msg.event = Some(EventKind::MsgDelete);
                    return true;
                }
                false
            }
            Some(MessageDeleted) => {
                msg.text = MSG_DELETE_TEXT.to_string();
                msg.event = Some(EventKind::MsgDelete);
                msg.id = ev.deleted_ts.clone();
                true
            }
            Some(MeMessage) => {
                msg.event = Some(EventKind::UserAction);
                false
            }
            _ => false,
        }
    }

    /// Rejects messages without files whose text or username ended up empty.
    pub fn validate(&self, ev: &MessageEvent, msg: &Message) -> AdapterResult<()> {
        if !ev.files.is_empty() || (!msg.text.is_empty() && !msg.username.is_empty()) {
            return Ok(());
        }
        let cause = if !ev.bot_id.is_empty() {
            EmptyMessageCause::UnresolvedBot
        } else if ev.sub_message.is_some() {
            EmptyMessageCause::EmptySubMessage
        } else {
            EmptyMessageCause::Generic
        };
        Err(AdapterError::EmptyMessage { cause })
    }
}
