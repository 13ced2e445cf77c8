//! Inbound Events API types.
//!
//! The endpoint receives one of two envelopes:
//!
//! ```text
//! { "type": "url_verification", "challenge": "…" }
//! { "type": "event_callback", "event": { "type": "message", … } }
//! ```
//!
//! The envelope header is parsed leniently first, so that a malformed inner
//! event never prevents the challenge handshake.

use conflux_core::Attachment;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Envelope
// =============================================================================

/// A parsed Events API envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Endpoint ownership check; the challenge must be echoed back.
    UrlVerification { challenge: String },
    /// A wrapped event. `None` if the inner event could not be parsed.
    EventCallback(Option<RawEvent>),
    /// Any other envelope type.
    Other(String),
}

/// Why an envelope was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The body is not a JSON object with a `type`.
    Malformed(String),
    /// A `url_verification` envelope without a string challenge.
    MissingChallenge,
}

impl std::fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(e) => write!(f, "malformed envelope: {e}"),
            Self::MissingChallenge => f.write_str("url_verification without challenge"),
        }
    }
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    event: Option<Value>,
}

impl Envelope {
    /// Parses a request body.
    pub fn parse(body: &[u8]) -> Result<Self, EnvelopeError> {
        let header: EnvelopeHeader =
            serde_json::from_slice(body).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

        match header.kind.as_str() {
            "url_verification" => header
                .challenge
                .map(|challenge| Self::UrlVerification { challenge })
                .ok_or(EnvelopeError::MissingChallenge),
            "event_callback" => Ok(Self::EventCallback(
                header
                    .event
                    .and_then(|event| serde_json::from_value(event).ok()),
            )),
            other => Ok(Self::Other(other.to_string())),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// An event carried by an `event_callback` envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    Hello,
    Message(MessageEvent),
    MemberJoinedChannel(MemberJoinedEvent),
    ChannelJoined(ChannelJoinedEvent),
    FileDeleted(FileDeletedEvent),
    UserTyping(UserTypingEvent),
    LatencyReport,
    #[serde(other)]
    Other,
}

/// Message subtypes the adapter distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageSubtype {
    #[serde(alias = "group_join")]
    ChannelJoin,
    #[serde(alias = "group_leave")]
    ChannelLeave,
    ChannelJoined,
    MemberJoinedChannel,
    #[serde(alias = "group_topic")]
    ChannelTopic,
    #[serde(alias = "group_purpose")]
    ChannelPurpose,
    MessageChanged,
    MessageDeleted,
    MessageReplied,
    PinnedItem,
    UnpinnedItem,
    FileComment,
    FileShare,
    MeMessage,
    BotMessage,
    ThreadBroadcast,
    #[serde(other)]
    Other,
}

/// A `message` event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MessageEvent {
    pub subtype: Option<MessageSubtype>,
    pub channel: String,
    pub user: String,
    pub username: String,
    pub bot_id: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: String,
    pub deleted_ts: String,
    pub hidden: bool,
    pub blocks: Vec<Block>,
    pub attachments: Vec<Attachment>,
    pub files: Vec<File>,
    /// The new version of an edited message.
    #[serde(rename = "message")]
    pub sub_message: Option<Box<SubMessage>>,
    pub previous_message: Option<Box<SubMessage>>,
    pub edited: Option<Edited>,
}

impl MessageEvent {
    /// Returns `true` if the event has the given subtype.
    pub fn is(&self, subtype: MessageSubtype) -> bool {
        self.subtype == Some(subtype)
    }
}

/// The nested message of `message_changed` and friends.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SubMessage {
    pub user: String,
    pub username: String,
    pub bot_id: String,
    pub text: String,
    pub ts: String,
    pub thread_ts: String,
    pub blocks: Vec<Block>,
    pub edited: Option<Edited>,
}

/// Edit marker of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Edited {
    pub user: String,
    pub ts: String,
}

/// A layout block. Only the fields the adapter reads or writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub block_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextObject>,
}

impl Block {
    /// A markdown section block.
    pub fn section(block_id: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            kind: "section".to_string(),
            block_id: block_id.into(),
            text: Some(TextObject {
                kind: "mrkdwn".to_string(),
                text: markdown.into(),
            }),
        }
    }

    /// Returns `true` for section blocks.
    pub fn is_section(&self) -> bool {
        self.kind == "section"
    }
}

/// A text composition object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextObject {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// A file descriptor attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct File {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub url_private_download: String,
    pub mimetype: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MemberJoinedEvent {
    pub user: String,
    pub channel: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelJoinedEvent {
    pub channel: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileDeletedEvent {
    pub file_id: String,
    pub event_ts: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserTypingEvent {
    pub channel: String,
    pub user: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_verification() {
        let env = Envelope::parse(br#"{"type":"url_verification","challenge":"abc","token":"t"}"#);
        assert_eq!(
            env,
            Ok(Envelope::UrlVerification {
                challenge: "abc".into()
            })
        );
        assert_eq!(
            Envelope::parse(br#"{"type":"url_verification"}"#),
            Err(EnvelopeError::MissingChallenge)
        );
        assert!(matches!(
            Envelope::parse(b"not json"),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn test_message_changed_event() {
        let body = br#"{
            "type": "event_callback",
            "event": {
                "type": "message",
                "subtype": "message_changed",
                "channel": "C1",
                "hidden": true,
                "message": {
                    "user": "U1",
                    "text": "fixed",
                    "ts": "100.1",
                    "edited": {"user": "U1", "ts": "101.0"},
                    "blocks": [{"type": "section", "block_id": "abc", "text": {"type": "mrkdwn", "text": "fixed"}}]
                },
                "ts": "101.0"
            }
        }"#;
        let Ok(Envelope::EventCallback(Some(RawEvent::Message(ev)))) = Envelope::parse(body) else {
            panic!("expected a message event");
        };
        assert!(ev.is(MessageSubtype::MessageChanged));
        let sub = ev.sub_message.unwrap();
        assert_eq!(sub.text, "fixed");
        assert_eq!(sub.blocks[0].block_id, "abc");
        assert!(sub.edited.is_some());
    }

    #[test]
    fn test_unknown_subtype_and_event() {
        let ev: RawEvent =
            serde_json::from_str(r#"{"type":"message","subtype":"reminder_add","text":"x"}"#)
                .unwrap();
        let RawEvent::Message(msg) = ev else {
            panic!("expected a message event");
        };
        assert_eq!(msg.subtype, Some(MessageSubtype::Other));

        let ev: RawEvent = serde_json::from_str(r#"{"type":"reaction_added"}"#).unwrap();
        assert_eq!(ev, RawEvent::Other);
    }

    #[test]
    fn test_unparsable_inner_event_is_none() {
        let env = Envelope::parse(br#"{"type":"event_callback","event":{"type":"message","files":"oops"}}"#);
        assert_eq!(env, Ok(Envelope::EventCallback(None)));
    }
}
