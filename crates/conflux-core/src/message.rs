//! The canonical message passed between the relay and every adapter.
//!
//! A [`Message`] is protocol-agnostic: adapters translate their platform's
//! events into it on the way in, and translate it back into platform calls on
//! the way out. Side content that does not fit into plain text (attachments,
//! files, member rosters) travels in [`Message::extra`] as a list of
//! [`Payload`] variants.

use serde::{Deserialize, Serialize};

/// Parent ID marker set by the relay when a reply's parent could not be
/// mapped onto the destination protocol.
pub const PARENT_ID_NOT_FOUND: &str = "msg-parent-not-found";

/// Clip notice used when none is configured.
pub const DEFAULT_CLIP_NOTICE: &str = " <clipped message>";

// ============================================================================
// Event kinds
// ============================================================================

/// Non-plain message kinds. A message without an event is a plain message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Someone is typing.
    UserTyping,
    /// A message was deleted; `Message::id` names it.
    MsgDelete,
    /// A file was deleted; `Message::id` names it.
    FileDelete,
    /// Someone joined or left the channel.
    JoinLeave,
    /// Channel topic or purpose changed.
    TopicChange,
    /// A `/me` style action.
    UserAction,
    /// Request (outbound) or answer (inbound) for a channel member roster.
    GetChannelMembers,
}

impl EventKind {
    /// Returns the wire name of this event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserTyping => "user_typing",
            Self::MsgDelete => "msg_delete",
            Self::FileDelete => "file_delete",
            Self::JoinLeave => "join_leave",
            Self::TopicChange => "topic_change",
            Self::UserAction => "user_action",
            Self::GetChannelMembers => "get_channel_members",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Side payloads
// ============================================================================

/// A rich attachment, modelled on the widely shared "message attachment"
/// layout (title, link, text, footer, images).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub fallback: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub color: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pretext: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub author_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub author_link: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub author_icon: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title_link: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub image_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thumb_url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub footer: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub footer_icon: String,
}

/// A file carried across the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// File name.
    pub name: String,
    /// File content, if it was downloaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    /// Caption attached to the file.
    #[serde(default)]
    pub comment: String,
    /// Public URL of the file, if any.
    #[serde(default)]
    pub url: String,
    /// Declared size in bytes.
    #[serde(default)]
    pub size: u64,
    /// Whether the file is an avatar rather than user content.
    #[serde(default)]
    pub avatar: bool,
    /// Platform-native file ID.
    #[serde(default)]
    pub native_id: String,
}

/// A file that was not downloaded because it exceeded the size limit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    /// File name.
    pub name: String,
    /// Declared size in bytes.
    pub size: u64,
    /// The configured limit at the time of the failure.
    pub limit: u64,
    /// Caption that accompanied the file.
    #[serde(default)]
    pub comment: String,
}

/// One member of one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMember {
    pub team_id: String,
    pub channel_id: String,
    pub channel_name: String,
    pub user_id: String,
    pub username: String,
    pub nick: String,
}

/// Side content carried by a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Native attachments, relayed verbatim to compatible bridges.
    Attachments(Vec<Attachment>),
    /// A downloaded (or linkable) file.
    File(FileInfo),
    /// A file that was skipped for being too large.
    FileTooLarge(FileFailure),
    /// A channel member roster.
    Members(Vec<ChannelMember>),
}

// ============================================================================
// Message
// ============================================================================

/// The canonical, protocol-agnostic message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    /// Platform ID of the message (set for edits and deletes).
    pub id: String,
    /// Platform ID of the thread parent.
    pub parent_id: String,
    /// Channel name (or `ID:<id>`).
    pub channel: String,
    /// Display name of the author.
    pub username: String,
    /// Platform ID of the author.
    pub user_id: String,
    /// Avatar URL of the author.
    pub avatar: String,
    /// Message text.
    pub text: String,
    /// Event kind; `None` for a plain message.
    pub event: Option<EventKind>,
    /// Side payloads.
    pub extra: Vec<Payload>,
    /// Account label of the originating bridge (`<protocol>.<name>`).
    pub account: String,
    /// Protocol name of the originating bridge.
    pub protocol: String,
}

impl Message {
    /// Creates a plain text message.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Creates an event-only message.
    pub fn event(event: EventKind) -> Self {
        Self {
            event: Some(event),
            ..Default::default()
        }
    }

    /// Returns `true` if this message carries the given event.
    pub fn is_event(&self, event: EventKind) -> bool {
        self.event == Some(event)
    }

    /// Returns `true` if the relay could not map this reply's parent.
    pub fn parent_not_found(&self) -> bool {
        self.parent_id == PARENT_ID_NOT_FOUND
    }

    /// Iterates over the files carried by this message.
    pub fn files(&self) -> impl Iterator<Item = &FileInfo> {
        self.extra.iter().filter_map(|p| match p {
            Payload::File(f) => Some(f),
            _ => None,
        })
    }

    /// Iterates over the too-large file notices carried by this message.
    pub fn file_failures(&self) -> impl Iterator<Item = &FileFailure> {
        self.extra.iter().filter_map(|p| match p {
            Payload::FileTooLarge(f) => Some(f),
            _ => None,
        })
    }

    /// All attachments of all attachment bundles, in order.
    pub fn attachments(&self) -> Vec<Attachment> {
        self.extra
            .iter()
            .filter_map(|p| match p {
                Payload::Attachments(a) => Some(a.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    /// Returns `true` if the message carries files or file notices, i.e.
    /// content that needs its own delivery step.
    pub fn has_file_payloads(&self) -> bool {
        self.extra
            .iter()
            .any(|p| matches!(p, Payload::File(_) | Payload::FileTooLarge(_)))
    }
}

// ============================================================================
// Text helpers
// ============================================================================

/// Clips `text` to at most `limit` bytes, ending it with `notice`.
///
/// Never splits a UTF-8 character. An empty notice falls back to
/// [`DEFAULT_CLIP_NOTICE`].
pub fn clip_message(text: &str, limit: usize, notice: &str) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let notice = if notice.is_empty() {
        DEFAULT_CLIP_NOTICE
    } else {
        notice
    };
    let mut cut = limit.saturating_sub(notice.len());
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &text[..cut], notice)
}

/// Expands an icon URL template for `msg`.
///
/// `{NICK}` is replaced by the username, `{PROTOCOL}` and `{BRIDGE}` by the
/// two halves of the account label.
pub fn icon_url(msg: &Message, template: &str) -> String {
    if template.is_empty() {
        return String::new();
    }
    let (protocol, bridge) = msg.account.split_once('.').unwrap_or((&msg.account, ""));
    template
        .replace("{NICK}", &msg.username)
        .replace("{BRIDGE}", bridge)
        .replace("{PROTOCOL}", protocol)
}
