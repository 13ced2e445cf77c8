//! Web API request and response shapes.

use std::collections::HashMap;

use conflux_core::Attachment;
use serde::{Deserialize, Serialize};

use super::event::Block;

/// A conversation (public or private channel).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub is_private: bool,
    pub is_member: bool,
}

/// A workspace user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub name: String,
    pub is_bot: bool,
    pub profile: UserProfile,
}

impl User {
    /// Display name if set, otherwise the account name.
    pub fn display_name(&self) -> &str {
        if self.profile.display_name.is_empty() {
            &self.name
        } else {
            &self.profile.display_name
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub display_name: String,
    pub real_name: String,
    pub image_48: String,
}

/// The identity behind the configured token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BotIdentity {
    pub user_id: String,
    pub user: String,
    pub team_id: String,
}

/// Body of `chat.postMessage` / `chat.update`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub icon_url: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub as_user: bool,
    pub link_names: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub thread_ts: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
    pub unfurl_links: bool,
    pub unfurl_media: bool,
}

/// A file to upload into one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadRequest {
    pub channel_id: String,
    pub filename: String,
    pub data: Vec<u8>,
    pub initial_comment: String,
    pub thread_ts: String,
}

/// Result of `files.upload`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UploadedFile {
    pub id: String,
    pub shares: FileShares,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileShares {
    pub public: HashMap<String, Vec<ShareInfo>>,
    pub private: HashMap<String, Vec<ShareInfo>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ShareInfo {
    pub ts: String,
}

impl UploadedFile {
    /// Timestamp of the message that shared the file in `channel_id`.
    /// Public shares win over private ones.
    pub fn message_ts(&self, channel_id: &str) -> Option<&str> {
        fn first<'a>(
            shares: &'a HashMap<String, Vec<ShareInfo>>,
            channel_id: &str,
        ) -> Option<&'a str> {
            shares.get(channel_id)?.first().map(|s| s.ts.as_str())
        }
        first(&self.shares.public, channel_id)
            .or_else(|| first(&self.shares.private, channel_id))
    }
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor of the next page; `None` on the last page.
    pub next_cursor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_share_wins() {
        let file: UploadedFile = serde_json::from_str(
            r#"{"id":"F1","shares":{
                "private":{"C1":[{"ts":"1.0"}],"C4":[{"ts":"4.0"}]},
                "public":{"C1":[{"ts":"2.0"}],"C2":[{"ts":"3.0"}]}
            }}"#,
        )
        .unwrap();
        assert_eq!(file.message_ts("C1"), Some("2.0"));
        assert_eq!(file.message_ts("C2"), Some("3.0"));
        assert_eq!(file.message_ts("C4"), Some("4.0"));
        assert_eq!(file.message_ts("C3"), None);
    }

    #[test]
    fn test_outgoing_message_omits_empty_fields() {
        let msg = OutgoingMessage {
            channel: "C1".into(),
            text: "hi".into(),
            link_names: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert!(json.get("username").is_none());
        assert!(json.get("as_user").is_none());
        assert!(json.get("blocks").is_none());
        assert_eq!(json["link_names"], true);
    }

    #[test]
    fn test_display_name_fallback() {
        let mut user = User {
            name: "alice".into(),
            ..Default::default()
        };
        assert_eq!(user.display_name(), "alice");
        user.profile.display_name = "Alice A.".into();
        assert_eq!(user.display_name(), "Alice A.");
    }
}
