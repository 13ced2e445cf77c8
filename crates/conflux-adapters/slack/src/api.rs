//! The Slack platform capabilities the adapter consumes.
//!
//! Everything the adapter needs from Slack goes through [`SlackApi`], so the
//! message pipeline never touches HTTP directly:
//!
//! | Capability | Used by |
//! |------------|---------|
//! | post / update / delete message | outbound API sender |
//! | upload file | outbound API sender |
//! | set topic / purpose | outbound topic sync |
//! | join conversation | `legacy_join` |
//! | user info, conversation listings | directory |
//! | download file | inbound file handling |
//!
//! [`WebApiClient`](crate::web_client::WebApiClient) is the production
//! implementation. Every method returns an [`ApiError`](conflux_core::ApiError)
//! that the rate-limit combinator can inspect.

use async_trait::async_trait;

use conflux_core::ApiResult;

use crate::model::{
    BotIdentity, Channel, OutgoingMessage, Page, UploadRequest, UploadedFile, User,
};

/// Slack Web API capabilities.
#[async_trait]
pub trait SlackApi: Send + Sync {
    /// Posts a new message and returns its timestamp.
    async fn post_message(&self, msg: &OutgoingMessage) -> ApiResult<String>;

    /// Replaces the text and attachments of the message at `ts`.
    async fn update_message(&self, ts: &str, msg: &OutgoingMessage) -> ApiResult<()>;

    /// Deletes the message at `ts`.
    async fn delete_message(&self, channel_id: &str, ts: &str) -> ApiResult<()>;

    /// Uploads a file into one channel.
    async fn upload_file(&self, req: &UploadRequest) -> ApiResult<UploadedFile>;

    /// Sets the channel topic.
    async fn set_topic(&self, channel_id: &str, topic: &str) -> ApiResult<()>;

    /// Sets the channel purpose.
    async fn set_purpose(&self, channel_id: &str, purpose: &str) -> ApiResult<()>;

    /// Joins a public conversation by ID or name.
    async fn join_conversation(&self, channel: &str) -> ApiResult<Channel>;

    /// Fetches one user.
    async fn user_info(&self, user_id: &str) -> ApiResult<User>;

    /// Lists public and private conversations.
    async fn list_conversations(&self, cursor: Option<&str>) -> ApiResult<Page<Channel>>;

    /// Lists the member IDs of one conversation.
    async fn conversation_members(
        &self,
        channel_id: &str,
        cursor: Option<&str>,
    ) -> ApiResult<Page<String>>;

    /// Fetches a private file with the bot's credentials.
    async fn download_file(&self, url: &str) -> ApiResult<Vec<u8>>;

    /// Identifies the bot account behind the token.
    async fn auth_test(&self) -> ApiResult<BotIdentity>;
}
