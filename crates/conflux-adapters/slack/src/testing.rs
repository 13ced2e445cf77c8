//! Recording fakes of the adapter's collaborators.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use conflux_core::{
    AdapterError, AdapterResult, ApiError, ApiResult, ChannelMember, Message, Relay,
    TransportError,
};
use parking_lot::Mutex;

use crate::api::SlackApi;
use crate::directory::{CHANNEL_ID_PREFIX, Directory};
use crate::model::{
    BotIdentity, Channel, FileShares, OutgoingMessage, Page, ShareInfo, UploadRequest,
    UploadedFile, User, UserProfile,
};

/// One recorded platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Post(OutgoingMessage),
    Update { ts: String, msg: OutgoingMessage },
    Delete { channel: String, ts: String },
    Upload(UploadRequest),
    SetTopic { channel: String, text: String },
    SetPurpose { channel: String, text: String },
    Join(String),
    UserInfo(String),
    ListConversations,
    ConversationMembers(String),
    Download(String),
    AuthTest,
}

fn channel(id: &str, name: &str, is_member: bool) -> Channel {
    Channel {
        id: id.to_string(),
        name: name.to_string(),
        is_private: false,
        is_member,
    }
}

fn user(id: &str, name: &str, display_name: &str) -> User {
    User {
        id: id.to_string(),
        name: name.to_string(),
        is_bot: false,
        profile: UserProfile {
            display_name: display_name.to_string(),
            real_name: String::new(),
            image_48: format!("https://avatars.example/{id}.png"),
        },
    }
}

/// In-memory [`SlackApi`] that records every call.
///
/// Errors queued with [`fail_next`](Self::fail_next) are returned by the
/// next calls, whatever they are.
#[derive(Default)]
pub struct FakeSlackApi {
    channels: Vec<Channel>,
    members: HashMap<String, Vec<String>>,
    users: HashMap<String, User>,
    downloads: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    failures: Mutex<VecDeque<ApiError>>,
    calls: Mutex<Vec<ApiCall>>,
    next_ts: AtomicU64,
}

impl FakeSlackApi {
    pub fn new() -> Self {
        Self {
            next_ts: AtomicU64::new(1000),
            ..Default::default()
        }
    }

    pub fn with_channel(mut self, id: &str, name: &str, is_member: bool) -> Self {
        self.channels.push(channel(id, name, is_member));
        self
    }

    pub fn with_member(mut self, channel_id: &str, user_id: &str) -> Self {
        self.members
            .entry(channel_id.to_string())
            .or_default()
            .push(user_id.to_string());
        self
    }

    pub fn with_user(mut self, id: &str, name: &str, display_name: &str) -> Self {
        self.users.insert(id.to_string(), user(id, name, display_name));
        self
    }

    /// Serves `bodies` in order for `url`; the last one repeats.
    pub fn with_download(self, url: &str, bodies: Vec<Vec<u8>>) -> Self {
        self.downloads
            .lock()
            .insert(url.to_string(), bodies.into_iter().collect());
        self
    }

    pub fn fail_next(&self, err: ApiError) {
        self.failures.lock().push_back(err);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&ApiCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Messages passed to `chat.postMessage`.
    pub fn posts(&self) -> Vec<OutgoingMessage> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ApiCall::Post(m) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) -> ApiResult<()> {
        self.calls.lock().push(call);
        match self.failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn ts(&self) -> String {
        format!("{}.000100", self.next_ts.fetch_add(1, Ordering::SeqCst))
    }

    fn find_channel(&self, key: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == key || c.name == key)
    }
}

#[async_trait]
impl SlackApi for FakeSlackApi {
    async fn post_message(&self, msg: &OutgoingMessage) -> ApiResult<String> {
        self.record(ApiCall::Post(msg.clone()))?;
        Ok(self.ts())
    }

    async fn update_message(&self, ts: &str, msg: &OutgoingMessage) -> ApiResult<()> {
        self.record(ApiCall::Update {
            ts: ts.to_string(),
            msg: msg.clone(),
        })
    }

    async fn delete_message(&self, channel_id: &str, ts: &str) -> ApiResult<()> {
        self.record(ApiCall::Delete {
            channel: channel_id.to_string(),
            ts: ts.to_string(),
        })
    }

    async fn upload_file(&self, req: &UploadRequest) -> ApiResult<UploadedFile> {
        self.record(ApiCall::Upload(req.clone()))?;
        let n = self.next_ts.fetch_add(1, Ordering::SeqCst);
        Ok(UploadedFile {
            id: format!("F{n}"),
            shares: FileShares {
                public: HashMap::from([(
                    req.channel_id.clone(),
                    vec![ShareInfo {
                        ts: format!("{n}.000200"),
                    }],
                )]),
                private: HashMap::new(),
            },
        })
    }

    async fn set_topic(&self, channel_id: &str, topic: &str) -> ApiResult<()> {
        self.record(ApiCall::SetTopic {
            channel: channel_id.to_string(),
            text: topic.to_string(),
        })
    }

    async fn set_purpose(&self, channel_id: &str, purpose: &str) -> ApiResult<()> {
        self.record(ApiCall::SetPurpose {
            channel: channel_id.to_string(),
            text: purpose.to_string(),
        })
    }

    async fn join_conversation(&self, channel: &str) -> ApiResult<Channel> {
        self.record(ApiCall::Join(channel.to_string()))?;
        self.find_channel(channel)
            .cloned()
            .ok_or_else(|| ApiError::platform("channel_not_found"))
    }

    async fn user_info(&self, user_id: &str) -> ApiResult<User> {
        self.record(ApiCall::UserInfo(user_id.to_string()))?;
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ApiError::platform("user_not_found"))
    }

    async fn list_conversations(&self, _cursor: Option<&str>) -> ApiResult<Page<Channel>> {
        self.record(ApiCall::ListConversations)?;
        Ok(Page {
            items: self.channels.clone(),
            next_cursor: None,
        })
    }

    async fn conversation_members(
        &self,
        channel_id: &str,
        _cursor: Option<&str>,
    ) -> ApiResult<Page<String>> {
        self.record(ApiCall::ConversationMembers(channel_id.to_string()))?;
        Ok(Page {
            items: self.members.get(channel_id).cloned().unwrap_or_default(),
            next_cursor: None,
        })
    }

    async fn download_file(&self, url: &str) -> ApiResult<Vec<u8>> {
        self.record(ApiCall::Download(url.to_string()))?;
        let mut downloads = self.downloads.lock();
        let bodies = downloads.get_mut(url).ok_or(TransportError::HttpStatus {
            status: 404,
            body: String::new(),
        })?;
        let body = if bodies.len() > 1 {
            bodies.pop_front()
        } else {
            bodies.front().cloned()
        };
        Ok(body.unwrap_or_default())
    }

    async fn auth_test(&self) -> ApiResult<BotIdentity> {
        self.record(ApiCall::AuthTest)?;
        Ok(BotIdentity {
            user_id: "UBOT".to_string(),
            user: "conflux".to_string(),
            team_id: "T1".to_string(),
        })
    }
}

/// Fixed [`Directory`] counting refreshes.
#[derive(Default)]
pub struct StaticDirectory {
    channels: Vec<Channel>,
    users: HashMap<String, User>,
    members: Vec<ChannelMember>,
    refreshes: AtomicUsize,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, id: &str, name: &str, is_member: bool) -> Self {
        self.channels.push(channel(id, name, is_member));
        self
    }

    pub fn with_user(mut self, id: &str, name: &str, display_name: &str) -> Self {
        self.users.insert(id.to_string(), user(id, name, display_name));
        self
    }

    pub fn with_member(mut self, member: ChannelMember) -> Self {
        self.members.push(member);
        self
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn channel_by_name(&self, name: &str) -> AdapterResult<Channel> {
        if let Some(id) = name.strip_prefix(CHANNEL_ID_PREFIX) {
            return self.channel_by_id(id).await;
        }
        self.channels
            .iter()
            .find(|c| c.name == name)
            .cloned()
            .ok_or_else(|| AdapterError::channel_not_found(name))
    }

    async fn channel_by_id(&self, id: &str) -> AdapterResult<Channel> {
        self.channels
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| AdapterError::channel_not_found(id))
    }

    async fn refresh(&self, _force: bool) -> AdapterResult<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn user(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).cloned()
    }

    async fn channel_members(&self) -> Vec<ChannelMember> {
        self.members.clone()
    }
}

/// [`Relay`] that keeps everything delivered to it.
#[derive(Default)]
pub struct RecordingRelay {
    messages: Mutex<Vec<Message>>,
}

impl RecordingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    /// Polls until at least `n` messages arrived, giving up after ~5s.
    pub async fn wait_for(&self, n: usize) -> Vec<Message> {
        for _ in 0..500 {
            let messages = self.messages();
            if messages.len() >= n {
                return messages;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.messages()
    }
}

#[async_trait]
impl Relay for RecordingRelay {
    async fn deliver(&self, msg: Message) {
        self.messages.lock().push(msg);
    }
}
