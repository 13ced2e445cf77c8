//! Channel and user directory.
//!
//! The pipeline resolves channel names, channel IDs, user names and avatars
//! through [`Directory`]. [`SlackDirectory`] backs it with the Web API:
//!
//! - Channels (with their member lists) live in one immutable snapshot that
//!   is rebuilt off to the side and swapped in whole, so a reader sees either
//!   the old or the new directory and never a half-built one.
//! - A non-forced refresh within a minute of the last one is a no-op.
//! - Users are fetched on first use and memoized.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conflux_core::{AdapterError, AdapterResult, ChannelMember};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::api::SlackApi;
use crate::model::{Channel, User};
use crate::ratelimit::retry_rate_limited;

/// Prefix addressing a channel by ID instead of name.
pub const CHANNEL_ID_PREFIX: &str = "ID:";

/// Minimum interval between two non-forced refreshes.
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Lookup services the message pipeline depends on.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolves a channel by name, or by ID when prefixed with `ID:`.
    async fn channel_by_name(&self, name: &str) -> AdapterResult<Channel>;

    /// Resolves a channel by ID.
    async fn channel_by_id(&self, id: &str) -> AdapterResult<Channel>;

    /// Rebuilds the channel directory. A non-forced refresh may be skipped.
    async fn refresh(&self, force: bool) -> AdapterResult<()>;

    /// Looks up a user, `None` if unknown.
    async fn user(&self, user_id: &str) -> Option<User>;

    /// Avatar URL of a user, empty if unknown.
    async fn avatar_for(&self, user_id: &str) -> String {
        self.user(user_id)
            .await
            .map(|u| u.profile.image_48)
            .unwrap_or_default()
    }

    /// Member roster of every known channel.
    async fn channel_members(&self) -> Vec<ChannelMember>;
}

#[derive(Debug, Default)]
struct Snapshot {
    by_id: HashMap<String, Channel>,
    by_name: HashMap<String, String>,
    members: HashMap<String, Vec<String>>,
}

impl Snapshot {
    fn by_name(&self, name: &str) -> Option<&Channel> {
        self.by_name.get(name).and_then(|id| self.by_id.get(id))
    }
}

/// [`Directory`] backed by the Slack Web API.
pub struct SlackDirectory {
    api: Arc<dyn SlackApi>,
    team_id: String,
    snapshot: RwLock<Arc<Snapshot>>,
    users: RwLock<HashMap<String, User>>,
    /// Serializes refreshes; holds the time of the last one.
    last_refresh: Mutex<Option<Instant>>,
}

impl SlackDirectory {
    pub fn new(api: Arc<dyn SlackApi>) -> Self {
        Self {
            api,
            team_id: String::new(),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            users: RwLock::new(HashMap::new()),
            last_refresh: Mutex::new(None),
        }
    }

    /// Sets the team ID reported in member rosters.
    pub fn with_team_id(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = team_id.into();
        self
    }

    fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read())
    }

    async fn build_snapshot(&self) -> AdapterResult<Snapshot> {
        let mut snapshot = Snapshot::default();
        let mut cursor: Option<String> = None;
        loop {
            let page = retry_rate_limited("conversations.list", || {
                self.api.list_conversations(cursor.as_deref())
            })
            .await?;
            for channel in page.items {
                snapshot
                    .by_name
                    .insert(channel.name.clone(), channel.id.clone());
                snapshot.by_id.insert(channel.id.clone(), channel);
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        for channel in snapshot.by_id.values().filter(|c| c.is_member) {
            let members = self.fetch_members(&channel.id).await?;
            snapshot.members.insert(channel.id.clone(), members);
        }
        Ok(snapshot)
    }

    async fn fetch_members(&self, channel_id: &str) -> AdapterResult<Vec<String>> {
        let mut members = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = retry_rate_limited("conversations.members", || {
                self.api.conversation_members(channel_id, cursor.as_deref())
            })
            .await?;
            members.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(members),
            }
        }
    }
}

#[async_trait]
impl Directory for SlackDirectory {
    async fn channel_by_name(&self, name: &str) -> AdapterResult<Channel> {
        if let Some(id) = name.strip_prefix(CHANNEL_ID_PREFIX) {
            return self.channel_by_id(id).await;
        }
        if let Some(channel) = self.current().by_name(name) {
            return Ok(channel.clone());
        }
        self.refresh(false).await?;
        self.current()
            .by_name(name)
            .cloned()
            .ok_or_else(|| AdapterError::channel_not_found(name))
    }

    async fn channel_by_id(&self, id: &str) -> AdapterResult<Channel> {
        if let Some(channel) = self.current().by_id.get(id) {
            return Ok(channel.clone());
        }
        self.refresh(false).await?;
        self.current()
            .by_id
            .get(id)
            .cloned()
            .ok_or_else(|| AdapterError::channel_not_found(id))
    }

    async fn refresh(&self, force: bool) -> AdapterResult<()> {
        let mut last = self.last_refresh.lock().await;
        if !force && last.is_some_and(|t| t.elapsed() < REFRESH_INTERVAL) {
            debug!("Skipping channel directory refresh, last one is recent");
            return Ok(());
        }

        let snapshot = self.build_snapshot().await?;
        info!(channels = snapshot.by_id.len(), "Channel directory refreshed");
        *self.snapshot.write() = Arc::new(snapshot);
        *last = Some(Instant::now());
        Ok(())
    }

    async fn user(&self, user_id: &str) -> Option<User> {
        if user_id.is_empty() {
            return None;
        }
        let cached = self.users.read().get(user_id).cloned();
        if cached.is_some() {
            return cached;
        }
        match retry_rate_limited("users.info", || self.api.user_info(user_id)).await {
            Ok(user) => {
                self.users.write().insert(user_id.to_string(), user.clone());
                Some(user)
            }
            Err(e) => {
                debug!(user_id, error = %e, "Could not resolve user");
                None
            }
        }
    }

    async fn channel_members(&self) -> Vec<ChannelMember> {
        let snapshot = self.current();
        let mut roster = Vec::new();
        for (channel_id, members) in &snapshot.members {
            let channel_name = snapshot
                .by_id
                .get(channel_id)
                .map(|c| c.name.clone())
                .unwrap_or_default();
            for user_id in members {
                let (username, nick) = match self.user(user_id).await {
                    Some(user) => (user.name.clone(), user.profile.display_name.clone()),
                    None => (user_id.clone(), String::new()),
                };
                roster.push(ChannelMember {
                    team_id: self.team_id.clone(),
                    channel_id: channel_id.clone(),
                    channel_name: channel_name.clone(),
                    user_id: user_id.clone(),
                    username,
                    nick,
                });
            }
        }
        roster
    }
}
