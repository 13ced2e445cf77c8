//! Inbound event routing.
//!
//! Two ingestion paths feed the relay:
//!
//! | Path | Mode | Source |
//! |------|------|--------|
//! | Events API | token | JSON envelopes POSTed to the events endpoint |
//! | Legacy webhook | no token | form posts from an outgoing-webhook integration |
//!
//! The Events API path runs the full classification pipeline
//! ([`EventClassifier`], [`AttachmentHandler`]); the legacy path only knows
//! username, text and channel. Both finish in the same [`Normalizer`] before
//! the message is delivered.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use conflux_core::{AdapterError, AdapterResult, EventKind, Message, Relay};
use conflux_transport::IncomingWebhook;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::attachments::AttachmentHandler;
use crate::classifier::{EventClassifier, SLACKBOT_USER};
use crate::config::SlackConfig;
use crate::dedup::DedupCache;
use crate::directory::{CHANNEL_ID_PREFIX, Directory};
use crate::format;
use crate::model::{
    Channel, Envelope, EnvelopeError, FileDeletedEvent, MessageEvent, MessageSubtype, RawEvent, UserTypingEvent,
};

/// Protocol name reported on inbound messages.
pub const PROTOCOL: &str = "slack";

/// Set by Slack on redeliveries of an event.
const RETRY_NUM_HEADER: &str = "x-slack-retry-num";
const RETRY_REASON_HEADER: &str = "x-slack-retry-reason";

/// Text of canonical file-delete messages.
pub const FILE_DELETE_TEXT: &str = "file_delete";

/// Pause before the legacy loop starts consuming.
const LEGACY_STARTUP_DELAY: Duration = Duration::from_secs(1);

// =============================================================================
// Normalization
// =============================================================================

/// Rewrites Slack markup into relay markdown and attaches avatars.
pub struct Normalizer {
    directory: Option<Arc<dyn Directory>>,
}

impl Normalizer {
    /// Without a directory, mentions stay unresolved and no avatar is set.
    pub fn new(directory: Option<Arc<dyn Directory>>) -> Self {
        Self { directory }
    }

    pub async fn normalize(&self, msg: &mut Message) {
        if matches!(
            msg.event,
            Some(EventKind::UserTyping | EventKind::MsgDelete | EventKind::FileDelete)
        ) {
            return;
        }

        if let Some(directory) = &self.directory {
            let mut names = HashMap::new();
            for id in format::mention_ids(&msg.text) {
                if let Some(user) = directory.user(&id).await {
                    names.insert(id, user.display_name().to_string());
                }
            }
            msg.text = format::replace_mentions(&msg.text, &names);
        }
        msg.text = format::replace_variables(&msg.text);
        msg.text = format::replace_channels(&msg.text);
        msg.text = format::replace_urls(&msg.text);
        msg.text = format::repair_markdown(&msg.text);
        msg.text = format::unescape_html(&msg.text);

        if let Some(directory) = &self.directory
            && !msg.user_id.is_empty()
        {
            msg.avatar = directory.avatar_for(&msg.user_id).await;
        }
    }
}

// =============================================================================
// Events API pipeline
// =============================================================================

/// Turns Events API events into canonical messages.
pub struct InboundPipeline {
    config: Arc<SlackConfig>,
    directory: Arc<dyn Directory>,
    classifier: EventClassifier,
    attachments: AttachmentHandler,
    dedup: Arc<DedupCache>,
    normalizer: Normalizer,
    relay: Arc<dyn Relay>,
    /// Report channels as `ID:<id>` instead of by name.
    use_channel_id: Arc<AtomicBool>,
}

impl InboundPipeline {
    pub fn new(
        config: Arc<SlackConfig>,
        directory: Arc<dyn Directory>,
        classifier: EventClassifier,
        attachments: AttachmentHandler,
        dedup: Arc<DedupCache>,
        relay: Arc<dyn Relay>,
        use_channel_id: Arc<AtomicBool>,
    ) -> Self {
        Self {
            normalizer: Normalizer::new(Some(Arc::clone(&directory))),
            config,
            directory,
            classifier,
            attachments,
            dedup,
            relay,
            use_channel_id,
        }
    }

    /// Processes one event, delivering the resulting message if any.
    ///
    /// Failures drop the event; there is no caller to report them to.
    pub async fn handle_event(&self, event: RawEvent) {
        let result = match event {
            RawEvent::Message(ev) if ev.is(MessageSubtype::BotMessage) => {
                debug!(channel = %ev.channel, "Ignoring bot message");
                Ok(None)
            }
            RawEvent::Message(ev) => self.handle_message(&ev).await,
            RawEvent::FileDeleted(ev) => self.handle_file_deleted(&ev).await.map(Some),
            RawEvent::UserTyping(ev) if self.config.show_user_typing => {
                self.handle_typing(&ev).await.map(Some)
            }
            RawEvent::ChannelJoined(_) | RawEvent::MemberJoinedChannel(_) => {
                self.directory.refresh(false).await.map(|_| None)
            }
            RawEvent::Hello => {
                info!("Connected to Slack");
                Ok(None)
            }
            _ => Ok(None),
        };

        match result {
            Ok(Some(msg)) => self.deliver(msg).await,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Dropping inbound Slack event"),
        }
    }

    async fn deliver(&self, mut msg: Message) {
        self.normalizer.normalize(&mut msg).await;
        debug!(
            username = %msg.username,
            channel = %msg.channel,
            event = ?msg.event,
            "Relaying Slack message"
        );
        self.relay.deliver(msg).await;
    }

    fn channel_label(&self, channel: &Channel) -> String {
        if self.use_channel_id.load(Ordering::Relaxed) {
            format!("{CHANNEL_ID_PREFIX}{}", channel.id)
        } else {
            channel.name.clone()
        }
    }

    /// Runs a message event through skip, classification, attachments and
    /// validation. `Ok(None)` means the event was skipped.
    pub async fn handle_message(&self, ev: &MessageEvent) -> AdapterResult<Option<Message>> {
        if self.classifier.skip(ev) {
            debug!(channel = %ev.channel, subtype = ?ev.subtype, "Skipping message event");
            return Ok(None);
        }

        let mut msg = self.populate(ev).await?;
        if self.classifier.classify(ev, &mut msg).await {
            return Ok(Some(msg));
        }
        self.apply_edit_suffix(ev, &mut msg);
        self.attachments.handle(ev, &mut msg).await;
        self.classifier.validate(ev, &msg)?;
        Ok(Some(msg))
    }

    async fn populate(&self, ev: &MessageEvent) -> AdapterResult<Message> {
        let channel = self.directory.channel_by_id(&ev.channel).await?;
        let mut msg = Message {
            id: ev.ts.clone(),
            parent_id: ev.thread_ts.clone(),
            channel: self.channel_label(&channel),
            text: ev.text.clone(),
            account: self.config.account.clone(),
            protocol: PROTOCOL.to_string(),
            ..Default::default()
        };

        if let Some(sub) = &ev.sub_message {
            if !self.config.edit_disable {
                msg.id = sub.ts.clone();
            }
            // only the sub-message knows the thread of an edited reply
            msg.parent_id = sub.thread_ts.clone();
        }

        self.populate_user(ev, &mut msg).await;
        Ok(msg)
    }

    async fn populate_user(&self, ev: &MessageEvent, msg: &mut Message) {
        if ev.is(MessageSubtype::MessageDeleted) || ev.is(MessageSubtype::FileComment) {
            return;
        }

        if !ev.bot_id.is_empty() && !ev.username.is_empty() {
            msg.username = ev.username.clone();
            msg.user_id = ev.bot_id.clone();
        }

        let user_id = match &ev.sub_message {
            _ if !ev.user.is_empty() => ev.user.as_str(),
            Some(sub) if !sub.user.is_empty() => sub.user.as_str(),
            _ => return,
        };

        match self.directory.user(user_id).await {
            Some(user) => {
                msg.user_id = user.id.clone();
                msg.username = user.display_name().to_string();
            }
            None => {
                debug!(user_id, "Unknown user, using the raw ID as name");
                msg.user_id = user_id.to_string();
                msg.username = user_id.to_string();
            }
        }
    }

    /// Marks edited top-level messages with the configured suffix.
    fn apply_edit_suffix(&self, ev: &MessageEvent, msg: &mut Message) {
        if self.config.edit_disable || self.config.edit_suffix.is_empty() || msg.event.is_some() {
            return;
        }
        if let Some(sub) = &ev.sub_message
            && sub.thread_ts != sub.ts
            && !msg.text.is_empty()
        {
            msg.text.push_str(&self.config.edit_suffix);
        }
    }

    pub async fn handle_file_deleted(&self, ev: &FileDeletedEvent) -> AdapterResult<Message> {
        let channel_id = self.dedup.file_channel(&ev.file_id).ok_or_else(|| {
            AdapterError::channel_not_found(format!("<channel of file {}>", ev.file_id))
        })?;
        let channel = self.directory.channel_by_id(&channel_id).await?;
        Ok(Message {
            id: ev.file_id.clone(),
            channel: self.channel_label(&channel),
            text: FILE_DELETE_TEXT.to_string(),
            event: Some(EventKind::FileDelete),
            account: self.config.account.clone(),
            protocol: PROTOCOL.to_string(),
            ..Default::default()
        })
    }

    pub async fn handle_typing(&self, ev: &UserTypingEvent) -> AdapterResult<Message> {
        let channel = self.directory.channel_by_id(&ev.channel).await?;
        Ok(Message {
            channel: self.channel_label(&channel),
            event: Some(EventKind::UserTyping),
            account: self.config.account.clone(),
            protocol: PROTOCOL.to_string(),
            ..Default::default()
        })
    }
}

/// Router serving the Events API endpoint at `path`.
pub fn events_router(path: &str, pipeline: Arc<InboundPipeline>) -> Router {
    Router::new()
        .route(path, post(events_handler))
        .with_state(pipeline)
}

/// Slack redelivers after a timed-out acknowledgement even though the
/// first delivery is already being processed.
fn is_timeout_redelivery(headers: &HeaderMap) -> bool {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    header(RETRY_NUM_HEADER).is_some() && header(RETRY_REASON_HEADER) == Some("http_timeout")
}

/// Events are acknowledged right away and processed on their own task,
/// since Slack expects an answer within three seconds.
async fn events_handler(
    State(pipeline): State<Arc<InboundPipeline>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match Envelope::parse(&body) {
        Ok(Envelope::UrlVerification { challenge }) => {
            info!("Answering Slack URL verification");
            Json(json!({ "challenge": challenge })).into_response()
        }
        Ok(Envelope::EventCallback(Some(_))) if is_timeout_redelivery(&headers) => {
            debug!("Dropping Slack redelivery of a timed-out event");
            StatusCode::OK.into_response()
        }
        Ok(Envelope::EventCallback(Some(event))) => {
            tokio::spawn(async move { pipeline.handle_event(event).await });
            StatusCode::OK.into_response()
        }
        Ok(Envelope::EventCallback(None)) => {
            debug!("Dropping unparsable Slack event");
            StatusCode::OK.into_response()
        }
        Ok(Envelope::Other(kind)) => {
            debug!(kind = %kind, "Ignoring Slack envelope");
            StatusCode::OK.into_response()
        }
        Err(e @ EnvelopeError::MissingChallenge) => {
            warn!(error = %e, "Rejecting Slack URL verification");
            (StatusCode::BAD_REQUEST, "bad request").into_response()
        }
        Err(e) => {
            warn!(error = %e, "Ignoring unreadable Slack event request");
            StatusCode::OK.into_response()
        }
    }
}

// =============================================================================
// Legacy webhook loop
// =============================================================================

/// Converts an incoming webhook post. Posts by Slack's own bot yield `None`.
pub fn legacy_message(hook: &IncomingWebhook, account: &str) -> Option<Message> {
    if hook.user_name == SLACKBOT_USER {
        return None;
    }
    Some(Message {
        username: hook.user_name.clone(),
        text: hook.text.clone(),
        channel: hook.channel_name.clone(),
        account: account.to_string(),
        protocol: PROTOCOL.to_string(),
        ..Default::default()
    })
}

/// Spawns the legacy receive loop. It ends when the listener is stopped.
pub fn spawn_legacy_loop(
    mut hooks: mpsc::Receiver<IncomingWebhook>,
    normalizer: Arc<Normalizer>,
    relay: Arc<dyn Relay>,
    account: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(LEGACY_STARTUP_DELAY).await;
        info!("Listening for Slack webhook messages");
        while let Some(hook) = hooks.recv().await {
            debug!(user = %hook.user_name, channel = %hook.channel_name, "Received webhook message");
            let Some(mut msg) = legacy_message(&hook, &account) else {
                continue;
            };
            normalizer.normalize(&mut msg).await;
            relay.deliver(msg).await;
        }
        debug!("Webhook message stream closed");
    })
}
