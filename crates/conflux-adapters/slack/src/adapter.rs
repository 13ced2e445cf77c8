//! The Slack adapter.
//!
//! Two transport families, chosen by configuration at connect time:
//!
//! - **Token mode**: Web API for outbound calls, an Events API listener for
//!   inbound events.
//! - **Legacy webhooks**: an outgoing webhook URL for plain outbound posts
//!   and/or an incoming webhook listener. Outbound goes through the webhook
//!   only when no token is set; the incoming listener only runs without one.
//!
//! [`disconnect`](Adapter::disconnect) stops the inbound listener. Outbound
//! sends keep working on the established session.
//!
//! ```toml
//! [adapters.slack]
//! token = "xoxb-..."
//! events_bind_address = "0.0.0.0:3000"
//!
//! [channels]
//! slack = ["general", "ID:C024BE91L"]
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use conflux_core::{
    Adapter, AdapterError, AdapterResult, ApiError, ConfigurableAdapter, ListenerHandle, Message,
    Relay, SizePolicy,
};
use conflux_transport::{HttpClientOptions, WebhookClient, WebhookListener, serve};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::SlackApi;
use crate::attachments::AttachmentHandler;
use crate::classifier::EventClassifier;
use crate::config::SlackConfig;
use crate::dedup::DedupCache;
use crate::directory::{CHANNEL_ID_PREFIX, Directory, SlackDirectory};
use crate::inbound::{InboundPipeline, Normalizer, PROTOCOL, events_router, spawn_legacy_loop};
use crate::origin::{BlockIdMarker, OriginMarker};
use crate::outbound::{
    ApiSender, MessageSender, OutboundDispatcher, Route, WebhookSender, select_route,
};
use crate::ratelimit::retry_rate_limited;
use crate::web_client::WebApiClient;

/// `conversations.join` failures that still leave the channel usable.
const TOLERATED_JOIN_ERRORS: &[&str] = &[
    "already_in_channel",
    "name_taken",
    "restricted_action",
    "method_not_supported_for_channel_type",
];

/// Web API collaborators, present in token mode only.
struct Platform {
    api: Arc<dyn SlackApi>,
    directory: Arc<dyn Directory>,
    dedup: Arc<DedupCache>,
    marker: Arc<dyn OriginMarker>,
}

struct Session {
    platform: Option<Platform>,
    dispatcher: Option<OutboundDispatcher>,
}

/// Slack adapter.
pub struct SlackAdapter {
    config: Arc<SlackConfig>,
    session: RwLock<Option<Arc<Session>>>,
    /// Events API listener (token mode).
    events: Mutex<Option<ListenerHandle>>,
    /// Incoming webhook listener (no token).
    webhook: Mutex<Option<ListenerHandle>>,
    /// Report inbound channels as `ID:<id>`. Set by joining such a channel.
    use_channel_id: Arc<AtomicBool>,
}

impl SlackAdapter {
    /// Creates an adapter after validating `config`.
    pub fn new(config: SlackConfig) -> AdapterResult<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            session: RwLock::new(None),
            events: Mutex::new(None),
            webhook: Mutex::new(None),
            use_channel_id: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Returns the adapter configuration.
    pub fn config(&self) -> &SlackConfig {
        &self.config
    }

    /// Returns `true` while connected.
    pub fn is_connected(&self) -> bool {
        self.session.read().is_some()
    }

    /// Addresses of the running listeners.
    pub fn listener_addrs(&self) -> Vec<String> {
        [&self.events, &self.webhook]
            .into_iter()
            .filter_map(|slot| slot.lock().as_ref().map(|l| l.id.clone()))
            .collect()
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.session.read().clone()
    }

    fn http_options(&self) -> HttpClientOptions {
        HttpClientOptions {
            skip_tls_verify: self.config.skip_tls_verify,
            ..Default::default()
        }
    }

    /// Connects with an explicit Web API implementation; `None` means no
    /// token mode.
    ///
    /// Listener handles stay local until the session is installed, so a
    /// failed connect stops whatever it had started.
    async fn connect_with(
        &self,
        relay: Arc<dyn Relay>,
        api: Option<Arc<dyn SlackApi>>,
    ) -> AdapterResult<()> {
        let (platform, events) = match api {
            Some(api) => {
                let (platform, handle) = self.start_events(api, relay.clone()).await?;
                (Some(platform), Some(handle))
            }
            None => (None, None),
        };

        let dispatcher = match (select_route(&self.config), &platform) {
            (Route::Webhook, _) => {
                let url = self.config.webhook_url().unwrap_or_default();
                info!(url, "Using webhook for outgoing messages");
                let client = WebhookClient::new(url, &self.http_options())?;
                let sender: Arc<dyn MessageSender> =
                    Arc::new(WebhookSender::new(self.config.clone(), client));
                Some(OutboundDispatcher::new(self.config.clone(), sender))
            }
            (Route::Api, Some(platform)) => {
                let sender: Arc<dyn MessageSender> = Arc::new(ApiSender::new(
                    self.config.clone(),
                    platform.api.clone(),
                    platform.directory.clone(),
                    platform.dedup.clone(),
                    platform.marker.clone(),
                    relay.clone(),
                ));
                Some(OutboundDispatcher::new(self.config.clone(), sender))
            }
            (Route::Api, None) => {
                warn!("No outgoing transport configured, messages to Slack will be refused");
                None
            }
        };

        let webhook = match self.config.webhook_bind_address() {
            Some(addr) if platform.is_some() => {
                warn!(addr, "Ignoring webhook_bind_address, events arrive through the Events API");
                None
            }
            Some(addr) => {
                info!(addr, "Setting up local webhook for incoming messages");
                let (handle, hooks) = WebhookListener::bind(addr).await?;
                let normalizer = Arc::new(Normalizer::new(None));
                spawn_legacy_loop(hooks, normalizer, relay, self.config.account.clone());
                Some(handle)
            }
            None => None,
        };

        *self.session.write() = Some(Arc::new(Session {
            platform,
            dispatcher,
        }));
        *self.events.lock() = events;
        *self.webhook.lock() = webhook;
        Ok(())
    }

    async fn start_events(
        &self,
        api: Arc<dyn SlackApi>,
        relay: Arc<dyn Relay>,
    ) -> AdapterResult<(Platform, ListenerHandle)> {
        info!("Connecting using token");
        let team_id = match api.auth_test().await {
            Ok(identity) => {
                info!(user = %identity.user, team_id = %identity.team_id, "Authenticated with Slack");
                identity.team_id
            }
            Err(e) => {
                warn!(error = %e, "Slack identity lookup failed, member rosters will lack a team ID");
                String::new()
            }
        };

        let config = self.config.clone();
        let directory: Arc<dyn Directory> =
            Arc::new(SlackDirectory::new(api.clone()).with_team_id(team_id));
        let dedup = Arc::new(DedupCache::new());
        let marker: Arc<dyn OriginMarker> = Arc::new(BlockIdMarker::new());
        let media = Arc::new(SizePolicy::new(
            config.media_download_size,
            &config.media_download_blacklist,
        ));

        let classifier = EventClassifier::new(
            config.clone(),
            marker.clone(),
            dedup.clone(),
            directory.clone(),
        );
        let attachments = AttachmentHandler::new(api.clone(), dedup.clone(), media);
        let pipeline = Arc::new(InboundPipeline::new(
            config.clone(),
            directory.clone(),
            classifier,
            attachments,
            dedup.clone(),
            relay,
            self.use_channel_id.clone(),
        ));

        let router = events_router(&config.events_path, pipeline);
        let handle = serve(&config.events_bind_address, router).await?;
        info!(addr = %handle.id, path = %config.events_path, "Listening for Slack events");

        let platform = Platform {
            api,
            directory,
            dedup,
            marker,
        };
        Ok((platform, handle))
    }

    async fn legacy_join(&self, api: &Arc<dyn SlackApi>, channel: &str) -> AdapterResult<()> {
        let target = channel.strip_prefix(CHANNEL_ID_PREFIX).unwrap_or(channel);
        match retry_rate_limited("conversations.join", || api.join_conversation(target)).await {
            Ok(_) => Ok(()),
            Err(e) if e.code().is_some_and(|c| TOLERATED_JOIN_ERRORS.contains(&c)) => {
                debug!(channel, error = %e, "Ignoring join failure");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Adapter for SlackAdapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn account(&self) -> &str {
        &self.config.account
    }

    async fn connect(&self, relay: Arc<dyn Relay>) -> AdapterResult<()> {
        self.config.require_transport()?;
        if self.is_connected() {
            warn!(account = %self.config.account, "Slack adapter is already connected");
            return Ok(());
        }

        let api = match self.config.token() {
            Some(token) => {
                let client = WebApiClient::new(token, &self.http_options())?;
                Some(Arc::new(client) as Arc<dyn SlackApi>)
            }
            None => None,
        };
        self.connect_with(relay, api).await
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        let listener = self.events.lock().take();
        if let Some(mut listener) = listener
            && listener.stop()
        {
            info!(addr = %listener.id, "Stopped Slack events listener");
        }
        Ok(())
    }

    async fn join_channel(&self, channel: &str) -> AdapterResult<()> {
        // channels can only be checked through the Web API
        let Some(session) = self.session() else {
            return Ok(());
        };
        let Some(platform) = &session.platform else {
            return Ok(());
        };

        if self.config.legacy_join {
            self.legacy_join(&platform.api, channel).await?;
        }

        if let Err(e) = platform.directory.refresh(false).await {
            warn!(error = %e, "Could not refresh channel directory");
        }

        let info = platform
            .directory
            .channel_by_name(channel)
            .await
            .map_err(|e| AdapterError::Join(e.to_string()))?;

        if channel.starts_with(CHANNEL_ID_PREFIX) {
            debug!(channel, name = %info.name, "Reporting channels by ID");
            self.use_channel_id.store(true, Ordering::Relaxed);
        }

        // bots cannot invite themselves
        if !info.is_member && !self.config.legacy_join {
            return Err(AdapterError::ChannelNotMember { channel: info.name });
        }
        Ok(())
    }

    async fn send(&self, msg: Message) -> AdapterResult<String> {
        let session = self.session().ok_or(ApiError::NotConnected)?;
        let dispatcher = session.dispatcher.as_ref().ok_or(ApiError::NotConnected)?;
        dispatcher.send(msg).await
    }
}

impl ConfigurableAdapter for SlackAdapter {
    type Config = SlackConfig;

    fn name() -> &'static str {
        "slack"
    }

    fn from_config(config: SlackConfig) -> AdapterResult<Self> {
        Self::new(config)
    }
}
