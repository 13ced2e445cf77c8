//! # Conflux Adapter for Slack
//!
//! Connects a Slack workspace to the Conflux relay.
//!
//! ## Overview
//!
//! - Inbound Events API events are classified, enriched with files and
//!   attachments, normalized to relay markdown and delivered to the relay.
//! - Outbound canonical messages become Web API calls: posts, edits,
//!   deletes, uploads and topic changes.
//! - Without a token, legacy webhooks carry plain text both ways.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use conflux_adapter_slack::SlackAdapter;
//! use conflux_core::ChannelRelay;
//! use conflux_runtime::ConfluxRuntime;
//!
//! #[tokio::main]
//! async fn main() -> conflux_runtime::RuntimeResult<()> {
//!     let (relay, mut inbound) = ChannelRelay::new();
//!     let runtime = ConfluxRuntime::new(Arc::new(relay))?;
//!     runtime.register_adapter::<SlackAdapter>().await?;
//!     runtime.run().await
//! }
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! Events API ─▶ EventClassifier ─▶ AttachmentHandler ─▶ Normalizer ─▶ Relay
//! webhook    ───────────────────────────────────────────▶ Normalizer ─▶ Relay
//!
//! Relay ─▶ OutboundDispatcher ─▶ ApiSender     ─▶ Web API
//!                             └▶ WebhookSender ─▶ outgoing webhook
//! ```
//!
//! Every Web API call goes through [`ratelimit::retry_rate_limited`], and our
//! own messages are recognized on the way back in by their
//! [`origin::OriginMarker`].

mod adapter;
pub mod api;
pub mod attachments;
pub mod classifier;
pub mod config;
pub mod dedup;
pub mod directory;
pub mod format;
pub mod inbound;
pub mod model;
pub mod origin;
pub mod outbound;
pub mod ratelimit;
pub mod web_client;

#[cfg(test)]
mod testing;

pub use adapter::SlackAdapter;
pub use api::SlackApi;
pub use config::SlackConfig;
pub use dedup::DedupCache;
pub use directory::{Directory, SlackDirectory};
pub use inbound::{InboundPipeline, Normalizer};
pub use origin::{BlockIdMarker, OriginMarker};
pub use outbound::{ApiSender, MessageSender, OutboundDispatcher, WebhookSender};
pub use web_client::WebApiClient;
