//! # Conflux Core
//!
//! Relay-boundary types shared by every Conflux adapter.
//!
//! - **Canonical message**: [`Message`], its [`EventKind`] and the closed set
//!   of side [`Payload`]s.
//! - **Relay boundary**: the [`Relay`] sink adapters deliver into, and the
//!   [`Adapter`] trait the relay drives.
//! - **Errors**: [`TransportError`], [`ApiError`], [`AdapterError`].
//! - **Media**: the [`MediaPolicy`] consulted before downloading files.
//!
//! ```text
//! ┌──────────┐ deliver  ┌───────┐  send   ┌──────────┐
//! │ Adapter  │────────▶│ Relay │────────▶│ Adapter  │
//! │ (Slack)  │         └───────┘         │ (other)  │
//! └──────────┘                           └──────────┘
//! ```

pub mod adapter;
pub mod bridge;
pub mod error;
pub mod listener;
pub mod media;
pub mod message;

pub use adapter::{Adapter, BoxedAdapter, ConfigurableAdapter};
pub use bridge::{ChannelRelay, Relay};
pub use error::{
    AdapterError, AdapterResult, ApiError, ApiResult, EmptyMessageCause, TransportError,
    TransportResult,
};
pub use listener::ListenerHandle;
pub use media::{MediaPolicy, MediaRejection, SYSTEM_NOTICE_USERNAME, SizePolicy, side_payload_notices};
pub use message::{
    Attachment, ChannelMember, DEFAULT_CLIP_NOTICE, EventKind, FileFailure, FileInfo, Message,
    PARENT_ID_NOT_FOUND, Payload, clip_message, icon_url,
};
