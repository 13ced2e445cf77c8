//! Slack wire types.
//!
//! - [`event`]: inbound Events API envelopes and the events they carry.
//! - [`api`]: Web API request and response shapes.

pub mod api;
pub mod event;

pub use api::{
    BotIdentity, Channel, FileShares, OutgoingMessage, Page, ShareInfo, UploadRequest, UploadedFile,
    User, UserProfile,
};
pub use event::{
    Block, ChannelJoinedEvent, Edited, Envelope, EnvelopeError, File, FileDeletedEvent,
    MemberJoinedEvent, MessageEvent, MessageSubtype, RawEvent, SubMessage, TextObject,
    UserTypingEvent,
};
