//! Unified error types for the Conflux relay boundary.
//!
//! Every adapter reports failures with these types so the relay can treat
//! all protocols the same way. Platform-specific detail travels inside the
//! variants as strings.

use std::time::Duration;

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Binding a listener failed.
    #[error("failed to bind {addr}: {reason}")]
    BindFailed {
        /// The address that could not be bound.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// Connection closed.
    #[error("connection closed: {reason}")]
    ConnectionClosed {
        /// Reason for closure.
        reason: String,
    },

    /// Message send failed.
    #[error("failed to send message: {0}")]
    SendFailed(String),

    /// The remote side answered with a non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        /// Status code returned by the peer.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for platform API calls.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The platform asked us to slow down.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// How long the platform wants us to wait.
        retry_after: Duration,
    },
    /// The platform rejected the call with an error code.
    #[error("platform error: {code}")]
    Platform {
        /// Error code reported by the platform (e.g. `channel_not_found`).
        code: String,
    },
    /// The adapter is not connected to the platform.
    #[error("not connected")]
    NotConnected,
    /// Failed to serialize/deserialize.
    #[error("serialization error: {0}")]
    SerializationError(String),
    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Creates a platform error from an error code.
    pub fn platform(code: impl Into<String>) -> Self {
        Self::Platform { code: code.into() }
    }

    /// Returns the platform error code, if this is a platform error.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Platform { code } => Some(code),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

// =============================================================================
// Adapter Errors
// =============================================================================

/// Why an inbound event produced a message with no content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyMessageCause {
    /// A bot message whose sender could not be resolved (typically an
    /// incoming webhook).
    UnresolvedBot,
    /// An edit whose sub-message carried no text.
    EmptySubMessage,
    /// Anything else.
    Generic,
}

impl std::fmt::Display for EmptyMessageCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::UnresolvedBot => "empty bot message (probably an unresolved incoming webhook)",
            Self::EmptySubMessage => "empty message with sub-message",
            Self::Generic => "empty message",
        };
        f.write_str(s)
    }
}

/// Errors that can occur in adapter operations.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// No viable transport configured, or an invalid option.
    #[error("configuration error: {0}")]
    Config(String),

    /// A channel could not be resolved.
    #[error("channel '{channel}' not found")]
    ChannelNotFound {
        /// The channel name or ID that failed to resolve.
        channel: String,
    },

    /// The adapter account is not a member of the channel.
    #[error("not a member of channel '{channel}', please add the integration manually")]
    ChannelNotMember {
        /// The channel name.
        channel: String,
    },

    /// Joining a channel failed.
    #[error("could not join channel: {0}")]
    Join(String),

    /// Message handling produced nothing worth relaying.
    #[error("message handling resulted in an {cause}")]
    EmptyMessage {
        /// What made the message empty.
        cause: EmptyMessageCause,
    },

    /// Downloading an inbound file failed.
    #[error("download of {url} failed: {reason}")]
    Download {
        /// File URL.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// A platform call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AdapterError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a channel-not-found error.
    pub fn channel_not_found(channel: impl Into<String>) -> Self {
        Self::ChannelNotFound {
            channel: channel.into(),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
