//! Error types for the WHEP client.

use thiserror::Error;

use crate::state::ConnectionState;

/// Result type alias using the WHEP client's error type.
pub type Result<T> = std::result::Result<T, WhepError>;

#[derive(Debug, Clone, Error)]
pub enum WhepError {
    /// The peer connection rejected an operation
    #[error("transport error: {0}")]
    Transport(String),

    /// The signaling request failed before a status was received
    #[error("signaling error: {0}")]
    Signaling(String),

    /// The signaling endpoint answered 405; its URL needs updating
    #[error("signaling endpoint {endpoint} rejected the offer with HTTP {status}; update the WHEP URL")]
    StaleEndpoint { endpoint: String, status: u16 },

    /// No local description was available to send as the offer
    #[error("failed to gather ICE candidates for offer")]
    MissingLocalDescription,

    #[error("a negotiation attempt is already in flight")]
    NegotiationInProgress,

    #[error("invalid connection state transition {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl WhepError {
    pub fn transport(msg: impl std::fmt::Display) -> Self {
        Self::Transport(msg.to_string())
    }

    pub fn signaling(msg: impl std::fmt::Display) -> Self {
        Self::Signaling(msg.to_string())
    }

    pub fn config(msg: impl std::fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// Whether the negotiation loop should stop on this error instead of retrying.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::StaleEndpoint { .. }
                | Self::MissingLocalDescription
                | Self::NegotiationInProgress
                | Self::Config(_)
        )
    }
}

impl From<webrtc::Error> for WhepError {
    fn from(err: webrtc::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<reqwest::Error> for WhepError {
    fn from(err: reqwest::Error) -> Self {
        Self::Signaling(err.to_string())
    }
}
