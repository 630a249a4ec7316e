//! The peer connection capability driven by the WHEP client.
//!
//! The client never implements WebRTC itself. It drives a [`PeerTransport`]
//! created by a [`TransportConnector`], and learns about everything the
//! transport does asynchronously through [`TransportEvent`]s delivered on the
//! channel handed to the connector.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::TransportConfig;
use crate::error::Result;
use crate::state::ConnectionState;

/// Media kind of a transceiver or inbound track.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Audio,
    /// Anything the client does not play back.
    Other(String),
}

impl MediaKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "video" => Self::Video,
            "audio" => Self::Audio,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Other(kind) => kind,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpType {
    Offer,
    Answer,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// An inbound media track owned by the platform media runtime.
pub trait RemoteTrack: Send + Sync + fmt::Debug + 'static {
    fn id(&self) -> String;
    fn kind(&self) -> MediaKind;
}

/// Events raised by a transport session.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    NegotiationNeeded,
    Track(Arc<dyn RemoteTrack>),
    ConnectionStateChanged(ConnectionState),
}

pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// A peer-connection-like object.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Adds a receive-only transceiver for `kind`.
    async fn add_recvonly_transceiver(&self, kind: MediaKind) -> Result<()>;

    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> Result<()>;

    /// The current local description, including any candidates gathered so far.
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()>;

    /// Subscribes to ICE gathering completion.
    ///
    /// Gathering is complete once the receiver yields a value or its channel
    /// closes. It must be requested before the local description is applied
    /// so the event cannot be missed.
    async fn gathering_complete(&self) -> mpsc::Receiver<()>;

    /// Closes the transport, releases media resources and unregisters every
    /// event handler. No events are sent after this returns.
    async fn close(&self) -> Result<()>;
}

/// Creates transport sessions.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    type Transport: PeerTransport;

    /// Builds a transport whose event handlers forward into `events`.
    ///
    /// Handlers are registered before this returns, so nothing the transport
    /// raises afterwards is lost.
    async fn connect(
        &self,
        config: &TransportConfig,
        events: TransportEvents,
    ) -> Result<Self::Transport>;
}
