//! [`PeerTransport`] on top of webrtc-rs.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::policy::bundle_policy::RTCBundlePolicy;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_remote::TrackRemote;

use crate::config::TransportConfig;
use crate::error::{Result, WhepError};
use crate::state::ConnectionState;
use crate::transport::{
    MediaKind, PeerTransport, RemoteTrack, SdpType, SessionDescription, TransportConnector,
    TransportEvent, TransportEvents,
};

/// Builds webrtc-rs peer connections with the default codecs and interceptors.
#[derive(Debug, Clone, Copy, Default)]
pub struct RtcConnector;

pub struct RtcTransport {
    pc: RTCPeerConnection,
}

/// An inbound webrtc-rs track.
#[derive(Clone)]
pub struct RtcTrack {
    track: Arc<TrackRemote>,
}

impl RtcTrack {
    /// The underlying track, for sinks that read RTP from it.
    pub fn remote(&self) -> &Arc<TrackRemote> {
        &self.track
    }
}

impl fmt::Debug for RtcTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtcTrack")
            .field("id", &self.track.id())
            .field("kind", &self.track.kind())
            .field("ssrc", &self.track.ssrc())
            .finish()
    }
}

impl RemoteTrack for RtcTrack {
    fn id(&self) -> String {
        self.track.id()
    }

    fn kind(&self) -> MediaKind {
        match self.track.kind() {
            RTPCodecType::Video => MediaKind::Video,
            RTPCodecType::Audio => MediaKind::Audio,
            other => MediaKind::Other(other.to_string()),
        }
    }
}

fn connection_state(state: RTCPeerConnectionState) -> Option<ConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(ConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

fn codec_type(kind: &MediaKind) -> Result<RTPCodecType> {
    match kind {
        MediaKind::Video => Ok(RTPCodecType::Video),
        MediaKind::Audio => Ok(RTPCodecType::Audio),
        MediaKind::Other(kind) => Err(WhepError::transport(format!(
            "cannot add a transceiver for media kind `{kind}`"
        ))),
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription> {
    let parsed = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp)?,
        SdpType::Answer => RTCSessionDescription::answer(description.sdp)?,
    };
    Ok(parsed)
}

fn from_rtc(description: RTCSessionDescription) -> SessionDescription {
    match description.sdp_type {
        RTCSdpType::Answer | RTCSdpType::Pranswer => SessionDescription::answer(description.sdp),
        _ => SessionDescription::offer(description.sdp),
    }
}

#[async_trait]
impl TransportConnector for RtcConnector {
    type Transport = RtcTransport;

    async fn connect(
        &self,
        config: &TransportConfig,
        events: TransportEvents,
    ) -> Result<RtcTransport> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            bundle_policy: if config.bundle_max {
                RTCBundlePolicy::MaxBundle
            } else {
                RTCBundlePolicy::Balanced
            },
            ..Default::default()
        };

        let pc = api.new_peer_connection(rtc_config).await?;
        let transport = RtcTransport { pc };
        transport.register_handlers(events);
        Ok(transport)
    }
}

impl RtcTransport {
    fn register_handlers(&self, events: TransportEvents) {
        let tx = events.clone();
        self.pc.on_negotiation_needed(Box::new(move || {
            let _ = tx.send(TransportEvent::NegotiationNeeded);
            Box::pin(async {})
        }));

        let tx = events.clone();
        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let _ = tx.send(TransportEvent::Track(Arc::new(RtcTrack { track })));
            Box::pin(async {})
        }));

        let tx = events;
        self.pc
            .on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
                if let Some(state) = connection_state(state) {
                    let _ = tx.send(TransportEvent::ConnectionStateChanged(state));
                }
                Box::pin(async {})
            }));
    }

    /// Replaces every handler with a no-op, dropping the event senders.
    fn unregister_handlers(&self) {
        self.pc.on_negotiation_needed(Box::new(|| Box::pin(async {})));
        self.pc
            .on_track(Box::new(|_track, _receiver, _transceiver| Box::pin(async {})));
        self.pc
            .on_peer_connection_state_change(Box::new(|_state| Box::pin(async {})));
    }
}

#[async_trait]
impl PeerTransport for RtcTransport {
    async fn add_recvonly_transceiver(&self, kind: MediaKind) -> Result<()> {
        let codec = codec_type(&kind)?;
        self.pc
            .add_transceiver_from_kind(
                codec,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await?;
        debug!("added recvonly {} transceiver", kind);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await?;
        Ok(from_rtc(offer))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        self.pc.set_local_description(to_rtc(description)?).await?;
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.map(from_rtc)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        self.pc.set_remote_description(to_rtc(description)?).await?;
        Ok(())
    }

    async fn gathering_complete(&self) -> mpsc::Receiver<()> {
        self.pc.gathering_complete_promise().await
    }

    async fn close(&self) -> Result<()> {
        self.unregister_handlers();
        self.pc.close().await?;
        Ok(())
    }
}
