//! WHEP (WebRTC-HTTP Egress Protocol) playback client.
//!
//! Opens a receive-only WebRTC session against a WHEP endpoint, posts the SDP
//! offer over HTTP until the server answers, and collects the inbound audio
//! and video tracks into a single stream for a playback sink.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use aquareum_whep::{HttpSignaling, OutputStream, PlaybackSink, RtcConnector, WhepConfig, WhepSession};
//!
//! struct Sink;
//!
//! impl PlaybackSink for Sink {
//!     fn attach(&self, stream: OutputStream) {
//!         println!("playing {} track(s)", stream.len());
//!     }
//! }
//!
//! # async fn run() -> aquareum_whep::Result<()> {
//! let config = WhepConfig::default();
//! let signaling = Arc::new(HttpSignaling::new(config.request_timeout)?);
//! let session = WhepSession::open(
//!     &RtcConnector,
//!     signaling,
//!     "https://node.example/api/webrtc/live",
//!     Arc::new(Sink),
//!     &config,
//! )
//! .await?;
//! // ...
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod negotiator;
pub mod rtc;
pub mod session;
pub mod signaling;
pub mod state;
pub mod tracks;
pub mod transport;

pub use config::{IceServer, NegotiationConfig, TransportConfig, WhepConfig};
pub use error::{Result, WhepError};
pub use negotiator::{Established, NegotiationOutcome, Negotiator};
pub use rtc::{RtcConnector, RtcTrack, RtcTransport};
pub use session::{PlaybackSink, WhepSession};
pub use signaling::{HttpSignaling, ResponseClass, SignalingClient, SignalingResponse};
pub use state::{ConnectionState, SessionState};
pub use tracks::{OutputStream, TrackCollector, TrackDisposition};
pub use transport::{
    MediaKind, PeerTransport, RemoteTrack, SdpType, SessionDescription, TransportConnector,
    TransportEvent, TransportEvents,
};
