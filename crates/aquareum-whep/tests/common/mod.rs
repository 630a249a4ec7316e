//! In-memory transport and signaling fakes for driving the client under a
//! paused tokio clock.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use aquareum_whep::{
    MediaKind, OutputStream, PeerTransport, PlaybackSink, RemoteTrack, Result, SessionDescription,
    SignalingClient, SignalingResponse, TransportConfig, TransportConnector, TransportEvent,
    TransportEvents, WhepError,
};

pub const OFFER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=recvonly\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=recvonly\r\n";
pub const ANSWER_SDP: &str = "v=0\r\no=- 2 2 IN IP4 10.0.0.1\r\ns=-\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=sendonly\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=sendonly\r\n";
pub const ENDPOINT: &str = "http://node.test/api/webrtc/live";

/// Lets spawned tasks run; the paused clock advances automatically.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherMode {
    /// Completion is signalled by dropping the sender, as webrtc-rs does.
    Immediate,
    Never,
    /// Drops the sender after the delay.
    After(Duration),
    /// Sends a value after the delay and keeps the channel open.
    SignalAfter(Duration),
}

#[derive(Debug)]
pub struct FakeTrack {
    pub id: String,
    pub kind: MediaKind,
}

impl FakeTrack {
    pub fn new(id: &str, kind: &str) -> Arc<dyn RemoteTrack> {
        Arc::new(Self {
            id: id.to_string(),
            kind: MediaKind::parse(kind),
        })
    }
}

impl RemoteTrack for FakeTrack {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind.clone()
    }
}

#[derive(Default)]
struct TransportInner {
    events: Option<TransportEvents>,
    transceivers: Vec<MediaKind>,
    local: Option<SessionDescription>,
    remote: Vec<SessionDescription>,
    pending_gathers: Vec<mpsc::Sender<()>>,
    remote_failures: usize,
    close_calls: usize,
}

/// Scripted peer connection. Clones share state.
#[derive(Clone)]
pub struct FakeTransport {
    inner: Arc<Mutex<TransportInner>>,
    gather: GatherMode,
    announce_negotiation: bool,
    lose_local_description: bool,
}

impl FakeTransport {
    pub fn new(gather: GatherMode) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TransportInner::default())),
            gather,
            announce_negotiation: true,
            lose_local_description: false,
        }
    }

    /// Local description disappears after it is applied.
    pub fn losing_local_description(mut self) -> Self {
        self.lose_local_description = true;
        self
    }

    /// The next `count` remote descriptions are rejected.
    pub fn rejecting_answers(self, count: usize) -> Self {
        self.inner.lock().unwrap().remote_failures = count;
        self
    }

    pub fn attach_events(&self, events: TransportEvents) {
        self.inner.lock().unwrap().events = Some(events);
    }

    /// Raises an event as the platform would. Returns false once unregistered.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match &self.inner.lock().unwrap().events {
            Some(events) => events.send(event).is_ok(),
            None => false,
        }
    }

    pub fn transceivers(&self) -> Vec<MediaKind> {
        self.inner.lock().unwrap().transceivers.clone()
    }

    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.inner.lock().unwrap().remote.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.inner.lock().unwrap().close_calls
    }

    pub fn has_listeners(&self) -> bool {
        self.inner.lock().unwrap().events.is_some()
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn add_recvonly_transceiver(&self, kind: MediaKind) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.transceivers.push(kind);
        if self.announce_negotiation {
            if let Some(events) = &inner.events {
                let _ = events.send(TransportEvent::NegotiationNeeded);
            }
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription> {
        Ok(SessionDescription::offer(OFFER_SDP))
    }

    async fn set_local_description(&self, description: SessionDescription) -> Result<()> {
        if !self.lose_local_description {
            self.inner.lock().unwrap().local = Some(description);
        }
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.inner.lock().unwrap().local.clone()
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.remote_failures > 0 {
            inner.remote_failures -= 1;
            return Err(WhepError::transport("SessionDescription is malformed"));
        }
        inner.remote.push(description);
        Ok(())
    }

    async fn gathering_complete(&self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        match self.gather {
            GatherMode::Immediate => drop(tx),
            GatherMode::Never => self.inner.lock().unwrap().pending_gathers.push(tx),
            GatherMode::After(delay) => {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    drop(tx);
                });
            }
            GatherMode::SignalAfter(delay) => {
                let pending = tx.clone();
                self.inner.lock().unwrap().pending_gathers.push(pending);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(()).await;
                });
            }
        }
        rx
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.close_calls += 1;
        inner.events = None;
        Ok(())
    }
}

/// Hands out the same [`FakeTransport`] for every connect.
pub struct FakeConnector {
    pub transport: FakeTransport,
}

#[async_trait]
impl TransportConnector for FakeConnector {
    type Transport = FakeTransport;

    async fn connect(
        &self,
        _config: &TransportConfig,
        events: TransportEvents,
    ) -> Result<FakeTransport> {
        self.transport.attach_events(events);
        Ok(self.transport.clone())
    }
}

#[derive(Debug, Clone)]
pub enum Reply {
    Created {
        location: Option<&'static str>,
        answer: &'static str,
    },
    Status(u16, &'static str),
    NetworkError,
}

impl Reply {
    pub fn created() -> Self {
        Reply::Created {
            location: Some("/api/webrtc/live/sessions/1"),
            answer: ANSWER_SDP,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Post {
    pub at: Instant,
    pub endpoint: String,
    pub body: String,
}

/// Scripted WHEP endpoint.
pub struct FakeSignaling {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    latency: Duration,
    posts: Mutex<Vec<Post>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: AtomicUsize,
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeSignaling {
    pub fn new(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            latency: Duration::ZERO,
            posts: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalingClient for FakeSignaling {
    async fn post_offer(&self, endpoint: &str, offer_sdp: &str) -> Result<SignalingResponse> {
        self.posts.lock().unwrap().push(Post {
            at: Instant::now(),
            endpoint: endpoint.to_string(),
            body: offer_sdp.to_string(),
        });
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _in_flight = InFlight(Arc::clone(&self.in_flight));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match reply {
            Reply::Created { location, answer } => Ok(SignalingResponse {
                status: 201,
                location: location.map(str::to_string),
                body: answer.to_string(),
            }),
            Reply::Status(status, body) => Ok(SignalingResponse {
                status,
                location: None,
                body: body.to_string(),
            }),
            Reply::NetworkError => Err(WhepError::signaling("connection refused")),
        }
    }
}

/// Records every stream attached to it.
#[derive(Default)]
pub struct RecordingSink {
    attached: Mutex<Vec<OutputStream>>,
}

impl RecordingSink {
    pub fn attach_count(&self) -> usize {
        self.attached.lock().unwrap().len()
    }

    pub fn attached(&self) -> Option<OutputStream> {
        self.attached.lock().unwrap().first().cloned()
    }
}

impl PlaybackSink for RecordingSink {
    fn attach(&self, stream: OutputStream) {
        self.attached.lock().unwrap().push(stream);
    }
}
