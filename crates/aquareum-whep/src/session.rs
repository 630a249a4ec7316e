//! Connection lifecycle: owns the transport and wires the collector and the
//! negotiator to its events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::WhepConfig;
use crate::error::{Result, WhepError};
use crate::negotiator::{Established, NegotiationOutcome, Negotiator};
use crate::signaling::SignalingClient;
use crate::state::{wait_closed, ConnectionState, SessionState};
use crate::tracks::{OutputStream, TrackCollector};
use crate::transport::{MediaKind, PeerTransport, TransportConnector, TransportEvent};

/// Playback surface the output stream is handed to.
pub trait PlaybackSink: Send + Sync + 'static {
    /// Called once, the first time the session reaches `connected`.
    fn attach(&self, stream: OutputStream);
}

/// A live WHEP playback session.
///
/// Dropping the session closes it; prefer [`WhepSession::close`] so transport
/// teardown errors can be observed.
pub struct WhepSession<T: PeerTransport, S: SignalingClient> {
    shared: Arc<Shared<T, S>>,
}

struct Shared<T: PeerTransport, S: SignalingClient> {
    transport: Arc<T>,
    negotiator: Negotiator<T, S>,
    collector: TrackCollector,
    state: SessionState,
    sink: Arc<dyn PlaybackSink>,
    attached: AtomicBool,
    established: Mutex<Option<Established>>,
    failure: watch::Sender<Option<WhepError>>,
    tasks: Mutex<Tasks>,
}

#[derive(Default)]
struct Tasks {
    events: Option<JoinHandle<()>>,
    negotiation: Option<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: PeerTransport, S: SignalingClient> WhepSession<T, S> {
    /// Opens a receive-only session against `endpoint`.
    ///
    /// Event handlers are wired before the video and audio transceivers are
    /// added, so the transport's first "negotiation needed" starts the exchange.
    pub async fn open<C>(
        connector: &C,
        signaling: Arc<S>,
        endpoint: impl Into<String>,
        sink: Arc<dyn PlaybackSink>,
        config: &WhepConfig,
    ) -> Result<Self>
    where
        C: TransportConnector<Transport = T>,
    {
        let endpoint = endpoint.into();
        Url::parse(&endpoint)
            .map_err(|e| WhepError::config(format!("invalid WHEP endpoint `{endpoint}`: {e}")))?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(connector.connect(&config.transport, events_tx).await?);
        let state = SessionState::new();
        let negotiator = Negotiator::new(
            Arc::clone(&transport),
            signaling,
            endpoint,
            config.negotiation.clone(),
            state.subscribe(),
        );

        let shared = Arc::new(Shared {
            transport,
            negotiator,
            collector: TrackCollector::default(),
            state,
            sink,
            attached: AtomicBool::new(false),
            established: Mutex::new(None),
            failure: watch::channel(None).0,
            tasks: Mutex::new(Tasks::default()),
        });
        let events = tokio::spawn(run_events(Arc::clone(&shared), events_rx));
        lock(&shared.tasks).events = Some(events);

        let session = Self { shared };
        for kind in [MediaKind::Video, MediaKind::Audio] {
            if let Err(err) = session.shared.transport.add_recvonly_transceiver(kind).await {
                if let Err(close_err) = session.close().await {
                    warn!("failed to close half-open WHEP session: {}", close_err);
                }
                return Err(err);
            }
        }

        info!("opened WHEP session for {}", session.endpoint());
        Ok(session)
    }

    pub fn endpoint(&self) -> &str {
        self.shared.negotiator.endpoint()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.current()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.is_closed()
    }

    /// The stream tracks are collected into, whether or not it is attached yet.
    pub fn stream(&self) -> OutputStream {
        self.shared.collector.stream().clone()
    }

    pub fn is_negotiating(&self) -> bool {
        self.shared.negotiator.is_in_flight()
    }

    /// The most recent successful exchange, if any.
    pub fn established(&self) -> Option<Established> {
        lock(&self.shared.established).clone()
    }

    /// The error that ended negotiation, if it stopped without an answer.
    pub fn failure(&self) -> Option<WhepError> {
        self.shared.failure.borrow().clone()
    }

    pub fn failures(&self) -> watch::Receiver<Option<WhepError>> {
        self.shared.failure.subscribe()
    }

    /// Tears the session down. Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        if !self.shared.begin_close() {
            return Ok(());
        }
        if let Some(events) = lock(&self.shared.tasks).events.take() {
            events.abort();
        }
        info!("closing WHEP session for {}", self.endpoint());
        self.shared.transport.close().await
    }
}

impl<T: PeerTransport, S: SignalingClient> Drop for WhepSession<T, S> {
    fn drop(&mut self) {
        if !self.shared.begin_close() {
            return;
        }
        if let Some(events) = lock(&self.shared.tasks).events.take() {
            events.abort();
        }
        let transport = Arc::clone(&self.shared.transport);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = transport.close().await {
                        warn!("failed to close dropped WHEP session: {}", err);
                    }
                });
            }
            Err(_) => warn!("WHEP session dropped outside a runtime; transport left open"),
        }
    }
}

impl<T: PeerTransport, S: SignalingClient> Shared<T, S> {
    /// Marks the session closed and stops everything that could still act on it.
    ///
    /// Returns `false` if the session was already closed.
    fn begin_close(&self) -> bool {
        if !self.state.close() {
            return false;
        }
        self.collector.stop();
        if let Some(negotiation) = lock(&self.tasks).negotiation.take() {
            negotiation.abort();
        }
        true
    }

    fn start_negotiation(self: &Arc<Self>) {
        if self.state.is_closed() {
            return;
        }

        let mut tasks = lock(&self.tasks);
        let running = tasks
            .negotiation
            .as_ref()
            .is_some_and(|handle| !handle.is_finished());
        if running || self.negotiator.is_in_flight() {
            debug!("negotiation already in flight; ignoring negotiationneeded");
            return;
        }

        let shared = Arc::clone(self);
        tasks.negotiation = Some(tokio::spawn(async move {
            match shared.negotiator.negotiate().await {
                Ok(NegotiationOutcome::Established(established)) => {
                    *lock(&shared.established) = Some(established);
                    shared.failure.send_if_modified(|failure| failure.take().is_some());
                }
                Ok(NegotiationOutcome::Closed) => debug!("negotiation ended by close"),
                Err(err) => {
                    error!(
                        "WHEP negotiation with {} failed: {}",
                        shared.negotiator.endpoint(),
                        err
                    );
                    shared.failure.send_replace(Some(err));
                }
            }
        }));
    }

    fn on_state_change(&self, next: ConnectionState) {
        match self.state.transition(next) {
            Ok(true) => info!("connection state -> {}", next),
            Ok(false) => {}
            Err(err) => {
                warn!("{}", err);
                return;
            }
        }

        if next == ConnectionState::Connected && !self.attached.swap(true, Ordering::AcqRel) {
            debug!("attaching output stream to playback sink");
            self.sink.attach(self.collector.stream().clone());
        }
    }
}

async fn run_events<T: PeerTransport, S: SignalingClient>(
    shared: Arc<Shared<T, S>>,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
) {
    let mut closed = shared.state.subscribe();
    loop {
        let event = tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    debug!("transport event channel closed");
                    break;
                }
            },
        };

        match event {
            TransportEvent::NegotiationNeeded => shared.start_negotiation(),
            TransportEvent::Track(track) => {
                shared.collector.on_track(track);
            }
            TransportEvent::ConnectionStateChanged(ConnectionState::Closed) => {
                // The transport closed underneath us; finish the teardown here.
                if shared.begin_close() {
                    info!("transport closed; tearing down WHEP session");
                    if let Err(err) = shared.transport.close().await {
                        warn!("failed to close transport: {}", err);
                    }
                }
                break;
            }
            TransportEvent::ConnectionStateChanged(next) => shared.on_state_change(next),
        }
    }
}
