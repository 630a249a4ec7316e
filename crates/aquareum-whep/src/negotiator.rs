//! Session negotiation: the WHEP offer/answer exchange.
//!
//! 1. Create the local offer for the receive-only transceivers and apply it.
//! 2. Wait for ICE gathering, bounded by `gather_timeout`; send whatever local
//!    description exists once the bound elapses.
//! 3. POST the offer to the endpoint until it is answered with `201 Created`,
//!    sleeping `retry_backoff` between attempts.
//!
//! The loop only ends on success, a terminal error, or the session closing.
//! Closing cancels whichever step is pending, including an in-flight request
//! or a backoff sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::NegotiationConfig;
use crate::error::{Result, WhepError};
use crate::signaling::{ResponseClass, SignalingClient};
use crate::state::{wait_closed, ConnectionState};
use crate::transport::{PeerTransport, SessionDescription};

/// Result of a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Established {
    /// SDP answer applied as the remote description, verbatim.
    pub answer_sdp: String,
    /// `Location` header of the 201 response, verbatim.
    pub resource_url: Option<String>,
    /// Number of POSTs it took.
    pub attempts: u32,
}

impl Established {
    /// Resolves a relative `Location` against the endpoint it was returned by.
    pub fn absolute_resource_url(&self, endpoint: &str) -> Option<Url> {
        let location = self.resource_url.as_deref()?;
        Url::parse(endpoint)
            .and_then(|base| base.join(location))
            .ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    Established(Established),
    /// The session closed before an answer was applied.
    Closed,
}

pub struct Negotiator<T: PeerTransport, S: SignalingClient> {
    transport: Arc<T>,
    signaling: Arc<S>,
    endpoint: String,
    config: NegotiationConfig,
    state: watch::Receiver<ConnectionState>,
    in_flight: AtomicBool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: PeerTransport, S: SignalingClient> Negotiator<T, S> {
    pub fn new(
        transport: Arc<T>,
        signaling: Arc<S>,
        endpoint: impl Into<String>,
        config: NegotiationConfig,
        state: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self {
            transport,
            signaling,
            endpoint: endpoint.into(),
            config,
            state,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Runs the offer/answer exchange to completion.
    ///
    /// Transient failures (network errors, unexpected statuses, unusable
    /// answers) are retried indefinitely. `Err` is returned only for terminal
    /// failures: the offer could not be produced, the endpoint is stale, or
    /// another negotiation is already running.
    pub async fn negotiate(&self) -> Result<NegotiationOutcome> {
        let _guard =
            InFlightGuard::acquire(&self.in_flight).ok_or(WhepError::NegotiationInProgress)?;

        let mut closed = self.state.clone();
        let already_closed = closed.borrow().is_closed();
        if already_closed {
            return Ok(NegotiationOutcome::Closed);
        }

        let offer = tokio::select! {
            biased;
            _ = wait_closed(&mut closed) => return Ok(NegotiationOutcome::Closed),
            offer = self.gather_offer() => offer?,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = wait_closed(&mut closed) => {
                    debug!("session closed during attempt {}; abandoning request", attempt);
                    return Ok(NegotiationOutcome::Closed);
                }
                result = self.exchange(&offer.sdp, attempt) => result,
            };

            match result {
                Ok(established) => {
                    info!(
                        "WHEP session established with {} after {} attempt(s)",
                        self.endpoint, attempt
                    );
                    return Ok(NegotiationOutcome::Established(established));
                }
                Err(err) if err.is_terminal() => return Err(err),
                Err(err) => warn!(
                    "WHEP attempt {} failed: {}; retrying in {:?}",
                    attempt, err, self.config.retry_backoff
                ),
            }

            tokio::select! {
                biased;
                _ = wait_closed(&mut closed) => {
                    debug!("session closed during backoff; not retrying");
                    return Ok(NegotiationOutcome::Closed);
                }
                _ = time::sleep(self.config.retry_backoff) => {}
            }
        }
    }

    async fn gather_offer(&self) -> Result<SessionDescription> {
        let mut gathered = self.transport.gathering_complete().await;

        let offer = self.transport.create_offer().await?;
        self.transport.set_local_description(offer).await?;

        tokio::select! {
            // webrtc-rs signals completion by dropping the sender.
            _ = gathered.recv() => debug!("ICE gathering complete"),
            _ = time::sleep(self.config.gather_timeout) => debug!(
                "ICE gathering still running after {:?}; sending current offer",
                self.config.gather_timeout
            ),
        }

        self.transport
            .local_description()
            .await
            .ok_or(WhepError::MissingLocalDescription)
    }

    async fn exchange(&self, offer_sdp: &str, attempt: u32) -> Result<Established> {
        debug!("POST offer to {} (attempt {})", self.endpoint, attempt);
        let response = self.signaling.post_offer(&self.endpoint, offer_sdp).await?;

        match response.classify() {
            ResponseClass::Created => {
                if response.body.trim().is_empty() {
                    return Err(WhepError::signaling("201 response carried no SDP answer"));
                }
                self.transport
                    .set_remote_description(SessionDescription::answer(response.body.clone()))
                    .await?;
                Ok(Established {
                    answer_sdp: response.body,
                    resource_url: response.location,
                    attempts: attempt,
                })
            }
            ResponseClass::StaleEndpoint => {
                warn!(
                    "{} answered HTTP 405; remember to update the URL passed into the WHEP client",
                    self.endpoint
                );
                if self.config.retry_on_stale_endpoint {
                    Err(WhepError::signaling("HTTP 405 Method Not Allowed"))
                } else {
                    Err(WhepError::StaleEndpoint {
                        endpoint: self.endpoint.clone(),
                        status: response.status,
                    })
                }
            }
            ResponseClass::Transient => Err(WhepError::signaling(format!(
                "HTTP {}: {}",
                response.status,
                response.body.trim()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn established(location: Option<&str>) -> Established {
        Established {
            answer_sdp: "v=0".to_string(),
            resource_url: location.map(str::to_string),
            attempts: 1,
        }
    }

    #[test]
    fn test_absolute_resource_url_resolves_relative_location() {
        let endpoint = "https://node.example/api/webrtc/live";
        let url = established(Some("/api/webrtc/live/session/42"))
            .absolute_resource_url(endpoint)
            .unwrap();
        assert_eq!(url.as_str(), "https://node.example/api/webrtc/live/session/42");

        let url = established(Some("https://edge.example/s/1"))
            .absolute_resource_url(endpoint)
            .unwrap();
        assert_eq!(url.as_str(), "https://edge.example/s/1");

        assert!(established(None).absolute_resource_url(endpoint).is_none());
    }

    #[test]
    fn test_in_flight_guard_is_exclusive() {
        let flag = AtomicBool::new(false);
        let guard = InFlightGuard::acquire(&flag).unwrap();
        assert!(InFlightGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(InFlightGuard::acquire(&flag).is_some());
    }
}
