//! Connection state of a transport session.
//!
//! The platform transport drives the transitions:
//!
//! ```text
//! new -> connecting -> connected
//!          |              |
//!          v              v
//!        failed        disconnected -> connecting
//!          |              |
//!          v              v
//!              closed (terminal)
//! ```
//!
//! Every update goes through [`SessionState::transition`], which rejects moves
//! the diagram does not allow. `closed` is reachable from anywhere and is never
//! left again.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{Result, WhepError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        }
    }

    /// Whether the transport may move from `self` to `next`.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (from, to) if from == to => true,
            (New, Connecting | Failed) => true,
            (Connecting, Connected | Disconnected | Failed) => true,
            (Connected, Disconnected | Failed) => true,
            // ICE may recover on its own, with or without a visible connecting phase.
            (Disconnected, Connecting | Connected | Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, observable connection state of one transport session.
#[derive(Debug)]
pub struct SessionState {
    tx: watch::Sender<ConnectionState>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::New);
        Self { tx }
    }

    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.current().is_closed()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Applies a transition reported by the transport.
    ///
    /// Returns `Ok(true)` if the state changed, `Ok(false)` if it was already
    /// `next`.
    pub fn transition(&self, next: ConnectionState) -> Result<bool> {
        let mut outcome = Ok(false);
        self.tx.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            if !current.can_transition_to(next) {
                outcome = Err(WhepError::InvalidTransition {
                    from: *current,
                    to: next,
                });
                return false;
            }
            *current = next;
            outcome = Ok(true);
            true
        });
        outcome
    }

    /// Moves to `closed`. Returns `true` only for the call that closed the session.
    pub fn close(&self) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_closed() {
                return false;
            }
            *current = ConnectionState::Closed;
            true
        })
    }
}

/// Resolves once the observed state is `closed`, or the session state is dropped.
pub async fn wait_closed(rx: &mut watch::Receiver<ConnectionState>) {
    let _ = rx.wait_for(|state| state.is_closed()).await;
}
