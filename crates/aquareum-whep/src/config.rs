use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default upper bound on the ICE gathering wait before the offer is sent anyway.
pub const DEFAULT_GATHER_TIMEOUT: Duration = Duration::from_secs(1);
/// Default pause between failed signaling attempts.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);
/// Default bound on a single signaling POST.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Top-level configuration for a WHEP playback session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhepConfig {
    pub negotiation: NegotiationConfig,
    pub transport: TransportConfig,
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    #[serde(with = "duration_ms")]
    pub gather_timeout: Duration,
    #[serde(with = "duration_ms")]
    pub retry_backoff: Duration,
    /// Keep retrying after HTTP 405 instead of failing with `StaleEndpoint`.
    pub retry_on_stale_endpoint: bool,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            gather_timeout: DEFAULT_GATHER_TIMEOUT,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            retry_on_stale_endpoint: false,
        }
    }
}

/// Peer connection settings.
///
/// No STUN server is configured by default; candidates come from local
/// interfaces only. Add `stun:` or `turn:` URLs to reach peers behind NAT.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub ice_servers: Vec<IceServer>,
    /// Bundle all media over a single transport (`max-bundle`).
    pub bundle_max: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            bundle_max: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            ..Default::default()
        }
    }
}

impl WhepConfig {
    pub fn with_ice_server(mut self, server: IceServer) -> Self {
        self.transport.ice_servers.push(server);
        self
    }
}

impl Default for WhepConfig {
    fn default() -> Self {
        Self {
            negotiation: NegotiationConfig::default(),
            transport: TransportConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
