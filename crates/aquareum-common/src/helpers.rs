//! Common helper functions for Aquareum.

use thiserror::Error;
use url::Url;

/// Path prefix under which an Aquareum node serves WHEP endpoints.
pub const WHEP_API_PATH: &str = "api/webrtc";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("invalid node URL `{url}`: {reason}")]
    InvalidNodeUrl { url: String, reason: String },

    #[error("stream name must not be empty")]
    EmptyStream,
}

/// Builds the WHEP playback endpoint for `stream` on the node at `node_url`.
///
/// `https://node.example` + `live` gives `https://node.example/api/webrtc/live`.
/// A trailing slash on the node URL, or a path prefix, is preserved correctly.
pub fn whep_endpoint(node_url: &str, stream: &str) -> Result<Url, EndpointError> {
    let stream = stream.trim().trim_matches('/');
    if stream.is_empty() {
        return Err(EndpointError::EmptyStream);
    }

    let mut base = Url::parse(node_url.trim()).map_err(|e| EndpointError::InvalidNodeUrl {
        url: node_url.to_string(),
        reason: e.to_string(),
    })?;
    if base.cannot_be_a_base() {
        return Err(EndpointError::InvalidNodeUrl {
            url: node_url.to_string(),
            reason: "URL cannot carry a path".to_string(),
        });
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    base.join(&format!("{WHEP_API_PATH}/{stream}"))
        .map_err(|e| EndpointError::InvalidNodeUrl {
            url: node_url.to_string(),
            reason: e.to_string(),
        })
}
