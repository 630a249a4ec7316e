//! WHEP signaling over HTTP.
//!
//! One exchange is a `POST` of the raw SDP offer with
//! `content-type: application/sdp`. A `201 Created` carries the SDP answer in
//! its body and the session resource in its `Location` header.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use tracing::debug;

use crate::error::{Result, WhepError};

pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// Raw outcome of one signaling request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingResponse {
    pub status: u16,
    pub location: Option<String>,
    pub body: String,
}

/// How the negotiator should treat a signaling response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 201: the body is the SDP answer.
    Created,
    /// 405: the endpoint URL is wrong for this operation.
    StaleEndpoint,
    /// Anything else: worth another attempt after backing off.
    Transient,
}

impl SignalingResponse {
    pub fn classify(&self) -> ResponseClass {
        match self.status {
            201 => ResponseClass::Created,
            405 => ResponseClass::StaleEndpoint,
            _ => ResponseClass::Transient,
        }
    }
}

/// Minimal HTTP capability needed for the WHEP exchange.
#[async_trait]
pub trait SignalingClient: Send + Sync + 'static {
    /// POSTs `offer_sdp` to `endpoint`.
    ///
    /// Any HTTP status is a successful return; `Err` means no response was
    /// obtained (connection failure, timeout, unreadable body).
    async fn post_offer(&self, endpoint: &str, offer_sdp: &str) -> Result<SignalingResponse>;
}

/// [`SignalingClient`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpSignaling {
    client: reqwest::Client,
}

impl HttpSignaling {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SignalingClient for HttpSignaling {
    async fn post_offer(&self, endpoint: &str, offer_sdp: &str) -> Result<SignalingResponse> {
        debug!("POST {} ({} bytes of SDP)", endpoint, offer_sdp.len());

        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
            .body(offer_sdp.to_owned())
            .send()
            .await?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .text()
            .await
            .map_err(|e| WhepError::signaling(format!("failed to read response body: {e}")))?;

        Ok(SignalingResponse {
            status,
            location,
            body,
        })
    }
}
