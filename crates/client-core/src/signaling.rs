//! Offer/answer exchange with the avatar service
//!
//! One round trip per connect attempt: the complete local offer (candidates
//! included) is POSTed as JSON and the service replies with its answer and an
//! optional session id.
//!
//! ```text
//! POST /offer  {"sdp": "...", "type": "offer"}
//! 200 OK       {"sdp": "...", "type": "answer", "sessionid": "..."}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::engine::{SdpType, SessionDescription};
use crate::error::SessionError;

/// Response bodies longer than this are truncated in error messages
const MAX_ERROR_BODY: usize = 512;

pub type SignalingResult<T> = Result<T, SignalingError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignalingError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response body: {0}")]
    MalformedBody(String),

    #[error("response carries no session description")]
    MissingDescription,

    #[error("response carries no session id")]
    MissingSessionId,

    #[error("invalid signaling endpoint '{url}': {reason}")]
    InvalidEndpoint { url: String, reason: String },
}

impl From<SignalingError> for SessionError {
    fn from(err: SignalingError) -> Self {
        match err {
            SignalingError::Transport(_) | SignalingError::Timeout(_) => {
                SessionError::signaling_transport(err.to_string())
            }
            SignalingError::InvalidEndpoint { .. } => {
                SessionError::invalid_configuration("signaling_url", err.to_string())
            }
            SignalingError::Status { .. }
            | SignalingError::MalformedBody(_)
            | SignalingError::MissingDescription
            | SignalingError::MissingSessionId => SessionError::signaling_protocol(err.to_string()),
        }
    }
}

/// Request body
#[derive(Debug, Serialize)]
struct OfferRequest<'a> {
    sdp: &'a str,
    #[serde(rename = "type")]
    sdp_type: SdpType,
}

/// Response body, tolerant of the id spellings services use
#[derive(Debug, Deserialize)]
struct AnswerResponse {
    #[serde(default)]
    sdp: Option<String>,
    #[serde(default, rename = "type")]
    sdp_type: Option<String>,
    #[serde(default, alias = "sessionId", alias = "session_id")]
    sessionid: Option<serde_json::Value>,
}

/// What the service sent back
#[derive(Debug, Clone, PartialEq)]
pub struct SignalingAnswer {
    pub description: SessionDescription,
    pub session_id: Option<String>,
}

/// Parse a signaling response body
pub fn parse_answer(body: &str) -> SignalingResult<SignalingAnswer> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| SignalingError::MalformedBody(e.to_string()))?;
    // Derived struct deserializers also accept sequences by position
    if !value.is_object() {
        return Err(SignalingError::MalformedBody("expected a JSON object".to_string()));
    }
    let response: AnswerResponse =
        serde_json::from_value(value).map_err(|e| SignalingError::MalformedBody(e.to_string()))?;

    let sdp = match response.sdp {
        Some(sdp) if !sdp.trim().is_empty() => sdp,
        _ => return Err(SignalingError::MissingDescription),
    };

    let sdp_type = match response.sdp_type.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None | Some("answer") => SdpType::Answer,
        Some("pranswer") => SdpType::Pranswer,
        Some(other) => {
            return Err(SignalingError::MalformedBody(format!(
                "expected an answer, got description type '{}'",
                other
            )))
        }
    };

    let session_id = match response.sessionid {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Ok(SignalingAnswer {
        description: SessionDescription { sdp_type, sdp },
        session_id,
    })
}

/// The single round trip that turns a local offer into a remote answer
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    fn endpoint(&self) -> &str;

    async fn exchange(&self, offer: &SessionDescription) -> SignalingResult<SignalingAnswer>;
}

/// JSON-over-HTTP signaling client
#[derive(Debug, Clone)]
pub struct HttpSignalingClient {
    client: reqwest::Client,
    endpoint: url::Url,
    timeout: Duration,
}

impl HttpSignalingClient {
    pub fn new(endpoint: &str, timeout: Duration) -> SignalingResult<Self> {
        let invalid = |reason: String| SignalingError::InvalidEndpoint {
            url: endpoint.to_string(),
            reason,
        };

        let url = url::Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SignalingError::Transport(e.to_string()))?;

        Ok(Self { client, endpoint: url, timeout })
    }

    pub fn from_config(config: &SessionConfig) -> SignalingResult<Self> {
        Self::new(&config.signaling_url, config.signaling_timeout)
    }

    fn map_request_error(&self, e: reqwest::Error) -> SignalingError {
        if e.is_timeout() {
            SignalingError::Timeout(self.timeout)
        } else {
            SignalingError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl SignalingTransport for HttpSignalingClient {
    fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }

    async fn exchange(&self, offer: &SessionDescription) -> SignalingResult<SignalingAnswer> {
        debug!(
            endpoint = %self.endpoint,
            sdp_len = offer.sdp.len(),
            candidates = offer.candidate_count(),
            "Sending offer"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&OfferRequest {
                sdp: &offer.sdp,
                sdp_type: offer.sdp_type,
            })
            .send()
            .await
            .map_err(|e| self.map_request_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.map_request_error(e))?;

        if !status.is_success() {
            let mut body = body;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            warn!(endpoint = %self.endpoint, status = status.as_u16(), "Signaling endpoint rejected offer");
            return Err(SignalingError::Status { status: status.as_u16(), body });
        }

        let answer = parse_answer(&body)?;
        info!(
            endpoint = %self.endpoint,
            sdp_type = %answer.description.sdp_type,
            session_id = answer.session_id.as_deref().unwrap_or("<none>"),
            "Received answer"
        );
        Ok(answer)
    }
}
