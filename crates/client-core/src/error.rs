//! Error types and handling for the session core
//!
//! Every fatal failure of a connect attempt is reported as one of the
//! [`SessionError`] variants below, after the session has already been torn
//! down. None of them are retried internally.
//!
//! # Error Categories
//!
//! - **Permission** - the host refused camera/microphone access
//! - **Media** - local capture or the media engine failed
//! - **Signaling** - the offer/answer exchange failed (transport or protocol)
//! - **Negotiation** - candidate discovery did not settle in time
//! - **Connection** - the underlying connection reached a terminal state
//!
//! ## Basic Pattern
//!
//! ```rust,no_run
//! # use avatar_rtc_client_core::{SessionManager, SessionError};
//! # use std::sync::Arc;
//! # async fn example(manager: Arc<SessionManager>) {
//! match manager.try_connect().await {
//!     Ok(()) => println!("negotiated"),
//!     Err(e) if e.is_recoverable() => {
//!         eprintln!("transient {} failure: {}", e.category(), e);
//!         // The host decides whether and when to call connect() again
//!     }
//!     Err(e) => eprintln!("giving up: {}", e),
//! }
//! # }
//! ```

use thiserror::Error;

/// Result type alias for session-core operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors surfaced by the session manager and its components
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Permission denied: {operation}")]
    PermissionDenied { operation: String },

    #[error("Local media acquisition failed: {reason}")]
    MediaAcquisitionFailed { reason: String },

    /// The signaling request never produced a usable HTTP response
    #[error("Signaling transport error: {reason}")]
    SignalingTransport { reason: String },

    /// The signaling endpoint answered, but not with a usable description
    #[error("Signaling protocol error: {reason}")]
    SignalingProtocol { reason: String },

    #[error("Negotiation timed out after {duration_ms}ms waiting for {stage}")]
    NegotiationTimeout { stage: String, duration_ms: u64 },

    #[error("Connection failure: underlying connection is {state}")]
    ConnectionFailure { state: String },

    #[error("Media engine error: {reason}")]
    MediaEngine { reason: String },

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Invalid session state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The attempt was superseded by a teardown while it was suspended
    #[error("Negotiation cancelled: {reason}")]
    Cancelled { reason: String },
}

impl SessionError {
    pub fn permission_denied(operation: impl Into<String>) -> Self {
        Self::PermissionDenied { operation: operation.into() }
    }

    pub fn media_acquisition_failed(reason: impl Into<String>) -> Self {
        Self::MediaAcquisitionFailed { reason: reason.into() }
    }

    pub fn signaling_transport(reason: impl Into<String>) -> Self {
        Self::SignalingTransport { reason: reason.into() }
    }

    pub fn signaling_protocol(reason: impl Into<String>) -> Self {
        Self::SignalingProtocol { reason: reason.into() }
    }

    pub fn media_engine(reason: impl Into<String>) -> Self {
        Self::MediaEngine { reason: reason.into() }
    }

    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration { field: field.into(), reason: reason.into() }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled { reason: reason.into() }
    }

    /// Check if a fresh connect attempt has a reasonable chance of succeeding
    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::SignalingTransport { .. }
            | SessionError::NegotiationTimeout { .. }
            | SessionError::ConnectionFailure { .. } => true,

            SessionError::PermissionDenied { .. }
            | SessionError::InvalidConfiguration { .. }
            | SessionError::SignalingProtocol { .. } => false,

            _ => false,
        }
    }

    /// Teardown-driven cancellation is not a failure the host needs to see
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SessionError::Cancelled { .. })
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            SessionError::PermissionDenied { .. } => "permission",

            SessionError::MediaAcquisitionFailed { .. } | SessionError::MediaEngine { .. } => "media",

            SessionError::SignalingTransport { .. } | SessionError::SignalingProtocol { .. } => "signaling",

            SessionError::NegotiationTimeout { .. } | SessionError::Cancelled { .. } => "negotiation",

            SessionError::ConnectionFailure { .. } => "connection",

            SessionError::InvalidConfiguration { .. } => "configuration",

            SessionError::InvalidState { .. } => "state",
        }
    }
}
