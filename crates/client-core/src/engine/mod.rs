//! Media engine abstraction
//!
//! The session core never talks to a WebRTC stack directly. It drives a
//! [`PeerConnection`] created by a [`MediaEngine`], and the engine reports
//! asynchronous happenings (state changes, candidates, remote tracks) as
//! [`EngineEvent`]s on the channel handed to it at creation time.
//!
//! The production engine lives in [`webrtc_impl`] behind the `webrtc-engine`
//! feature; tests supply scripted engines.

#[cfg(feature = "webrtc-engine")]
pub mod webrtc_impl;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::{IceServerConfig, OfferOptions};
use crate::error::{SessionError, SessionResult};
use crate::media::{MediaKind, MediaTrack};

#[cfg(feature = "webrtc-engine")]
pub use webrtc_impl::WebRtcEngine;

/// Kind of a session description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Pranswer,
    Answer,
    Rollback,
}

impl SdpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Pranswer => "pranswer",
            SdpType::Answer => "answer",
            SdpType::Rollback => "rollback",
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SdpType {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "offer" => Ok(SdpType::Offer),
            "pranswer" => Ok(SdpType::Pranswer),
            "answer" => Ok(SdpType::Answer),
            "rollback" => Ok(SdpType::Rollback),
            other => Err(SessionError::signaling_protocol(format!("unknown description type '{}'", other))),
        }
    }
}

/// Textual session description plus its kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: SdpType::Answer, sdp: sdp.into() }
    }

    /// Number of `a=candidate` lines carried in the description body
    pub fn candidate_count(&self) -> usize {
        self.sdp.lines().filter(|l| l.starts_with("a=candidate")).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransceiverDirection {
    SendRecv,
    SendOnly,
    RecvOnly,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

/// Connection state as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for PeerConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerConnectionState::New => "new",
            PeerConnectionState::Connecting => "connecting",
            PeerConnectionState::Connected => "connected",
            PeerConnectionState::Disconnected => "disconnected",
            PeerConnectionState::Failed => "failed",
            PeerConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Peer connection construction parameters
#[derive(Debug, Clone, Default)]
pub struct PeerConnectionConfig {
    pub ice_servers: Vec<IceServerConfig>,
}

/// Asynchronous notification from an engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    ConnectionStateChanged(PeerConnectionState),
    IceGatheringStateChanged(IceGatheringState),
    /// A discovered candidate; `None` marks the end of discovery
    IceCandidate(Option<String>),
    Track(MediaTrack),
}

pub type EngineEventSender = mpsc::UnboundedSender<EngineEvent>;
pub type EngineEventReceiver = mpsc::UnboundedReceiver<EngineEvent>;

/// Factory for peer connections
#[async_trait]
pub trait MediaEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Create a connection that reports its events on `events`
    async fn create_peer_connection(
        &self,
        config: &PeerConnectionConfig,
        events: EngineEventSender,
    ) -> SessionResult<Box<dyn PeerConnection>>;
}

/// One underlying WebRTC connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_transceiver(&self, kind: MediaKind, direction: TransceiverDirection) -> SessionResult<()>;

    /// Attach a locally captured track as a send line
    async fn add_track(&self, track: &MediaTrack) -> SessionResult<()>;

    async fn create_offer(&self, options: &OfferOptions) -> SessionResult<SessionDescription>;

    async fn set_local_description(&self, description: SessionDescription) -> SessionResult<()>;

    /// Current local description, including any candidates gathered so far
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn set_remote_description(&self, description: SessionDescription) -> SessionResult<()>;

    fn ice_gathering_state(&self) -> IceGatheringState;

    fn connection_state(&self) -> PeerConnectionState;

    async fn close(&self) -> SessionResult<()>;
}
