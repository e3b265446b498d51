//! Media engine backed by the `webrtc` crate

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine as RtcMediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::{
    EngineEvent, EngineEventSender, IceGatheringState, MediaEngine, PeerConnection, PeerConnectionConfig,
    PeerConnectionState, SdpType, SessionDescription, TransceiverDirection,
};
use crate::config::OfferOptions;
use crate::error::{SessionError, SessionResult};
use crate::media::{MediaKind, MediaTrack};

fn engine_error(context: &str, e: impl std::fmt::Display) -> SessionError {
    SessionError::media_engine(format!("{}: {}", context, e))
}

fn codec_type(kind: MediaKind) -> RTPCodecType {
    match kind {
        MediaKind::Audio => RTPCodecType::Audio,
        MediaKind::Video => RTPCodecType::Video,
    }
}

fn direction(direction: TransceiverDirection) -> RTCRtpTransceiverDirection {
    match direction {
        TransceiverDirection::SendRecv => RTCRtpTransceiverDirection::Sendrecv,
        TransceiverDirection::SendOnly => RTCRtpTransceiverDirection::Sendonly,
        TransceiverDirection::RecvOnly => RTCRtpTransceiverDirection::Recvonly,
        TransceiverDirection::Inactive => RTCRtpTransceiverDirection::Inactive,
    }
}

fn connection_state(state: RTCPeerConnectionState) -> Option<PeerConnectionState> {
    match state {
        RTCPeerConnectionState::New => Some(PeerConnectionState::New),
        RTCPeerConnectionState::Connecting => Some(PeerConnectionState::Connecting),
        RTCPeerConnectionState::Connected => Some(PeerConnectionState::Connected),
        RTCPeerConnectionState::Disconnected => Some(PeerConnectionState::Disconnected),
        RTCPeerConnectionState::Failed => Some(PeerConnectionState::Failed),
        RTCPeerConnectionState::Closed => Some(PeerConnectionState::Closed),
        RTCPeerConnectionState::Unspecified => None,
    }
}

fn to_rtc_description(description: SessionDescription) -> SessionResult<RTCSessionDescription> {
    let sdp = description.sdp;
    let parsed = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(sdp),
        SdpType::Answer => RTCSessionDescription::answer(sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(sdp),
        SdpType::Rollback => {
            return Err(SessionError::media_engine("rollback descriptions are not supported"));
        }
    };
    parsed.map_err(|e| engine_error("invalid session description", e))
}

fn from_rtc_description(description: RTCSessionDescription) -> Option<SessionDescription> {
    let sdp_type = match description.sdp_type {
        RTCSdpType::Offer => SdpType::Offer,
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        RTCSdpType::Unspecified => return None,
    };
    Some(SessionDescription { sdp_type, sdp: description.sdp })
}

/// Production engine: default codecs and interceptors, unified plan
pub struct WebRtcEngine {
    api: API,
}

impl WebRtcEngine {
    pub fn new() -> SessionResult<Self> {
        let mut media_engine = RtcMediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| engine_error("failed to register codecs", e))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| engine_error("failed to register interceptors", e))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api })
    }
}

impl std::fmt::Debug for WebRtcEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebRtcEngine").finish_non_exhaustive()
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    fn name(&self) -> &str {
        "webrtc-rs"
    }

    async fn create_peer_connection(
        &self,
        config: &PeerConnectionConfig,
        events: EngineEventSender,
    ) -> SessionResult<Box<dyn PeerConnection>> {
        let rtc_config = RTCConfiguration {
            ice_servers: config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone().unwrap_or_default(),
                    credential: server.credential.clone().unwrap_or_default(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        };

        let pc = Arc::new(
            self.api
                .new_peer_connection(rtc_config)
                .await
                .map_err(|e| engine_error("failed to create peer connection", e))?,
        );

        let tx = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            if let Some(state) = connection_state(state) {
                let _ = tx.send(EngineEvent::ConnectionStateChanged(state));
            }
            Box::pin(async {})
        }));

        let tx = events.clone();
        pc.on_ice_gathering_state_change(Box::new(move |state: RTCIceGathererState| {
            let mapped = match state {
                RTCIceGathererState::New => Some(IceGatheringState::New),
                RTCIceGathererState::Gathering => Some(IceGatheringState::Gathering),
                RTCIceGathererState::Complete => Some(IceGatheringState::Complete),
                _ => None,
            };
            if let Some(mapped) = mapped {
                let _ = tx.send(EngineEvent::IceGatheringStateChanged(mapped));
            }
            Box::pin(async {})
        }));

        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate| {
            let candidate = candidate.and_then(|c| match c.to_json() {
                Ok(init) => Some(init.candidate),
                Err(e) => {
                    warn!(error = %e, "Failed to serialize local candidate");
                    None
                }
            });
            let _ = tx.send(EngineEvent::IceCandidate(candidate));
            Box::pin(async {})
        }));

        let tx = events;
        pc.on_track(Box::new(move |track: Arc<TrackRemote>, _, _| {
            let kind = match track.kind() {
                RTPCodecType::Audio => Some(MediaKind::Audio),
                RTPCodecType::Video => Some(MediaKind::Video),
                _ => None,
            };
            match kind {
                Some(kind) => {
                    let id = track.id();
                    let id = if id.is_empty() { format!("{}-{}", kind, track.ssrc()) } else { id };
                    let _ = tx.send(EngineEvent::Track(MediaTrack::with_label(id, kind, track.stream_id())));
                }
                None => debug!(ssrc = track.ssrc(), "Ignoring remote track of unknown kind"),
            }
            Box::pin(async {})
        }));

        Ok(Box::new(WebRtcPeerConnection { pc }))
    }
}

struct WebRtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerConnection for WebRtcPeerConnection {
    async fn add_transceiver(&self, kind: MediaKind, dir: TransceiverDirection) -> SessionResult<()> {
        self.pc
            .add_transceiver_from_kind(
                codec_type(kind),
                Some(RTCRtpTransceiverInit {
                    direction: direction(dir),
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| engine_error("failed to add transceiver", e))?;
        Ok(())
    }

    async fn add_track(&self, track: &MediaTrack) -> SessionResult<()> {
        let capability = match track.kind() {
            MediaKind::Audio => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48000,
                channels: 2,
                ..Default::default()
            },
            MediaKind::Video => RTCRtpCodecCapability {
                mime_type: MIME_TYPE_VP8.to_owned(),
                clock_rate: 90000,
                ..Default::default()
            },
        };

        let local = Arc::new(TrackLocalStaticSample::new(
            capability,
            track.id().to_owned(),
            track.label().to_owned(),
        ));
        self.pc
            .add_track(local as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| engine_error("failed to add local track", e))?;
        Ok(())
    }

    async fn create_offer(&self, options: &OfferOptions) -> SessionResult<SessionDescription> {
        let offer = self
            .pc
            .create_offer(Some(RTCOfferOptions {
                voice_activity_detection: options.voice_activity_detection,
                ice_restart: false,
            }))
            .await
            .map_err(|e| engine_error("failed to create offer", e))?;

        from_rtc_description(offer).ok_or_else(|| SessionError::media_engine("engine produced an untyped offer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> SessionResult<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_local_description(description)
            .await
            .map_err(|e| engine_error("failed to set local description", e))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.and_then(from_rtc_description)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> SessionResult<()> {
        let description = to_rtc_description(description)?;
        self.pc
            .set_remote_description(description)
            .await
            .map_err(|e| engine_error("failed to set remote description", e))
    }

    fn ice_gathering_state(&self) -> IceGatheringState {
        match self.pc.ice_gathering_state() {
            RTCIceGatheringState::Complete => IceGatheringState::Complete,
            RTCIceGatheringState::Gathering => IceGatheringState::Gathering,
            _ => IceGatheringState::New,
        }
    }

    fn connection_state(&self) -> PeerConnectionState {
        connection_state(self.pc.connection_state()).unwrap_or(PeerConnectionState::New)
    }

    async fn close(&self) -> SessionResult<()> {
        self.pc
            .close()
            .await
            .map_err(|e| engine_error("failed to close peer connection", e))
    }
}
