//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use avatar_rtc_client_core::audio::{AudioPlatform, AudioPlatformResult};
use avatar_rtc_client_core::config::{AudioSessionProfile, MediaConstraints, OfferOptions};
use avatar_rtc_client_core::engine::{
    EngineEvent, EngineEventSender, IceGatheringState, MediaEngine, PeerConnection, PeerConnectionConfig,
    PeerConnectionState, SessionDescription, TransceiverDirection,
};
use avatar_rtc_client_core::events::SessionEventHandler;
use avatar_rtc_client_core::media::{AggregateStream, LocalMedia};
use avatar_rtc_client_core::platform::{MediaPermission, MediaSource, PermissionGrant, PermissionProvider};
use avatar_rtc_client_core::signaling::{SignalingAnswer, SignalingError, SignalingResult, SignalingTransport};
use avatar_rtc_client_core::{
    ConnectionStateInfo, ControllerState, MediaKind, MediaTrack, RemoteStreamInfo, SessionError,
};

pub const OFFER_SDP: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\nm=video 9 UDP/TLS/RTP/SAVPF 96\r\na=recvonly\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=recvonly\r\n";
pub const CANDIDATE_LINE: &str = "a=candidate:1 1 udp 2130706431 192.168.1.10 54321 typ host";

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("avatar_rtc_client_core=debug")
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gathering {
    /// Complete by the time the local description is set
    Immediate,
    /// Completes after the given delay, announced through an engine event
    After(Duration),
    Never,
}

#[derive(Debug, Clone)]
pub struct EngineScript {
    pub gathering: Gathering,
    pub fail_offer: bool,
    /// Reject the remote description
    pub fail_answer: bool,
    /// Tracks announced once the remote description is applied
    pub remote_tracks: Vec<(String, MediaKind)>,
    /// Report Connected once the remote description is applied
    pub connect_on_answer: bool,
}

impl Default for EngineScript {
    fn default() -> Self {
        Self {
            gathering: Gathering::Immediate,
            fail_offer: false,
            fail_answer: false,
            remote_tracks: vec![
                ("a1".to_string(), MediaKind::Audio),
                ("v1".to_string(), MediaKind::Video),
            ],
            connect_on_answer: true,
        }
    }
}

/// Shared view of one fake connection
pub struct FakeConnection {
    events: EngineEventSender,
    script: EngineScript,
    calls: Mutex<Vec<String>>,
    gathering: Mutex<IceGatheringState>,
    state: Mutex<PeerConnectionState>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl FakeConnection {
    /// Inject an engine notification as if the engine raised it
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    pub fn emit_state(&self, state: PeerConnectionState) {
        *self.state.lock() = state;
        self.emit(EngineEvent::ConnectionStateChanged(state));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

struct FakePeerConnection {
    inner: Arc<FakeConnection>,
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    async fn add_transceiver(&self, kind: MediaKind, direction: TransceiverDirection) -> Result<(), SessionError> {
        self.inner.record(format!("transceiver:{}:{:?}", kind, direction));
        Ok(())
    }

    async fn add_track(&self, track: &MediaTrack) -> Result<(), SessionError> {
        self.inner.record(format!("track:{}", track.id()));
        Ok(())
    }

    async fn create_offer(&self, _options: &OfferOptions) -> Result<SessionDescription, SessionError> {
        self.inner.record("create_offer");
        if self.inner.script.fail_offer {
            return Err(SessionError::media_engine("scripted offer failure"));
        }
        Ok(SessionDescription::offer(OFFER_SDP))
    }

    async fn set_local_description(&self, _description: SessionDescription) -> Result<(), SessionError> {
        self.inner.record("set_local_description");
        match self.inner.script.gathering {
            Gathering::Immediate => {
                *self.inner.gathering.lock() = IceGatheringState::Complete;
            }
            Gathering::After(delay) => {
                *self.inner.gathering.lock() = IceGatheringState::Gathering;
                let inner = self.inner.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    *inner.gathering.lock() = IceGatheringState::Complete;
                    inner.emit(EngineEvent::IceCandidate(Some(CANDIDATE_LINE.to_string())));
                    inner.emit(EngineEvent::IceCandidate(None));
                    inner.emit(EngineEvent::IceGatheringStateChanged(IceGatheringState::Complete));
                });
            }
            Gathering::Never => {
                *self.inner.gathering.lock() = IceGatheringState::Gathering;
            }
        }
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        let candidates = if *self.inner.gathering.lock() == IceGatheringState::Complete {
            format!("{}\r\na=end-of-candidates\r\n", CANDIDATE_LINE)
        } else {
            String::new()
        };
        Some(SessionDescription::offer(format!("{}{}", OFFER_SDP, candidates)))
    }

    async fn set_remote_description(&self, description: SessionDescription) -> Result<(), SessionError> {
        self.inner.record(format!("set_remote_description:{}", description.sdp_type));
        if self.inner.script.fail_answer {
            return Err(SessionError::media_engine("scripted answer rejection"));
        }
        for (id, kind) in &self.inner.script.remote_tracks {
            self.inner.emit(EngineEvent::Track(MediaTrack::new(id.clone(), *kind)));
        }
        if self.inner.script.connect_on_answer {
            self.inner.emit_state(PeerConnectionState::Connecting);
            self.inner.emit_state(PeerConnectionState::Connected);
        }
        Ok(())
    }

    fn ice_gathering_state(&self) -> IceGatheringState {
        *self.inner.gathering.lock()
    }

    fn connection_state(&self) -> PeerConnectionState {
        *self.inner.state.lock()
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.inner.close_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.record("close");
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            // Real engines report their own closure
            self.inner.emit_state(PeerConnectionState::Closed);
        }
        Ok(())
    }
}

/// Engine whose connections follow an [`EngineScript`]
pub struct FakeEngine {
    script: Mutex<EngineScript>,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeEngine {
    pub fn new(script: EngineScript) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            connections: Mutex::new(Vec::new()),
        })
    }

    pub fn set_script(&self, script: EngineScript) {
        *self.script.lock() = script;
    }

    pub fn created(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn connection(&self, index: usize) -> Arc<FakeConnection> {
        self.connections.lock()[index].clone()
    }

    pub fn last(&self) -> Arc<FakeConnection> {
        self.connections.lock().last().cloned().expect("no connection created")
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_peer_connection(
        &self,
        _config: &PeerConnectionConfig,
        events: EngineEventSender,
    ) -> Result<Box<dyn PeerConnection>, SessionError> {
        let inner = Arc::new(FakeConnection {
            events,
            script: self.script.lock().clone(),
            calls: Mutex::new(Vec::new()),
            gathering: Mutex::new(IceGatheringState::New),
            state: Mutex::new(PeerConnectionState::New),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
        });
        self.connections.lock().push(inner.clone());
        Ok(Box::new(FakePeerConnection { inner }))
    }
}

/// Signaling transport returning a scripted answer
pub struct FakeSignaling {
    response: Mutex<SignalingResult<SignalingAnswer>>,
    delay: Mutex<Option<Duration>>,
    offers: Mutex<Vec<SessionDescription>>,
}

impl FakeSignaling {
    pub fn answering(session_id: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(Ok(SignalingAnswer {
                description: SessionDescription::answer("v=0\r\no=- 2 2 IN IP4 0.0.0.0\r\n"),
                session_id: session_id.map(str::to_string),
            })),
            delay: Mutex::new(None),
            offers: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: SignalingError) -> Arc<Self> {
        let signaling = Self::answering(None);
        *signaling.response.lock() = Err(error);
        signaling
    }

    pub fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock() = Some(delay);
        self
    }

    pub fn offers(&self) -> Vec<SessionDescription> {
        self.offers.lock().clone()
    }
}

#[async_trait]
impl SignalingTransport for FakeSignaling {
    fn endpoint(&self) -> &str {
        "fake://signaling/offer"
    }

    async fn exchange(&self, offer: &SessionDescription) -> SignalingResult<SignalingAnswer> {
        self.offers.lock().push(offer.clone());
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.response.lock().clone()
    }
}

pub enum PermissionScript {
    Grant,
    Deny(Vec<MediaPermission>),
    Fail,
}

pub struct ScriptedPermissions {
    script: PermissionScript,
    pub requests: AtomicUsize,
}

impl ScriptedPermissions {
    pub fn new(script: PermissionScript) -> Arc<Self> {
        Arc::new(Self { script, requests: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl PermissionProvider for ScriptedPermissions {
    async fn request(&self, _permissions: &[MediaPermission]) -> Result<PermissionGrant, SessionError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        match &self.script {
            PermissionScript::Grant => Ok(PermissionGrant::granted()),
            PermissionScript::Deny(denied) => Ok(PermissionGrant::denied(denied.clone())),
            PermissionScript::Fail => Err(SessionError::permission_denied("prompt could not be shown")),
        }
    }
}

/// Capture source handing out microphone and camera tracks it keeps handles to
#[derive(Default)]
pub struct FakeCapture {
    acquired: Mutex<Vec<MediaTrack>>,
    failure: Option<SessionError>,
}

impl FakeCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A source whose every acquisition fails with `error`
    pub fn failing(error: SessionError) -> Arc<Self> {
        Arc::new(Self { failure: Some(error), ..Self::default() })
    }

    pub fn acquired(&self) -> Vec<MediaTrack> {
        self.acquired.lock().clone()
    }

    pub fn live_tracks(&self) -> usize {
        self.acquired.lock().iter().filter(|t| t.is_live()).count()
    }
}

#[async_trait]
impl MediaSource for FakeCapture {
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalMedia, SessionError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new("mic-0", MediaKind::Audio));
        }
        if constraints.video.is_some() {
            tracks.push(MediaTrack::new("cam-0", MediaKind::Video));
        }
        self.acquired.lock().extend(tracks.iter().cloned());
        Ok(LocalMedia::new(tracks))
    }
}

/// Audio platform counting calls; supports every capability
#[derive(Default)]
pub struct CountingAudioPlatform {
    pub configured: AtomicUsize,
    pub released: AtomicUsize,
    pub speaker: AtomicUsize,
    pub volume: AtomicUsize,
    pub gain_stages: AtomicUsize,
}

impl AudioPlatform for CountingAudioPlatform {
    fn name(&self) -> &str {
        "counting"
    }

    fn configure_session(&self, _profile: &AudioSessionProfile) -> AudioPlatformResult<()> {
        self.configured.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn set_speaker_output(&self, _enabled: bool) -> AudioPlatformResult<()> {
        self.speaker.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn maximize_output_volume(&self) -> AudioPlatformResult<()> {
        self.volume.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn install_gain_stage(&self, _stream: &AggregateStream, _gain: f32) -> AudioPlatformResult<()> {
        self.gain_stages.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release_session(&self) -> AudioPlatformResult<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    State(ControllerState, bool),
    Stream { kind: MediaKind, stream_id: String, tracks: usize },
    SessionId(String),
    Error(SessionError),
}

/// Handler recording every callback in arrival order
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn states(&self) -> Vec<(ControllerState, bool)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::State(state, connected) => Some((state, connected)),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<SessionError> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Recorded::Error(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    pub fn stream_updates(&self, kind: MediaKind) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Recorded::Stream { kind: k, .. } if *k == kind))
            .count()
    }

    pub fn terminal_reports(&self) -> usize {
        self.states().iter().filter(|(s, _)| s.is_terminal()).count()
    }

    /// Poll until `predicate` holds or `timeout` passes
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[Recorded]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if predicate(&self.events.lock()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn wait_for_state(&self, state: ControllerState) -> bool {
        self.wait_until(Duration::from_secs(2), |events| {
            events.iter().any(|e| matches!(e, Recorded::State(s, _) if *s == state))
        })
        .await
    }
}

#[async_trait]
impl SessionEventHandler for RecordingHandler {
    async fn on_connection_state_change(&self, info: ConnectionStateInfo) {
        self.events.lock().push(Recorded::State(info.state, info.connected));
    }

    async fn on_remote_stream_update(&self, info: RemoteStreamInfo) {
        self.events.lock().push(Recorded::Stream {
            kind: info.kind,
            stream_id: info.stream.id().to_string(),
            tracks: info.stream.track_count(),
        });
    }

    async fn on_session_id_received(&self, session_id: String) {
        self.events.lock().push(Recorded::SessionId(session_id));
    }

    async fn on_error(&self, error: SessionError) {
        self.events.lock().push(Recorded::Error(error));
    }
}
