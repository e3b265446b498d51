//! Peer connection controller
//!
//! Wraps one engine [`PeerConnection`] for the lifetime of a single connect
//! attempt. It owns the controller state machine and exposes the negotiation
//! steps as separate operations so the session manager can check for
//! cancellation between every suspension point.
//!
//! Candidate discovery is never trickled: the description handed to
//! signaling is read back after gathering settles (or the bounded wait
//! expires) and therefore carries every candidate found.

mod state;

pub use state::{ControllerState, StateTransition};

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{OfferOptions, SessionConfig};
use crate::engine::{
    EngineEventSender, IceGatheringState, MediaEngine, PeerConnection, PeerConnectionConfig, PeerConnectionState,
    SessionDescription, TransceiverDirection,
};
use crate::error::{SessionError, SessionResult};
use crate::media::{LocalMedia, MediaKind};
use crate::recovery::with_timeout;

/// One peer connection and the state machine reported for it
///
/// Created fresh for every connect attempt and never reused after
/// [`close`](Self::close).
pub struct PeerConnectionController {
    connection: Box<dyn PeerConnection>,
    state: Mutex<ControllerState>,
    gathering: watch::Sender<IceGatheringState>,
    closed: watch::Sender<bool>,
    ice_gathering_timeout: Duration,
}

impl PeerConnectionController {
    /// Construct the underlying connection with the configured discovery servers
    pub async fn create(
        engine: &dyn MediaEngine,
        config: &SessionConfig,
        events: EngineEventSender,
    ) -> SessionResult<Self> {
        let pc_config = PeerConnectionConfig {
            ice_servers: config.ice_servers.clone(),
        };
        let connection = engine.create_peer_connection(&pc_config, events).await?;

        info!(
            engine = engine.name(),
            ice_servers = pc_config.ice_servers.len(),
            "Peer connection created"
        );

        Ok(Self::new(connection, config.ice_gathering_timeout))
    }

    /// Wrap an already-built connection
    pub fn new(connection: Box<dyn PeerConnection>, ice_gathering_timeout: Duration) -> Self {
        let (gathering, _) = watch::channel(connection.ice_gathering_state());
        let (closed, _) = watch::channel(false);
        Self {
            connection,
            state: Mutex::new(ControllerState::New),
            gathering,
            closed,
            ice_gathering_timeout,
        }
    }

    pub fn state(&self) -> ControllerState {
        *self.state.lock()
    }

    /// Apply `next` if the state machine allows it
    pub fn transition(&self, next: ControllerState) -> Option<StateTransition> {
        let mut state = self.state.lock();
        if !state.can_transition_to(next) {
            debug!(from = %*state, to = %next, "Ignoring state transition");
            return None;
        }
        let transition = StateTransition { from: *state, to: next };
        *state = next;
        Some(transition)
    }

    /// Controller state an engine-reported connection state maps to, if any
    pub fn target_state(state: PeerConnectionState) -> Option<ControllerState> {
        match state {
            PeerConnectionState::Connected => Some(ControllerState::Connected),
            PeerConnectionState::Disconnected => Some(ControllerState::Disconnected),
            PeerConnectionState::Failed => Some(ControllerState::Failed),
            PeerConnectionState::Closed => Some(ControllerState::Closed),
            PeerConnectionState::New | PeerConnectionState::Connecting => None,
        }
    }

    /// Feed a gathering-state notification from the engine
    pub fn observe_gathering(&self, state: IceGatheringState) {
        debug!(state = ?state, "Candidate discovery state changed");
        self.gathering.send_replace(state);
    }

    /// Attach captured tracks as send lines. Returns how many were attached.
    pub async fn attach_local_tracks(&self, media: &LocalMedia) -> SessionResult<usize> {
        for track in media.tracks() {
            self.connection.add_track(track).await?;
            debug!(track_id = track.id(), kind = %track.kind(), "Attached local track");
        }
        Ok(media.tracks().len())
    }

    /// Add receive lines, create the offer and install it as the local description
    pub async fn describe(&self, options: &OfferOptions) -> SessionResult<SessionDescription> {
        if options.offer_to_receive_video {
            self.connection
                .add_transceiver(MediaKind::Video, TransceiverDirection::RecvOnly)
                .await?;
        }
        if options.offer_to_receive_audio {
            self.connection
                .add_transceiver(MediaKind::Audio, TransceiverDirection::RecvOnly)
                .await?;
        }

        let offer = self.connection.create_offer(options).await?;
        self.connection.set_local_description(offer.clone()).await?;
        debug!(sdp_len = offer.sdp.len(), "Local description applied");
        Ok(offer)
    }

    /// Wait until candidate discovery completes, bounded by the configured timeout
    ///
    /// Returns at once if gathering already finished. Completion is seen
    /// either through [`observe_gathering`](Self::observe_gathering) or by
    /// polling the connection after each wake-up.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NegotiationTimeout`] when the timeout expires
    /// - [`SessionError::Cancelled`] when the controller is closed meanwhile
    pub async fn wait_for_gathering_complete(&self) -> SessionResult<()> {
        if self.connection.ice_gathering_state() == IceGatheringState::Complete {
            return Ok(());
        }

        let mut gathering = self.gathering.subscribe();
        let mut closed = self.closed.subscribe();

        with_timeout("ice gathering", self.ice_gathering_timeout, async move {
            loop {
                if *gathering.borrow_and_update() == IceGatheringState::Complete
                    || self.connection.ice_gathering_state() == IceGatheringState::Complete
                {
                    return Ok(());
                }
                if *closed.borrow_and_update() {
                    return Err(SessionError::cancelled("connection closed during candidate discovery"));
                }

                tokio::select! {
                    changed = gathering.changed() => {
                        if changed.is_err() {
                            return Err(SessionError::cancelled("controller dropped"));
                        }
                    }
                    _ = closed.changed() => {}
                }
            }
        })
        .await
    }

    /// Local description as it stands now, candidates included
    pub async fn local_description(&self) -> SessionResult<SessionDescription> {
        let description = self
            .connection
            .local_description()
            .await
            .ok_or_else(|| SessionError::media_engine("no local description available"))?;

        if description.candidate_count() == 0 {
            warn!("Local description carries no candidates");
        }
        Ok(description)
    }

    /// Install the service's answer; remote tracks and connection state follow as engine events
    pub async fn apply_remote_description(&self, description: SessionDescription) -> SessionResult<()> {
        self.connection.set_remote_description(description).await?;
        debug!("Remote description applied");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolve once [`close`](Self::close) has been called
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in self, so this cannot fail while we're borrowed
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Close the underlying connection and enter `terminal`.
    ///
    /// Only the first call does anything.
    pub async fn close(&self, terminal: ControllerState) -> Option<StateTransition> {
        if self.closed.send_replace(true) {
            return None;
        }

        if let Err(e) = self.connection.close().await {
            warn!(error = %e, "Error while closing peer connection");
        }

        let mut state = self.state.lock();
        let transition = StateTransition { from: *state, to: terminal };
        *state = terminal;
        Some(transition)
    }
}

impl std::fmt::Debug for PeerConnectionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnectionController")
            .field("state", &self.state())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaTrack;
    use async_trait::async_trait;
    use std::sync::Arc;

    #[derive(Default)]
    struct Recorded {
        calls: Vec<String>,
        gathering: Option<IceGatheringState>,
    }

    /// Records every call and holds gathering in whatever state the test sets
    struct RecordingConnection {
        log: Arc<Mutex<Recorded>>,
    }

    #[async_trait]
    impl PeerConnection for RecordingConnection {
        async fn add_transceiver(&self, kind: MediaKind, direction: TransceiverDirection) -> SessionResult<()> {
            self.log.lock().calls.push(format!("transceiver:{}:{:?}", kind, direction));
            Ok(())
        }

        async fn add_track(&self, track: &MediaTrack) -> SessionResult<()> {
            self.log.lock().calls.push(format!("track:{}", track.id()));
            Ok(())
        }

        async fn create_offer(&self, _options: &OfferOptions) -> SessionResult<SessionDescription> {
            self.log.lock().calls.push("offer".to_string());
            Ok(SessionDescription::offer("v=0\r\n"))
        }

        async fn set_local_description(&self, _d: SessionDescription) -> SessionResult<()> {
            self.log.lock().calls.push("local".to_string());
            Ok(())
        }

        async fn local_description(&self) -> Option<SessionDescription> {
            Some(SessionDescription::offer("v=0\r\na=candidate:1 1 udp 1 10.0.0.1 9 typ host\r\n"))
        }

        async fn set_remote_description(&self, _d: SessionDescription) -> SessionResult<()> {
            self.log.lock().calls.push("remote".to_string());
            Ok(())
        }

        fn ice_gathering_state(&self) -> IceGatheringState {
            self.log.lock().gathering.unwrap_or(IceGatheringState::New)
        }

        fn connection_state(&self) -> PeerConnectionState {
            PeerConnectionState::New
        }

        async fn close(&self) -> SessionResult<()> {
            self.log.lock().calls.push("close".to_string());
            Ok(())
        }
    }

    fn controller(timeout: Duration) -> (Arc<PeerConnectionController>, Arc<Mutex<Recorded>>) {
        let log = Arc::new(Mutex::new(Recorded::default()));
        let connection = Box::new(RecordingConnection { log: log.clone() });
        (Arc::new(PeerConnectionController::new(connection, timeout)), log)
    }

    #[tokio::test]
    async fn test_describe_adds_receive_lines_video_first() {
        let (controller, log) = controller(Duration::from_secs(1));
        controller.describe(&OfferOptions::default()).await.unwrap();

        assert_eq!(
            log.lock().calls,
            vec!["transceiver:video:RecvOnly", "transceiver:audio:RecvOnly", "offer", "local"]
        );
    }

    #[tokio::test]
    async fn test_gathering_wait_returns_immediately_when_complete() {
        let (controller, log) = controller(Duration::from_millis(10));
        log.lock().gathering = Some(IceGatheringState::Complete);
        controller.wait_for_gathering_complete().await.unwrap();
    }

    #[tokio::test]
    async fn test_gathering_wait_wakes_on_notification() {
        let (controller, _log) = controller(Duration::from_secs(2));
        let notifier = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            notifier.observe_gathering(IceGatheringState::Gathering);
            notifier.observe_gathering(IceGatheringState::Complete);
        });
        controller.wait_for_gathering_complete().await.unwrap();
    }

    #[tokio::test]
    async fn test_gathering_wait_is_bounded() {
        let (controller, _log) = controller(Duration::from_millis(30));
        let err = controller.wait_for_gathering_complete().await.unwrap_err();
        assert!(matches!(err, SessionError::NegotiationTimeout { duration_ms: 30, .. }));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_close_cancels_gathering_wait_and_is_idempotent() {
        let (controller, log) = controller(Duration::from_secs(5));
        let closer = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            closer.close(ControllerState::Closed).await;
        });

        let err = controller.wait_for_gathering_complete().await.unwrap_err();
        assert!(err.is_cancellation());
        assert!(controller.close(ControllerState::Closed).await.is_none());
        assert_eq!(controller.state(), ControllerState::Closed);
        assert_eq!(log.lock().calls.iter().filter(|c| *c == "close").count(), 1);
    }

    #[tokio::test]
    async fn test_transitions_follow_state_machine() {
        let (controller, _log) = controller(Duration::from_secs(1));
        assert!(controller.transition(ControllerState::Connected).is_none());
        assert!(controller.transition(ControllerState::Describing).is_some());
        assert!(controller.transition(ControllerState::Negotiating).is_some());
        let t = controller.transition(ControllerState::Connected).unwrap();
        assert_eq!(t.from, ControllerState::Negotiating);
        assert!(controller.transition(ControllerState::Connected).is_none());
    }
}
