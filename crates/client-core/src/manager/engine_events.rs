//! Engine notification handling
//!
//! Engines call back on their own tasks. Their callbacks only enqueue an
//! [`EngineEvent`]; one pump task per session drains the queue and applies
//! each event to the session it was created for.

use std::sync::{Arc, Weak};

use tracing::{debug, info, trace};

use super::SessionManager;
use crate::engine::{EngineEvent, EngineEventReceiver};
use crate::error::SessionError;
use crate::media::{DemuxOutcome, MediaKind, MediaTrack};
use crate::peer::{ControllerState, PeerConnectionController};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpControl {
    Continue,
    Stop,
}

pub(super) async fn run_event_pump(
    manager: Weak<SessionManager>,
    epoch: u64,
    controller: Arc<PeerConnectionController>,
    mut events: EngineEventReceiver,
) {
    debug!(epoch, "Engine event pump started");
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = controller.closed() => None,
        };
        let Some(event) = event else { break };
        let Some(manager) = manager.upgrade() else { break };

        if manager.handle_engine_event(epoch, &controller, event).await == PumpControl::Stop {
            break;
        }
    }
    debug!(epoch, "Engine event pump finished");
}

impl SessionManager {
    async fn handle_engine_event(
        &self,
        epoch: u64,
        controller: &Arc<PeerConnectionController>,
        event: EngineEvent,
    ) -> PumpControl {
        match event {
            EngineEvent::ConnectionStateChanged(state) => {
                debug!(epoch, state = %state, "Engine connection state");
                match PeerConnectionController::target_state(state) {
                    Some(ControllerState::Connected) => {
                        self.on_connected(epoch, controller).await;
                        PumpControl::Continue
                    }
                    Some(terminal) => {
                        self.on_terminal(epoch, terminal).await;
                        PumpControl::Stop
                    }
                    None => PumpControl::Continue,
                }
            }
            EngineEvent::IceGatheringStateChanged(state) => {
                controller.observe_gathering(state);
                PumpControl::Continue
            }
            EngineEvent::IceCandidate(Some(candidate)) => {
                trace!(epoch, candidate = %candidate, "Local candidate discovered");
                PumpControl::Continue
            }
            EngineEvent::IceCandidate(None) => {
                debug!(epoch, "End of local candidates");
                PumpControl::Continue
            }
            EngineEvent::Track(track) => {
                self.on_remote_track(epoch, controller, track).await;
                PumpControl::Continue
            }
        }
    }

    async fn on_connected(&self, epoch: u64, controller: &PeerConnectionController) {
        if !self.is_current(epoch) {
            return;
        }
        let Some(transition) = controller.transition(ControllerState::Connected) else {
            return;
        };
        self.emit_state(epoch, transition).await;

        // Completes before the next engine event is handled
        let audio = self
            .session
            .lock()
            .as_ref()
            .filter(|s| s.epoch == epoch)
            .and_then(|s| s.demuxer.audio().cloned());
        let report = self.enhancer.enhance(audio.as_ref());
        info!(epoch, report = ?report, "Audio output enhanced on connect");
    }

    async fn on_terminal(&self, epoch: u64, terminal: ControllerState) {
        if !self.teardown(Some(epoch), terminal).await {
            return;
        }
        if terminal.is_failure() {
            self.emit_error(SessionError::ConnectionFailure {
                state: terminal.to_string(),
            })
            .await;
        }
    }

    async fn on_remote_track(&self, epoch: u64, controller: &PeerConnectionController, track: MediaTrack) {
        let outcome = {
            let mut slot = self.session.lock();
            match slot.as_mut() {
                Some(session) if session.epoch == epoch => Some(session.demuxer.on_track(track.clone())),
                _ => None,
            }
        };

        let Some(outcome) = outcome else {
            debug!(epoch, track_id = track.id(), "Stopping track from a stale session");
            track.stop();
            return;
        };

        if let DemuxOutcome::Added { kind, stream, .. } = outcome {
            self.emit_stream(epoch, kind, stream.clone()).await;

            if kind == MediaKind::Audio && controller.state().is_connected() {
                let report = self.enhancer.enhance(Some(&stream));
                debug!(epoch, report = ?report, "Audio output enhanced for new track");
            }
        }
    }
}
