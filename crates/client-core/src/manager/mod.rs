//! Session manager facade
//!
//! [`SessionManager`] is the single entry point a host uses: `initialize`
//! once with an event handler, then `connect`/`disconnect` as often as
//! needed, and `cleanup` on shutdown. At most one session is live at a time.
//!
//! - **`lifecycle`** - connect, disconnect, cleanup and teardown
//! - **`engine_events`** - the per-session pump handling engine notifications
//! - **`builder`** - assembling a manager from its collaborators
//!
//! # Stale work
//!
//! Every connect attempt gets a fresh epoch. Asynchronous work (engine
//! events, negotiation steps resuming after an await) carries the epoch it
//! was started under and is dropped once the session slot holds a different
//! epoch or none at all.

mod builder;
mod engine_events;
mod lifecycle;
mod session;

pub use builder::SessionManagerBuilder;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::audio::AudioOutputEnhancer;
use crate::config::SessionConfig;
use crate::engine::MediaEngine;
use crate::error::{SessionError, SessionResult};
use crate::events::{
    ConnectionStateInfo, EventEmitter, RemoteStreamInfo, SessionEvent, SessionEventHandler,
};
use crate::media::{AggregateStream, MediaKind};
use crate::peer::{ControllerState, StateTransition};
use crate::platform::{MediaSource, PermissionProvider};
use crate::signaling::SignalingTransport;

use session::Session;

/// Point-in-time view of the live session
///
/// Serializable, so hosts can log it or hand it to a debug overlay.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub epoch: u64,
    pub state: ControllerState,
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub local_tracks: usize,
    pub remote_audio_tracks: usize,
    pub remote_video_tracks: usize,
    pub audio_gain: Option<f32>,
}

/// Facade over one avatar session at a time
///
/// Built with [`SessionManager::builder`] and shared as an `Arc`.
pub struct SessionManager {
    config: SessionConfig,
    engine: Arc<dyn MediaEngine>,
    signaling: Arc<dyn SignalingTransport>,
    permissions: Arc<dyn PermissionProvider>,
    media_source: Arc<dyn MediaSource>,
    enhancer: AudioOutputEnhancer,
    events: EventEmitter,
    session: Mutex<Option<Session>>,
    epoch: AtomicU64,
    initialized: AtomicBool,
}

impl SessionManager {
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::new()
    }

    /// Register the host's event handler and prepare the audio session.
    ///
    /// May be called again to replace the handler; the audio session is only
    /// configured the first time.
    pub async fn initialize(&self, handler: Arc<dyn SessionEventHandler>) {
        self.events.set_handler(handler).await;

        if !self.initialized.swap(true, Ordering::AcqRel) {
            let outcome = self.enhancer.configure_session();
            tracing::info!(
                audio_platform = self.enhancer.platform_name(),
                audio_session = ?outcome,
                signaling = self.signaling.endpoint(),
                "Session manager initialized"
            );
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Broadcast stream of every event the handler also sees
    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Configuration the manager was built with
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Id assigned by the avatar service for the live session
    pub fn session_id(&self) -> Option<String> {
        self.session.lock().as_ref().and_then(|s| s.session_id.clone())
    }

    /// State of the live session, `None` when there is none
    pub fn state(&self) -> Option<ControllerState> {
        self.session.lock().as_ref().map(Session::state)
    }

    /// Whether the engine has reported the media path as up
    pub fn is_connected(&self) -> bool {
        self.state().is_some_and(|s| s.is_connected())
    }

    /// Aggregate stream the remote side sends for `kind`
    ///
    /// `None` until the first track of that kind arrives, and again after
    /// teardown. The returned handle shares state with the session, so
    /// tracks added later show up in it.
    pub fn remote_stream(&self, kind: MediaKind) -> Option<AggregateStream> {
        self.session
            .lock()
            .as_ref()
            .and_then(|s| s.demuxer.stream(kind).cloned())
    }

    /// Point-in-time view of the live session, `None` when there is none
    ///
    /// # Examples
    ///
    /// ```rust
    /// # tokio_test::block_on(async {
    /// use avatar_rtc_client_core::SessionManager;
    ///
    /// let manager = SessionManager::builder().build()?;
    /// assert!(manager.snapshot().is_none());
    /// # Ok::<(), avatar_rtc_client_core::SessionError>(())
    /// # }).unwrap();
    /// ```
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let guard = self.session.lock();
        let session = guard.as_ref()?;
        let audio = session.demuxer.audio();
        Some(SessionSnapshot {
            epoch: session.epoch,
            state: session.state(),
            session_id: session.session_id.clone(),
            started_at: session.started_at,
            local_tracks: session.local_media.live_track_count(),
            remote_audio_tracks: audio.map_or(0, |s| s.track_count()),
            remote_video_tracks: session.demuxer.video().map_or(0, |s| s.track_count()),
            audio_gain: audio.filter(|s| s.has_gain_stage()).map(|s| s.gain()),
        })
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.session.lock().as_ref().is_some_and(|s| s.epoch == epoch)
    }

    fn ensure_current(&self, epoch: u64, stage: &str) -> SessionResult<()> {
        if self.is_current(epoch) {
            Ok(())
        } else {
            tracing::debug!(epoch, stage, "Dropping stale negotiation step");
            Err(SessionError::cancelled(format!("session torn down during {}", stage)))
        }
    }

    async fn emit_state(&self, epoch: u64, transition: StateTransition) {
        tracing::info!(epoch, from = %transition.from, to = %transition.to, "Connection state changed");
        self.events
            .emit(SessionEvent::ConnectionStateChanged {
                info: ConnectionStateInfo {
                    state: transition.to,
                    previous_state: Some(transition.from),
                    connected: transition.to.is_connected(),
                    epoch,
                    timestamp: Utc::now(),
                },
            })
            .await;
    }

    async fn emit_stream(&self, epoch: u64, kind: MediaKind, stream: AggregateStream) {
        self.events
            .emit(SessionEvent::RemoteStreamUpdated {
                info: RemoteStreamInfo {
                    kind,
                    stream,
                    epoch,
                    timestamp: Utc::now(),
                },
            })
            .await;
    }

    async fn emit_error(&self, error: SessionError) {
        self.events.emit(SessionEvent::Error { error }).await;
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("engine", &self.engine.name())
            .field("signaling", &self.signaling.endpoint())
            .field("epoch", &self.epoch.load(Ordering::Relaxed))
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
