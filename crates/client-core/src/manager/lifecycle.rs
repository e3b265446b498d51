//! Connect, disconnect and cleanup

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::engine_events::run_event_pump;
use super::session::Session;
use super::SessionManager;
use crate::error::{SessionError, SessionResult};
use crate::events::SessionEvent;
use crate::media::LocalMedia;
use crate::peer::{ControllerState, PeerConnectionController, StateTransition};
use crate::platform::PermissionGrant;
use crate::signaling::SignalingError;

impl SessionManager {
    /// Run one connect attempt. Returns `true` once the remote description is applied.
    ///
    /// The attempt requests media permissions, acquires local capture when
    /// configured, builds a fresh peer connection and negotiates it with the
    /// signaling endpoint. `Connected` is reported later, through the
    /// handler, when the engine says the media path is up.
    ///
    /// # Failure
    ///
    /// Any failing step tears the session down (one terminal state report)
    /// and then reports the error through `on_error`. Nothing is retried; see
    /// [`retry_with_backoff`](crate::recovery::retry_with_backoff) for hosts
    /// that want to. Use [`try_connect`](Self::try_connect) to get the error
    /// itself.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use avatar_rtc_client_core::{SessionConfig, SessionManager};
    /// # async fn example() -> avatar_rtc_client_core::SessionResult<()> {
    /// let manager = SessionManager::builder()
    ///     .config(SessionConfig::receive_only().with_base_url("http://127.0.0.1:8010"))
    ///     .build()?;
    ///
    /// if manager.connect().await {
    ///     println!("negotiated session {:?}", manager.session_id());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(self: &Arc<Self>) -> bool {
        self.try_connect().await.is_ok()
    }

    /// Like [`connect`](Self::connect), but returns the failure
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidState`] if a session is already live; it is
    ///   left untouched and `on_error` is not called
    /// - [`SessionError::Cancelled`] if a `disconnect` overtook the attempt;
    ///   `on_error` is not called
    /// - any other [`SessionError`] after teardown and `on_error`
    pub async fn try_connect(self: &Arc<Self>) -> SessionResult<()> {
        let epoch = {
            let mut slot = self.session.lock();
            if let Some(live) = slot.as_ref() {
                return Err(SessionError::InvalidState {
                    expected: "no live session".to_string(),
                    actual: live.state().to_string(),
                });
            }
            let epoch = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            *slot = Some(Session::new(epoch));
            epoch
        };

        info!(epoch, signaling = self.signaling.endpoint(), "Connect attempt started");

        match self.run_connect(epoch).await {
            Ok(()) => {
                info!(epoch, session_id = ?self.session_id(), "Negotiation complete");
                Ok(())
            }
            Err(e) if e.is_cancellation() || !self.is_current(epoch) => {
                info!(epoch, reason = %e, "Connect attempt superseded by teardown");
                match e {
                    SessionError::Cancelled { .. } => Err(e),
                    other => Err(SessionError::cancelled(other.to_string())),
                }
            }
            Err(e) => {
                error!(epoch, error = %e, category = e.category(), "Connect attempt failed");
                self.teardown(Some(epoch), ControllerState::Closed).await;
                self.emit_error(e.clone()).await;
                Err(e)
            }
        }
    }

    async fn run_connect(self: &Arc<Self>, epoch: u64) -> SessionResult<()> {
        let permissions = self.config.media.required_permissions();
        if !permissions.is_empty() {
            let grant = self.permissions.request(&permissions).await.unwrap_or_else(|e| {
                warn!(error = %e, "Permission request failed, treating as denied");
                PermissionGrant::denied(permissions.clone())
            });
            if !grant.is_granted() {
                let denied: Vec<String> = grant.denied.iter().map(ToString::to_string).collect();
                return Err(SessionError::permission_denied(format!(
                    "media access denied: {}",
                    denied.join(", ")
                )));
            }
        }
        self.ensure_current(epoch, "permission request")?;

        let local_media = if self.config.media.capture_local_media {
            self.media_source
                .acquire(&self.config.media)
                .await
                .map_err(|e| match e {
                    SessionError::MediaAcquisitionFailed { .. } => e,
                    other => SessionError::media_acquisition_failed(other.to_string()),
                })?
        } else {
            LocalMedia::empty()
        };
        if !self.store_local_media(epoch, &local_media) {
            local_media.stop_all();
            return Err(SessionError::cancelled("session torn down during media acquisition"));
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let controller =
            Arc::new(PeerConnectionController::create(self.engine.as_ref(), &self.config, events_tx).await?);
        if !self.store_controller(epoch, &controller) {
            controller.close(ControllerState::Closed).await;
            return Err(SessionError::cancelled("session torn down while creating peer connection"));
        }
        tokio::spawn(run_event_pump(Arc::downgrade(self), epoch, controller.clone(), events_rx));

        let attached = controller.attach_local_tracks(&local_media).await?;
        debug!(epoch, attached, "Local tracks attached");

        self.negotiate(epoch, &controller).await
    }

    async fn negotiate(&self, epoch: u64, controller: &Arc<PeerConnectionController>) -> SessionResult<()> {
        self.advance(epoch, controller, ControllerState::Describing).await?;
        controller.describe(&self.config.offer).await?;
        self.ensure_current(epoch, "local description")?;

        controller.wait_for_gathering_complete().await?;
        self.ensure_current(epoch, "candidate discovery")?;
        let local = controller.local_description().await?;

        self.advance(epoch, controller, ControllerState::Negotiating).await?;
        let answer = tokio::select! {
            answer = self.signaling.exchange(&local) => answer?,
            _ = controller.closed() => {
                return Err(SessionError::cancelled("session torn down during signaling exchange"));
            }
        };
        self.ensure_current(epoch, "signaling exchange")?;

        if answer.session_id.is_none() {
            if self.config.require_session_id {
                return Err(SignalingError::MissingSessionId.into());
            }
            warn!(epoch, "Answer carries no session id");
        }

        controller.apply_remote_description(answer.description).await?;
        self.ensure_current(epoch, "remote description")?;

        // Only announced once the answer is in place
        if let Some(session_id) = answer.session_id {
            if !self.store_session_id(epoch, &session_id) {
                return Err(SessionError::cancelled("session torn down before session id was stored"));
            }
            info!(epoch, session_id = %session_id, "Session id assigned");
            self.events.emit(SessionEvent::SessionIdReceived { session_id }).await;
        }
        Ok(())
    }

    /// Move to `next` and report it, unless the attempt went stale
    async fn advance(
        &self,
        epoch: u64,
        controller: &PeerConnectionController,
        next: ControllerState,
    ) -> SessionResult<()> {
        self.ensure_current(epoch, next.as_str())?;
        if let Some(transition) = controller.transition(next) {
            self.emit_state(epoch, transition).await;
        }
        Ok(())
    }

    fn store_local_media(&self, epoch: u64, media: &LocalMedia) -> bool {
        match self.session.lock().as_mut() {
            Some(session) if session.epoch == epoch => {
                session.local_media = media.clone();
                true
            }
            _ => false,
        }
    }

    fn store_controller(&self, epoch: u64, controller: &Arc<PeerConnectionController>) -> bool {
        match self.session.lock().as_mut() {
            Some(session) if session.epoch == epoch => {
                session.controller = Some(controller.clone());
                true
            }
            _ => false,
        }
    }

    fn store_session_id(&self, epoch: u64, session_id: &str) -> bool {
        match self.session.lock().as_mut() {
            Some(session) if session.epoch == epoch => {
                session.session_id = Some(session_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// Tear the live session down. Returns `false` if there was none.
    ///
    /// Stops every local and remote track, closes the peer connection, clears
    /// the session id and reports `Closed` through the same path organic
    /// failures use. An in-flight [`connect`](Self::connect) resolves as
    /// cancelled.
    ///
    /// Safe to call at any time and any number of times; only the first call
    /// after a connect does anything.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # tokio_test::block_on(async {
    /// use avatar_rtc_client_core::SessionManager;
    ///
    /// let manager = SessionManager::builder().build()?;
    /// assert!(!manager.disconnect().await);
    /// # Ok::<(), avatar_rtc_client_core::SessionError>(())
    /// # }).unwrap();
    /// ```
    pub async fn disconnect(&self) -> bool {
        self.teardown(None, ControllerState::Closed).await
    }

    /// Disconnect and release the platform audio session
    ///
    /// Meant for final shutdown; the manager can still connect afterwards,
    /// but the audio session is not configured again.
    pub async fn cleanup(&self) {
        self.disconnect().await;
        if self.initialized.load(Ordering::Acquire) {
            let outcome = self.enhancer.release_session();
            debug!(audio_session = ?outcome, "Audio session released");
        }
        info!("Session manager cleaned up");
    }

    /// Take the session out of its slot (only if it belongs to `epoch`, when
    /// given) and release everything it holds, reporting `terminal` once.
    pub(super) async fn teardown(&self, epoch: Option<u64>, terminal: ControllerState) -> bool {
        let taken = {
            let mut slot = self.session.lock();
            match slot.as_ref() {
                Some(session) if epoch.map_or(true, |e| e == session.epoch) => slot.take(),
                _ => None,
            }
        };
        let Some(mut session) = taken else {
            debug!(?epoch, "No session to tear down");
            return false;
        };

        let local_stopped = session.local_media.stop_all();
        let remote_stopped = session.demuxer.reset();
        let previous = session.state();

        if let Some(controller) = session.controller.take() {
            controller.close(terminal).await;
        }

        info!(
            epoch = session.epoch,
            state = %terminal,
            session_id = ?session.session_id,
            local_tracks_stopped = local_stopped,
            remote_tracks_stopped = remote_stopped,
            "Session torn down"
        );

        self.emit_state(session.epoch, StateTransition { from: previous, to: terminal })
            .await;
        true
    }
}
