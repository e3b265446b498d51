//! Builder for creating a session manager

use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use parking_lot::Mutex;

use super::SessionManager;
use crate::audio::{AudioOutputEnhancer, AudioPlatform, SoftwareAudioPlatform};
use crate::config::SessionConfig;
use crate::engine::MediaEngine;
use crate::error::{SessionError, SessionResult};
use crate::events::EventEmitter;
use crate::platform::{AllowAllPermissions, MediaSource, NoCaptureSource, PermissionProvider};
use crate::signaling::{HttpSignalingClient, SignalingTransport};

/// Assembles a [`SessionManager`]
///
/// Anything not supplied falls back to a default: the `webrtc` engine (with
/// the `webrtc-engine` feature), an HTTP signaling client for the configured
/// URL, permissive permissions, no local capture and software gain.
///
/// ```rust
/// # tokio_test::block_on(async {
/// use std::sync::Arc;
/// use avatar_rtc_client_core::{CallbackSet, SessionConfig, SessionManager};
///
/// let manager = SessionManager::builder()
///     .config(SessionConfig::receive_only().with_base_url("http://127.0.0.1:8010"))
///     .build()?;
/// manager.initialize(Arc::new(CallbackSet::new())).await;
///
/// assert!(manager.is_initialized());
/// assert!(manager.state().is_none());
/// # Ok::<(), avatar_rtc_client_core::SessionError>(())
/// # }).unwrap();
/// ```
#[derive(Default)]
pub struct SessionManagerBuilder {
    config: SessionConfig,
    engine: Option<Arc<dyn MediaEngine>>,
    signaling: Option<Arc<dyn SignalingTransport>>,
    permissions: Option<Arc<dyn PermissionProvider>>,
    media_source: Option<Arc<dyn MediaSource>>,
    audio_platform: Option<Arc<dyn AudioPlatform>>,
}

impl SessionManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn signaling_url(mut self, url: impl Into<String>) -> Self {
        self.config.signaling_url = url.into();
        self
    }

    pub fn engine(mut self, engine: Arc<dyn MediaEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn signaling(mut self, signaling: Arc<dyn SignalingTransport>) -> Self {
        self.signaling = Some(signaling);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn media_source(mut self, source: Arc<dyn MediaSource>) -> Self {
        self.media_source = Some(source);
        self
    }

    pub fn audio_platform(mut self, platform: Arc<dyn AudioPlatform>) -> Self {
        self.audio_platform = Some(platform);
        self
    }

    pub fn build(self) -> SessionResult<Arc<SessionManager>> {
        self.config.validate()?;

        let engine = match self.engine {
            Some(engine) => engine,
            None => default_engine()?,
        };
        let signaling = match self.signaling {
            Some(signaling) => signaling,
            None => Arc::new(HttpSignalingClient::from_config(&self.config).map_err(SessionError::from)?),
        };
        let audio_platform = self
            .audio_platform
            .unwrap_or_else(|| Arc::new(SoftwareAudioPlatform));

        tracing::debug!(
            engine = engine.name(),
            signaling = signaling.endpoint(),
            audio_platform = audio_platform.name(),
            "Building session manager"
        );

        Ok(Arc::new(SessionManager {
            enhancer: AudioOutputEnhancer::new(audio_platform, self.config.audio.clone()),
            config: self.config,
            engine,
            signaling,
            permissions: self.permissions.unwrap_or_else(|| Arc::new(AllowAllPermissions)),
            media_source: self.media_source.unwrap_or_else(|| Arc::new(NoCaptureSource)),
            events: EventEmitter::new(),
            session: Mutex::new(None),
            epoch: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
        }))
    }
}

#[cfg(feature = "webrtc-engine")]
fn default_engine() -> SessionResult<Arc<dyn MediaEngine>> {
    Ok(Arc::new(crate::engine::WebRtcEngine::new()?))
}

#[cfg(not(feature = "webrtc-engine"))]
fn default_engine() -> SessionResult<Arc<dyn MediaEngine>> {
    Err(SessionError::invalid_configuration(
        "engine",
        "no media engine supplied and the webrtc-engine feature is disabled",
    ))
}
