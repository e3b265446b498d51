//! Session configuration
//!
//! [`SessionConfig`] carries everything a connect attempt needs: where the
//! signaling endpoint lives, which discovery servers to use, what local media
//! (if any) to capture, how long candidate discovery may take and how the
//! audio output should be enhanced once the session is live.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};
use crate::platform::MediaPermission;

/// Default signaling endpoint (local avatar service)
pub const DEFAULT_SIGNALING_URL: &str = "http://127.0.0.1:8010/offer";

/// Public STUN server used when no discovery servers are configured
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Path appended to a base URL by [`SessionConfig::with_base_url`]
pub const OFFER_PATH: &str = "/offer";

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// One candidate-discovery server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

impl Default for IceServerConfig {
    fn default() -> Self {
        Self::stun(DEFAULT_STUN_SERVER)
    }
}

/// Which camera a capture source should open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    User,
    Environment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConstraints {
    pub frame_rate: u32,
    pub facing_mode: FacingMode,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            facing_mode: FacingMode::User,
        }
    }
}

/// Local media requirements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: Option<VideoConstraints>,
    /// Acquire local capture media and attach it as send tracks
    pub capture_local_media: bool,
}

impl MediaConstraints {
    /// Permissions the host must grant before a connect attempt proceeds
    pub fn required_permissions(&self) -> Vec<MediaPermission> {
        let mut permissions = Vec::new();
        if self.video.is_some() {
            permissions.push(MediaPermission::Camera);
        }
        if self.audio {
            permissions.push(MediaPermission::Microphone);
        }
        permissions
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints::default()),
            capture_local_media: false,
        }
    }
}

/// Options applied when the local offer is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfferOptions {
    pub offer_to_receive_audio: bool,
    pub offer_to_receive_video: bool,
    pub voice_activity_detection: bool,
}

impl Default for OfferOptions {
    fn default() -> Self {
        Self {
            offer_to_receive_audio: true,
            offer_to_receive_video: true,
            voice_activity_detection: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCategory {
    PlayAndRecord,
    Playback,
    Ambient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    VideoChat,
    VoiceChat,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSessionOptions {
    pub default_to_speaker: bool,
    pub allow_bluetooth: bool,
    pub allow_bluetooth_a2dp: bool,
    pub allow_airplay: bool,
    pub mix_with_others: bool,
}

impl Default for AudioSessionOptions {
    fn default() -> Self {
        Self {
            default_to_speaker: true,
            allow_bluetooth: true,
            allow_bluetooth_a2dp: true,
            allow_airplay: true,
            mix_with_others: true,
        }
    }
}

/// Platform audio-session setup applied at initialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSessionProfile {
    pub category: AudioCategory,
    pub mode: AudioMode,
    pub options: AudioSessionOptions,
    /// Requested output volume, 0.0..=1.0
    pub output_volume: f32,
}

impl Default for AudioSessionProfile {
    fn default() -> Self {
        Self {
            category: AudioCategory::PlayAndRecord,
            mode: AudioMode::VideoChat,
            options: AudioSessionOptions::default(),
            output_volume: 1.0,
        }
    }
}

/// Best-effort audio output policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEnhancementConfig {
    pub enabled: bool,
    pub prefer_speaker: bool,
    pub maximize_session_volume: bool,
    /// Post-processing multiplier installed on the remote audio stream
    pub software_gain: f32,
    pub session_profile: AudioSessionProfile,
}

impl Default for AudioEnhancementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefer_speaker: true,
            maximize_session_volume: true,
            software_gain: 2.5,
            session_profile: AudioSessionProfile::default(),
        }
    }
}

/// Configuration for one [`SessionManager`](crate::SessionManager)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Full URL the local offer is POSTed to
    pub signaling_url: String,
    pub ice_servers: Vec<IceServerConfig>,
    pub media: MediaConstraints,
    pub offer: OfferOptions,
    /// Upper bound on the candidate-discovery wait
    #[serde(rename = "ice_gathering_timeout_ms", with = "duration_ms")]
    pub ice_gathering_timeout: Duration,
    /// HTTP timeout for the signaling exchange
    #[serde(rename = "signaling_timeout_ms", with = "duration_ms")]
    pub signaling_timeout: Duration,
    /// Treat an answer without a session id as a protocol failure
    pub require_session_id: bool,
    pub audio: AudioEnhancementConfig,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            signaling_url: DEFAULT_SIGNALING_URL.to_string(),
            ice_servers: vec![IceServerConfig::default()],
            media: MediaConstraints::default(),
            offer: OfferOptions::default(),
            ice_gathering_timeout: Duration::from_secs(5),
            signaling_timeout: Duration::from_secs(10),
            require_session_id: false,
            audio: AudioEnhancementConfig::default(),
        }
    }

    /// Receive-only session: nothing is captured locally
    pub fn receive_only() -> Self {
        Self::new()
    }

    /// Capture microphone and camera and send them alongside the receive lines
    pub fn with_local_capture() -> Self {
        let mut config = Self::new();
        config.media.capture_local_media = true;
        config
    }

    pub fn with_signaling_url(mut self, url: impl Into<String>) -> Self {
        self.signaling_url = url.into();
        self
    }

    /// Point at an avatar service base URL; the offer path is appended
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.signaling_url = format!("{}{}", base_url.trim_end_matches('/'), OFFER_PATH);
        self
    }

    pub fn with_ice_servers(mut self, servers: Vec<IceServerConfig>) -> Self {
        self.ice_servers = servers;
        self
    }

    pub fn with_media(mut self, media: MediaConstraints) -> Self {
        self.media = media;
        self
    }

    pub fn with_ice_gathering_timeout(mut self, timeout: Duration) -> Self {
        self.ice_gathering_timeout = timeout;
        self
    }

    pub fn with_signaling_timeout(mut self, timeout: Duration) -> Self {
        self.signaling_timeout = timeout;
        self
    }

    pub fn with_require_session_id(mut self, required: bool) -> Self {
        self.require_session_id = required;
        self
    }

    pub fn with_audio(mut self, audio: AudioEnhancementConfig) -> Self {
        self.audio = audio;
        self
    }

    pub fn validate(&self) -> SessionResult<()> {
        let url = url::Url::parse(&self.signaling_url)
            .map_err(|e| SessionError::invalid_configuration("signaling_url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SessionError::invalid_configuration(
                "signaling_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }

        if let Some(server) = self.ice_servers.iter().find(|s| s.urls.is_empty()) {
            return Err(SessionError::invalid_configuration(
                "ice_servers",
                format!("server entry without urls (username: {:?})", server.username),
            ));
        }

        if !self.offer.offer_to_receive_audio && !self.offer.offer_to_receive_video {
            return Err(SessionError::invalid_configuration(
                "offer",
                "at least one of audio or video must be received",
            ));
        }

        if self.ice_gathering_timeout.is_zero() {
            return Err(SessionError::invalid_configuration("ice_gathering_timeout_ms", "must be positive"));
        }

        if self.audio.software_gain <= 1.0 || !self.audio.software_gain.is_finite() {
            return Err(SessionError::invalid_configuration(
                "audio.software_gain",
                format!("must be greater than 1.0, got {}", self.audio.software_gain),
            ));
        }

        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
