use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{AudioPlatform, AudioPlatformError, AudioPlatformResult};
use crate::config::AudioEnhancementConfig;
use crate::media::AggregateStream;

/// Result of one enhancement policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyOutcome {
    Applied,
    /// The platform lacks the capability
    Unsupported,
    Failed(String),
    /// Disabled by configuration, nothing to act on, or already in effect
    Skipped,
}

impl PolicyOutcome {
    fn from_result(policy: &str, result: AudioPlatformResult<()>) -> Self {
        match result {
            Ok(()) => PolicyOutcome::Applied,
            Err(AudioPlatformError::Unsupported) => {
                debug!(policy, "Audio policy not supported on this platform");
                PolicyOutcome::Unsupported
            }
            Err(AudioPlatformError::Failed { reason }) => {
                warn!(policy, reason = %reason, "Audio policy failed");
                PolicyOutcome::Failed(reason)
            }
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, PolicyOutcome::Applied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnhancementReport {
    pub tracks_enabled: usize,
    pub speaker_route: PolicyOutcome,
    pub session_volume: PolicyOutcome,
    pub gain_stage: PolicyOutcome,
}

impl EnhancementReport {
    fn skipped() -> Self {
        Self {
            tracks_enabled: 0,
            speaker_route: PolicyOutcome::Skipped,
            session_volume: PolicyOutcome::Skipped,
            gain_stage: PolicyOutcome::Skipped,
        }
    }
}

/// Best-effort loudness policies for the remote audio stream
///
/// Each policy is attempted on its own; an unsupported or failing one never
/// prevents the others and never fails the session.
pub struct AudioOutputEnhancer {
    platform: Arc<dyn AudioPlatform>,
    config: AudioEnhancementConfig,
    session_active: AtomicBool,
}

impl AudioOutputEnhancer {
    pub fn new(platform: Arc<dyn AudioPlatform>, config: AudioEnhancementConfig) -> Self {
        Self {
            platform,
            config,
            session_active: AtomicBool::new(false),
        }
    }

    pub fn platform_name(&self) -> &str {
        self.platform.name()
    }

    /// Configure the platform audio session. Only the first successful call acts.
    pub fn configure_session(&self) -> PolicyOutcome {
        if !self.config.enabled || self.session_active.load(Ordering::Acquire) {
            return PolicyOutcome::Skipped;
        }

        let outcome = PolicyOutcome::from_result(
            "audio_session",
            self.platform.configure_session(&self.config.session_profile),
        );
        if outcome.is_applied() {
            self.session_active.store(true, Ordering::Release);
            info!(
                category = ?self.config.session_profile.category,
                mode = ?self.config.session_profile.mode,
                "Audio session configured"
            );
        }
        outcome
    }

    /// Deactivate the audio session if [`configure_session`](Self::configure_session) activated it
    pub fn release_session(&self) -> PolicyOutcome {
        if !self.session_active.swap(false, Ordering::AcqRel) {
            return PolicyOutcome::Skipped;
        }
        PolicyOutcome::from_result("audio_session_release", self.platform.release_session())
    }

    /// Apply every output policy to the remote audio, if any
    pub fn enhance(&self, audio: Option<&AggregateStream>) -> EnhancementReport {
        if !self.config.enabled {
            return EnhancementReport::skipped();
        }

        let tracks_enabled = audio
            .map(|stream| {
                stream
                    .tracks()
                    .iter()
                    .filter(|track| track.is_live())
                    .inspect(|track| track.set_enabled(true))
                    .count()
            })
            .unwrap_or(0);

        let speaker_route = if self.config.prefer_speaker {
            PolicyOutcome::from_result("speaker_route", self.platform.set_speaker_output(true))
        } else {
            PolicyOutcome::Skipped
        };

        let session_volume = if self.config.maximize_session_volume {
            PolicyOutcome::from_result("session_volume", self.platform.maximize_output_volume())
        } else {
            PolicyOutcome::Skipped
        };

        let gain_stage = match audio {
            Some(stream) if !stream.has_gain_stage() => {
                let gain = self.config.software_gain;
                let outcome =
                    PolicyOutcome::from_result("gain_stage", self.platform.install_gain_stage(stream, gain));
                if outcome.is_applied() {
                    stream.set_gain(gain);
                }
                outcome
            }
            _ => PolicyOutcome::Skipped,
        };

        let report = EnhancementReport {
            tracks_enabled,
            speaker_route,
            session_volume,
            gain_stage,
        };
        debug!(report = ?report, "Audio output enhanced");
        report
    }
}

impl std::fmt::Debug for AudioOutputEnhancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioOutputEnhancer")
            .field("platform", &self.platform.name())
            .field("config", &self.config)
            .field("session_active", &self.session_active.load(Ordering::Relaxed))
            .finish()
    }
}
