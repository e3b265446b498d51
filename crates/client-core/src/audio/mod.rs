//! Audio output handling
//!
//! The remote audio of an avatar session is often too quiet on handheld
//! devices. [`AudioOutputEnhancer`] applies a set of independent,
//! best-effort policies through an [`AudioPlatform`] implementation:
//!
//! - configure the platform audio session for two-way media
//! - route playback to the loudspeaker
//! - raise the communication-class volume to its maximum
//! - install a post-processing gain stage on the remote audio stream
//!
//! A platform implements only the capabilities it has; everything else
//! reports [`AudioPlatformError::Unsupported`] and is skipped.
//!
//! # Built-in platforms
//!
//! - [`NullAudioPlatform`] supports nothing
//! - [`SoftwareAudioPlatform`] supports only the gain stage, applied by the
//!   host's own playback path with [`GainProcessor`]

pub mod enhancer;
pub mod gain;

use thiserror::Error;

use crate::config::AudioSessionProfile;
use crate::media::AggregateStream;

pub use enhancer::{AudioOutputEnhancer, EnhancementReport, PolicyOutcome};
pub use gain::GainProcessor;

pub type AudioPlatformResult<T> = Result<T, AudioPlatformError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioPlatformError {
    #[error("not supported on this platform")]
    Unsupported,

    #[error("platform audio error: {reason}")]
    Failed { reason: String },
}

impl AudioPlatformError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed { reason: reason.into() }
    }
}

/// Audio capabilities of the host platform
///
/// Calls are synchronous and must not block for long; they run on the
/// session's event path.
pub trait AudioPlatform: Send + Sync {
    fn name(&self) -> &str {
        "unknown"
    }

    fn configure_session(&self, _profile: &AudioSessionProfile) -> AudioPlatformResult<()> {
        Err(AudioPlatformError::Unsupported)
    }

    fn set_speaker_output(&self, _enabled: bool) -> AudioPlatformResult<()> {
        Err(AudioPlatformError::Unsupported)
    }

    fn maximize_output_volume(&self) -> AudioPlatformResult<()> {
        Err(AudioPlatformError::Unsupported)
    }

    /// Route `stream` through a programmable graph that multiplies by `gain`
    fn install_gain_stage(&self, _stream: &AggregateStream, _gain: f32) -> AudioPlatformResult<()> {
        Err(AudioPlatformError::Unsupported)
    }

    fn release_session(&self) -> AudioPlatformResult<()> {
        Err(AudioPlatformError::Unsupported)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullAudioPlatform;

impl AudioPlatform for NullAudioPlatform {
    fn name(&self) -> &str {
        "null"
    }
}

/// Desktop playback: the host applies the gain itself
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareAudioPlatform;

impl AudioPlatform for SoftwareAudioPlatform {
    fn name(&self) -> &str {
        "software"
    }

    fn install_gain_stage(&self, stream: &AggregateStream, gain: f32) -> AudioPlatformResult<()> {
        GainProcessor::new(gain)?;
        tracing::debug!(stream_id = stream.id(), gain, "Software gain stage ready");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioEnhancementConfig;
    use crate::media::MediaKind;
    use std::sync::Arc;

    #[test]
    fn test_null_platform_never_fails_the_enhancer() {
        let enhancer = AudioOutputEnhancer::new(Arc::new(NullAudioPlatform), AudioEnhancementConfig::default());
        let stream = AggregateStream::new(MediaKind::Audio);

        assert_eq!(enhancer.configure_session(), PolicyOutcome::Unsupported);
        let report = enhancer.enhance(Some(&stream));
        assert_eq!(report.speaker_route, PolicyOutcome::Unsupported);
        assert_eq!(report.session_volume, PolicyOutcome::Unsupported);
        assert_eq!(report.gain_stage, PolicyOutcome::Unsupported);
        assert!(!stream.has_gain_stage());
        assert_eq!(enhancer.release_session(), PolicyOutcome::Skipped);
    }

    #[test]
    fn test_software_platform_rejects_bad_gain() {
        let stream = AggregateStream::new(MediaKind::Audio);
        assert!(SoftwareAudioPlatform.install_gain_stage(&stream, 2.5).is_ok());
        assert!(matches!(
            SoftwareAudioPlatform.install_gain_stage(&stream, f32::NAN),
            Err(AudioPlatformError::Failed { .. })
        ));
        assert_eq!(SoftwareAudioPlatform.set_speaker_output(true), Err(AudioPlatformError::Unsupported));
    }
}
