//! Media tracks and aggregate streams
//!
//! Tracks are created by the media engine (remote) or by a [`MediaSource`]
//! (local). Remote tracks are grouped per kind into an [`AggregateStream`],
//! which is what the host renders or plays back.
//!
//! Both handle types are cheap to clone and share their state, so a clone
//! handed to the host observes the same enable/stop state the session sees.
//!
//! [`MediaSource`]: crate::platform::MediaSource

pub mod demux;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub use demux::{DemuxOutcome, TrackDemuxer};

/// Kind of media carried by a track or stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct TrackInner {
    id: String,
    kind: MediaKind,
    label: String,
    enabled: AtomicBool,
    live: AtomicBool,
}

/// Handle to one encoded media source
///
/// Identity is the track id: two handles with the same id refer to the same
/// media line even if the engine produced them from separate notifications.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    pub fn new(id: impl Into<String>, kind: MediaKind) -> Self {
        let id = id.into();
        Self::with_label(id.clone(), kind, id)
    }

    pub fn with_label(id: impl Into<String>, kind: MediaKind, label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: id.into(),
                kind,
                label: label.into(),
                enabled: AtomicBool::new(true),
                live: AtomicBool::new(true),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Release);
    }

    /// A track stays live until it is stopped
    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Stop the track. Returns `false` if it had already been stopped.
    pub fn stop(&self) -> bool {
        let was_live = self.inner.live.swap(false, Ordering::AcqRel);
        if was_live {
            tracing::debug!(track_id = %self.inner.id, kind = %self.inner.kind, "Track stopped");
        }
        was_live
    }

    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.id == other.inner.id
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("enabled", &self.is_enabled())
            .field("live", &self.is_live())
            .finish()
    }
}

struct StreamInner {
    id: String,
    kind: MediaKind,
    tracks: RwLock<Vec<MediaTrack>>,
    gain: RwLock<Option<f32>>,
}

/// Application-level grouping of same-kind remote tracks
///
/// Hosts receive clones of the session's streams through events and may read
/// them freely; only the session core adds tracks, stops them or installs a
/// playback gain.
#[derive(Clone)]
pub struct AggregateStream {
    inner: Arc<StreamInner>,
}

impl AggregateStream {
    pub(crate) fn new(kind: MediaKind) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                id: format!("{}-{}", kind, uuid::Uuid::new_v4()),
                kind,
                tracks: RwLock::new(Vec::new()),
                gain: RwLock::new(None),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn tracks(&self) -> Vec<MediaTrack> {
        self.inner.tracks.read().clone()
    }

    pub fn track_count(&self) -> usize {
        self.inner.tracks.read().len()
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.inner.tracks.read().iter().any(|t| t.id() == track_id)
    }

    /// Playback gain consumers should apply; 1.0 unless the enhancer installed one
    pub fn gain(&self) -> f32 {
        self.inner.gain.read().unwrap_or(1.0)
    }

    pub fn has_gain_stage(&self) -> bool {
        self.inner.gain.read().is_some()
    }

    pub fn same_stream(&self, other: &AggregateStream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Insert unless a member with the same identity exists. Returns whether it was added.
    pub(crate) fn add_track(&self, track: MediaTrack) -> bool {
        let mut tracks = self.inner.tracks.write();
        if tracks.iter().any(|t| t.same_track(&track)) {
            return false;
        }
        tracks.push(track);
        true
    }

    pub(crate) fn set_gain(&self, gain: f32) {
        *self.inner.gain.write() = Some(gain);
    }

    /// Stop every member track, returning how many were still live
    pub(crate) fn stop_all(&self) -> usize {
        self.inner.tracks.read().iter().filter(|t| t.stop()).count()
    }
}

impl fmt::Debug for AggregateStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateStream")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("tracks", &self.track_count())
            .field("gain", &self.gain())
            .finish()
    }
}

/// Locally captured media attached to a session
#[derive(Debug, Clone, Default)]
pub struct LocalMedia {
    tracks: Vec<MediaTrack>,
}

impl LocalMedia {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn stop_all(&self) -> usize {
        self.tracks.iter().filter(|t| t.stop()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_stop_is_reported_once() {
        let track = MediaTrack::new("a1", MediaKind::Audio);
        assert!(track.is_live());
        assert!(track.stop());
        assert!(!track.stop());
        assert!(!track.is_live());
    }

    #[test]
    fn test_clones_share_state() {
        let track = MediaTrack::new("v1", MediaKind::Video);
        let clone = track.clone();
        clone.set_enabled(false);
        assert!(!track.is_enabled());
        assert!(track.same_track(&clone));
    }

    #[test]
    fn test_stream_rejects_duplicate_identity() {
        let stream = AggregateStream::new(MediaKind::Audio);
        assert!(stream.add_track(MediaTrack::new("a1", MediaKind::Audio)));
        // A separate handle for the same media line is still a duplicate
        assert!(!stream.add_track(MediaTrack::new("a1", MediaKind::Audio)));
        assert!(stream.add_track(MediaTrack::new("a2", MediaKind::Audio)));
        assert_eq!(stream.track_count(), 2);
        assert!(stream.contains("a2"));
    }

    #[test]
    fn test_stream_gain_defaults_to_unity() {
        let stream = AggregateStream::new(MediaKind::Audio);
        assert_eq!(stream.gain(), 1.0);
        assert!(!stream.has_gain_stage());
        stream.set_gain(2.5);
        assert_eq!(stream.gain(), 2.5);
    }

    #[test]
    fn test_local_media_stop_all() {
        let media = LocalMedia::new(vec![
            MediaTrack::new("mic", MediaKind::Audio),
            MediaTrack::new("cam", MediaKind::Video),
        ]);
        assert_eq!(media.live_track_count(), 2);
        assert_eq!(media.stop_all(), 2);
        assert_eq!(media.stop_all(), 0);
        assert_eq!(media.live_track_count(), 0);
    }
}
