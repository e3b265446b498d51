//! Track demultiplexing
//!
//! Turns individually arriving remote tracks into one long-lived
//! [`AggregateStream`] per media kind. Engines may announce the same media
//! line more than once, so insertion is identity-deduplicated and only a
//! genuinely new track produces an update.

use super::{AggregateStream, MediaKind, MediaTrack};

/// Result of feeding one track-arrival notification to the demuxer
#[derive(Debug, Clone)]
pub enum DemuxOutcome {
    /// The track is new; the host should be told about `stream`
    Added {
        kind: MediaKind,
        stream: AggregateStream,
        /// The aggregate stream was created by this arrival
        created: bool,
    },
    /// The track was already a member of its stream
    Duplicate { kind: MediaKind, track_id: String },
}

impl DemuxOutcome {
    pub fn is_added(&self) -> bool {
        matches!(self, DemuxOutcome::Added { .. })
    }
}

/// Per-session demultiplexer state
#[derive(Debug, Default)]
pub struct TrackDemuxer {
    audio: Option<AggregateStream>,
    video: Option<AggregateStream>,
}

impl TrackDemuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify the track by kind and add it to the matching stream,
    /// creating the stream lazily on the first track of that kind.
    pub fn on_track(&mut self, track: MediaTrack) -> DemuxOutcome {
        let kind = track.kind();
        let slot = match kind {
            MediaKind::Audio => &mut self.audio,
            MediaKind::Video => &mut self.video,
        };

        let created = slot.is_none();
        let stream = slot.get_or_insert_with(|| AggregateStream::new(kind)).clone();

        let track_id = track.id().to_string();
        if stream.add_track(track) {
            tracing::debug!(
                kind = %kind,
                track_id = %track_id,
                stream_id = %stream.id(),
                tracks = stream.track_count(),
                "Added remote track to aggregate stream"
            );
            DemuxOutcome::Added { kind, stream, created }
        } else {
            tracing::debug!(kind = %kind, track_id = %track_id, "Ignoring duplicate track notification");
            DemuxOutcome::Duplicate { kind, track_id }
        }
    }

    pub fn stream(&self, kind: MediaKind) -> Option<&AggregateStream> {
        match kind {
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Video => self.video.as_ref(),
        }
    }

    pub fn audio(&self) -> Option<&AggregateStream> {
        self.audio.as_ref()
    }

    pub fn video(&self) -> Option<&AggregateStream> {
        self.video.as_ref()
    }

    /// Stop every remote track and drop both stream references.
    /// Returns how many tracks were still live.
    pub fn reset(&mut self) -> usize {
        let stopped = [self.audio.take(), self.video.take()]
            .into_iter()
            .flatten()
            .map(|stream| stream.stop_all())
            .sum();
        stopped
    }
}
