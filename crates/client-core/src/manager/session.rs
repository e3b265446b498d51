//! Per-attempt session record

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::media::{LocalMedia, TrackDemuxer};
use crate::peer::{ControllerState, PeerConnectionController};

/// Everything owned by one connect attempt
///
/// Lives in the manager's slot from the start of `connect` until teardown
/// takes it out; whoever takes it is the one that tears it down.
#[derive(Debug)]
pub(crate) struct Session {
    pub epoch: u64,
    pub session_id: Option<String>,
    pub local_media: LocalMedia,
    pub demuxer: TrackDemuxer,
    pub controller: Option<Arc<PeerConnectionController>>,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            session_id: None,
            local_media: LocalMedia::empty(),
            demuxer: TrackDemuxer::new(),
            controller: None,
            started_at: Utc::now(),
        }
    }

    pub fn state(&self) -> ControllerState {
        self.controller
            .as_ref()
            .map(|c| c.state())
            .unwrap_or(ControllerState::New)
    }
}
