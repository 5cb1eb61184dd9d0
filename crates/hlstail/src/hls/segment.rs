use std::sync::Arc;

use url::Url;

use crate::decrypt::EncryptionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentState {
    Pending,
    Fetching,
    Fetched,
    SkippedFailed,
}

impl SegmentState {
    fn can_advance_to(self, next: SegmentState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Fetching)
                | (Self::Fetching, Self::Fetched)
                | (Self::Fetching, Self::SkippedFailed)
                // vanished from the chunk list before it could be fetched
                | (Self::Pending, Self::SkippedFailed)
        )
    }
}

pub struct M3u8Segment {
    pub url: Url,
    /// Playback length in seconds
    pub duration: f32,
    pub key: Option<Arc<EncryptionContext>>,

    /// Media sequence number, unique across all generations of the chunk list
    pub sequence: u64,

    state: SegmentState,
}

impl M3u8Segment {
    pub fn new(
        sequence: u64,
        url: Url,
        duration: f32,
        key: Option<Arc<EncryptionContext>>,
    ) -> Self {
        Self {
            url,
            duration,
            key,
            sequence,
            state: SegmentState::Pending,
        }
    }

    pub fn state(&self) -> SegmentState {
        self.state
    }

    /// Moves the segment forward. Backward or repeated transitions are ignored.
    pub fn advance(&mut self, next: SegmentState) -> bool {
        if self.state.can_advance_to(next) {
            self.state = next;
            true
        } else {
            tracing::warn!(
                "Segment #{} can not move from {:?} to {:?}",
                self.sequence,
                self.state,
                next
            );
            false
        }
    }
}
