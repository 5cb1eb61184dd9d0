use std::{ops::RangeInclusive, time::Duration};

use crate::hls::playlist::ChunkList;

/// Follows the media sequence cursor across chunk list reloads.
///
/// Every sequence number is handed out at most once, no matter how many
/// generations keep listing it.
#[derive(Debug, Clone)]
pub struct SequenceTracker {
    /// Resume window, only applied to the first generation
    tail: Option<Duration>,

    first_sequence: Option<u64>,
    last_dispatched: Option<u64>,
}

impl SequenceTracker {
    pub fn new(tail: Option<Duration>) -> Self {
        Self {
            tail,
            first_sequence: None,
            last_dispatched: None,
        }
    }

    /// The first sequence that was handed out, once a generation has been seen.
    pub fn first_sequence(&self) -> Option<u64> {
        self.first_sequence
    }

    pub fn last_dispatched(&self) -> Option<u64> {
        self.last_dispatched
    }

    /// Returns the range of sequences revealed by this generation, or `None` if
    /// there is nothing new.
    ///
    /// The range always continues right after the previously returned one. It may
    /// contain sequences this generation no longer lists when the server window
    /// moved past them between two reloads.
    pub fn reconcile(&mut self, chunk_list: &ChunkList) -> Option<RangeInclusive<u64>> {
        // an empty generation says nothing about where the stream is
        let end = chunk_list.last_sequence()?;

        let start = match self.last_dispatched {
            Some(last) => last + 1,
            None => {
                let start = match self.tail {
                    Some(tail) => {
                        let start = tail_start(
                            chunk_list.media_sequence,
                            end,
                            chunk_list.target_duration,
                            tail,
                        );
                        tracing::info!(
                            "Tail mode: keeping the last {}s, starting at #{start}",
                            tail.as_secs()
                        );
                        start
                    }
                    None => chunk_list.media_sequence,
                };
                self.first_sequence = Some(start);
                start
            }
        };

        if start > end {
            return None;
        }

        self.last_dispatched = Some(end);
        Some(start..=end)
    }
}

/// `max(media_sequence, last_sequence - floor(tail / target_duration))`
pub fn tail_start(
    media_sequence: u64,
    last_sequence: u64,
    target_duration: f64,
    tail: Duration,
) -> u64 {
    let tail_size = if target_duration > 0. {
        (tail.as_secs_f64() / target_duration).floor() as u64
    } else {
        u64::MAX
    };
    last_sequence.saturating_sub(tail_size).max(media_sequence)
}
