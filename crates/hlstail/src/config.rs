use std::{num::NonZeroU32, path::PathBuf, time::Duration};

/// Tunables of a [TailDownloader](crate::download::TailDownloader).
#[derive(Debug, Clone)]
pub struct TailOptions {
    /// Maximum number of segments fetched at the same time
    pub concurrency: NonZeroU32,

    pub segment_timeout: Duration,
    /// Retries after the first failed attempt, a segment is given up after
    /// `segment_retries + 1` attempts
    pub segment_retries: u32,
    pub segment_retry_backoff: Duration,

    pub chunk_list_timeout: Duration,
    pub chunk_list_retries: u32,
    pub chunk_list_retry_backoff: Duration,

    /// Start this far behind the live edge instead of at the oldest listed segment
    pub tail: Option<Duration>,
    /// Read the decryption key from this file instead of the key uri
    pub key_file: Option<PathBuf>,
}

impl Default for TailOptions {
    fn default() -> Self {
        Self {
            concurrency: NonZeroU32::new(5).unwrap_or(NonZeroU32::MIN),
            segment_timeout: Duration::from_secs(5),
            segment_retries: 10,
            segment_retry_backoff: Duration::from_secs(3),
            chunk_list_timeout: Duration::from_secs(5),
            chunk_list_retries: 10,
            chunk_list_retry_backoff: Duration::from_secs(10),
            tail: None,
            key_file: None,
        }
    }
}

impl TailOptions {
    pub fn with_concurrency(mut self, concurrency: NonZeroU32) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_segment_timeout(mut self, timeout: Duration) -> Self {
        self.segment_timeout = timeout;
        self
    }

    pub fn with_segment_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.segment_retries = retries;
        self.segment_retry_backoff = backoff;
        self
    }

    pub fn with_chunk_list_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_list_timeout = timeout;
        self
    }

    pub fn with_chunk_list_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.chunk_list_retries = retries;
        self.chunk_list_retry_backoff = backoff;
        self
    }

    pub fn with_tail(mut self, tail: Option<Duration>) -> Self {
        self.tail = tail;
        self
    }

    pub fn with_key_file(mut self, key_file: Option<PathBuf>) -> Self {
        self.key_file = key_file;
        self
    }
}
