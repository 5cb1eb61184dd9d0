mod parallel;

pub use parallel::SegmentPool;

use std::{sync::Arc, time::Duration};

use url::Url;

use crate::{
    config::TailOptions,
    decrypt::{DecrypterRegistry, EncryptionContext},
    error::TailResult,
    fetch::Fetch,
    hls::{
        key::KeyLoader, playlist::ChunkList, resolve::resolve_chunk_list, segment::M3u8Segment,
        ChunkListPoller,
    },
    merge::{MergeSummary, Merger},
    tracker::SequenceTracker,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Resolving,
    Polling,
    Draining,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Segments scheduled, including the ones that vanished before dispatch
    pub dispatched: usize,
    pub downloaded: usize,
    pub failed: usize,
    /// Sequences given up on, in ascending order
    pub failed_sequences: Vec<u64>,
    pub merge: MergeSummary,
}

/// Follows a live or finished HLS stream until its end, downloading every new
/// segment exactly once.
pub struct TailDownloader<F> {
    fetcher: Arc<F>,
    url: Url,
    options: TailOptions,
    registry: DecrypterRegistry,

    state: PollState,
}

impl<F> TailDownloader<F>
where
    F: Fetch,
{
    pub fn new(fetcher: F, url: Url, options: TailOptions) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            url,
            options,
            registry: DecrypterRegistry::default(),
            state: PollState::Resolving,
        }
    }

    /// Replaces the decryption methods, AES-128 by default.
    pub fn with_registry(mut self, registry: DecrypterRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    fn transition(&mut self, next: PollState) {
        tracing::debug!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    pub async fn download<M>(&mut self, merger: M) -> TailResult<DownloadSummary>
    where
        M: Merger,
    {
        let merger = Arc::new(merger);

        self.transition(PollState::Resolving);
        let chunk_list_url = match resolve_chunk_list(
            self.fetcher.as_ref(),
            &self.url,
            self.options.chunk_list_timeout,
        )
        .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::error!("Failed to resolve playlist: {e}");
                self.transition(PollState::Aborted);
                _ = merger.finish().await;
                return Err(e);
            }
        };

        let pool = SegmentPool::new(
            self.fetcher.clone(),
            merger.clone(),
            self.options.concurrency,
            self.options.segment_timeout,
            self.options.segment_retries,
            self.options.segment_retry_backoff,
        );

        self.transition(PollState::Polling);
        let result = self.follow(chunk_list_url, &pool, merger.as_ref()).await;
        if let Err(e) = &result {
            tracing::error!("Stop polling: {e}");
        }

        self.transition(PollState::Draining);
        pool.join().await?;
        let merge = merger.finish().await;

        let summary = DownloadSummary {
            dispatched: pool.total(),
            downloaded: pool.downloaded(),
            failed: pool.failed(),
            failed_sequences: pool.failed_sequences().await,
            merge: merge?,
        };

        match result {
            Ok(()) => {
                self.transition(PollState::Done);
                Ok(summary)
            }
            Err(e) => {
                self.transition(PollState::Aborted);
                Err(e)
            }
        }
    }

    async fn follow<M>(
        &self,
        chunk_list_url: Url,
        pool: &SegmentPool<F, M>,
        merger: &M,
    ) -> TailResult<()>
    where
        M: Merger,
    {
        let mut poller = ChunkListPoller::new(
            self.fetcher.clone(),
            chunk_list_url,
            self.options.chunk_list_timeout,
            self.options.chunk_list_retries,
            self.options.chunk_list_retry_backoff,
        );
        let keys = KeyLoader::new(
            self.fetcher.clone(),
            self.registry.clone(),
            self.options.key_file.clone(),
            self.options.segment_timeout,
        );
        let mut tracker = SequenceTracker::new(self.options.tail);

        loop {
            let (url, chunk_list) = poller.poll().await?;

            let key = match keys.load(chunk_list.encryption.as_ref(), &url).await {
                Ok(key) => key,
                Err(e) if e.is_configuration_error() => return Err(e),
                Err(e) => {
                    tracing::warn!("Cannot load decryption key: {e}");
                    poller.backoff().await?;
                    continue;
                }
            };
            poller.reset();

            if let Some(range) = tracker.reconcile(&chunk_list) {
                if let Some(first) = tracker.first_sequence() {
                    merger.begin(first).await?;
                }

                tracing::info!(
                    "{} new segments were added to queue.",
                    range.end() - range.start() + 1
                );
                for sequence in range {
                    self.dispatch(pool, &chunk_list, &url, sequence, key.as_ref())
                        .await?;
                }
            }

            if chunk_list.is_end {
                tracing::info!("End of stream reached.");
                return Ok(());
            }

            tokio::time::sleep(self.reload_interval(&chunk_list)).await;
        }
    }

    async fn dispatch<M>(
        &self,
        pool: &SegmentPool<F, M>,
        chunk_list: &ChunkList,
        chunk_list_url: &Url,
        sequence: u64,
        key: Option<&Arc<EncryptionContext>>,
    ) -> TailResult<()>
    where
        M: Merger,
    {
        let Some(entry) = chunk_list.entry(sequence) else {
            tracing::warn!("Segment #{sequence} left the chunk list before it was fetched.");
            return pool.skip(sequence).await;
        };

        match chunk_list_url.join(&entry.uri) {
            Ok(url) => {
                let segment = M3u8Segment::new(sequence, url, entry.duration, key.cloned());
                pool.dispatch(segment).await
            }
            Err(e) => {
                tracing::error!("Invalid uri {} of segment #{sequence}: {e}", entry.uri);
                pool.skip(sequence).await
            }
        }
    }

    /// Half the target duration, the retry backoff when the chunk list has none.
    fn reload_interval(&self, chunk_list: &ChunkList) -> Duration {
        if chunk_list.target_duration > 0. {
            Duration::from_secs_f64(chunk_list.target_duration / 2.)
        } else {
            self.options.chunk_list_retry_backoff
        }
    }
}
