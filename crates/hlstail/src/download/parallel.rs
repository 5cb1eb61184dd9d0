use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use bytes::Bytes;
use tokio::sync::{Mutex, Semaphore};

use crate::{
    error::TailResult,
    fetch::Fetch,
    hls::segment::{M3u8Segment, SegmentState},
    merge::Merger,
};

/// Fetches segments on a bounded number of concurrent tasks and hands the
/// results to a [Merger].
pub struct SegmentPool<F, M> {
    fetcher: Arc<F>,
    merger: Arc<M>,

    concurrency: NonZeroU32,
    permits: Arc<Semaphore>,

    timeout: Duration,
    retries: u32,
    retry_backoff: Duration,

    total: Arc<AtomicUsize>,
    downloaded: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
    failed_sequences: Arc<Mutex<Vec<u64>>>,
}

impl<F, M> SegmentPool<F, M>
where
    F: Fetch,
    M: Merger,
{
    pub fn new(
        fetcher: Arc<F>,
        merger: Arc<M>,
        concurrency: NonZeroU32,
        timeout: Duration,
        retries: u32,
        retry_backoff: Duration,
    ) -> Self {
        tracing::info!("Start downloading with {} thread(s).", concurrency.get());

        Self {
            fetcher,
            merger,
            concurrency,
            permits: Arc::new(Semaphore::new(concurrency.get() as usize)),

            timeout,
            retries,
            retry_backoff,

            total: Arc::new(AtomicUsize::new(0)),
            downloaded: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(AtomicUsize::new(0)),
            failed_sequences: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Schedules a segment. Waits until a worker slot is free, but never for the
    /// fetch itself.
    pub async fn dispatch(&self, mut segment: M3u8Segment) -> TailResult<()> {
        let permit = self.permits.clone().acquire_owned().await?;
        self.total.fetch_add(1, Ordering::Relaxed);

        let fetcher = self.fetcher.clone();
        let merger = self.merger.clone();
        let segments_total = self.total.clone();
        let segments_downloaded = self.downloaded.clone();
        let segments_failed = self.failed.clone();
        let failed_sequences = self.failed_sequences.clone();

        let timeout = self.timeout;
        let retry_backoff = self.retry_backoff;
        let mut retries = self.retries;

        tokio::spawn(async move {
            let sequence = segment.sequence;
            segment.advance(SegmentState::Fetching);
            tracing::debug!(
                "Fetching #{sequence} ({:.2}s) from {}",
                segment.duration,
                segment.url
            );

            let data = loop {
                match fetch_and_process(fetcher.as_ref(), &segment, timeout).await {
                    Ok(data) => break Some(data),
                    Err(e) => {
                        if retries == 0 {
                            tracing::error!(
                                "Processing #{sequence} failed, max retries exceed, drop. {e}"
                            );
                            break None;
                        }

                        retries -= 1;
                        tracing::warn!("Processing #{sequence} failed, retry later. {e}");
                        tokio::time::sleep(retry_backoff).await;
                    }
                }
            };

            let result = match data {
                Some(data) => {
                    segment.advance(SegmentState::Fetched);
                    segments_downloaded.fetch_add(1, Ordering::Relaxed);
                    merger.update(sequence, data).await
                }
                None => {
                    segment.advance(SegmentState::SkippedFailed);
                    failed_sequences.lock().await.push(sequence);
                    segments_failed.fetch_add(1, Ordering::Relaxed);
                    merger.fail(sequence).await
                }
            };
            if let Err(e) = result {
                tracing::error!("Failed to merge #{sequence}: {e}");
            }

            let done = segments_downloaded.load(Ordering::Relaxed)
                + segments_failed.load(Ordering::Relaxed);
            let total = segments_total.load(Ordering::Relaxed);
            let percentage = if total == 0 {
                0.
            } else {
                done as f32 / total as f32 * 100.
            };
            tracing::info!(
                "Processing #{sequence} finished. ({done} / {total} or {percentage:.2}%)"
            );

            // release the slot only after the merger has taken the segment
            drop(permit);
        });

        Ok(())
    }

    /// Records a segment that can not be fetched at all.
    pub async fn skip(&self, sequence: u64) -> TailResult<()> {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.failed_sequences.lock().await.push(sequence);
        self.merger.fail(sequence).await
    }

    /// Waits until every dispatched segment is finished.
    pub async fn join(&self) -> TailResult<()> {
        let _permits = self.permits.acquire_many(self.concurrency.get()).await?;
        Ok(())
    }

    /// Number of segments scheduled so far, skipped ones included.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Sequences given up on, in ascending order.
    pub async fn failed_sequences(&self) -> Vec<u64> {
        let mut failed = self.failed_sequences.lock().await.clone();
        failed.sort_unstable();
        failed
    }
}

/// One attempt: fetch, check the transfer, decrypt.
async fn fetch_and_process<F>(
    fetcher: &F,
    segment: &M3u8Segment,
    timeout: Duration,
) -> TailResult<Bytes>
where
    F: Fetch,
{
    let response = fetcher
        .fetch(&segment.url, timeout)
        .await?
        .error_for_status()?;
    response.verify_content_length()?;

    match &segment.key {
        Some(key) => Ok(Bytes::from(key.decrypt(&response.body)?)),
        None => Ok(response.body),
    }
}
