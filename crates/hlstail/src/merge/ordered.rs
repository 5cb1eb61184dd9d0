use std::{collections::BTreeMap, path::Path};

use bytes::Bytes;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncWrite, AsyncWriteExt},
    sync::Mutex,
};

use super::{MergeSummary, Merger};
use crate::error::TailResult;

/// Reassembles segments completed in any order into one sequential output.
///
/// Every submission runs its whole check-and-advance step under a single lock,
/// so exactly one submitter writes each contiguous run of segments.
pub struct OrderedMerger<W> {
    state: Mutex<ReassemblyState<W>>,
}

struct ReassemblyState<W> {
    /// Completed segments waiting for their predecessors. `None` marks a
    /// segment that failed permanently.
    payloads: BTreeMap<u64, Option<Bytes>>,
    /// Next sequence to flush, known after [Merger::begin]
    next: Option<u64>,

    sink: Option<W>,
    summary: MergeSummary,
}

impl OrderedMerger<File> {
    /// Opens `path` for writing. The file is truncated unless `append` is set.
    pub async fn file(path: impl AsRef<Path>, append: bool) -> TailResult<Self> {
        let mut options = OpenOptions::new();
        options.create(true);
        if append {
            options.append(true);
        } else {
            options.write(true).truncate(true);
        }

        let file = options.open(path.as_ref()).await?;
        tracing::info!(
            "Writing stream to {} ({})",
            path.as_ref().display(),
            if append { "append" } else { "truncate" }
        );
        Ok(Self::new(file))
    }
}

impl<W> OrderedMerger<W>
where
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    pub fn new(sink: W) -> Self {
        Self {
            state: Mutex::new(ReassemblyState {
                payloads: BTreeMap::new(),
                next: None,
                sink: Some(sink),
                summary: MergeSummary::default(),
            }),
        }
    }

    /// The last sequence written or skipped.
    pub async fn last_flushed(&self) -> Option<u64> {
        self.state
            .lock()
            .await
            .next
            .and_then(|next| next.checked_sub(1))
    }

    /// Number of completed segments still waiting for a predecessor.
    pub async fn pending(&self) -> usize {
        self.state.lock().await.payloads.len()
    }

    /// Gives the sink back once the merger has been finished.
    pub fn into_inner(self) -> Option<W> {
        self.state.into_inner().sink
    }

    async fn submit(&self, sequence: u64, payload: Option<Bytes>) -> TailResult<()> {
        let mut state = self.state.lock().await;
        let flushed = state.next.is_some_and(|next| sequence < next);
        if flushed || state.payloads.contains_key(&sequence) {
            tracing::warn!("Segment #{sequence} was submitted twice, ignoring.");
            return Ok(());
        }

        state.payloads.insert(sequence, payload);
        state.advance().await
    }
}

impl<W> ReassemblyState<W>
where
    W: AsyncWrite + Unpin,
{
    async fn advance(&mut self) -> TailResult<()> {
        let Some(mut next) = self.next else {
            return Ok(());
        };

        let mut result = Ok(());
        while let Some(payload) = self.payloads.remove(&next) {
            match payload {
                Some(data) => {
                    tracing::debug!("Writing #{next} to output");
                    if let Some(sink) = self.sink.as_mut() {
                        if let Err(e) = sink.write_all(&data).await {
                            tracing::error!("Failed to write #{next}: {e}");
                            result = Err(e.into());
                        }
                    }
                    self.summary.written += 1;
                    self.summary.bytes += data.len() as u64;
                }
                None => {
                    tracing::debug!("Skip writing #{next}");
                    self.summary.skipped += 1;
                }
            }
            next += 1;
        }
        self.next = Some(next);

        result
    }
}

impl<W> Merger for OrderedMerger<W>
where
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    async fn begin(&self, first_sequence: u64) -> TailResult<()> {
        let mut state = self.state.lock().await;
        if state.next.is_some() {
            return Ok(());
        }

        state.next = Some(first_sequence);
        state.advance().await
    }

    async fn update(&self, sequence: u64, data: Bytes) -> TailResult<()> {
        self.submit(sequence, Some(data)).await
    }

    async fn fail(&self, sequence: u64) -> TailResult<()> {
        self.submit(sequence, None).await
    }

    async fn finish(&self) -> TailResult<MergeSummary> {
        let mut state = self.state.lock().await;
        if !state.payloads.is_empty() {
            tracing::warn!(
                "{} segment(s) were never written, still waiting for #{}",
                state.payloads.len(),
                state.next.unwrap_or_default()
            );
        }

        if let Some(mut sink) = state.sink.take() {
            sink.flush().await?;
            sink.shutdown().await?;
            state.sink = Some(sink);
        }

        Ok(state.summary.clone())
    }
}
