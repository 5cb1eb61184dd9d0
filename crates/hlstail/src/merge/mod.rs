mod ordered;
mod split;

pub use ordered::OrderedMerger;
pub use split::SplitMerger;

use std::{future::Future, path::PathBuf, sync::Arc};

use bytes::Bytes;
use tokio::fs::File;

use crate::error::TailResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Segments written to the output
    pub written: usize,
    /// Segments that failed and left no output
    pub skipped: usize,
    pub bytes: u64,
}

/// Destination of downloaded segments, shared by all download workers.
pub trait Merger: Send + Sync + 'static {
    /// Announce the first sequence that will ever be submitted.
    fn begin(&self, _first_sequence: u64) -> impl Future<Output = TailResult<()>> + Send {
        async { Ok(()) }
    }

    /// Add a segment to the merger.
    ///
    /// This method might not be called in order of segment sequence.
    /// Implementations must handle the order themselves.
    fn update(&self, sequence: u64, data: Bytes) -> impl Future<Output = TailResult<()>> + Send;

    /// Tell the merger that a segment has failed permanently.
    fn fail(&self, sequence: u64) -> impl Future<Output = TailResult<()>> + Send;

    /// Close the output. Called exactly once, after every worker has finished.
    fn finish(&self) -> impl Future<Output = TailResult<MergeSummary>> + Send;
}

impl<M> Merger for Arc<M>
where
    M: Merger,
{
    fn begin(&self, first_sequence: u64) -> impl Future<Output = TailResult<()>> + Send {
        self.as_ref().begin(first_sequence)
    }

    fn update(&self, sequence: u64, data: Bytes) -> impl Future<Output = TailResult<()>> + Send {
        self.as_ref().update(sequence, data)
    }

    fn fail(&self, sequence: u64) -> impl Future<Output = TailResult<()>> + Send {
        self.as_ref().fail(sequence)
    }

    fn finish(&self) -> impl Future<Output = TailResult<MergeSummary>> + Send {
        self.as_ref().finish()
    }
}

pub enum TailMerger {
    Ordered(OrderedMerger<File>),
    Split(SplitMerger),
}

impl TailMerger {
    /// Concatenate segments into `output_file` in sequence order.
    pub async fn concat(output_file: impl Into<PathBuf>, append: bool) -> TailResult<Self> {
        Ok(Self::Ordered(
            OrderedMerger::file(output_file.into(), append).await?,
        ))
    }

    /// Write every segment to its own file under `output_dir`.
    pub fn split(output_dir: impl Into<PathBuf>) -> Self {
        Self::Split(SplitMerger::new(output_dir))
    }
}

impl Merger for TailMerger {
    async fn begin(&self, first_sequence: u64) -> TailResult<()> {
        match self {
            Self::Ordered(merger) => merger.begin(first_sequence).await,
            Self::Split(merger) => merger.begin(first_sequence).await,
        }
    }

    async fn update(&self, sequence: u64, data: Bytes) -> TailResult<()> {
        match self {
            Self::Ordered(merger) => merger.update(sequence, data).await,
            Self::Split(merger) => merger.update(sequence, data).await,
        }
    }

    async fn fail(&self, sequence: u64) -> TailResult<()> {
        match self {
            Self::Ordered(merger) => merger.fail(sequence).await,
            Self::Split(merger) => merger.fail(sequence).await,
        }
    }

    async fn finish(&self) -> TailResult<MergeSummary> {
        match self {
            Self::Ordered(merger) => merger.finish().await,
            Self::Split(merger) => merger.finish().await,
        }
    }
}
