use std::{
    path::PathBuf,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;

use super::{MergeSummary, Merger};
use crate::error::TailResult;

/// Writes every segment to its own file, no ordering involved.
pub struct SplitMerger {
    output_dir: PathBuf,

    written: AtomicUsize,
    skipped: AtomicUsize,
    bytes: AtomicU64,
}

impl SplitMerger {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            written: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    pub fn segment_path(&self, sequence: u64) -> PathBuf {
        self.output_dir.join(format!("{sequence:05}.ts"))
    }
}

impl Merger for SplitMerger {
    async fn begin(&self, _first_sequence: u64) -> TailResult<()> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        Ok(())
    }

    async fn update(&self, sequence: u64, data: Bytes) -> TailResult<()> {
        // begin may never have run for a merger driven by hand
        tokio::fs::create_dir_all(&self.output_dir).await?;

        let path = self.segment_path(sequence);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.shutdown().await?;

        self.written.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn fail(&self, sequence: u64) -> TailResult<()> {
        tracing::warn!("No file is written for failed segment #{sequence}");
        self.skipped.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn finish(&self) -> TailResult<MergeSummary> {
        tracing::info!("Segments are located at {}", self.output_dir.display());
        Ok(MergeSummary {
            written: self.written.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        })
    }
}
