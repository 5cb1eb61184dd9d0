use bytes::Bytes;
use hlstail::{Merger, OrderedMerger, TailMerger};

use crate::source::{body, concat};

#[tokio::test]
async fn concat_truncates_by_default() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("output.ts");
    std::fs::write(&output, b"stale data from a previous run")?;

    let merger = OrderedMerger::file(&output, false).await?;
    merger.begin(0).await?;
    merger.update(1, body(1)).await?;
    merger.update(0, body(0)).await?;
    merger.finish().await?;

    assert_eq!(std::fs::read(&output)?, concat(0..2));
    Ok(())
}

#[tokio::test]
async fn concat_appends_when_asked() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let output = dir.path().join("output.ts");
    std::fs::write(&output, body(0))?;

    let merger = TailMerger::concat(&output, true).await?;
    merger.begin(1).await?;
    merger.update(2, body(2)).await?;
    merger.fail(1).await?;
    let summary = merger.finish().await?;

    assert_eq!(summary.written, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(std::fs::read(&output)?, concat([0, 2]));
    Ok(())
}

#[tokio::test]
async fn split_writes_one_file_per_sequence() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let segments = dir.path().join("segments");

    let merger = TailMerger::split(&segments);
    merger.begin(98).await?;
    merger.update(100, Bytes::from_static(b"c")).await?;
    merger.update(98, Bytes::from_static(b"a")).await?;
    merger.fail(99).await?;
    let summary = merger.finish().await?;

    assert_eq!(summary.written, 2);
    assert_eq!(std::fs::read(segments.join("00098.ts"))?, b"a");
    assert_eq!(std::fs::read(segments.join("00100.ts"))?, b"c");
    assert!(!segments.join("00099.ts").exists());
    Ok(())
}
