use std::{sync::Arc, time::Duration};

use hlstail::{PollState, TailError, TailOptions};
use tokio::time::Instant;

use super::download;
use crate::source::{chunk_list, concat, with_segments, MockFetcher, Reply};

fn generations(replies: impl IntoIterator<Item = String>) -> MockFetcher {
    MockFetcher::new().route("/index.m3u8", replies.into_iter().map(Reply::body))
}

#[tokio::test(start_paused = true)]
async fn every_sequence_is_fetched_once() -> anyhow::Result<()> {
    let fetcher = Arc::new(with_segments(
        generations([
            chunk_list(0, 3, 2, false),
            chunk_list(0, 3, 2, false),
            chunk_list(0, 3, 2, false),
            chunk_list(1, 4, 2, false),
            chunk_list(3, 3, 2, true),
        ]),
        0..6,
    ));

    let outcome = download(fetcher.clone(), "/index.m3u8", TailOptions::default()).await?;
    let summary = outcome.result?;

    assert_eq!(outcome.output, concat(0..6));
    assert_eq!(summary.dispatched, 6);
    for sequence in 0..6 {
        assert_eq!(fetcher.hits(&format!("/{sequence}.ts")), 1);
    }

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reload_waits_half_target_duration() -> anyhow::Result<()> {
    let fetcher = Arc::new(with_segments(
        generations([
            chunk_list(0, 1, 6, false),
            chunk_list(0, 1, 6, false),
            chunk_list(0, 2, 6, false),
            chunk_list(0, 3, 6, true),
        ]),
        0..3,
    ));

    let started = Instant::now();
    let outcome = download(fetcher.clone(), "/index.m3u8", TailOptions::default()).await?;
    outcome.result?;

    assert_eq!(started.elapsed(), Duration::from_secs(6));
    assert_eq!(fetcher.hits("/index.m3u8"), 4);
    assert_eq!(outcome.output, concat(0..3));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn segments_leaving_the_window_are_failed() -> anyhow::Result<()> {
    let fetcher = Arc::new(with_segments(
        generations([
            chunk_list(0, 3, 2, false),
            chunk_list(0, 3, 2, false),
            chunk_list(5, 3, 2, true),
        ]),
        0..8,
    ));

    let outcome = download(fetcher.clone(), "/index.m3u8", TailOptions::default()).await?;
    let summary = outcome.result?;

    assert_eq!(outcome.output, concat([0, 1, 2, 5, 6, 7]));
    assert_eq!(summary.failed_sequences, vec![3, 4]);
    assert_eq!(summary.merge.skipped, 2);
    assert_eq!(fetcher.hits("/3.ts"), 0);
    assert_eq!(fetcher.hits("/4.ts"), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn chunk_list_outage_is_survived() -> anyhow::Result<()> {
    let fetcher = with_segments(
        MockFetcher::new().route(
            "/index.m3u8",
            [
                Reply::body(chunk_list(0, 3, 2, false)),
                Reply::body(chunk_list(0, 3, 2, false)),
                Reply::Status(500),
                Reply::Reset,
                Reply::body(chunk_list(0, 5, 2, true)),
            ],
        ),
        0..5,
    );

    let outcome = download(fetcher, "/index.m3u8", TailOptions::default()).await?;
    outcome.result?;

    assert_eq!(outcome.state, PollState::Done);
    assert_eq!(outcome.output, concat(0..5));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_chunk_list_budget_drains_and_aborts() -> anyhow::Result<()> {
    let fetcher = Arc::new(
        with_segments(
            MockFetcher::new().route(
                "/index.m3u8",
                [
                    Reply::body(chunk_list(0, 3, 2, false)),
                    Reply::body(chunk_list(0, 3, 2, false)),
                    Reply::Status(404),
                ],
            ),
            0..3,
        )
        .delay("/2.ts", Duration::from_secs(30)),
    );

    let options = TailOptions::default().with_chunk_list_retries(2, Duration::from_secs(1));
    let outcome = download(fetcher.clone(), "/index.m3u8", options).await?;

    assert!(matches!(
        outcome.result,
        Err(TailError::ChunkListUnavailable(3))
    ));
    assert_eq!(outcome.state, PollState::Aborted);
    // segments dispatched before the outage still complete
    assert_eq!(outcome.output, concat(0..3));
    assert_eq!(fetcher.hits("/index.m3u8"), 2 + 3);

    Ok(())
}
