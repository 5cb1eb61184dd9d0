use std::{sync::Arc, time::Duration};

use url::Url;

use crate::{
    error::{TailError, TailResult},
    fetch::Fetch,
    hls::playlist::{parse_chunk_list, ChunkList},
};

/// Reloads a chunk list, spending a bounded retry budget on failures.
pub struct ChunkListPoller<F> {
    fetcher: Arc<F>,
    url: Url,
    timeout: Duration,

    retry_limit: u32,
    retry_backoff: Duration,
    retries: u32,
}

impl<F> ChunkListPoller<F>
where
    F: Fetch,
{
    pub fn new(
        fetcher: Arc<F>,
        url: Url,
        timeout: Duration,
        retry_limit: u32,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            fetcher,
            url,
            timeout,
            retry_limit,
            retry_backoff,
            retries: 0,
        }
    }

    /// Failed attempts since the last [reset](Self::reset).
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Loads the next generation of the chunk list, returned with its final url.
    ///
    /// Transport errors and non-success responses consume the retry budget. A
    /// response that can not be parsed is waited out without consuming it.
    pub async fn poll(&mut self) -> TailResult<(Url, ChunkList)> {
        loop {
            let response = match self
                .fetcher
                .fetch(&self.url, self.timeout)
                .await
                .and_then(|r| r.error_for_status())
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!("Cannot get chunk list: {e}");
                    self.backoff().await?;
                    continue;
                }
            };

            match parse_chunk_list(&response.body) {
                Ok(chunk_list) => return Ok((response.url, chunk_list)),
                Err(e) => {
                    tracing::warn!("Incorrect chunk list, waiting for the next one. {e}");
                    tokio::time::sleep(self.retry_backoff).await;
                }
            }
        }
    }

    /// Consumes one retry, sleeping before the caller tries again.
    pub async fn backoff(&mut self) -> TailResult<()> {
        if self.retries >= self.retry_limit {
            tracing::error!("Exceeded retry limit for fetching chunk list.");
            return Err(TailError::ChunkListUnavailable(self.retries + 1));
        }

        self.retries += 1;
        tracing::info!(
            "Retrying chunk list in {:?} ({}/{})",
            self.retry_backoff,
            self.retries,
            self.retry_limit
        );
        tokio::time::sleep(self.retry_backoff).await;
        Ok(())
    }

    /// Marks a reload round as successful and restores the retry budget.
    pub fn reset(&mut self) {
        self.retries = 0;
    }
}
