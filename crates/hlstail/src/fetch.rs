use std::{future::Future, sync::Arc, time::Duration};

use bytes::Bytes;
use reqwest::{header::CONTENT_LENGTH, StatusCode};
use url::Url;

use crate::{
    error::{TailError, TailResult},
    util::http::HttpClient,
};

/// Response of a single GET request.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final url after redirects. Relative references resolve against it.
    pub url: Url,
    pub status: StatusCode,
    /// Value of the `Content-Length` header, if the server sent one.
    pub content_length: Option<u64>,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn ok(url: Url, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            url,
            status: StatusCode::OK,
            content_length: Some(body.len() as u64),
            body,
        }
    }

    pub fn error_for_status(self) -> TailResult<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(TailError::HttpError(self.status))
        }
    }

    /// A body shorter or longer than the declared length means the transfer was cut.
    pub fn verify_content_length(&self) -> TailResult<()> {
        match self.content_length {
            Some(expected) if expected != self.body.len() as u64 => {
                Err(TailError::ContentLengthMismatch {
                    expected,
                    received: self.body.len() as u64,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Executes raw HTTP requests for the downloader.
///
/// Headers and cookies are a property of the implementation, every request made
/// through it carries them.
pub trait Fetch: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> impl Future<Output = TailResult<FetchResponse>> + Send;
}

impl<F> Fetch for Arc<F>
where
    F: Fetch,
{
    fn fetch(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> impl Future<Output = TailResult<FetchResponse>> + Send {
        self.as_ref().fetch(url, timeout)
    }
}

impl Fetch for HttpClient {
    fn fetch(
        &self,
        url: &Url,
        timeout: Duration,
    ) -> impl Future<Output = TailResult<FetchResponse>> + Send {
        let request = self.get(url.clone()).timeout(timeout);
        async move {
            let response = request.send().await?;
            let url = response.url().clone();
            let status = response.status();
            let content_length = response
                .headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let body = response.bytes().await?;

            Ok(FetchResponse {
                url,
                status,
                content_length,
                body,
            })
        }
    }
}
