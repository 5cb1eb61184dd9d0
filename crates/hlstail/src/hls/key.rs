use std::{path::PathBuf, sync::Arc, time::Duration};

use url::Url;

use crate::{
    decrypt::{parse_iv, DecrypterRegistry, EncryptionContext},
    error::{TailError, TailResult},
    fetch::Fetch,
    hls::playlist::KeyDescriptor,
};

/// Turns the key descriptor of a chunk list into an [EncryptionContext].
///
/// The key is loaded again for every generation, so a rotated key is picked up
/// on the next reload.
pub struct KeyLoader<F> {
    fetcher: Arc<F>,
    registry: DecrypterRegistry,
    /// Overrides the key uri in the playlist
    key_file: Option<PathBuf>,
    timeout: Duration,
}

impl<F> KeyLoader<F>
where
    F: Fetch,
{
    pub fn new(
        fetcher: Arc<F>,
        registry: DecrypterRegistry,
        key_file: Option<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            registry,
            key_file,
            timeout,
        }
    }

    pub async fn load(
        &self,
        descriptor: Option<&KeyDescriptor>,
        chunk_list_url: &Url,
    ) -> TailResult<Option<Arc<EncryptionContext>>> {
        let Some(descriptor) = descriptor.filter(|d| !d.is_none()) else {
            return Ok(None);
        };

        // an unknown method must fail before any key is requested
        if !self.registry.contains(&descriptor.method) {
            return Err(TailError::UnsupportedKeyMethod(descriptor.method.clone()));
        }
        let iv = descriptor.iv.as_deref().map(parse_iv).transpose()?;

        let key = match &self.key_file {
            Some(path) => tokio::fs::read(path)
                .await
                .map_err(|source| TailError::KeyFileError {
                    path: path.clone(),
                    source,
                })?,
            None => {
                let uri = descriptor
                    .uri
                    .as_deref()
                    .ok_or_else(|| TailError::MissingKeyUri(descriptor.method.clone()))?;
                let url = chunk_list_url.join(uri)?;
                tracing::debug!("Fetching key from {url}");
                self.fetcher
                    .fetch(&url, self.timeout)
                    .await?
                    .error_for_status()?
                    .body
                    .to_vec()
            }
        };

        tracing::info!("Stream encrypted with {}.", descriptor.method);
        let context = EncryptionContext::new(&self.registry, descriptor.method.as_str(), key, iv)?;
        Ok(Some(Arc::new(context)))
    }
}
