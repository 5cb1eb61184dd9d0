use std::time::Duration;

use url::Url;

use crate::{
    error::{TailError, TailResult},
    fetch::Fetch,
    hls::playlist::{parse_manifest, Manifest, VariantEntry},
};

/// Picks the variant with the largest height. If no variant declares a
/// resolution, the one with the largest bandwidth is used. The first of equal
/// candidates wins.
pub fn select_variant(variants: &[VariantEntry]) -> Option<&VariantEntry> {
    let with_resolution = variants.iter().filter_map(|v| v.height().map(|h| (h, v)));
    if let Some(best) = first_max(with_resolution) {
        return Some(best);
    }

    first_max(variants.iter().map(|v| (v.bandwidth, v)))
}

fn first_max<'a>(
    candidates: impl Iterator<Item = (u64, &'a VariantEntry)>,
) -> Option<&'a VariantEntry> {
    let mut best: Option<(u64, &VariantEntry)> = None;
    for (value, variant) in candidates {
        match best {
            Some((best_value, _)) if value <= best_value => {}
            _ => best = Some((value, variant)),
        }
    }
    best.map(|(_, v)| v)
}

/// Loads the top level manifest and returns the url of the chunk list to follow.
///
/// Any failure here is fatal, there is no retry.
pub async fn resolve_chunk_list<F>(fetcher: &F, url: &Url, timeout: Duration) -> TailResult<Url>
where
    F: Fetch,
{
    tracing::info!("Playlist URL: {url}");

    let response = fetcher
        .fetch(url, timeout)
        .await
        .map_err(|e| TailError::ManifestUnavailable(e.to_string()))?;
    tracing::info!("Main playlist {} responded {}", response.url, response.status);
    let response = response
        .error_for_status()
        .map_err(|e| TailError::ManifestUnavailable(e.to_string()))?;

    let chunk_list_url = match parse_manifest(&response.body)? {
        Manifest::Variants(variants) => {
            for variant in variants.iter() {
                match variant.height() {
                    Some(height) => tracing::info!("Stream at {height}p detected!"),
                    None => tracing::info!(
                        "Stream with bandwidth {} detected!",
                        variant.bandwidth
                    ),
                }
            }

            match select_variant(&variants) {
                Some(variant) => {
                    tracing::info!(
                        "Stream picked: {}",
                        variant
                            .height()
                            .map(|h| format!("{h}p"))
                            .unwrap_or_else(|| format!("{} bps", variant.bandwidth))
                    );
                    response.url.join(&variant.uri)?
                }
                // a master playlist without variants is followed as is
                None => response.url,
            }
        }
        Manifest::ChunkList(_) => response.url,
    };

    tracing::info!("Chunk list: {chunk_list_url}");
    Ok(chunk_list_url)
}
