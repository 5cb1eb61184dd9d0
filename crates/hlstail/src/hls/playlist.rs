//! Parsed forms of the two documents the downloader reads, and the adapter from
//! m3u8 text into them.

use m3u8_rs::{KeyMethod, MasterPlaylist, MediaPlaylist, Playlist};

use crate::{
    decrypt::{METHOD_AES_128, METHOD_NONE},
    error::{TailError, TailResult},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    /// A master playlist listing variant streams.
    Variants(Vec<VariantEntry>),
    /// The document is a chunk list already.
    ChunkList(ChunkList),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantEntry {
    pub uri: String,
    pub bandwidth: u64,
    /// `(width, height)`
    pub resolution: Option<(u64, u64)>,
}

impl VariantEntry {
    pub fn height(&self) -> Option<u64> {
        self.resolution.map(|(_, height)| height)
    }
}

/// One generation of a chunk list.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkList {
    /// Sequence number of the first entry.
    pub media_sequence: u64,
    pub target_duration: f64,
    pub segments: Vec<ChunkListEntry>,
    pub is_end: bool,
    pub encryption: Option<KeyDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChunkListEntry {
    pub uri: String,
    pub duration: f32,
}

/// `#EXT-X-KEY` attributes, before the key itself is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDescriptor {
    pub method: String,
    pub uri: Option<String>,
    pub iv: Option<String>,
}

impl KeyDescriptor {
    pub fn is_none(&self) -> bool {
        self.method == METHOD_NONE
    }
}

impl ChunkList {
    /// Sequence number of the last entry. `None` for an empty list.
    pub fn last_sequence(&self) -> Option<u64> {
        let count = self.segments.len() as u64;
        count
            .checked_sub(1)
            .map(|offset| self.media_sequence + offset)
    }

    pub fn entry(&self, sequence: u64) -> Option<&ChunkListEntry> {
        let offset = sequence.checked_sub(self.media_sequence)?;
        self.segments.get(usize::try_from(offset).ok()?)
    }
}

pub fn parse_manifest(data: &[u8]) -> TailResult<Manifest> {
    match m3u8_rs::parse_playlist_res(data) {
        Ok(Playlist::MasterPlaylist(pl)) => Ok(Manifest::Variants(variants(pl))),
        Ok(Playlist::MediaPlaylist(pl)) => Ok(Manifest::ChunkList(pl.into())),
        Err(_) => Err(TailError::M3u8ParseError(
            String::from_utf8_lossy(data).into_owned(),
        )),
    }
}

pub fn parse_chunk_list(data: &[u8]) -> TailResult<ChunkList> {
    match parse_manifest(data)? {
        Manifest::ChunkList(chunk_list) => Ok(chunk_list),
        Manifest::Variants(_) => Err(TailError::M3u8ParseError(
            "expected a media playlist, got a master playlist".to_string(),
        )),
    }
}

fn variants(playlist: MasterPlaylist) -> Vec<VariantEntry> {
    playlist
        .variants
        .into_iter()
        .filter(|v| !v.is_i_frame)
        .map(|v| VariantEntry {
            uri: v.uri,
            bandwidth: v.bandwidth,
            resolution: v.resolution.map(|r| (r.width, r.height)),
        })
        .collect()
}

impl From<MediaPlaylist> for ChunkList {
    fn from(playlist: MediaPlaylist) -> Self {
        // the first declared key applies to the whole generation
        let encryption = playlist
            .segments
            .iter()
            .find_map(|s| s.key.as_ref())
            .map(|key| KeyDescriptor {
                method: match &key.method {
                    KeyMethod::None => METHOD_NONE.to_string(),
                    KeyMethod::AES128 => METHOD_AES_128.to_string(),
                    KeyMethod::SampleAES => "SAMPLE-AES".to_string(),
                    KeyMethod::Other(name) => name.clone(),
                },
                uri: key.uri.clone(),
                iv: key.iv.clone(),
            });

        ChunkList {
            media_sequence: playlist.media_sequence,
            target_duration: playlist.target_duration as f64,
            segments: playlist
                .segments
                .into_iter()
                .map(|s| ChunkListEntry {
                    uri: s.uri,
                    duration: s.duration,
                })
                .collect(),
            is_end: playlist.end_list,
            encryption,
        }
    }
}
