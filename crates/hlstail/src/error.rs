use aes::cipher::block_padding::UnpadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TailError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error("Content length mismatch: expected {expected} bytes, received {received}")]
    ContentLengthMismatch { expected: u64, received: u64 },

    #[error("Manifest unavailable: {0}")]
    ManifestUnavailable(String),

    #[error("Chunk list unavailable after {0} attempts")]
    ChunkListUnavailable(u32),

    #[error("Invalid m3u8 file: {0}")]
    M3u8ParseError(String),

    #[error("Unsupported encryption method: {0}")]
    UnsupportedKeyMethod(String),

    #[error("URI field is required for {0} encryption")]
    MissingKeyUri(String),

    #[error("Invalid AES-128 key: {0:?}")]
    InvalidAes128Key(Vec<u8>),

    #[error("Invalid initialization vector: {0}")]
    InvalidIv(String),

    #[error("Failed to read key file {path}: {source}")]
    KeyFileError {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Pkcs7 unpad error")]
    UnpadError(#[from] UnpadError),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error("Download pool closed: {0}")]
    PoolClosed(#[from] tokio::sync::AcquireError),
}

impl TailError {
    /// Errors caused by operator supplied configuration. Retrying can not fix them.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedKeyMethod(_)
                | Self::MissingKeyUri(_)
                | Self::InvalidAes128Key(_)
                | Self::InvalidIv(_)
                | Self::KeyFileError { .. }
        )
    }
}

pub type TailResult<T> = Result<T, TailError>;
