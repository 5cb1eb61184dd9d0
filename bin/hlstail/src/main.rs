use std::{fs::File, num::NonZeroU32, path::PathBuf, sync::Mutex, time::Duration};

use clap::{Args, Parser};
use fake_user_agent::get_chrome_rua;
use hlstail::{
    util::http::{load_cookie_file, load_header_file},
    HttpClient, TailDownloader, TailMerger, TailOptions,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT},
    Client, Url,
};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

#[derive(Parser, Debug)]
#[clap(name = "hlstail", version, about)]
struct TailArgs {
    #[clap(flatten)]
    http: HttpOptions,

    #[clap(flatten)]
    download: DownloadOptions,

    #[clap(flatten)]
    output: OutputOptions,

    /// Write logs to this file as well
    #[clap(long)]
    log_file: Option<PathBuf>,

    /// Debug output
    #[clap(short, long, alias = "debug")]
    verbose: bool,

    /// Master playlist or chunk list URL
    url: Url,
}

#[derive(Args, Debug)]
struct HttpOptions {
    /// JSON file with extra HTTP headers
    ///
    /// An array of objects, eg. [{"Referer": "https://example.com/"}]
    #[clap(long)]
    header: Option<PathBuf>,

    /// JSON file with cookies
    ///
    /// An array of objects, eg. [{"name": "session", "value": "abc"}]
    #[clap(long)]
    cookie: Option<PathBuf>,
}

impl HttpOptions {
    fn into_client(self) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_str(get_chrome_rua())?);

        if let Some(path) = &self.header {
            headers.extend(load_header_file(path)?);
        }
        if let Some(path) = &self.cookie {
            if let Some(cookie) = load_cookie_file(path)? {
                headers.insert(COOKIE, cookie);
            }
        }

        Ok(HttpClient::new(Client::builder().default_headers(headers))?)
    }
}

#[derive(Args, Debug)]
struct DownloadOptions {
    /// Threads limit
    #[clap(long, default_value = "5")]
    threads: NonZeroU32,

    /// Segment request timeout, in seconds
    #[clap(long, default_value = "5")]
    timeout: u64,

    /// Retry limit of a segment
    #[clap(long, default_value = "10")]
    retries: u32,

    /// Seconds to wait before retrying a segment
    #[clap(long, default_value = "3")]
    retry_wait: u64,

    /// Chunk list request timeout, in seconds
    #[clap(long, default_value = "5")]
    playlist_timeout: u64,

    /// Retry limit of the chunk list
    #[clap(long, default_value = "10")]
    playlist_retries: u32,

    /// Seconds to wait before reloading a failed chunk list
    #[clap(long, default_value = "10")]
    playlist_retry_wait: u64,

    /// Start this many seconds behind the live edge, 0 disables it
    #[clap(short = 'd', long = "dur")]
    tail: Option<u64>,

    /// Decryption key file, used instead of the key URI in the playlist
    #[clap(short = 'k', long = "keyfile")]
    key_file: Option<PathBuf>,
}

impl DownloadOptions {
    fn into_options(self) -> TailOptions {
        TailOptions::default()
            .with_concurrency(self.threads)
            .with_segment_timeout(Duration::from_secs(self.timeout))
            .with_segment_retries(self.retries, Duration::from_secs(self.retry_wait))
            .with_chunk_list_timeout(Duration::from_secs(self.playlist_timeout))
            .with_chunk_list_retries(
                self.playlist_retries,
                Duration::from_secs(self.playlist_retry_wait),
            )
            .with_tail(self.tail.filter(|&secs| secs > 0).map(Duration::from_secs))
            .with_key_file(self.key_file)
    }
}

#[derive(Args, Debug)]
struct OutputOptions {
    /// Concatenate all segments into this file
    ///
    /// Without it, every segment is saved to its own file in --segment-dir.
    #[clap(short = 'f', long = "file")]
    file: Option<PathBuf>,

    /// Append to --file instead of overwriting it
    #[clap(short, long)]
    append: bool,

    /// Directory for per-segment files
    #[clap(long, default_value = "segments")]
    segment_dir: PathBuf,
}

impl OutputOptions {
    async fn into_merger(self) -> anyhow::Result<TailMerger> {
        Ok(match self.file {
            Some(file) => TailMerger::concat(file, self.append).await?,
            None => {
                if self.append {
                    tracing::warn!("--append only takes effect with --file, ignoring.");
                }
                TailMerger::split(self.segment_dir)
            }
        })
    }
}

fn init_tracing(verbose: bool, log_file: Option<&PathBuf>) -> anyhow::Result<()> {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let file_layer = match log_file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(File::create(path)?)),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = TailArgs::parse();
    init_tracing(args.verbose, args.log_file.as_ref())?;

    let client = args.http.into_client()?;
    let merger = args.output.into_merger().await?;

    let mut downloader = TailDownloader::new(client, args.url, args.download.into_options());
    let summary = downloader.download(merger).await?;

    tracing::info!(
        "Downloaded {} of {} segment(s), {} bytes written.",
        summary.downloaded,
        summary.dispatched,
        summary.merge.bytes
    );
    if !summary.failed_sequences.is_empty() {
        tracing::error!("Failed to download {} segments:", summary.failed);
        for sequence in summary.failed_sequences.iter() {
            tracing::error!("  - #{sequence}");
        }
    }

    Ok(())
}
