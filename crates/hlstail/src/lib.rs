//! ┌───────────────────────┐                ┌────────────────────┐
//! │                       │   #N .. #N+2   │                    │
//! │    Chunk List Gen#1   ├────────────────►                    ├───┐
//! │                       │                │                    │   │fetch_and_process
//! └───────────────────────┘                │                    ◄───┘
//!                                          │    SegmentPool     │
//! ┌───────────────────────┐                │                    ├───┐
//! │                       │   #N+3 .. #M   │    [Semaphore]     │   │fetch_and_process
//! │    Chunk List Gen#2   ├────────────────►                    ◄───┘
//! │                       │                │                    │
//! └───────────────────────┘                └─────────┬──────────┘
//!            ...                                     │ any order
//! ┌───────────────────────┐                ┌─────────▼──────────┐
//! │                       │                │                    │
//! │  Chunk List #EXT-X-   │                │   OrderedMerger    ├────► output
//! │      ENDLIST          │                │   [Mutex]          │   ascending
//! └───────────────────────┘                └────────────────────┘
pub mod config;
pub mod decrypt;
pub mod download;
pub mod error;
pub mod fetch;
pub mod hls;
pub mod merge;
pub mod tracker;
pub mod util;

pub use config::TailOptions;
pub use download::{DownloadSummary, PollState, TailDownloader};
pub use error::{TailError, TailResult};
pub use fetch::{Fetch, FetchResponse};
pub use merge::{MergeSummary, Merger, OrderedMerger, SplitMerger, TailMerger};
pub use util::http::HttpClient;
