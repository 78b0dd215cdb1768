//! Acquisition stages of the pipeline: search the image site through a
//! rendered browser page, scrape detail pages for metadata, and download
//! the images. Chapters can also be matched to images paragraph by
//! paragraph.

pub mod cache;
pub mod config;
pub mod detail;
pub mod download;
pub mod http;
pub mod matcher;
pub mod metadata;
pub mod output;
pub mod retry;
pub mod search;
pub mod session;

pub use cache::HtmlCache;
pub use config::{PoliteDelay, SiteConfig, DEFAULT_BASE_URL};
pub use download::{
    download_curated, download_images, CuratedDownloadReport, DownloadOptions, DownloadReport,
    FullResStrategy,
};
pub use http::{FetchError, HttpClient};
pub use matcher::{match_paragraphs, MatchOptions};
pub use metadata::collect_metadata;
pub use retry::{BackoffPolicy, RetryPolicy};
pub use search::{search, search_url};
pub use session::{BrowserSession, HttpSource, PageSource};
