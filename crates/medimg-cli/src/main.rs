use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use medimg_acquire::output::{self, SearchSource};
use medimg_acquire::{
    BrowserSession, DownloadOptions, DownloadReport, FullResStrategy, HtmlCache, HttpClient,
    HttpSource, MatchOptions, PageSource, PoliteDelay, SiteConfig,
};
use medimg_model::{table, CuratedImage, DownloadSize, ParagraphRecord, SearchHit};
use medimg_prep::{QueryMode, DEFAULT_KEYWORD_TERMS, DEFAULT_PARAGRAPH_TERMS};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "medimg")]
#[command(about = "Turn textbook chapters into a set of downloaded medical images")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("BUILD_HASH"), ")"))]
struct Cli {
    /// Log level: error, warn, info, debug, trace
    #[arg(long, global = true, default_value = "info", value_enum)]
    log_level: LogLevel,

    /// Use UTC timestamps instead of local time
    #[arg(long, global = true)]
    utc: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Subcommand)]
enum Commands {
    /// Split chapter files into a paragraph dataset
    Preprocess {
        /// Directory containing chapter .md / .txt files
        #[arg(short, long, default_value = "data/chapters")]
        chapters_dir: PathBuf,

        /// Output CSV (chapter_id, paragraph_id, text)
        #[arg(short, long, default_value = "data/chapters_dataset.csv")]
        output: PathBuf,
    },

    /// List the chapters present in a dataset
    Chapters {
        #[arg(short, long, default_value = "data/chapters_dataset.csv")]
        dataset: PathBuf,
    },

    /// Build a search query from one chapter
    Query {
        #[arg(short, long, default_value = "data/chapters_dataset.csv")]
        dataset: PathBuf,

        /// Chapter id (e.g., "14")
        #[arg(short, long)]
        chapter: String,

        #[command(flatten)]
        mode: QueryModeArgs,

        /// Where to write the query text
        #[arg(short, long, default_value = "data/query_text.txt")]
        output: PathBuf,
    },

    /// Search the image site and save the result list
    Search {
        /// File holding the query text
        #[arg(short, long, default_value = "data/query_text.txt", conflicts_with = "query")]
        query_file: PathBuf,

        /// Query text, instead of reading the query file
        #[arg(long)]
        query: Option<String>,

        /// Maximum number of results to keep
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Output CSV of search hits
        #[arg(short, long, default_value = "data/nih_results.csv")]
        output: PathBuf,

        /// Also save the rendered search page here
        #[arg(long)]
        save_html: Option<PathBuf>,

        #[command(flatten)]
        site: SiteArgs,
    },

    /// Scrape detail pages of search hits for titles, credits, and licenses
    Metadata {
        #[arg(short, long, default_value = "data/nih_results.csv")]
        input: PathBuf,

        #[arg(short, long, default_value = "data/extracted_metadata.csv")]
        output: PathBuf,

        /// Directory of cached detail pages
        #[arg(long, default_value = "data/html_cache")]
        cache_dir: PathBuf,

        /// Query text recorded with each row; read from the query file if omitted
        #[arg(long)]
        query: Option<String>,

        #[arg(long, default_value = "data/query_text.txt")]
        query_file: PathBuf,

        /// Minimum seconds between detail page requests
        #[arg(long, default_value = "1.0", value_parser = parse_delay)]
        delay: Duration,

        #[command(flatten)]
        site: SiteArgs,
    },

    /// Download thumbnails and full-resolution images for search hits
    Download {
        #[arg(short, long, default_value = "data/nih_results.csv")]
        input: PathBuf,

        #[command(flatten)]
        download: DownloadArgs,

        #[command(flatten)]
        site: SiteArgs,
    },

    /// Search paragraph by paragraph and write a paragraph-to-image map
    Match {
        #[arg(short, long, default_value = "data/chapters_dataset.csv")]
        dataset: PathBuf,

        /// Chapter id; a trailing "_" is optional
        #[arg(short, long)]
        chapter: String,

        /// Search every n-th paragraph
        #[arg(long, default_value_t = 1)]
        every: usize,

        /// Hits requested per paragraph search
        #[arg(long, default_value_t = 20)]
        max_per_para: usize,

        /// Images kept per paragraph
        #[arg(long, default_value_t = 3)]
        top_k: usize,

        /// Words in each paragraph query
        #[arg(long, default_value_t = DEFAULT_PARAGRAPH_TERMS)]
        terms: usize,

        /// Output CSV [default: data/paragraph_image_map_<chapter>_<timestamp>.csv]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Minimum seconds between searches
        #[arg(long, default_value = "2.0", value_parser = parse_delay)]
        delay: Duration,

        #[command(flatten)]
        site: SiteArgs,
    },

    /// Filter scraped metadata to freely reusable illustrations and write attributions
    Curate {
        #[arg(short, long, default_value = "data/extracted_metadata.csv")]
        input: PathBuf,

        #[arg(short = 'O', long, default_value = "data/curated")]
        output_dir: PathBuf,
    },

    /// Download curated images by id under the names listed in ATTRIBUTIONS.txt
    FetchCurated {
        #[arg(short, long, default_value = "data/curated/filtered_images.csv")]
        input: PathBuf,

        #[arg(short = 'O', long, default_value = "data/curated/images")]
        output_dir: PathBuf,

        /// Image size: small (72 dpi), medium (150 dpi), large (300 dpi)
        #[arg(long, default_value = "large")]
        size: DownloadSize,

        /// Minimum seconds between downloads; up to one more second is added at random
        #[arg(long, default_value = "2.0", value_parser = parse_delay)]
        delay: Duration,

        #[command(flatten)]
        site: SiteArgs,
    },

    /// Preprocess, query, search, and download in one go
    Run {
        #[arg(long, default_value = "data/chapters")]
        chapters_dir: PathBuf,

        /// Chapter id to build the query from
        #[arg(short, long)]
        chapter: String,

        #[command(flatten)]
        mode: QueryModeArgs,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Also scrape detail page metadata and curate it
        #[arg(long)]
        with_metadata: bool,

        /// Also download the curated images into <data-dir>/curated/images
        #[arg(long, requires = "with_metadata")]
        fetch_curated: bool,

        /// Root directory for every intermediate and output file
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,

        #[command(flatten)]
        download: DownloadArgs,

        #[command(flatten)]
        site: SiteArgs,
    },
}

#[derive(Args)]
struct QueryModeArgs {
    /// Use the chapter's full text instead of extracted keywords
    #[arg(long, conflicts_with = "terms")]
    full_text: bool,

    /// Number of keywords in the query
    #[arg(long, default_value_t = DEFAULT_KEYWORD_TERMS)]
    terms: usize,
}

impl QueryModeArgs {
    fn mode(&self) -> QueryMode {
        if self.full_text {
            QueryMode::FullText
        } else {
            QueryMode::Keywords { max_terms: self.terms }
        }
    }
}

#[derive(Args)]
struct SiteArgs {
    /// Site root to search (a mirror or a local test server)
    #[arg(long, default_value = medimg_acquire::DEFAULT_BASE_URL)]
    base_url: String,

    /// Fetch pages over plain HTTP instead of a headless browser
    #[arg(long)]
    no_browser: bool,

    /// Retries per request on throttling or server errors
    #[arg(long, default_value_t = 3)]
    retries: usize,
}

impl SiteArgs {
    fn site_config(&self) -> SiteConfig {
        let mut site = SiteConfig::with_base_url(&self.base_url);
        site.retry.max_retries = self.retries;
        site
    }
}

const DEFAULT_SAVE_DIR: &str = "data/nih_images";

#[derive(Args)]
struct DownloadArgs {
    /// Directory for images and manifest_full.csv [default: data/nih_images, or
    /// <data-dir>/nih_images for run]
    #[arg(short, long)]
    save_dir: Option<PathBuf>,

    /// Full-resolution size: small (72 dpi), medium (150 dpi), large (300 dpi)
    #[arg(long, default_value = "large")]
    size: DownloadSize,

    /// Where full-resolution links come from
    #[arg(long, value_enum, default_value = "retrieve")]
    strategy: StrategyArg,

    /// Minimum seconds between items; up to one more second is added at random
    #[arg(long, default_value = "2.0", value_parser = parse_delay)]
    delay: Duration,
}

impl DownloadArgs {
    /// `--save-dir` if given, else `default_dir`.
    fn save_dir(&self, default_dir: &Path) -> PathBuf {
        self.save_dir.clone().unwrap_or_else(|| default_dir.to_path_buf())
    }

    fn options(&self, default_dir: &Path) -> DownloadOptions {
        let strategy = match self.strategy {
            StrategyArg::Retrieve => FullResStrategy::Retrieve(self.size),
            StrategyArg::DetailPage => FullResStrategy::DetailPage,
        };
        DownloadOptions {
            save_dir: self.save_dir(default_dir),
            strategy,
            delay: polite_delay(self.delay),
        }
    }
}

#[derive(Clone, clap::ValueEnum)]
enum StrategyArg {
    /// Request a JPEG from the retrieve endpoint by image id
    Retrieve,
    /// Render each detail page and follow its full-size link
    DetailPage,
}

/// What a `run` did, written next to its outputs as JSON.
#[derive(Serialize)]
struct RunSummary {
    started_at: String,
    finished_at: String,
    chapter: String,
    query: String,
    paragraphs: usize,
    hits: usize,
    metadata_records: Option<usize>,
    curated_images: Option<usize>,
    curated_downloaded: Option<usize>,
    thumbs_ok: usize,
    fulls_ok: usize,
    failed: usize,
}

/// Parse a non-negative, finite number of seconds.
fn parse_delay(s: &str) -> Result<Duration, String> {
    let seconds: f64 = s.trim().parse().map_err(|_| format!("'{s}' is not a number of seconds"))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid delay '{s}': {e}"))
}

fn polite_delay(min: Duration) -> PoliteDelay {
    PoliteDelay::new(min, Duration::from_secs(1))
}

fn page_source(site: &SiteArgs, client: &HttpClient) -> Result<Box<dyn PageSource>> {
    if site.no_browser {
        tracing::info!("Using plain HTTP page source");
        Ok(Box::new(HttpSource::new(client.clone())))
    } else {
        Ok(Box::new(BrowserSession::launch()?))
    }
}

fn query_text(query: Option<String>, query_file: &Path) -> Result<String> {
    match query {
        Some(q) => Ok(q),
        None => medimg_prep::read_query(query_file)
            .with_context(|| format!("No query given and {} is unreadable", query_file.display())),
    }
}

async fn run_search(
    source: &dyn PageSource,
    site: &SiteConfig,
    query: &str,
    limit: usize,
    output_csv: &Path,
    save_html: Option<&Path>,
) -> Result<Vec<SearchHit>> {
    let url = medimg_acquire::search_url(&site.base_url, query);
    let hits = if let Some(dir) = save_html {
        let html = source.fetch_html(&url, site.search_wait).await?;
        output::cache_html(dir, "search_results.html", &html)?;
        medimg_acquire::search::parse_search_results(&html, &site.base_url, limit)
    } else {
        medimg_acquire::search(source, site, query, limit).await?
    };

    if hits.is_empty() {
        tracing::warn!(query = %query, "Search returned no results");
    }
    output::write_search_results(output_csv, &hits, &SearchSource::new(&site.base_url, &url, query))?;
    Ok(hits)
}

async fn run_download(
    hits: &[SearchHit],
    args: &DownloadArgs,
    default_dir: &Path,
    site_args: &SiteArgs,
) -> Result<DownloadReport> {
    let site = site_args.site_config();
    let client = HttpClient::new(&site)?;
    let options = args.options(default_dir);

    // Retrieve URLs are built from ids; only hits without one need a rendered page.
    let needs_pages = matches!(options.strategy, FullResStrategy::DetailPage)
        || hits.iter().any(|h| !h.has_image_id());
    let source: Box<dyn PageSource> = if needs_pages {
        page_source(site_args, &client)?
    } else {
        Box::new(HttpSource::new(client.clone()))
    };

    let report = medimg_acquire::download_images(hits, source.as_ref(), &client, &site, &options).await?;
    tracing::info!(
        items = report.entries.len(),
        thumbs = report.thumbs_ok,
        full = report.fulls_ok,
        failed = report.failed,
        dir = %options.save_dir.display(),
        "Download finished"
    );
    Ok(report)
}

async fn run_fetch_curated(
    curated_csv: &Path,
    output_dir: &Path,
    size: DownloadSize,
    delay: Duration,
    site_args: &SiteArgs,
) -> Result<usize> {
    let images: Vec<CuratedImage> = table::read_records(curated_csv)?;
    let site = site_args.site_config();
    let client = HttpClient::new(&site)?;
    let report =
        medimg_acquire::download_curated(&images, &client, &site, output_dir, size, polite_delay(delay))
            .await?;
    Ok(report.downloaded + report.existing)
}

/// Default paragraph map name: `paragraph_image_map_<chapter>_<timestamp>.csv`.
fn paragraph_map_path(dir: &Path, chapter: &str) -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("paragraph_image_map_{chapter}_{stamp}.csv"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Map log level, suppressing noisy HTML-parsing crates at debug/trace
    let level = match cli.log_level {
        LogLevel::Error => "error",
        LogLevel::Warn  => "warn",
        LogLevel::Info  => "info",
        LogLevel::Debug => "debug,selectors=warn,html5ever=warn,headless_chrome=info",
        LogLevel::Trace => "trace,selectors=warn,html5ever=warn,headless_chrome=info",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // Timestamp format: 2026-02-14 19:44:09.123 -08:00
    let time_format = "%Y-%m-%d %H:%M:%S%.3f %:z";

    if cli.utc {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_timer(tracing_subscriber::fmt::time::ChronoUtc::new(time_format.to_string()))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_timer(tracing_subscriber::fmt::time::ChronoLocal::new(time_format.to_string()))
            .init();
    }

    match cli.command {
        Commands::Preprocess { chapters_dir, output } => {
            tracing::info!(dir = %chapters_dir.display(), "Preprocessing chapters");
            medimg_prep::preprocess_chapters(&chapters_dir, &output)?;
        }
        Commands::Chapters { dataset } => {
            let rows: Vec<ParagraphRecord> = table::read_records(&dataset)?;
            let chapters = medimg_prep::list_chapters(&rows);
            if chapters.is_empty() {
                tracing::warn!(path = %dataset.display(), "Dataset has no chapters");
            }
            for c in &chapters {
                println!("{}\t{} paragraphs", c.chapter_id, c.paragraphs);
            }
        }
        Commands::Query { dataset, chapter, mode, output } => {
            let rows: Vec<ParagraphRecord> = table::read_records(&dataset)?;
            let query = medimg_prep::build_chapter_query(&rows, &chapter, mode.mode())?;
            tracing::info!(chapter = %chapter, paragraphs = query.paragraphs, query = %query.text, "Built query");
            medimg_prep::write_query(&query, &output)?;
        }
        Commands::Search { query_file, query, limit, output, save_html, site } => {
            let query = query_text(query, &query_file)?;
            let config = site.site_config();
            let client = HttpClient::new(&config)?;
            let source = page_source(&site, &client)?;
            run_search(source.as_ref(), &config, &query, limit, &output, save_html.as_deref()).await?;
        }
        Commands::Metadata { input, output, cache_dir, query, query_file, delay, site } => {
            let hits = output::read_search_results(&input)?;
            let query = match query_text(query, &query_file) {
                Ok(q) => q,
                Err(e) => {
                    tracing::warn!(error = %e, "No query text, metadata rows will have an empty query");
                    String::new()
                }
            };
            let config = site.site_config();
            let client = HttpClient::new(&config)?;
            let cache = HtmlCache::new(cache_dir);
            let records = medimg_acquire::collect_metadata(
                &hits, &client, &cache, &config, &query, polite_delay(delay),
            )
            .await;
            output::write_metadata(&output, &records)?;
        }
        Commands::Download { input, download, site } => {
            let hits = output::read_search_results(&input)?;
            run_download(&hits, &download, Path::new(DEFAULT_SAVE_DIR), &site).await?;
        }
        Commands::Match {
            dataset,
            chapter,
            every,
            max_per_para,
            top_k,
            terms,
            output,
            delay,
            site,
        } => {
            let rows: Vec<ParagraphRecord> = table::read_records(&dataset)?;
            let config = site.site_config();
            let client = HttpClient::new(&config)?;
            let source = page_source(&site, &client)?;
            let options = MatchOptions {
                every,
                max_per_para,
                top_k,
                query_terms: terms,
                delay: polite_delay(delay),
            };
            let matches =
                medimg_acquire::match_paragraphs(&rows, &chapter, source.as_ref(), &config, &options).await?;
            let output = output.unwrap_or_else(|| paragraph_map_path(Path::new("data"), &chapter));
            output::write_paragraph_matches(&output, &matches)?;
        }
        Commands::Curate { input, output_dir } => {
            let out = medimg_curate::curate(&input, &output_dir)?;
            tracing::info!(
                kept = out.images.len(),
                duplicates = out.duplicates_removed,
                path = %out.curated_csv.display(),
                "Curation finished"
            );
        }
        Commands::FetchCurated { input, output_dir, size, delay, site } => {
            let saved = run_fetch_curated(&input, &output_dir, size, delay, &site).await?;
            tracing::info!(images = saved, dir = %output_dir.display(), "Curated images ready");
        }
        Commands::Run {
            chapters_dir,
            chapter,
            mode,
            limit,
            with_metadata,
            fetch_curated,
            data_dir,
            download,
            site,
        } => {
            let started_at = chrono::Utc::now().to_rfc3339();

            let rows = medimg_prep::preprocess_chapters(&chapters_dir, &data_dir.join("chapters_dataset.csv"))?;
            let query = medimg_prep::build_chapter_query(&rows, &chapter, mode.mode())?;
            medimg_prep::write_query(&query, &data_dir.join("query_text.txt"))?;
            tracing::info!(chapter = %chapter, query = %query.text, "Built query");

            let config = site.site_config();
            let client = HttpClient::new(&config)?;
            let hits = {
                let source = page_source(&site, &client)?;
                run_search(
                    source.as_ref(),
                    &config,
                    &query.text,
                    limit,
                    &data_dir.join("nih_results.csv"),
                    None,
                )
                .await?
            };

            let mut metadata_records = None;
            let mut curated_images = None;
            let mut curated_downloaded = None;
            if with_metadata {
                let cache = HtmlCache::new(data_dir.join("html_cache"));
                let records = medimg_acquire::collect_metadata(
                    &hits, &client, &cache, &config, &query.text, polite_delay(download.delay),
                )
                .await;
                let metadata_csv = data_dir.join("extracted_metadata.csv");
                output::write_metadata(&metadata_csv, &records)?;
                metadata_records = Some(records.len());

                let curated_dir = data_dir.join("curated");
                let curated = medimg_curate::curate(&metadata_csv, &curated_dir)?;
                curated_images = Some(curated.images.len());

                if fetch_curated {
                    let saved = run_fetch_curated(
                        &curated.curated_csv,
                        &curated_dir.join("images"),
                        download.size,
                        download.delay,
                        &site,
                    )
                    .await?;
                    curated_downloaded = Some(saved);
                }
            }

            let report = run_download(&hits, &download, &data_dir.join("nih_images"), &site).await?;

            let summary = RunSummary {
                started_at,
                finished_at: chrono::Utc::now().to_rfc3339(),
                chapter,
                query: query.text,
                paragraphs: query.paragraphs,
                hits: hits.len(),
                metadata_records,
                curated_images,
                curated_downloaded,
                thumbs_ok: report.thumbs_ok,
                fulls_ok: report.fulls_ok,
                failed: report.failed,
            };
            let path = data_dir.join("run_summary.json");
            let json = serde_json::to_string_pretty(&summary)?;
            std::fs::write(&path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Wrote run summary");
        }
    }

    Ok(())
}
