//! Curation of scraped image metadata: keep one row per image, drop
//! anything not freely reusable or not illustrative, rank what is left, and
//! generate attribution text for it.

pub mod attribution;
pub mod dedup;
pub mod filter;

use anyhow::{Context, Result};
use medimg_model::{table, CuratedImage, ImageMetadata};
use std::fs;
use std::path::{Path, PathBuf};

pub use attribution::{attribution_text, caption_text};
pub use dedup::deduplicate;
pub use filter::{educational_score, filter_images, is_free_use, FilterReport, Rejection};

pub const CURATED_FILE: &str = "filtered_images.csv";
pub const STATS_FILE: &str = "filter_stats.txt";
pub const ATTRIBUTIONS_FILE: &str = "ATTRIBUTIONS.txt";

/// Files written by [`curate`].
#[derive(Debug, Clone)]
pub struct CurateOutput {
    pub images: Vec<CuratedImage>,
    pub report: FilterReport,
    pub duplicates_removed: usize,
    pub curated_csv: PathBuf,
    pub stats_file: PathBuf,
    pub attributions_file: PathBuf,
}

/// Run de-duplication, filtering, and attribution over a metadata CSV and
/// write the curated CSV, a statistics file, and an attribution listing
/// into `output_dir`.
pub fn curate(metadata_csv: &Path, output_dir: &Path) -> Result<CurateOutput> {
    let records: Vec<ImageMetadata> = table::read_records(metadata_csv)?;
    tracing::info!(path = %metadata_csv.display(), records = records.len(), "Loaded image metadata");

    let before = records.len();
    let unique = deduplicate(records);
    let duplicates_removed = before - unique.len();

    let (kept, report) = filter_images(&unique);
    tracing::info!(
        total = report.total,
        free_use = report.free_use,
        kept = report.kept,
        "Filtered images"
    );
    if report.kept == 0 && report.total > 0 {
        tracing::warn!("No image passed the license and content filters");
    }

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let stats_file = output_dir.join(STATS_FILE);
    fs::write(&stats_file, report.render(&kept))
        .with_context(|| format!("Failed to write {}", stats_file.display()))?;
    tracing::info!(path = %stats_file.display(), "Wrote filter statistics");

    let images: Vec<CuratedImage> = kept
        .into_iter()
        .map(|(meta, score)| attribution::curated(meta, score))
        .collect();

    let curated_csv = output_dir.join(CURATED_FILE);
    table::write_records(&curated_csv, &images)?;
    tracing::info!(path = %curated_csv.display(), rows = images.len(), "Wrote curated images");

    let attributions_file = output_dir.join(ATTRIBUTIONS_FILE);
    fs::write(&attributions_file, attribution::attributions_listing(&images))
        .with_context(|| format!("Failed to write {}", attributions_file.display()))?;
    tracing::info!(path = %attributions_file.display(), "Wrote attribution list");

    Ok(CurateOutput {
        images,
        report,
        duplicates_removed,
        curated_csv,
        stats_file,
        attributions_file,
    })
}
