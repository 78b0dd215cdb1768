use anyhow::{Context, Result};
use medimg_model::{table, ImageMetadata, ParagraphMatch, SearchHit};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Provenance of one search run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSource {
    pub site: String,
    pub url: String,
    pub query: String,
    pub fetched_at: String,
}

impl SearchSource {
    pub fn new(site: &str, url: &str, query: &str) -> Self {
        Self {
            site: site.to_string(),
            url: url.to_string(),
            query: query.to_string(),
            fetched_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn source_md(&self, results: usize) -> String {
        format!(
            "# Source\n\n\
             - **Site:** {}\n\
             - **URL:** {}\n\
             - **Query:** {}\n\
             - **Fetched:** {}\n\
             - **Results:** {}\n",
            self.site, self.url, self.query, self.fetched_at, results,
        )
    }
}

/// `data/nih_results.csv` => `data/nih_results.source.md`
fn provenance_path(csv_path: &Path) -> PathBuf {
    csv_path.with_extension("source.md")
}

/// Write search hits as CSV, plus a provenance file next to it.
pub fn write_search_results(path: &Path, hits: &[SearchHit], source: &SearchSource) -> Result<()> {
    table::write_records(path, hits)?;
    tracing::info!(path = %path.display(), rows = hits.len(), "Wrote search results");

    let md_path = provenance_path(path);
    fs::write(&md_path, source.source_md(hits.len()))
        .with_context(|| format!("Failed to write {}", md_path.display()))?;
    tracing::info!(path = %md_path.display(), "Wrote source provenance");
    Ok(())
}

pub fn read_search_results(path: &Path) -> Result<Vec<SearchHit>> {
    let hits = table::read_records(path)?;
    tracing::debug!(path = %path.display(), rows = hits.len(), "Loaded search results");
    Ok(hits)
}

pub fn write_metadata(path: &Path, records: &[ImageMetadata]) -> Result<()> {
    table::write_records(path, records)?;
    tracing::info!(path = %path.display(), rows = records.len(), "Wrote image metadata");
    Ok(())
}

pub fn write_paragraph_matches(path: &Path, rows: &[ParagraphMatch]) -> Result<()> {
    table::write_records(path, rows)?;
    tracing::info!(path = %path.display(), rows = rows.len(), "Wrote paragraph image map");
    Ok(())
}

/// Save a rendered search page for later re-examination.
pub fn cache_html(output_dir: &Path, filename: &str, html: &str) -> Result<()> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(filename);
    fs::write(&path, html)?;
    tracing::info!(path = %path.display(), bytes = html.len(), "Cached raw HTML");
    Ok(())
}
