use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::license::LicenseClass;
use crate::size::ImageSize;

/// One paragraph of a preprocessed chapter.
///
/// This is the row type of the chapter dataset (`chapters_dataset.csv`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParagraphRecord {
    /// Chapter identifier derived from the source file name (e.g., "14").
    pub chapter_id: String,
    /// 1-based position of the paragraph within its chapter file.
    pub paragraph_id: u32,
    pub text: String,
}

/// A single hit from the image search results page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    /// 1-based position of the result container on the page.
    pub rank: u32,
    /// Numeric image id taken from the detail URL. Empty if the URL has none.
    pub image_id: String,
    pub title: String,
    /// Absolute URL of the image's detail page.
    pub detail_url: String,
    /// Absolute URL of the thumbnail shown on the results page.
    pub thumbnail: String,
    pub score: f32,
}

impl SearchHit {
    pub fn has_image_id(&self) -> bool {
        !self.image_id.is_empty()
    }
}

/// Metadata scraped from an image's detail page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImageMetadata {
    pub image_id: String,
    pub rank: u32,
    pub query: String,
    pub title: String,
    pub description: String,
    pub credit: String,
    pub license: String,
    pub license_class: LicenseClass,
    /// Canonical detail page URL.
    pub source: String,
    pub thumbnail: String,
    /// Full-resolution image link found on the detail page, if any.
    pub full_res_url: Option<String>,
}

/// One row of the download manifest (`manifest_full.csv`).
///
/// File and size columns are empty when the corresponding download failed
/// or no full-resolution link was found.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestEntry {
    pub index: u32,
    pub title: String,
    pub source_url: String,
    pub thumb_file: Option<String>,
    pub thumb_size: Option<ImageSize>,
    pub full_file: Option<String>,
    pub full_size: Option<ImageSize>,
}

impl ManifestEntry {
    pub fn is_complete(&self) -> bool {
        self.thumb_file.is_some() && self.full_file.is_some()
    }
}

/// One row of a paragraph-to-image map.
///
/// A paragraph whose search picked nothing still gets one row, with empty
/// image columns, so every searched paragraph is accounted for.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParagraphMatch {
    pub chapter_id: String,
    pub paragraph_id: u32,
    pub query: String,
    pub image_id: String,
    pub title: String,
    pub detail_url: String,
    pub thumbnail: String,
    /// Hits the paragraph's search returned before selection.
    pub candidate_count: usize,
    /// 1-based position among the paragraph's picks.
    pub rank: Option<u32>,
}

/// Image metadata that passed curation, with generated attribution text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CuratedImage {
    pub image_id: String,
    pub rank: u32,
    pub title: String,
    pub description: String,
    pub credit: String,
    pub license: String,
    pub license_class: LicenseClass,
    pub source: String,
    pub educational_score: u32,
    pub attribution_text: String,
    pub caption_text: String,
}

/// File name a curated image is stored under, keyed by its image id.
pub fn image_file_name(image_id: &str) -> String {
    format!("{image_id}.jpg")
}

/// Extract the numeric image id from a URL containing `imageid=NNN`.
pub fn extract_image_id(url: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)imageid=(\d+)").expect("valid regex"));
    re.captures(url).map(|caps| caps[1].to_string())
}
