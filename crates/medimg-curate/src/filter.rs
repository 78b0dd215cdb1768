use medimg_model::ImageMetadata;
use thiserror::Error;

const PUBLIC_DOMAIN_TERMS: &[&str] = &[
    "public domain",
    "freely reused",
    "free to use",
    "no restrictions",
    "cc0",
    "creative commons zero",
];

const FREE_CC_TERMS: &[&str] = &[
    "cc-by",
    "cc by",
    "creative commons attribution",
    "attribution 4.0",
    "attribution-sharealike",
];

/// License variants that forbid the reuse we need, even though they
/// contain a free-CC term ("cc-by-nc" contains "cc-by").
const RESTRICTIVE_TERMS: &[&str] = &[
    "all rights reserved",
    "no derivatives",
    "non-commercial",
    "noncommercial",
    "nc-nd",
    "cc-by-nc",
    "cc by-nc",
    "cc-by-nd",
    "cc by-nd",
];

const ILLUSTRATION_TERMS: &[&str] = &[
    "illustration", "diagram", "infographic", "graphic", "schematic",
    "drawing", "chart", "concept", "overview", "pathway",
    "microscopy", "microscope", "microscopic", "cells", "tissue",
];

const CLINICAL_IMAGING_TERMS: &[&str] = &[
    "x-ray", "ct scan", "mri scan", "pet scan",
    "radiograph", "mammogram", "ultrasound",
];

const EDUCATIONAL_TERMS: &[&str] = &[
    "what is", "how", "process", "mechanism", "function",
    "role", "interaction", "relationship", "system", "overview",
];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("license does not allow free reuse: '{0}'")]
    Restricted(String),

    #[error("not an illustration, diagram, or micrograph")]
    NotIllustrative,

    #[error("clinical imaging ({0})")]
    ClinicalImaging(&'static str),
}

/// Whether `license` text allows free reuse (public domain or an
/// attribution-only Creative Commons license).
pub fn is_free_use(license: &str) -> bool {
    let l = license.to_lowercase();
    if l.trim().is_empty() || RESTRICTIVE_TERMS.iter().any(|t| l.contains(t)) {
        return false;
    }
    PUBLIC_DOMAIN_TERMS.iter().any(|t| l.contains(t)) || FREE_CC_TERMS.iter().any(|t| l.contains(t))
}

/// Why an image would be dropped, or `None` if it is kept.
pub fn rejection(meta: &ImageMetadata) -> Option<Rejection> {
    if !is_free_use(&meta.license) {
        return Some(Rejection::Restricted(meta.license.clone()));
    }

    let title = meta.title.to_lowercase();
    let description = meta.description.to_lowercase();

    if let Some(term) = CLINICAL_IMAGING_TERMS
        .iter()
        .find(|t| title.contains(*t) || description.contains(*t))
    {
        return Some(Rejection::ClinicalImaging(*term));
    }

    let illustrative = ILLUSTRATION_TERMS
        .iter()
        .any(|t| title.contains(t) || description.contains(t));
    if !illustrative {
        return Some(Rejection::NotIllustrative);
    }

    None
}

/// Number of educational terms found in the title or description.
pub fn educational_score(meta: &ImageMetadata) -> u32 {
    let title = meta.title.to_lowercase();
    let description = meta.description.to_lowercase();
    EDUCATIONAL_TERMS
        .iter()
        .filter(|t| title.contains(*t) || description.contains(*t))
        .count() as u32
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterReport {
    pub total: usize,
    pub free_use: usize,
    pub kept: usize,
}

impl FilterReport {
    pub fn removed_by_license(&self) -> usize {
        self.total - self.free_use
    }

    pub fn removed_by_content(&self) -> usize {
        self.free_use - self.kept
    }

    /// Plain-text statistics, with a sample of the top kept images.
    pub fn render(&self, kept: &[(ImageMetadata, u32)]) -> String {
        let rule = "=".repeat(70);
        let mut out = String::new();
        out.push_str(&format!("{rule}\nIMAGE FILTERING REPORT\n{rule}\n\n"));
        out.push_str("SUMMARY:\n");
        out.push_str(&format!("  Total images processed: {}\n", self.total));
        out.push_str(&format!("  After license filter: {} ({})\n", self.free_use, percent(self.free_use, self.total)));
        out.push_str(&format!("  After content filter: {} ({})\n", self.kept, percent(self.kept, self.total)));
        out.push_str(&format!("  Removed by license restrictions: {}\n", self.removed_by_license()));
        out.push_str(&format!("  Removed by content filter: {}\n\n", self.removed_by_content()));

        out.push_str(&format!("{rule}\nSAMPLE APPROVED IMAGES (Top 5)\n{rule}\n\n"));
        for (meta, score) in kept.iter().take(5) {
            let description: String = meta.description.chars().take(200).collect();
            out.push_str(&format!("Image ID: {}\n", meta.image_id));
            out.push_str(&format!("Title: {}\n", meta.title));
            out.push_str(&format!("Description: {description}\n"));
            out.push_str(&format!("Educational score: {score}\n"));
            out.push_str(&format!("Source: {}\n\n", meta.source));
        }
        out
    }
}

fn percent(part: usize, total: usize) -> String {
    if total == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", part as f64 * 100.0 / total as f64)
}

/// Keep free-use illustrative images, each paired with its educational
/// score, ordered by descending score and then ascending rank.
pub fn filter_images(images: &[ImageMetadata]) -> (Vec<(ImageMetadata, u32)>, FilterReport) {
    let mut report = FilterReport { total: images.len(), ..Default::default() };
    let mut kept = Vec::new();

    for meta in images {
        match rejection(meta) {
            None => {
                report.free_use += 1;
                kept.push((meta.clone(), educational_score(meta)));
            }
            Some(reason) => {
                if !matches!(reason, Rejection::Restricted(_)) {
                    report.free_use += 1;
                }
                tracing::debug!(image_id = %meta.image_id, reason = %reason, "Filtered out");
            }
        }
    }

    kept.sort_by(|(a, sa), (b, sb)| sb.cmp(sa).then(a.rank.cmp(&b.rank)));
    report.kept = kept.len();
    (kept, report)
}
