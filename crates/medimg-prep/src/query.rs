// Search query building from the chapter dataset.
//
// A chapter becomes either one long full-text query or a short keyword
// query made of its most frequent content words. Individual paragraphs get
// a compact `+`-joined query suited to the search site's URL syntax.

use anyhow::Result;
use medimg_model::ParagraphRecord;
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

/// Words that carry no search signal in textbook prose.
const STOP_WORDS: &[&str] = &[
    "the", "and", "of", "to", "a", "in", "is", "on", "for", "with", "by", "as", "that", "this",
    "from", "an", "or", "at", "be", "are", "it", "we", "was", "were", "but", "about", "into",
    "over", "without", "figure", "chapter", "introduction", "section", "system", "systems",
    "cells", "cell", "study", "shown", "fig", "data",
];

/// Extra stop words for per-paragraph queries (roman numerals, headings).
const PARAGRAPH_STOP_WORDS: &[&str] = &["iii", "ii", "iv", "i", "subsection"];

/// Fallback query when a paragraph has no usable words.
pub const FALLBACK_QUERY: &str = "cancer";

pub const DEFAULT_KEYWORD_TERMS: usize = 12;
pub const DEFAULT_PARAGRAPH_TERMS: usize = 6;

#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("no paragraphs for chapter '{chapter}' (available: {})", .available.join(", "))]
    UnknownChapter {
        chapter: String,
        available: Vec<String>,
    },
}

/// How a chapter's text is turned into a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// All paragraph texts joined with spaces.
    FullText,
    /// The most frequent content words, most frequent first.
    Keywords { max_terms: usize },
}

impl Default for QueryMode {
    fn default() -> Self {
        QueryMode::Keywords { max_terms: DEFAULT_KEYWORD_TERMS }
    }
}

/// A query built for one chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterQuery {
    pub chapter_id: String,
    pub paragraphs: usize,
    pub mode: QueryMode,
    pub text: String,
}

/// A chapter present in the dataset with its paragraph count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterSummary {
    pub chapter_id: String,
    pub paragraphs: usize,
}

/// List the distinct chapters in a dataset.
///
/// Numeric chapter ids sort numerically and come before non-numeric ids,
/// which sort lexically. Numeric ties such as "14" and "014" fall back to
/// the raw id.
pub fn list_chapters(dataset: &[ParagraphRecord]) -> Vec<ChapterSummary> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for row in dataset {
        *counts.entry(row.chapter_id.as_str()).or_default() += 1;
    }

    let mut chapters: Vec<ChapterSummary> = counts
        .into_iter()
        .map(|(id, paragraphs)| ChapterSummary { chapter_id: id.to_string(), paragraphs })
        .collect();
    chapters.sort_by(|a, b| chapter_sort_key(&a.chapter_id).cmp(&chapter_sort_key(&b.chapter_id)));
    chapters
}

fn chapter_sort_key(id: &str) -> (u8, u64, String) {
    match id.parse::<u64>() {
        Ok(n) => (0, n, id.to_string()),
        Err(_) => (1, 0, id.to_string()),
    }
}

/// Find the dataset's id for `chapter`.
///
/// An exact match wins. Otherwise a trailing `_` is ignored on both sides,
/// so "31" finds "31_" and the other way round.
pub fn resolve_chapter(dataset: &[ParagraphRecord], chapter: &str) -> Result<String, QueryError> {
    let available: Vec<String> = list_chapters(dataset).into_iter().map(|c| c.chapter_id).collect();
    if available.iter().any(|id| id == chapter) {
        return Ok(chapter.to_string());
    }

    let wanted = chapter.trim_end_matches('_');
    match available.iter().find(|id| id.trim_end_matches('_') == wanted) {
        Some(id) => Ok(id.clone()),
        None => Err(QueryError::UnknownChapter { chapter: chapter.to_string(), available }),
    }
}

/// Build the query for one chapter.
pub fn build_chapter_query(
    dataset: &[ParagraphRecord],
    chapter_id: &str,
    mode: QueryMode,
) -> Result<ChapterQuery, QueryError> {
    let texts: Vec<&str> = dataset
        .iter()
        .filter(|r| r.chapter_id == chapter_id)
        .map(|r| r.text.as_str())
        .collect();

    if texts.is_empty() {
        return Err(QueryError::UnknownChapter {
            chapter: chapter_id.to_string(),
            available: list_chapters(dataset).into_iter().map(|c| c.chapter_id).collect(),
        });
    }

    let full_text = texts.join(" ");
    let text = match mode {
        QueryMode::FullText => full_text,
        QueryMode::Keywords { max_terms } => extract_keywords(&full_text, max_terms),
    };

    tracing::debug!(chapter = chapter_id, paragraphs = texts.len(), ?mode, "Built chapter query");

    Ok(ChapterQuery {
        chapter_id: chapter_id.to_string(),
        paragraphs: texts.len(),
        mode,
        text,
    })
}

/// Write a query's text to a file, creating parent directories.
pub fn write_query(query: &ChapterQuery, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, &query.text)?;
    tracing::info!(
        chapter = %query.chapter_id,
        path = %path.display(),
        chars = query.text.len(),
        "Wrote query text"
    );
    Ok(())
}

/// Read a previously written query file.
pub fn read_query(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path)?;
    let text = text.trim().to_string();
    anyhow::ensure!(!text.is_empty(), "Query file {} is empty", path.display());
    Ok(text)
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z]+").expect("valid regex"))
        .find_iter(text)
        .map(|m| m.as_str())
}

/// The `max_terms` most frequent content words of `text`, space-joined.
///
/// Words are lower-cased; stop words and words of three letters or fewer
/// are dropped. Ties keep first-occurrence order.
pub fn extract_keywords(text: &str, max_terms: usize) -> String {
    let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();

    let mut counts: BTreeMap<usize, (String, usize)> = BTreeMap::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    for word in words(text) {
        let w = word.to_lowercase();
        if w.len() <= 3 || stop.contains(w.as_str()) {
            continue;
        }
        let next = first_seen.len();
        let order = *first_seen.entry(w.clone()).or_insert(next);
        counts.entry(order).or_insert_with(|| (w, 0)).1 += 1;
    }

    // BTreeMap iterates in first-seen order; the stable sort keeps it for ties
    let mut ranked: Vec<(String, usize)> = counts.into_values().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    ranked
        .into_iter()
        .take(max_terms)
        .map(|(w, _)| w)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compact query for a single paragraph.
///
/// Keeps words longer than two letters that are not stop words,
/// de-duplicated case-insensitively in first-seen order, original casing
/// preserved, joined with `+`.
pub fn paragraph_query(text: &str, max_terms: usize) -> String {
    let stop: HashSet<&str> = STOP_WORDS
        .iter()
        .chain(PARAGRAPH_STOP_WORDS)
        .copied()
        .collect();

    let mut seen = HashSet::new();
    let terms: Vec<&str> = words(text)
        .filter(|w| w.len() > 2 && !stop.contains(w.to_lowercase().as_str()))
        .filter(|w| seen.insert(w.to_lowercase()))
        .take(max_terms)
        .collect();

    if terms.is_empty() {
        FALLBACK_QUERY.to_string()
    } else {
        terms.join("+")
    }
}
