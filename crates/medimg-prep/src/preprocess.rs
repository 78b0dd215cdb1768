// Chapter preprocessing.
//
// Reads raw chapter files (`.md` / `.txt`) from a directory and flattens
// them into one paragraph-per-row dataset.

use anyhow::{Context, Result};
use medimg_model::table;
use medimg_model::ParagraphRecord;
use std::fs;
use std::path::{Path, PathBuf};

use crate::normalize::{normalize_text, split_paragraphs};

/// Preprocess every chapter file in `chapters_dir` and write the dataset CSV.
///
/// Files are visited in file-name order so the dataset is reproducible.
/// Returns the records that were written.
pub fn preprocess_chapters(chapters_dir: &Path, output_csv: &Path) -> Result<Vec<ParagraphRecord>> {
    anyhow::ensure!(
        chapters_dir.is_dir(),
        "Chapters directory {} does not exist",
        chapters_dir.display()
    );

    let files = chapter_files(chapters_dir)?;
    tracing::info!(dir = %chapters_dir.display(), files = files.len(), "Found chapter files");

    let mut records = Vec::new();
    for path in &files {
        let chapter_records = read_chapter(path)?;
        tracing::debug!(
            file = %path.display(),
            paragraphs = chapter_records.len(),
            "Read chapter"
        );
        records.extend(chapter_records);
    }

    if records.is_empty() {
        tracing::warn!(dir = %chapters_dir.display(), "No paragraphs found");
    }

    table::write_records(output_csv, &records)?;
    tracing::info!(
        path = %output_csv.display(),
        paragraphs = records.len(),
        "Wrote chapter dataset"
    );

    Ok(records)
}

/// List chapter files (`.md` or `.txt`) in a directory, sorted by name.
fn chapter_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_chapter = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "md" || e == "txt");
        if is_chapter {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read one chapter file into paragraph records.
fn read_chapter(path: &Path) -> Result<Vec<ParagraphRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let chapter_id = chapter_id_from_stem(stem);

    let text = normalize_text(&raw);
    Ok(split_paragraphs(&text)
        .into_iter()
        .map(|(paragraph_id, para)| ParagraphRecord {
            chapter_id: chapter_id.clone(),
            paragraph_id,
            text: para.to_string(),
        })
        .collect())
}

/// Derive a chapter id from a file stem.
///
/// "Chapter 14" -> "14", "Chapter 3 Cell Biology" -> "3", "appendix" -> "appendix".
pub fn chapter_id_from_stem(stem: &str) -> String {
    let mut parts = stem.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(_), Some(second)) => second.to_string(),
        _ => stem.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chapter_id_from_stem() {
        assert_eq!(chapter_id_from_stem("Chapter 14"), "14");
        assert_eq!(chapter_id_from_stem("Chapter 3 Cell Biology"), "3");
        assert_eq!(chapter_id_from_stem("appendix"), "appendix");
    }

    #[test]
    fn test_preprocess_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let chapters = dir.path().join("chapters");
        fs::create_dir_all(&chapters).unwrap();
        fs::write(
            chapters.join("Chapter 2.md"),
            "Apoptosis is programmed cell death.\n\nCaspases execute it.\n",
        )
        .unwrap();
        fs::write(chapters.join("Chapter 1.txt"), "Cells divide by mitosis.\r\n").unwrap();
        fs::write(chapters.join("notes.pdf"), "ignored").unwrap();

        let out = dir.path().join("data/chapters_dataset.csv");
        let records = preprocess_chapters(&chapters, &out).unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].chapter_id, "1");
        assert_eq!(records[0].text, "Cells divide by mitosis.");
        assert_eq!(records[1].chapter_id, "2");
        assert_eq!(records[1].paragraph_id, 1);
        assert_eq!(records[2].paragraph_id, 2);
        assert_eq!(records[2].text, "Caspases execute it.");

        let back: Vec<ParagraphRecord> = table::read_records(&out).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = preprocess_chapters(&dir.path().join("missing"), &dir.path().join("out.csv"));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_directory_writes_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let chapters = dir.path().join("chapters");
        fs::create_dir_all(&chapters).unwrap();
        let out = dir.path().join("out.csv");

        let records = preprocess_chapters(&chapters, &out).unwrap();
        assert!(records.is_empty());
        assert!(out.exists());
    }
}
