// CSV persistence for pipeline records.
//
// Every stage reads its input from and writes its output to a headered CSV
// file whose columns are the serde field names of the record type.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Read all rows of a headered CSV file into records.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (i, row) in reader.deserialize().enumerate() {
        let row: T = row.with_context(|| format!("Bad row {} in {}", i + 1, path.display()))?;
        rows.push(row);
    }
    Ok(rows)
}

/// Write records as a headered CSV file, creating parent directories.
///
/// An empty slice produces an empty file (no header row).
pub fn write_records<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ImageSize, ManifestEntry, ParagraphRecord};

    #[test]
    fn test_paragraphs_with_commas_and_newlines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dataset.csv");
        let rows = vec![ParagraphRecord {
            chapter_id: "14".into(),
            paragraph_id: 3,
            text: "Tumors grow, spread,\nand \"metastasize\".".into(),
        }];

        write_records(&path, &rows).unwrap();
        let back: Vec<ParagraphRecord> = read_records(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_manifest_empty_columns_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest_full.csv");
        std::fs::write(
            &path,
            "index,title,source_url,thumb_file,thumb_size,full_file,full_size\n\
             1,Mitosis,https://example.org/d?imageid=1,nih_thumb_1.jpg,120x90,,\n",
        )
        .unwrap();

        let rows: Vec<ManifestEntry> = read_records(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].thumb_size, Some(ImageSize { width: 120, height: 90 }));
        assert_eq!(rows[0].full_file, None);
        assert_eq!(rows[0].full_size, None);
    }

    #[test]
    fn test_empty_file_reads_as_no_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        write_records::<ParagraphRecord>(&path, &[]).unwrap();
        let rows: Vec<ParagraphRecord> = read_records(&path).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<Vec<ParagraphRecord>> = read_records(&dir.path().join("nope.csv"));
        assert!(result.is_err());
    }
}
