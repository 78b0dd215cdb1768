use medimg_model::ImageMetadata;
use std::collections::HashMap;

/// One row per image id, keeping the best (lowest) rank.
///
/// Results come back ordered by rank; rows with equal rank keep their input
/// order. Rows without an image id cannot be matched and are all kept.
pub fn deduplicate(images: Vec<ImageMetadata>) -> Vec<ImageMetadata> {
    let before = images.len();
    let mut best: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<ImageMetadata> = Vec::with_capacity(images.len());

    for meta in images {
        if meta.image_id.is_empty() {
            kept.push(meta);
            continue;
        }
        match best.get(&meta.image_id) {
            Some(&slot) => {
                if meta.rank < kept[slot].rank {
                    kept[slot] = meta;
                }
            }
            None => {
                best.insert(meta.image_id.clone(), kept.len());
                kept.push(meta);
            }
        }
    }

    kept.sort_by_key(|m| m.rank);

    let removed = before - kept.len();
    if removed > 0 {
        tracing::info!(before, after = kept.len(), removed, "Removed duplicate images");
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, rank: u32, query: &str) -> ImageMetadata {
        ImageMetadata {
            image_id: id.into(),
            rank,
            query: query.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_keeps_lowest_rank_per_image() {
        let images = vec![
            meta("10", 4, "first"),
            meta("20", 2, "first"),
            meta("10", 1, "second"),
            meta("20", 2, "second"),
            meta("", 3, "first"),
            meta("", 5, "second"),
        ];

        let deduped = deduplicate(images);
        let got: Vec<(&str, u32, &str)> = deduped
            .iter()
            .map(|m| (m.image_id.as_str(), m.rank, m.query.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![("10", 1, "second"), ("20", 2, "first"), ("", 3, "first"), ("", 5, "second")]
        );
    }
}
