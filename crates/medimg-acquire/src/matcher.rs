// Paragraph to image matching.
//
// Every n-th paragraph of a chapter gets its own compact query and search.
// The leading hits of each search are kept, minus images an earlier
// paragraph already claimed, giving a paragraph-to-image map.

use anyhow::Result;
use medimg_model::{ParagraphMatch, ParagraphRecord, SearchHit};
use medimg_prep::{paragraph_query, resolve_chapter};
use std::collections::HashSet;

use crate::config::{PoliteDelay, SiteConfig};
use crate::search::search;
use crate::session::PageSource;

#[derive(Debug, Clone)]
pub struct MatchOptions {
    /// Search every n-th paragraph; 0 and 1 both search all of them.
    pub every: usize,
    /// Hits requested per paragraph search.
    pub max_per_para: usize,
    /// Picks kept per paragraph.
    pub top_k: usize,
    /// Words in each paragraph query.
    pub query_terms: usize,
    /// Pause between consecutive searches.
    pub delay: PoliteDelay,
}

/// Search for images paragraph by paragraph within one chapter.
///
/// A failed search is logged and recorded as a paragraph with no
/// candidates. Only an unknown chapter is an error.
pub async fn match_paragraphs(
    dataset: &[ParagraphRecord],
    chapter: &str,
    source: &dyn PageSource,
    site: &SiteConfig,
    options: &MatchOptions,
) -> Result<Vec<ParagraphMatch>> {
    let chapter_id = resolve_chapter(dataset, chapter)?;
    let selected: Vec<&ParagraphRecord> = dataset
        .iter()
        .filter(|r| r.chapter_id == chapter_id)
        .step_by(options.every.max(1))
        .collect();
    tracing::info!(
        chapter = %chapter_id,
        paragraphs = selected.len(),
        every = options.every,
        top_k = options.top_k,
        "Matching paragraphs to images"
    );

    let mut claimed: HashSet<String> = HashSet::new();
    let mut rows = Vec::new();

    for (i, para) in selected.iter().enumerate() {
        if i > 0 {
            options.delay.pause().await;
        }

        let query = paragraph_query(&para.text, options.query_terms);
        let hits = match search(source, site, &query, options.max_per_para).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(paragraph = para.paragraph_id, query = %query, error = %e, "Paragraph search failed");
                Vec::new()
            }
        };

        let base = ParagraphMatch {
            chapter_id: chapter_id.clone(),
            paragraph_id: para.paragraph_id,
            query,
            candidate_count: hits.len(),
            ..Default::default()
        };

        let picks = select_picks(&hits, options.top_k, &mut claimed);
        if picks.is_empty() {
            tracing::debug!(paragraph = para.paragraph_id, candidates = hits.len(), "No new image for paragraph");
            rows.push(base);
            continue;
        }

        for (n, hit) in picks.into_iter().enumerate() {
            rows.push(ParagraphMatch {
                image_id: hit.image_id.clone(),
                title: hit.title.clone(),
                detail_url: hit.detail_url.clone(),
                thumbnail: hit.thumbnail.clone(),
                rank: Some(n as u32 + 1),
                ..base.clone()
            });
        }
    }

    tracing::info!(rows = rows.len(), images = claimed.len(), "Matched paragraphs");
    Ok(rows)
}

/// Take up to `top_k` hits in page order, each image at most once per
/// paragraph and skipping ids in `claimed`. Picked ids are added to
/// `claimed`. Hits without an id can't be tracked across paragraphs.
fn select_picks<'a>(hits: &'a [SearchHit], top_k: usize, claimed: &mut HashSet<String>) -> Vec<&'a SearchHit> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut picks = Vec::new();

    for hit in hits {
        if picks.len() >= top_k {
            break;
        }
        if !seen.insert(hit.image_id.as_str()) {
            continue;
        }
        if hit.has_image_id() && claimed.contains(&hit.image_id) {
            continue;
        }
        picks.push(hit);
    }

    for hit in &picks {
        if hit.has_image_id() {
            claimed.insert(hit.image_id.clone());
        }
    }
    picks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::search_url;
    use crate::session::FakePages;
    use medimg_prep::DEFAULT_PARAGRAPH_TERMS;

    fn row(chapter: &str, id: u32, text: &str) -> ParagraphRecord {
        ParagraphRecord { chapter_id: chapter.into(), paragraph_id: id, text: text.into() }
    }

    fn results_page(ids: &[&str]) -> String {
        let items: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<div class="resultsitempic"><a href="details.cfm?imageid={id}"><img src="thumbs/{id}.jpg" alt="Image {id}"></a></div>"#
                )
            })
            .collect();
        format!("<html><body>{items}</body></html>")
    }

    fn options(every: usize, top_k: usize) -> MatchOptions {
        MatchOptions {
            every,
            max_per_para: 20,
            top_k,
            query_terms: DEFAULT_PARAGRAPH_TERMS,
            delay: PoliteDelay::NONE,
        }
    }

    fn page_for(site: &SiteConfig, text: &str, ids: &[&str]) -> (String, String) {
        (
            search_url(&site.base_url, &paragraph_query(text, DEFAULT_PARAGRAPH_TERMS)),
            results_page(ids),
        )
    }

    const TUMOR: &str = "Tumor angiogenesis feeds growing tumors.";
    const SKIPPED: &str = "Lymphocytes patrol tissues.";
    const METASTASIS: &str = "Metastasis spreads malignant cells through blood.";

    #[tokio::test]
    async fn test_match_every_other_paragraph_without_reusing_images() {
        let site = SiteConfig::default();
        let dataset = vec![
            row("31_", 1, TUMOR),
            row("31_", 2, SKIPPED),
            row("2", 1, "Unrelated chapter."),
            row("31_", 3, METASTASIS),
        ];
        let pages = FakePages::new(vec![
            page_for(&site, TUMOR, &["1", "2", "1", "3"]),
            page_for(&site, METASTASIS, &["2", "4", "5"]),
        ]);

        let rows = match_paragraphs(&dataset, "31", &pages, &site, &options(2, 2)).await.unwrap();

        let picked: Vec<(u32, &str, Option<u32>)> = rows
            .iter()
            .map(|r| (r.paragraph_id, r.image_id.as_str(), r.rank))
            .collect();
        assert_eq!(
            picked,
            vec![(1, "1", Some(1)), (1, "2", Some(2)), (3, "4", Some(1)), (3, "5", Some(2))]
        );
        assert!(rows.iter().all(|r| r.chapter_id == "31_"));
        assert_eq!(rows[0].candidate_count, 4);
        assert_eq!(rows[0].query, "Tumor+angiogenesis+feeds+growing+tumors");
        assert_eq!(rows[2].detail_url, "https://visualsonline.cancer.gov/details.cfm?imageid=4");
        assert_eq!(pages.requested().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_search_leaves_an_empty_row() {
        let site = SiteConfig::default();
        let dataset = vec![row("7", 1, TUMOR), row("7", 2, METASTASIS)];
        let pages = FakePages::new(vec![page_for(&site, METASTASIS, &["9"])]);

        let rows = match_paragraphs(&dataset, "7", &pages, &site, &options(1, 3)).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].paragraph_id, 1);
        assert_eq!(rows[0].image_id, "");
        assert_eq!(rows[0].rank, None);
        assert_eq!(rows[0].candidate_count, 0);
        assert_eq!(rows[1].image_id, "9");
    }

    #[tokio::test]
    async fn test_unknown_chapter_is_an_error() {
        let pages = FakePages::new(vec![]);
        let site = SiteConfig::default();
        let result = match_paragraphs(&[row("1", 1, TUMOR)], "99", &pages, &site, &options(1, 3)).await;
        assert!(result.is_err());
        assert!(pages.requested().is_empty());
    }

    #[test]
    fn test_select_picks_keeps_one_hit_without_id() {
        let hit = |id: &str| SearchHit {
            rank: 1,
            image_id: id.to_string(),
            title: String::new(),
            detail_url: String::new(),
            thumbnail: String::new(),
            score: 1.0,
        };
        let hits = vec![hit(""), hit(""), hit("8")];
        let mut claimed = HashSet::new();
        let picks = select_picks(&hits, 5, &mut claimed);
        assert_eq!(picks.len(), 2);
        assert_eq!(claimed, HashSet::from(["8".to_string()]));
    }
}
