use anyhow::{Context, Result};
use medimg_model::{extract_image_id, SearchHit};
use scraper::{ElementRef, Html, Selector};

use crate::config::{absolute_url, SiteConfig};
use crate::session::PageSource;

/// The site rejects overly long query strings.
pub const MAX_QUERY_CHARS: usize = 200;

/// Build the search URL for a query.
///
/// Terms are separated by whitespace or `+` (paragraph queries already use
/// `+`); each term is percent-encoded and the terms are re-joined with `+`.
pub fn search_url(base: &str, query: &str) -> String {
    let truncated: String = query.chars().take(MAX_QUERY_CHARS).collect();
    let encoded = truncated
        .split(|c: char| c.is_whitespace() || c == '+')
        .filter(|t| !t.is_empty())
        .map(|t| urlencoding::encode(t).into_owned())
        .collect::<Vec<_>>()
        .join("+");
    absolute_url(base, &format!("searchaction.cfm?q={encoded}&sort=relevance"))
}

/// Run one search through a rendered browser page and parse the hits.
pub async fn search(
    source: &dyn PageSource,
    site: &SiteConfig,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    let url = search_url(&site.base_url, query);
    tracing::info!(url = %url, limit, "Searching");

    let html = source
        .fetch_html(&url, site.search_wait)
        .await
        .with_context(|| format!("Failed to load search page {url}"))?;
    tracing::debug!(bytes = html.len(), "Received search page");

    let hits = parse_search_results(&html, &site.base_url, limit);
    tracing::info!(hits = hits.len(), "Parsed search results");
    Ok(hits)
}

/// Extract up to `limit` hits from a rendered search results page.
///
/// Each `div.resultsitempic` container is one hit; its rank is the
/// container's 1-based position even when an earlier container had to be
/// skipped for lacking an image or link.
pub fn parse_search_results(html: &str, base: &str, limit: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    let container_sel = Selector::parse("div.resultsitempic").expect("valid selector");

    let containers: Vec<ElementRef> = document.select(&container_sel).collect();
    tracing::debug!(containers = containers.len(), "Found result containers");

    containers
        .into_iter()
        .take(limit)
        .enumerate()
        .filter_map(|(i, container)| {
            let rank = i as u32 + 1;
            let hit = parse_container(container, base, rank);
            if hit.is_none() {
                tracing::warn!(rank, "Result container without image or link, skipping");
            }
            hit
        })
        .collect()
}

fn parse_container(container: ElementRef, base: &str, rank: u32) -> Option<SearchHit> {
    let img_sel = Selector::parse("img").expect("valid selector");
    let link_sel = Selector::parse("a").expect("valid selector");

    let img = container.select(&img_sel).next()?;
    let link = container.select(&link_sel).next()?;

    let src = img.value().attr("src").filter(|s| !s.trim().is_empty())?;
    let href = link.value().attr("href").filter(|s| !s.trim().is_empty())?;

    let detail_url = absolute_url(base, href);
    let title = img
        .value()
        .attr("alt")
        .map(str::trim)
        .filter(|alt| !alt.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Image {rank}"));

    Some(SearchHit {
        rank,
        image_id: extract_image_id(&detail_url).unwrap_or_default(),
        title,
        thumbnail: absolute_url(base, src),
        detail_url,
        score: 1.0,
    })
}
