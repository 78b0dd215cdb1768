use medimg_model::{ImageMetadata, SearchHit};

use crate::cache::HtmlCache;
use crate::config::{PoliteDelay, SiteConfig};
use crate::detail::{detail_url, looks_like_detail_page, parse_metadata};
use crate::http::HttpClient;

/// Fetch and parse the detail page of every hit.
///
/// Cached pages are used without touching the network; fresh pages are
/// validated, cached, and followed by a polite pause. Hits without an image
/// id and pages that cannot be fetched are logged and left out.
pub async fn collect_metadata(
    hits: &[SearchHit],
    client: &HttpClient,
    cache: &HtmlCache,
    site: &SiteConfig,
    query: &str,
    delay: PoliteDelay,
) -> Vec<ImageMetadata> {
    let mut collected = Vec::with_capacity(hits.len());

    for (i, hit) in hits.iter().enumerate() {
        if !hit.has_image_id() {
            tracing::warn!(rank = hit.rank, url = %hit.detail_url, "No image id in detail URL, skipping");
            continue;
        }

        let html = match cache.get(&hit.image_id) {
            Some(html) => html,
            None => {
                let url = detail_url(&site.base_url, &hit.image_id);
                tracing::info!(
                    item = i + 1,
                    total = hits.len(),
                    image_id = %hit.image_id,
                    "Fetching detail page"
                );
                let fetched = client.get_text_validated(&url, looks_like_detail_page).await;
                delay.pause().await;
                match fetched {
                    Ok(html) => {
                        if let Err(e) = cache.put(&hit.image_id, &html) {
                            tracing::warn!(image_id = %hit.image_id, error = %e, "Failed to cache detail page");
                        }
                        html
                    }
                    Err(e) => {
                        tracing::warn!(image_id = %hit.image_id, error = %e, "Failed to fetch detail page, skipping");
                        continue;
                    }
                }
            }
        };

        let meta = parse_metadata(&html, hit, &site.base_url, query);
        tracing::debug!(
            image_id = %meta.image_id,
            title = %meta.title,
            license_class = %meta.license_class,
            "Extracted metadata"
        );
        collected.push(meta);
    }

    tracing::info!(records = collected.len(), hits = hits.len(), "Collected image metadata");
    collected
}
