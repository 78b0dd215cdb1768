// Image download.
//
// For each search hit, fetch the thumbnail and a full-resolution copy,
// re-encode both as JPEG, and record what was obtained in a manifest.
// A failed item leaves empty manifest fields; it never stops the batch.
//
// Curated images are fetched separately, by id, under id-keyed names.

use anyhow::{Context, Result};
use image::ImageFormat;
use medimg_model::{
    image_file_name, table, CuratedImage, DownloadSize, ImageSize, ManifestEntry, SearchHit,
};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{absolute_url, PoliteDelay, SiteConfig};
use crate::detail::find_full_res_url;
use crate::http::HttpClient;
use crate::session::PageSource;

pub const MANIFEST_FILE: &str = "manifest_full.csv";

/// Where the full-resolution image comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullResStrategy {
    /// Ask the retrieve endpoint for a JPEG at the given size. Needs an
    /// image id; hits without one fall back to the detail page.
    Retrieve(DownloadSize),
    /// Render the detail page and follow the link found on it.
    DetailPage,
}

impl Default for FullResStrategy {
    fn default() -> Self {
        FullResStrategy::Retrieve(DownloadSize::default())
    }
}

/// Direct download URL for an image at a given size.
pub fn retrieve_url(base: &str, image_id: &str, size: DownloadSize) -> String {
    absolute_url(
        base,
        &format!("retrieve.cfm?imageid={image_id}&dpi={}&fileformat=jpg", size.dpi()),
    )
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub save_dir: PathBuf,
    pub strategy: FullResStrategy,
    /// Pause between consecutive items.
    pub delay: PoliteDelay,
}

#[derive(Debug, Clone, Default)]
pub struct DownloadReport {
    pub entries: Vec<ManifestEntry>,
    pub thumbs_ok: usize,
    pub fulls_ok: usize,
    /// Items missing the thumbnail, the full image, or both.
    pub failed: usize,
}

pub fn thumb_file_name(index: u32) -> String {
    format!("nih_thumb_{index}.jpg")
}

pub fn full_file_name(index: u32) -> String {
    format!("nih_full_{index}.jpg")
}

/// Download thumbnails and full-resolution images for `hits` into
/// `options.save_dir` and write `manifest_full.csv` there.
///
/// Only failing to create the save directory or to write the manifest is an
/// error; per-image failures are logged and counted.
pub async fn download_images(
    hits: &[SearchHit],
    source: &dyn PageSource,
    client: &HttpClient,
    site: &SiteConfig,
    options: &DownloadOptions,
) -> Result<DownloadReport> {
    fs::create_dir_all(&options.save_dir)
        .with_context(|| format!("Failed to create {}", options.save_dir.display()))?;

    let previous = previous_manifest(&options.save_dir);
    let mut report = DownloadReport::default();

    for (i, hit) in hits.iter().enumerate() {
        let index = i as u32 + 1;
        if i > 0 {
            options.delay.pause().await;
        }
        tracing::info!(index, total = hits.len(), title = %hit.title, "Downloading");

        // Files are named by position, so one left by an earlier run is only
        // ours if that run recorded the same image at this index.
        let earlier = previous
            .get(&index)
            .filter(|entry| entry.source_url == hit.detail_url);
        let reuse_thumb = earlier.is_some_and(|entry| entry.thumb_file.is_some());
        let reuse_full = earlier.is_some_and(|entry| entry.full_file.is_some());

        let thumb_name = thumb_file_name(index);
        let thumb_size = match fetch_image(
            client,
            &hit.thumbnail,
            Some(&hit.detail_url),
            &options.save_dir.join(&thumb_name),
            reuse_thumb,
        )
        .await
        {
            Ok(size) => Some(size),
            Err(e) => {
                tracing::warn!(index, url = %hit.thumbnail, error = %e, "Thumbnail download failed");
                None
            }
        };

        let full_size = match resolve_full_res_url(hit, source, site, options.strategy).await {
            Ok(Some(url)) => {
                tracing::debug!(index, url = %url, "Found full-resolution link");
                let path = options.save_dir.join(full_file_name(index));
                match fetch_image(client, &url, Some(&hit.detail_url), &path, reuse_full).await {
                    Ok(size) => Some(size),
                    Err(e) => {
                        tracing::warn!(index, url = %url, error = %e, "Full-resolution download failed");
                        None
                    }
                }
            }
            Ok(None) => {
                tracing::warn!(index, url = %hit.detail_url, "No full-resolution link found");
                None
            }
            Err(e) => {
                tracing::warn!(index, url = %hit.detail_url, error = %e, "Failed to load detail page");
                None
            }
        };

        let entry = ManifestEntry {
            index,
            title: hit.title.clone(),
            source_url: hit.detail_url.clone(),
            thumb_file: thumb_size.map(|_| thumb_name),
            thumb_size,
            full_file: full_size.map(|_| full_file_name(index)),
            full_size,
        };

        if entry.thumb_file.is_some() {
            report.thumbs_ok += 1;
        }
        if entry.full_file.is_some() {
            report.fulls_ok += 1;
        }
        if !entry.is_complete() {
            report.failed += 1;
        }
        report.entries.push(entry);
    }

    let manifest = options.save_dir.join(MANIFEST_FILE);
    table::write_records(&manifest, &report.entries)?;
    tracing::info!(
        path = %manifest.display(),
        items = report.entries.len(),
        thumbs = report.thumbs_ok,
        full = report.fulls_ok,
        failed = report.failed,
        "Wrote download manifest"
    );

    Ok(report)
}

/// Outcome of [`download_curated`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CuratedDownloadReport {
    pub downloaded: usize,
    /// Already present from an earlier run.
    pub existing: usize,
    pub failed: usize,
}

/// Download curated images by id from the retrieve endpoint into
/// `save_dir`, each as [`image_file_name`].
///
/// Names are unique per image, so a readable file already there is kept.
/// Per-image failures are logged and counted.
pub async fn download_curated(
    images: &[CuratedImage],
    client: &HttpClient,
    site: &SiteConfig,
    save_dir: &Path,
    size: DownloadSize,
    delay: PoliteDelay,
) -> Result<CuratedDownloadReport> {
    fs::create_dir_all(save_dir)
        .with_context(|| format!("Failed to create {}", save_dir.display()))?;

    let mut report = CuratedDownloadReport::default();
    let mut fetched = false;

    for (i, image) in images.iter().enumerate() {
        if image.image_id.is_empty() {
            tracing::warn!(title = %image.title, "Curated image has no id, skipping");
            report.failed += 1;
            continue;
        }

        let path = save_dir.join(image_file_name(&image.image_id));
        if path.exists() && image::image_dimensions(&path).is_ok() {
            tracing::info!(path = %path.display(), "Already downloaded");
            report.existing += 1;
            continue;
        }

        if fetched {
            delay.pause().await;
        }
        fetched = true;

        tracing::info!(index = i + 1, total = images.len(), image_id = %image.image_id, "Downloading");
        let url = retrieve_url(&site.base_url, &image.image_id, size);
        let referer = Some(image.source.as_str()).filter(|s| !s.is_empty());
        match fetch_image(client, &url, referer, &path, false).await {
            Ok(_) => report.downloaded += 1,
            Err(e) => {
                tracing::warn!(image_id = %image.image_id, url = %url, error = %e, "Download failed");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        dir = %save_dir.display(),
        downloaded = report.downloaded,
        existing = report.existing,
        failed = report.failed,
        "Curated download finished"
    );
    Ok(report)
}

/// Entries of the manifest an earlier run left in `save_dir`, by index.
fn previous_manifest(save_dir: &Path) -> HashMap<u32, ManifestEntry> {
    let path = save_dir.join(MANIFEST_FILE);
    if !path.exists() {
        return HashMap::new();
    }
    match table::read_records::<ManifestEntry>(&path) {
        Ok(entries) => entries.into_iter().map(|entry| (entry.index, entry)).collect(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable manifest");
            HashMap::new()
        }
    }
}

async fn resolve_full_res_url(
    hit: &SearchHit,
    source: &dyn PageSource,
    site: &SiteConfig,
    strategy: FullResStrategy,
) -> Result<Option<String>> {
    if let FullResStrategy::Retrieve(size) = strategy {
        if hit.has_image_id() {
            return Ok(Some(retrieve_url(&site.base_url, &hit.image_id, size)));
        }
        tracing::debug!(rank = hit.rank, "No image id, falling back to detail page");
    }

    let html = source.fetch_html(&hit.detail_url, site.detail_wait).await?;
    Ok(find_full_res_url(&html, &site.base_url))
}

/// Fetch one image and store it at `path` as JPEG, returning its size.
///
/// With `reuse`, an existing readable file at `path` is kept and only its
/// dimensions are read. Without it, the file is overwritten.
async fn fetch_image(
    client: &HttpClient,
    url: &str,
    referer: Option<&str>,
    path: &Path,
    reuse: bool,
) -> Result<ImageSize> {
    if reuse && path.exists() {
        if let Ok((width, height)) = image::image_dimensions(path) {
            tracing::debug!(path = %path.display(), "Already downloaded, skipping");
            return Ok(ImageSize { width, height });
        }
        tracing::debug!(path = %path.display(), "Existing file unreadable, downloading again");
    }

    if url.trim().is_empty() {
        anyhow::bail!("empty image URL");
    }

    let bytes = client.get_bytes(url, referer).await?;
    let decoded = image::load_from_memory(&bytes)
        .with_context(|| format!("Undecodable image from {url} ({} bytes)", bytes.len()))?;

    let rgb = decoded.to_rgb8();
    rgb.save_with_format(path, ImageFormat::Jpeg)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let size = ImageSize { width: rgb.width(), height: rgb.height() };
    tracing::info!(path = %path.display(), size = %size, "Saved image");
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::session::FakePages;
    use std::io::Cursor;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([180, 40, 40]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn hit(server: &MockServer, rank: u32, id: &str) -> SearchHit {
        SearchHit {
            rank,
            image_id: id.to_string(),
            title: format!("Image {rank}"),
            detail_url: format!("{}/details.cfm?imageid={id}", server.uri()),
            thumbnail: format!("{}/thumbs/{rank}.png", server.uri()),
            score: 1.0,
        }
    }

    fn setup(server: &MockServer, dir: &Path, strategy: FullResStrategy) -> (SiteConfig, HttpClient, DownloadOptions) {
        let mut site = SiteConfig::with_base_url(&server.uri());
        site.retry = RetryPolicy::none();
        site.detail_wait = std::time::Duration::ZERO;
        let client = HttpClient::new(&site).unwrap();
        let options = DownloadOptions {
            save_dir: dir.to_path_buf(),
            strategy,
            delay: PoliteDelay::NONE,
        };
        (site, client, options)
    }

    #[test]
    fn test_retrieve_url() {
        assert_eq!(
            retrieve_url("https://visualsonline.cancer.gov/", "2255", DownloadSize::Medium),
            "https://visualsonline.cancer.gov/retrieve.cfm?imageid=2255&dpi=150&fileformat=jpg"
        );
    }

    #[tokio::test]
    async fn test_download_with_retrieve_strategy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thumbs/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(4, 3)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/retrieve.cfm"))
            .and(query_param("imageid", "55"))
            .and(query_param("dpi", "72"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(16, 9)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (site, client, options) =
            setup(&server, dir.path(), FullResStrategy::Retrieve(DownloadSize::Small));
        let pages = FakePages::new(vec![]);

        let report = download_images(&[hit(&server, 1, "55")], &pages, &client, &site, &options)
            .await
            .unwrap();

        assert_eq!(report.thumbs_ok, 1);
        assert_eq!(report.fulls_ok, 1);
        assert_eq!(report.failed, 0);
        let entry = &report.entries[0];
        assert_eq!(entry.thumb_file.as_deref(), Some("nih_thumb_1.jpg"));
        assert_eq!(entry.thumb_size, Some(ImageSize { width: 4, height: 3 }));
        assert_eq!(entry.full_size, Some(ImageSize { width: 16, height: 9 }));
        assert!(pages.requested().is_empty());

        assert_eq!(image::image_dimensions(dir.path().join("nih_full_1.jpg")).unwrap(), (16, 9));
        let manifest: Vec<ManifestEntry> = table::read_records(&dir.path().join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest, report.entries);
    }

    #[tokio::test]
    async fn test_download_with_detail_page_strategy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thumbs/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(4, 3)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/previews/8.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(10, 20)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (site, client, options) = setup(&server, dir.path(), FullResStrategy::DetailPage);
        let h = hit(&server, 1, "8");
        let pages = FakePages::new(vec![(
            h.detail_url.clone(),
            r#"<html><img class="previewlg" src="/previews/8.png"></html>"#.to_string(),
        )]);

        let report = download_images(&[h.clone()], &pages, &client, &site, &options).await.unwrap();
        assert_eq!(report.entries[0].full_size, Some(ImageSize { width: 10, height: 20 }));
        assert_eq!(pages.requested(), vec![h.detail_url]);
    }

    #[tokio::test]
    async fn test_failures_leave_empty_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thumbs/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not an image"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (site, client, options) =
            setup(&server, dir.path(), FullResStrategy::Retrieve(DownloadSize::Large));
        // no image id: falls back to the detail page, which has no link
        let h = hit(&server, 1, "");
        let pages = FakePages::new(vec![(h.detail_url.clone(), "<html></html>".to_string())]);

        let report = download_images(&[h], &pages, &client, &site, &options).await.unwrap();
        assert_eq!(report.thumbs_ok, 0);
        assert_eq!(report.fulls_ok, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.entries[0].thumb_file, None);
        assert_eq!(report.entries[0].full_file, None);
        assert!(!dir.path().join("nih_thumb_1.jpg").exists());
        assert!(dir.path().join(MANIFEST_FILE).exists());
    }

    #[tokio::test]
    async fn test_existing_files_are_not_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        image::RgbImage::from_pixel(6, 5, image::Rgb([0, 0, 0]))
            .save_with_format(dir.path().join("nih_thumb_1.jpg"), ImageFormat::Jpeg)
            .unwrap();
        image::RgbImage::from_pixel(30, 20, image::Rgb([0, 0, 0]))
            .save_with_format(dir.path().join("nih_full_1.jpg"), ImageFormat::Jpeg)
            .unwrap();

        let h = hit(&server, 1, "3");
        table::write_records(
            &dir.path().join(MANIFEST_FILE),
            &[ManifestEntry {
                index: 1,
                title: h.title.clone(),
                source_url: h.detail_url.clone(),
                thumb_file: Some(thumb_file_name(1)),
                thumb_size: Some(ImageSize { width: 6, height: 5 }),
                full_file: Some(full_file_name(1)),
                full_size: Some(ImageSize { width: 30, height: 20 }),
            }],
        )
        .unwrap();

        let (site, client, options) =
            setup(&server, dir.path(), FullResStrategy::Retrieve(DownloadSize::Large));
        let pages = FakePages::new(vec![]);

        let report = download_images(&[h], &pages, &client, &site, &options)
            .await
            .unwrap();
        assert_eq!(report.entries[0].thumb_size, Some(ImageSize { width: 6, height: 5 }));
        assert_eq!(report.entries[0].full_size, Some(ImageSize { width: 30, height: 20 }));
        assert_eq!(report.failed, 0);
    }

    #[tokio::test]
    async fn test_second_run_replaces_files_of_other_images() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thumbs/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(4, 3)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/thumbs/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(40, 30)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/retrieve.cfm"))
            .and(query_param("imageid", "111"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(8, 6)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/retrieve.cfm"))
            .and(query_param("imageid", "222"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(80, 60)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let (site, client, options) =
            setup(&server, dir.path(), FullResStrategy::Retrieve(DownloadSize::Large));
        let pages = FakePages::new(vec![]);

        let first = download_images(&[hit(&server, 1, "111")], &pages, &client, &site, &options)
            .await
            .unwrap();
        assert_eq!(first.entries[0].thumb_size, Some(ImageSize { width: 4, height: 3 }));

        let second = download_images(&[hit(&server, 1, "222")], &pages, &client, &site, &options)
            .await
            .unwrap();
        assert_eq!(second.entries[0].thumb_size, Some(ImageSize { width: 40, height: 30 }));
        assert_eq!(second.entries[0].full_size, Some(ImageSize { width: 80, height: 60 }));
        assert_eq!(image::image_dimensions(dir.path().join("nih_thumb_1.jpg")).unwrap(), (40, 30));
        assert_eq!(image::image_dimensions(dir.path().join("nih_full_1.jpg")).unwrap(), (80, 60));
    }

    #[tokio::test]
    async fn test_stray_files_without_manifest_are_replaced() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thumbs/1.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(4, 3)))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        image::RgbImage::from_pixel(6, 5, image::Rgb([0, 0, 0]))
            .save_with_format(dir.path().join("nih_thumb_1.jpg"), ImageFormat::Jpeg)
            .unwrap();

        let (site, client, options) = setup(&server, dir.path(), FullResStrategy::DetailPage);
        let h = hit(&server, 1, "9");
        let pages = FakePages::new(vec![(h.detail_url.clone(), "<html></html>".to_string())]);

        let report = download_images(&[h], &pages, &client, &site, &options).await.unwrap();
        assert_eq!(report.entries[0].thumb_size, Some(ImageSize { width: 4, height: 3 }));
    }

    fn curated_image(server: &MockServer, id: &str) -> CuratedImage {
        CuratedImage {
            image_id: id.to_string(),
            rank: 1,
            title: format!("Image {id}"),
            description: String::new(),
            credit: "National Cancer Institute".into(),
            license: "Public domain".into(),
            license_class: medimg_model::LicenseClass::PublicDomain,
            source: format!("{}/details.cfm?imageid={id}", server.uri()),
            educational_score: 1,
            attribution_text: String::new(),
            caption_text: String::new(),
        }
    }

    #[tokio::test]
    async fn test_download_curated_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/retrieve.cfm"))
            .and(query_param("imageid", "77"))
            .and(query_param("dpi", "150"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(12, 8)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/retrieve.cfm"))
            .and(query_param("imageid", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(png(1, 1)))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/retrieve.cfm"))
            .and(query_param("imageid", "404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        image::RgbImage::from_pixel(3, 3, image::Rgb([0, 0, 0]))
            .save_with_format(dir.path().join(image_file_name("5")), ImageFormat::Jpeg)
            .unwrap();

        let (site, client, _) =
            setup(&server, dir.path(), FullResStrategy::Retrieve(DownloadSize::Medium));
        let images = vec![
            curated_image(&server, "77"),
            curated_image(&server, "5"),
            curated_image(&server, "404"),
            curated_image(&server, ""),
        ];

        let report = download_curated(
            &images,
            &client,
            &site,
            dir.path(),
            DownloadSize::Medium,
            PoliteDelay::NONE,
        )
        .await
        .unwrap();

        assert_eq!(report, CuratedDownloadReport { downloaded: 1, existing: 1, failed: 2 });
        assert_eq!(image::image_dimensions(dir.path().join("77.jpg")).unwrap(), (12, 8));
        assert!(!dir.path().join(image_file_name("404")).exists());
    }
}
