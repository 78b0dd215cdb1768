// Page retrieval.
//
// The search site renders its result grid client-side, so search pages go
// through a real headless browser. Detail pages and images are plain
// server-rendered resources and can use the HTTP client instead.

use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions};
use std::ffi::OsStr;
use std::time::Duration;

use crate::http::HttpClient;

/// Something that can turn a URL into the HTML of the fully rendered page.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Load `url` and return its DOM as HTML. `settle` is how long to let
    /// client-side scripts run after navigation; sources that do not
    /// execute scripts ignore it.
    async fn fetch_html(&self, url: &str, settle: Duration) -> Result<String>;
}

/// A headless Chrome instance shared by every page fetched in one run.
///
/// Each fetch opens its own tab and closes it afterwards. The browser
/// process exits when the session is dropped.
pub struct BrowserSession {
    browser: Browser,
}

impl BrowserSession {
    pub fn launch() -> Result<Self> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(false)
            .window_size(Some((1366, 900)))
            .idle_browser_timeout(Duration::from_secs(120))
            .args(vec![
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-dev-shm-usage"),
            ])
            .build()
            .map_err(|e| anyhow::anyhow!("Invalid browser launch options: {e}"))?;

        let browser = Browser::new(options).context("Failed to launch headless Chrome")?;
        tracing::info!("Launched headless browser");
        Ok(Self { browser })
    }
}

#[async_trait]
impl PageSource for BrowserSession {
    async fn fetch_html(&self, url: &str, settle: Duration) -> Result<String> {
        let browser = self.browser.clone();
        let url = url.to_string();
        tokio::task::spawn_blocking(move || render(&browser, &url, settle))
            .await
            .context("Browser task panicked")?
    }
}

fn render(browser: &Browser, url: &str, settle: Duration) -> Result<String> {
    let tab = browser.new_tab().context("Failed to open browser tab")?;
    close_after(
        || {
            tab.navigate_to(url)
                .with_context(|| format!("Failed to navigate to {url}"))?
                .wait_until_navigated()
                .with_context(|| format!("Navigation to {url} did not complete"))?;

            std::thread::sleep(settle);

            let html = tab.get_content().context("Failed to read page content")?;
            tracing::debug!(url = %url, bytes = html.len(), "Rendered page");
            Ok(html)
        },
        || tab.close(true),
    )
}

/// Run `body`, then `close`, on success and failure alike.
///
/// A failing `close` is logged and never masks the result of `body`.
fn close_after<T, C>(
    body: impl FnOnce() -> Result<T>,
    close: impl FnOnce() -> Result<C>,
) -> Result<T> {
    let result = body();
    if let Err(e) = close() {
        tracing::debug!(error = %e, "Failed to close tab");
    }
    result
}

/// Fetches pages over plain HTTP without running scripts.
pub struct HttpSource {
    client: HttpClient,
}

impl HttpSource {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch_html(&self, url: &str, _settle: Duration) -> Result<String> {
        Ok(self.client.get_text(url).await?)
    }
}

/// Serves canned pages keyed by URL, for exercising the stages offline.
#[cfg(test)]
pub(crate) struct FakePages {
    pages: std::collections::HashMap<String, String>,
    requested: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl FakePages {
    pub(crate) fn new(pages: Vec<(String, String)>) -> Self {
        Self {
            pages: pages.into_iter().collect(),
            requested: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl PageSource for FakePages {
    async fn fetch_html(&self, url: &str, _settle: Duration) -> Result<String> {
        self.requested.lock().unwrap().push(url.to_string());
        self.pages
            .get(url)
            .cloned()
            .with_context(|| format!("no canned page for {url}"))
    }
}
