use rand::Rng;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Default image search site (NCI Visuals Online).
pub const DEFAULT_BASE_URL: &str = "https://visualsonline.cancer.gov/";

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Everything the acquire stages need to know about the target site.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Site root, always ending in `/`.
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout: Duration,
    /// Time to let a rendered search page settle before reading the DOM.
    pub search_wait: Duration,
    /// Time to let a rendered detail page settle before reading the DOM.
    pub detail_wait: Duration,
    pub retry: RetryPolicy,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            search_wait: Duration::from_secs(5),
            detail_wait: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

impl SiteConfig {
    /// Default settings pointed at a different site root (a mirror or a test server).
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: normalize_base(base_url),
            ..Self::default()
        }
    }

    /// Resolve a link found on one of the site's pages to an absolute URL.
    pub fn absolute_url(&self, href: &str) -> String {
        absolute_url(&self.base_url, href)
    }
}

fn normalize_base(base: &str) -> String {
    let trimmed = base.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}

/// Resolve `href` against `base`. Links that already start with `http` are
/// returned as-is; everything else is treated as relative to the site root.
pub fn absolute_url(base: &str, href: &str) -> String {
    let href = href.trim();
    if href.starts_with("http") {
        href.to_string()
    } else {
        format!("{}{}", normalize_base(base), href.trim_start_matches('/'))
    }
}

/// Random pause between requests to the same site.
#[derive(Debug, Clone, Copy)]
pub struct PoliteDelay {
    pub min: Duration,
    /// Extra random time added on top of `min`, uniformly in `0..=spread`.
    pub spread: Duration,
}

impl PoliteDelay {
    pub const NONE: PoliteDelay = PoliteDelay { min: Duration::ZERO, spread: Duration::ZERO };

    pub fn new(min: Duration, spread: Duration) -> Self {
        Self { min, spread }
    }

    pub fn sample(&self) -> Duration {
        let spread_ms = self.spread.as_millis() as u64;
        let extra = if spread_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=spread_ms)
        };
        self.min + Duration::from_millis(extra)
    }

    pub async fn pause(&self) {
        let d = self.sample();
        if !d.is_zero() {
            tracing::debug!(ms = d.as_millis() as u64, "Waiting before next request");
            tokio::time::sleep(d).await;
        }
    }
}
