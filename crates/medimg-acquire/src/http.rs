use reqwest::header;
use std::future::Future;
use thiserror::Error;

use crate::config::SiteConfig;
use crate::retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("page at {url} looks blocked or empty ({bytes} bytes)")]
    Rejected { url: String, bytes: usize },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    fn is_retryable(&self, policy: &RetryPolicy) -> bool {
        match self {
            FetchError::Status { status, .. } => policy.is_retryable_status(*status),
            FetchError::Transport { .. } | FetchError::Rejected { .. } => true,
            FetchError::Client(_) => false,
        }
    }
}

/// Plain HTTP access to the site with retry on transient failures.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(site: &SiteConfig) -> Result<Self, FetchError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("en-US,en;q=0.5"),
        );

        let client = reqwest::Client::builder()
            .user_agent(site.user_agent.clone())
            .default_headers(headers)
            .timeout(site.request_timeout)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client, retry: site.retry.clone() })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// GET a page as text.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        self.get_text_validated(url, |_| true).await
    }

    /// GET a page as text, treating bodies that fail `accept` as a
    /// retryable rejection (throttling pages, empty shells).
    pub async fn get_text_validated<F>(&self, url: &str, accept: F) -> Result<String, FetchError>
    where
        F: Fn(&str) -> bool,
    {
        let accept = &accept;
        self.with_retry(url, || async move {
            let response = self.send(url, None).await?;
            let body = response.text().await.map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
            if accept(&body) {
                Ok(body)
            } else {
                Err(FetchError::Rejected { url: url.to_string(), bytes: body.len() })
            }
        })
        .await
    }

    /// GET a binary resource. `referer` is sent when given; the image
    /// endpoints refuse hot-linked requests without one.
    pub async fn get_bytes(&self, url: &str, referer: Option<&str>) -> Result<Vec<u8>, FetchError> {
        self.with_retry(url, || async move {
            let response = self.send(url, referer).await?;
            let bytes = response.bytes().await.map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
            Ok(bytes.to_vec())
        })
        .await
    }

    async fn send(&self, url: &str, referer: Option<&str>) -> Result<reqwest::Response, FetchError> {
        let mut request = self.client.get(url);
        if let Some(referer) = referer {
            request = request.header(header::REFERER, referer);
        }

        let response = request.send().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16(), url: url.to_string() });
        }
        Ok(response)
    }

    async fn with_retry<T, F, Fut>(&self, url: &str, op: F) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retry.max_retries && e.is_retryable(&self.retry) => {
                    let delay = self.retry.jittered_delay_for(attempt);
                    tracing::warn!(
                        url = %url,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
