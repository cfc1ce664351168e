//! PDF fetching and page-mapped loading (§4.6, §6).

pub mod blocklist;
pub mod loader;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfFetchError {
    #[error("domain is not allowed: {0}")]
    NotAllowed(String),
    #[error("fetch failed: {0}")]
    FetchFailed(String),
}

/// `fetch(url) -> bytes | NotAllowed | FetchFailed(reason)` (§6).
#[async_trait]
pub trait PdfFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PdfFetchError>;
}

pub struct HttpPdfFetcher {
    http: reqwest::Client,
}

impl HttpPdfFetcher {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .expect("reqwest client builds with static config"),
        }
    }
}

impl Default for HttpPdfFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PdfFetcher for HttpPdfFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, PdfFetchError> {
        if blocklist::is_blocked(url) {
            return Err(PdfFetchError::NotAllowed(url.to_string()));
        }
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| PdfFetchError::FetchFailed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PdfFetchError::FetchFailed(format!("status {}", response.status())));
        }
        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| PdfFetchError::FetchFailed(e.to_string()))
    }
}
