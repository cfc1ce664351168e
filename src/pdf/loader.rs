//! PDF loader with page map (§4.6): downloads, extracts, and produces the
//! per-page offset index that lets later snippet locators resolve back to
//! a page number.

use super::{PdfFetchError, PdfFetcher};
use crate::cache::{self, ttl, Cache};
use crate::model::PageMapEntry;
use sha2::{Digest, Sha256};
use std::sync::Arc;

/// Byte-level PDF→text extraction is explicitly out of scope (§1): this is
/// the narrow external collaborator the loader delegates to, matching the
/// `{search}`/`{generate}`-style narrow interfaces elsewhere (§9).
pub trait PdfTextExtractor: Send + Sync {
    /// Returns the text of each page, in order.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, String>;
}

/// A boundary-only default: treats `bytes` as UTF-8 already-extracted text
/// and splits on form-feed (`\x0C`), the conventional page separator. Real
/// deployments swap in a byte-level PDF parser; this crate does not carry
/// one (§1 "PDF byte-level parsing" is out of scope).
pub struct PlainTextPdfExtractor;

impl PdfTextExtractor for PlainTextPdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, String> {
        let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
        if text.is_empty() {
            return Err("empty document".to_string());
        }
        Ok(text.split('\x0C').map(|page| page.to_string()).collect())
    }
}

#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LoadedPdf {
    pub full_text: String,
    pub page_map: Vec<PageMapEntry>,
    pub pdf_hash: String,
}

pub struct PdfLoader {
    fetcher: Arc<dyn PdfFetcher>,
    extractor: Arc<dyn PdfTextExtractor>,
    cache: Arc<dyn Cache>,
}

const PREVIEW_CHARS: usize = 80;

impl PdfLoader {
    pub fn new(fetcher: Arc<dyn PdfFetcher>, extractor: Arc<dyn PdfTextExtractor>, cache: Arc<dyn Cache>) -> Self {
        Self {
            fetcher,
            extractor,
            cache,
        }
    }

    /// Returns `None` when the domain is blocked or the PDF cannot be
    /// parsed (§4.6: "on parse failure, return empty result but do not fail
    /// the phase"). The caller marks the paper "full-text unavailable".
    pub async fn load(&self, url: &str) -> Option<LoadedPdf> {
        let cache_key = cache::pdf_pages_key(url);
        if let Some(cached) = self.cache.get(&cache_key).await {
            if let Ok(loaded) = serde_json::from_slice::<LoadedPdf>(&cached) {
                return Some(loaded);
            }
        }

        let bytes = match self.fetcher.fetch(url).await {
            Ok(bytes) => bytes,
            Err(PdfFetchError::NotAllowed(_)) | Err(PdfFetchError::FetchFailed(_)) => return None,
        };

        let pages = match self.extractor.extract_pages(&bytes) {
            Ok(pages) => pages,
            Err(_) => return None,
        };

        let loaded = build_loaded_pdf(&pages, &bytes);

        if let Ok(encoded) = serde_json::to_vec(&loaded) {
            self.cache.set(&cache_key, encoded, ttl::pdf_pages()).await;
        }

        Some(loaded)
    }

    /// Locates `snippet` within `full_text`, returning the page containing
    /// its first character (§4.6: "if the snippet crosses a page boundary,
    /// return the page containing char_start").
    pub fn locate(loaded: &LoadedPdf, snippet: &str) -> Option<(u32, usize, usize)> {
        let char_start = loaded.full_text.find(snippet)?;
        let char_end = char_start + snippet.len();
        let page = locate_page(&loaded.page_map, char_start)?;
        Some((page, char_start, char_end))
    }
}

/// Resolves a character offset into `full_text` to the page containing it,
/// via binary search over the page map's `(char_start, char_end)` ranges.
pub fn locate_page(page_map: &[PageMapEntry], char_start: usize) -> Option<u32> {
    page_map
        .binary_search_by(|entry| {
            if char_start < entry.char_start {
                std::cmp::Ordering::Greater
            } else if char_start >= entry.char_end {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .ok()
        .map(|idx| page_map[idx].page_number)
}

fn build_loaded_pdf(pages: &[String], bytes: &[u8]) -> LoadedPdf {
    let mut full_text = String::new();
    let mut page_map = Vec::with_capacity(pages.len());
    for (idx, page) in pages.iter().enumerate() {
        let char_start = full_text.len();
        full_text.push_str(page);
        let char_end = full_text.len();
        let preview: String = page.chars().take(PREVIEW_CHARS).collect();
        page_map.push(PageMapEntry {
            page_number: (idx + 1) as u32,
            char_start,
            char_end,
            preview,
        });
    }
    let pdf_hash = format!("{:x}", Sha256::digest(bytes));
    LoadedPdf {
        full_text,
        page_map,
        pdf_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCache;
    use async_trait::async_trait;

    struct StubFetcher;
    #[async_trait]
    impl PdfFetcher for StubFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, PdfFetchError> {
            Ok(b"pdf-bytes".to_vec())
        }
    }

    struct StubExtractor;
    impl PdfTextExtractor for StubExtractor {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<String>, String> {
            Ok(vec!["page one text. ".to_string(), "page two text.".to_string()])
        }
    }

    #[tokio::test]
    async fn page_map_concatenation_equals_full_text() {
        let loader = PdfLoader::new(Arc::new(StubFetcher), Arc::new(StubExtractor), Arc::new(MemoryCache::new()));
        let loaded = loader.load("https://arxiv.org/pdf/x").await.unwrap();
        let reconstructed: String = loaded
            .page_map
            .iter()
            .map(|entry| &loaded.full_text[entry.char_start..entry.char_end])
            .collect();
        assert_eq!(reconstructed, loaded.full_text);
    }

    #[tokio::test]
    async fn locate_finds_the_containing_page() {
        let loader = PdfLoader::new(Arc::new(StubFetcher), Arc::new(StubExtractor), Arc::new(MemoryCache::new()));
        let loaded = loader.load("https://arxiv.org/pdf/x").await.unwrap();
        let (page, start, _end) = PdfLoader::locate(&loaded, "page two").unwrap();
        assert_eq!(page, 2);
        assert_eq!(start, "page one text. ".len());
    }
}
