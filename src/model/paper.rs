//! `Paper` (§3): one academic work, owned by the process-wide registry.

use crate::ids::PaperId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    Arxiv,
    Openalex,
    Huggingface,
    Url,
}

impl SourceTag {
    /// Tie-break priority used by the deduplicator (§4.3, S3): higher wins.
    pub fn priority(self) -> u8 {
        match self {
            SourceTag::Arxiv => 3,
            SourceTag::Openalex => 2,
            SourceTag::Huggingface => 1,
            SourceTag::Url => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PaperStatus {
    Raw,
    Screened,
    Fulltext,
    Extracted,
    Reported,
}

/// One entry of a paper's page map: `full_text[char_start..char_end]` is the
/// text of `page_number`, and concatenating entries in order reproduces
/// `full_text` exactly (§4.6).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMapEntry {
    pub page_number: u32,
    pub char_start: usize,
    pub char_end: usize,
    pub preview: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Paper {
    pub id: PaperId,
    pub title: String,
    pub authors: Vec<String>,
    pub published: Option<DateTime<Utc>>,
    pub source: SourceTag,
    pub arxiv_id: Option<String>,
    pub doi: Option<String>,
    pub abstract_text: String,
    pub pdf_url: Option<String>,
    pub landing_url: String,
    pub status: PaperStatus,
    pub relevance_score: Option<f32>,
    pub metadata_hash: String,
    pub pdf_hash: Option<String>,
    pub page_map: Option<Vec<PageMapEntry>>,
    /// Set by the `pdf_download` gate's skip decision (§4.13, S5(b)): the
    /// paper was included but its PDF was never fetched, so extraction
    /// must fall back to the abstract rather than wait on a download that
    /// will never happen.
    #[serde(default)]
    pub pdf_skipped: bool,
}

impl Paper {
    /// `doi`, normalized lowercase, as the dedup pipeline requires (§4.3).
    pub fn normalized_doi(&self) -> Option<String> {
        self.doi.as_ref().map(|d| d.trim().to_lowercase())
    }

    pub fn normalized_arxiv_id(&self) -> Option<String> {
        self.arxiv_id.as_ref().map(|a| a.trim().to_lowercase())
    }

    pub fn first_author(&self) -> Option<&str> {
        self.authors.first().map(|s| s.as_str())
    }

    /// Human-legible `surname_titleword` alias alongside the opaque
    /// `paper_id`, for repository/export convenience only — never a
    /// substitute for `paper_id` in cross-entity references.
    pub fn citation_key(&self) -> String {
        const STOP_WORDS: &[&str] = &[
            "a", "an", "the", "of", "in", "on", "for", "and", "or", "to", "with", "is", "are",
            "from", "using", "via",
        ];
        let surname = self
            .first_author()
            .and_then(|author| author.split_whitespace().last())
            .unwrap_or("unknown");
        let surname_key: String = surname.to_lowercase().chars().filter(|c| c.is_alphanumeric()).collect();

        let title_word = self
            .title
            .split_whitespace()
            .map(|w| w.to_lowercase().chars().filter(|c| c.is_alphanumeric()).collect::<String>())
            .find(|w| !w.is_empty() && !STOP_WORDS.contains(&w.as_str()))
            .unwrap_or_default();

        let year = self.published.map(|d| d.format("%Y").to_string()).unwrap_or_default();

        [surname_key, title_word, year]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Full text presence and `pdf_hash` must agree (§3 invariant).
    pub fn has_fulltext(&self) -> bool {
        let has_map = self.page_map.is_some();
        debug_assert_eq!(has_map, self.pdf_hash.is_some());
        has_map
    }

    /// Validates the page-map invariants of §3: non-overlapping, contiguous,
    /// `char_end >= char_start` for every entry.
    pub fn page_map_is_well_formed(&self) -> bool {
        let Some(map) = &self.page_map else {
            return true;
        };
        let mut expected_start = 0usize;
        for entry in map {
            if entry.char_end < entry.char_start {
                return false;
            }
            if entry.char_start != expected_start {
                return false;
            }
            expected_start = entry.char_end;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_paper() -> Paper {
        Paper {
            id: PaperId::from_raw("paper_1"),
            title: "A Study".into(),
            authors: vec!["Ada Lovelace".into()],
            published: None,
            source: SourceTag::Arxiv,
            arxiv_id: Some("2301.00001".into()),
            doi: None,
            abstract_text: "an abstract".into(),
            pdf_url: None,
            landing_url: "https://arxiv.org/abs/2301.00001".into(),
            status: PaperStatus::Raw,
            relevance_score: None,
            metadata_hash: "deadbeef".into(),
            pdf_hash: None,
            page_map: None,
            pdf_skipped: false,
        }
    }

    #[test]
    fn source_tag_priority_orders_arxiv_above_url() {
        assert!(SourceTag::Arxiv.priority() > SourceTag::Openalex.priority());
        assert!(SourceTag::Openalex.priority() > SourceTag::Huggingface.priority());
        assert!(SourceTag::Huggingface.priority() > SourceTag::Url.priority());
    }

    #[test]
    fn well_formed_page_map_is_contiguous_and_non_overlapping() {
        let mut paper = sample_paper();
        paper.page_map = Some(vec![
            PageMapEntry { page_number: 1, char_start: 0, char_end: 100, preview: "a".into() },
            PageMapEntry { page_number: 2, char_start: 100, char_end: 250, preview: "b".into() },
        ]);
        paper.pdf_hash = Some("hash".into());
        assert!(paper.page_map_is_well_formed());
        assert!(paper.has_fulltext());
    }

    #[test]
    fn citation_key_combines_surname_and_first_significant_title_word() {
        let paper = sample_paper();
        assert_eq!(paper.citation_key(), "lovelace_study");
    }

    #[test]
    fn citation_key_falls_back_to_unknown_with_no_authors() {
        let mut paper = sample_paper();
        paper.authors.clear();
        assert!(paper.citation_key().starts_with("unknown_"));
    }

    #[test]
    fn page_map_with_a_gap_is_rejected() {
        let mut paper = sample_paper();
        paper.page_map = Some(vec![
            PageMapEntry { page_number: 1, char_start: 0, char_end: 100, preview: "a".into() },
            PageMapEntry { page_number: 2, char_start: 150, char_end: 250, preview: "b".into() },
        ]);
        assert!(!paper.page_map_is_well_formed());
    }
}
