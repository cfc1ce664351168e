//! External-source clients (§4.3, §6): rate-limited adapters to academic
//! search APIs, fused by the deduplicator.

pub mod arxiv;
pub mod openalex;
pub mod rate_limit;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub published: Option<chrono::DateTime<chrono::Utc>>,
    pub source_id: String,
    pub landing_url: String,
    pub pdf_url: Option<String>,
    pub doi: Option<String>,
    pub source: crate::model::SourceTag,
    pub abstract_text: String,
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("transient source failure: {0}")]
    Transient(String),
    #[error("permanent source failure: {0}")]
    Permanent(String),
}

impl From<SourceError> for crate::error::PipelineError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Transient(msg) => crate::error::TransientError::Transport(msg).into(),
            SourceError::Permanent(msg) => crate::error::PermanentError::Malformed(msg).into(),
        }
    }
}

/// `search(query, max_results) -> lazy sequence of raw records` (§6),
/// finite and not restartable.
#[async_trait]
pub trait SearchSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawRecord>, SourceError>;
}

/// §4.3: condense query (B) to at most 4 significant tokens, since that
/// index's title-and-abstract search is conjunctive.
pub fn condense_query(query: &str, max_tokens: usize) -> String {
    static STOP_WORDS: &[&str] = &[
        "a", "an", "the", "of", "in", "on", "for", "and", "or", "to", "with", "is", "are",
    ];
    query
        .split_whitespace()
        .filter(|word| !STOP_WORDS.contains(&word.to_lowercase().as_str()))
        .take(max_tokens)
        .collect::<Vec<_>>()
        .join(" ")
}

/// §4.3 query-quality check: true when ≥ 80% of titles share no keyword
/// token with the query, signalling a refinement round is warranted.
pub fn needs_refinement(query: &str, titles: &[String]) -> bool {
    if titles.is_empty() {
        return false;
    }
    let query_tokens: std::collections::HashSet<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let mismatched = titles
        .iter()
        .filter(|title| {
            let title_tokens: std::collections::HashSet<String> =
                title.to_lowercase().split_whitespace().map(str::to_string).collect();
            query_tokens.is_disjoint(&title_tokens)
        })
        .count();
    (mismatched as f64 / titles.len() as f64) >= 0.8
}

/// Heuristic reformulation cascade used after an LLM-proposed reformulation
/// fails (§4.3): strip version suffixes, try each adjacent 2-word pair,
/// then append "survey". Capped by the caller at 2 rounds total.
pub fn heuristic_reformulations(query: &str) -> Vec<String> {
    static VERSION_SUFFIX: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"^v\d+(\.\d+)*$").unwrap());

    let version_stripped: String = query
        .split_whitespace()
        .filter(|w| !VERSION_SUFFIX.is_match(w))
        .collect::<Vec<_>>()
        .join(" ");

    let tokens: Vec<&str> = version_stripped.split_whitespace().collect();
    let mut candidates = vec![version_stripped.clone()];
    for pair in tokens.windows(2) {
        candidates.push(pair.join(" "));
    }
    candidates.push(format!("{query} survey"));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condense_query_drops_stop_words_and_caps_length() {
        let condensed = condense_query("a survey of the attention mechanism in transformers", 4);
        assert_eq!(condensed.split_whitespace().count(), 4);
        assert!(!condensed.contains("the"));
    }

    #[test]
    fn needs_refinement_detects_mostly_unrelated_titles() {
        let titles = vec![
            "Gardening tips".to_string(),
            "Cooking basics".to_string(),
            "Car maintenance".to_string(),
        ];
        assert!(needs_refinement("transformer architectures", &titles));
    }

    #[test]
    fn needs_refinement_is_false_when_titles_overlap() {
        let titles = vec!["Transformer architectures for vision".to_string()];
        assert!(!needs_refinement("transformer architectures", &titles));
    }

    #[test]
    fn heuristic_reformulations_strips_version_suffix() {
        let candidates = heuristic_reformulations("attention is all you need v2");
        assert!(candidates[0] == "attention is all you need");
    }
}
