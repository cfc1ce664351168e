//! 4-level deduplicator (§4.3), applied to the concatenated result set from
//! every search source before persistence.

use crate::model::{Paper, SourceTag};
use md5::{Digest, Md5};

/// MD5(lowercase(title) ∥ "|" ∥ lowercase(first-author)) (§4.3 level 3).
pub fn fingerprint(title: &str, first_author: &str) -> String {
    let input = format!("{}|{}", title.to_lowercase(), first_author.to_lowercase());
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// Longest-common-subsequence ratio: `2 * lcs_len / (len_a + len_b)`, the
/// level-4 fuzzy-title similarity measure (§4.3 step 4).
pub fn lcs_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ai in &a {
        for (j, bj) in b.iter().enumerate() {
            curr[j + 1] = if ai == bj {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    let lcs_len = prev[b.len()];
    (2 * lcs_len) as f64 / (a.len() + b.len()) as f64
}

const FUZZY_THRESHOLD: f64 = 0.85;

pub struct Deduplicator;

impl Deduplicator {
    /// Applies the full §4.3 pipeline to `candidates`, returning the unique
    /// survivors. Tie-break on every level prefers more populated metadata
    /// fields, then source priority (arxiv > openalex > huggingface > url).
    pub fn dedup(candidates: Vec<Paper>) -> Vec<Paper> {
        let mut survivors: Vec<Paper> = Vec::new();

        'candidate: for candidate in candidates {
            for existing in survivors.iter_mut() {
                if Self::is_duplicate(existing, &candidate) {
                    if Self::prefer(&candidate, existing) {
                        *existing = candidate;
                    }
                    continue 'candidate;
                }
            }
            survivors.push(candidate);
        }
        survivors
    }

    pub fn is_duplicate(a: &Paper, b: &Paper) -> bool {
        if let (Some(x), Some(y)) = (a.normalized_arxiv_id(), b.normalized_arxiv_id()) {
            if x == y {
                return true;
            }
        }
        if let (Some(x), Some(y)) = (a.normalized_doi(), b.normalized_doi()) {
            if x == y {
                return true;
            }
        }
        if let (Some(author_a), Some(author_b)) = (a.first_author(), b.first_author()) {
            if fingerprint(&a.title, author_a) == fingerprint(&b.title, author_b) {
                return true;
            }
        }
        lcs_ratio(&a.title, &b.title) >= FUZZY_THRESHOLD
    }

    /// §4.3 tie-break: prefer more populated metadata fields; if still
    /// tied, prefer higher source priority.
    fn prefer(candidate: &Paper, existing: &Paper) -> bool {
        let candidate_fields = populated_field_count(candidate);
        let existing_fields = populated_field_count(existing);
        match candidate_fields.cmp(&existing_fields) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => candidate.source.priority() > existing.source.priority(),
        }
    }
}

fn populated_field_count(paper: &Paper) -> usize {
    let mut count = 0;
    if !paper.abstract_text.trim().is_empty() {
        count += 1;
    }
    if paper.doi.is_some() {
        count += 1;
    }
    if paper.arxiv_id.is_some() {
        count += 1;
    }
    if paper.pdf_url.is_some() {
        count += 1;
    }
    if paper.published.is_some() {
        count += 1;
    }
    count += paper.authors.len().min(1);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PaperId;
    use crate::model::PaperStatus;

    fn paper(title: &str, author: &str, source: SourceTag, arxiv_id: Option<&str>) -> Paper {
        Paper {
            id: PaperId::new(),
            title: title.to_string(),
            authors: vec![author.to_string()],
            published: None,
            source,
            arxiv_id: arxiv_id.map(str::to_string),
            doi: None,
            abstract_text: String::new(),
            pdf_url: None,
            landing_url: "https://example.org".into(),
            status: PaperStatus::Raw,
            relevance_score: None,
            metadata_hash: "h".into(),
            pdf_hash: None,
            page_map: None,
            pdf_skipped: false,
        }
    }

    #[test]
    fn lcs_ratio_is_one_for_identical_strings() {
        assert_eq!(lcs_ratio("attention is all you need", "attention is all you need"), 1.0);
    }

    #[test]
    fn s3_case_only_title_difference_dedups_to_one_with_higher_priority_source() {
        let a = paper("Attention Is All You Need", "Vaswani", SourceTag::Openalex, None);
        let b = paper("attention is all you need", "vaswani", SourceTag::Arxiv, Some("1706.03762"));
        let unique = Deduplicator::dedup(vec![a, b]);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].source, SourceTag::Arxiv);
    }

    #[test]
    fn distinct_papers_both_survive() {
        let a = paper("Attention Is All You Need", "Vaswani", SourceTag::Arxiv, Some("1706.03762"));
        let b = paper("BERT: Pre-training", "Devlin", SourceTag::Arxiv, Some("1810.04805"));
        let unique = Deduplicator::dedup(vec![a, b]);
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn exact_arxiv_id_match_short_circuits_fuzzy_check() {
        let a = paper("A Study of Widgets", "Smith", SourceTag::Arxiv, Some("2301.00001"));
        let b = paper("A totally different title", "Jones", SourceTag::Openalex, Some("2301.00001"));
        let unique = Deduplicator::dedup(vec![a, b]);
        assert_eq!(unique.len(), 1);
    }
}
