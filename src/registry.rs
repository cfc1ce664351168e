//! Process-wide paper registry (§3 "papers are owned by a process-wide
//! registry and may be referenced by many sessions"; §9 "global state").
//!
//! A `dashmap`-backed shared map so writes are serialized per key without
//! a single global lock (§5 "shared resources").

use crate::ids::PaperId;
use crate::model::Paper;
use dashmap::DashMap;
use std::sync::Arc;

/// Injected into the orchestrator at construction (§9); never reached via
/// ambient/global access so sessions stay isolated in tests.
#[derive(Clone, Default)]
pub struct PaperRegistry {
    papers: Arc<DashMap<PaperId, Paper>>,
    by_metadata_hash: Arc<DashMap<String, PaperId>>,
}

impl PaperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert keyed on metadata hash (§8 round-trip law:
    /// "re-submitting the same paper metadata twice ... yields one record").
    /// Returns the id of the record now in the registry, which may be an
    /// existing entry rather than `paper.id` if one with the same
    /// `metadata_hash` was already present.
    pub fn put(&self, paper: Paper) -> PaperId {
        if let Some(existing) = self.by_metadata_hash.get(&paper.metadata_hash) {
            return existing.clone();
        }
        let id = paper.id.clone();
        self.by_metadata_hash
            .insert(paper.metadata_hash.clone(), id.clone());
        self.papers.insert(id.clone(), paper);
        id
    }

    pub fn get(&self, id: &PaperId) -> Option<Paper> {
        self.papers.get(id).map(|entry| entry.value().clone())
    }

    pub fn update<F: FnOnce(&mut Paper)>(&self, id: &PaperId, f: F) -> bool {
        match self.papers.get_mut(id) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    pub fn get_many(&self, ids: &[PaperId]) -> Vec<Paper> {
        ids.iter().filter_map(|id| self.get(id)).collect()
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PaperStatus, SourceTag};

    fn paper(id: &str, metadata_hash: &str) -> Paper {
        Paper {
            id: PaperId::from_raw(id),
            title: "t".into(),
            authors: vec!["A".into()],
            published: None,
            source: SourceTag::Arxiv,
            arxiv_id: None,
            doi: None,
            abstract_text: "abs".into(),
            pdf_url: None,
            landing_url: "https://example.org".into(),
            status: PaperStatus::Raw,
            relevance_score: None,
            metadata_hash: metadata_hash.into(),
            pdf_hash: None,
            page_map: None,
            pdf_skipped: false,
        }
    }

    #[test]
    fn resubmitting_the_same_metadata_hash_is_a_no_op() {
        let registry = PaperRegistry::new();
        let first = registry.put(paper("paper_1", "hash_a"));
        let second = registry.put(paper("paper_2", "hash_a"));
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_metadata_hashes_are_distinct_entries() {
        let registry = PaperRegistry::new();
        registry.put(paper("paper_1", "hash_a"));
        registry.put(paper("paper_2", "hash_b"));
        assert_eq!(registry.len(), 2);
    }
}
