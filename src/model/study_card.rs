//! `StudyCard` (§3): a structured per-paper extraction.

use crate::ids::{PaperId, SpanId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StudyCard {
    pub paper_id: PaperId,
    pub problem: String,
    pub method: String,
    pub results: String,
    pub limitations: String,
    pub datasets: BTreeSet<String>,
    pub metrics: BTreeSet<String>,
    pub evidence_span_ids: Vec<SpanId>,
}

impl StudyCard {
    pub fn new(paper_id: PaperId) -> Self {
        Self {
            paper_id,
            ..Default::default()
        }
    }

    /// True when every populated free-text field has name non-empty content;
    /// used before the §4.7 "each populated field needs ≥ 1 matching span"
    /// check is run against the span set.
    pub fn populated_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if !self.problem.trim().is_empty() {
            fields.push("problem");
        }
        if !self.method.trim().is_empty() {
            fields.push("method");
        }
        if !self.results.trim().is_empty() {
            fields.push("results");
        }
        if !self.limitations.trim().is_empty() {
            fields.push("limitations");
        }
        if !self.datasets.is_empty() {
            fields.push("datasets");
        }
        if !self.metrics.is_empty() {
            fields.push("metrics");
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn populated_fields_ignores_whitespace_only_text() {
        let mut card = StudyCard::new(PaperId::from_raw("p1"));
        card.problem = "   ".into();
        card.method = "uses attention".into();
        let fields = card.populated_fields();
        assert!(!fields.contains(&"problem"));
        assert!(fields.contains(&"method"));
    }
}
