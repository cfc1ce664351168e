//! `EvidenceSpan` (§3): a verbatim quotation with a locator, the atomic unit
//! of citation.

use crate::ids::{PaperId, SpanId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldTag {
    Problem,
    Method,
    Dataset,
    Metric,
    Result,
    Limitation,
    Other,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Locator {
    pub page: Option<u32>,
    pub section: Option<String>,
    pub char_start: Option<usize>,
    pub char_end: Option<usize>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvidenceSpan {
    pub span_id: SpanId,
    pub paper_id: PaperId,
    pub field_tag: FieldTag,
    pub snippet: String,
    pub locator: Locator,
    pub confidence: f32,
    pub source_url: String,
}

impl EvidenceSpan {
    /// Builds a span whose id is derived from `paper_id` and `snippet`
    /// (§3), truncating the snippet before hashing exactly as `SpanId::derive` does.
    pub fn new(
        paper_id: PaperId,
        field_tag: FieldTag,
        snippet: &str,
        locator: Locator,
        confidence: f32,
        source_url: String,
    ) -> Self {
        let (span_id, truncated) = SpanId::derive(&paper_id, snippet);
        Self {
            span_id,
            paper_id,
            field_tag,
            snippet: truncated,
            locator,
            confidence: confidence.clamp(0.0, 1.0),
            source_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_derives_id_from_paper_and_snippet() {
        let paper_id = PaperId::from_raw("paper_x");
        let span = EvidenceSpan::new(
            paper_id.clone(),
            FieldTag::Method,
            "we use a 12-layer encoder",
            Locator::default(),
            0.9,
            "https://example.org/p.pdf".into(),
        );
        let (expected, _) = SpanId::derive(&paper_id, "we use a 12-layer encoder");
        assert_eq!(span.span_id, expected);
    }

    #[test]
    fn confidence_is_clamped_into_unit_interval() {
        let span = EvidenceSpan::new(
            PaperId::from_raw("p"),
            FieldTag::Result,
            "snippet",
            Locator::default(),
            1.7,
            "u".into(),
        );
        assert_eq!(span.confidence, 1.0);
    }
}
