//! `ScreeningRecord` (§3, §4.5): one include/exclude decision per paper.

use crate::ids::PaperId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Core,
    Background,
    Exclude,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    Relevant,
    OutOfScope,
    SurveyOnly,
    MissingEval,
    DuplicateWork,
    InsufficientDetail,
    /// Not in the closed vocabulary proper; produced only by the §4.5
    /// fail-open degrade path when a screening batch fails to parse.
    ParseFailure,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScreeningRecord {
    pub paper_id: PaperId,
    pub tier: Tier,
    pub reason_code: ReasonCode,
    pub rationale: String,
    pub relevance_score: f32,
}

impl ScreeningRecord {
    /// Backward-compatible boolean: `include = (tier != exclude)` (§3).
    pub fn include(&self) -> bool {
        self.tier != Tier::Exclude
    }

    /// The permissive fail-open record emitted when a batch's LLM response
    /// does not parse (§4.5): everyone in the batch survives as `core`.
    pub fn parse_failure(paper_id: PaperId) -> Self {
        Self {
            paper_id,
            tier: Tier::Core,
            reason_code: ReasonCode::ParseFailure,
            rationale: "batch response failed to parse; admitted fail-open".to_string(),
            relevance_score: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn include_is_false_only_for_exclude_tier() {
        let mut record = ScreeningRecord {
            paper_id: PaperId::from_raw("p1"),
            tier: Tier::Core,
            reason_code: ReasonCode::Relevant,
            rationale: "on topic".into(),
            relevance_score: 8.0,
        };
        assert!(record.include());
        record.tier = Tier::Background;
        assert!(record.include());
        record.tier = Tier::Exclude;
        assert!(!record.include());
    }

    #[test]
    fn parse_failure_admits_fail_open() {
        let record = ScreeningRecord::parse_failure(PaperId::from_raw("p2"));
        assert!(record.include());
        assert_eq!(record.reason_code, ReasonCode::ParseFailure);
    }
}
