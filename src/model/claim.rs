//! `Claim` (§3): an atomic citable statement.

use crate::ids::{ClaimId, SpanId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub claim_text: String,
    pub evidence_span_ids: Vec<SpanId>,
    pub theme_id: Option<String>,
    pub salience: f32,
    pub uncertainty_flag: bool,
}

impl Claim {
    pub fn new(claim_text: String, evidence_span_ids: Vec<SpanId>) -> Self {
        Self {
            id: ClaimId::new(),
            claim_text,
            evidence_span_ids,
            theme_id: None,
            salience: 0.0,
            uncertainty_flag: false,
        }
    }

    /// §4.9: uncertainty is set when fewer than 2 supporting spans exist,
    /// independent of whatever the LLM itself signalled.
    pub fn apply_low_support_uncertainty(&mut self) {
        if self.evidence_span_ids.len() < 2 {
            self.uncertainty_flag = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PaperId;

    #[test]
    fn low_support_forces_uncertainty() {
        let paper = PaperId::from_raw("p1");
        let (span, _) = SpanId::derive(&paper, "one span only");
        let mut claim = Claim::new("claim".into(), vec![span]);
        claim.apply_low_support_uncertainty();
        assert!(claim.uncertainty_flag);
    }
}
