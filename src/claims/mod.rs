//! Claim generator (§4.9): per-theme atomic citable statements.

use crate::ids::SpanId;
use crate::llm::LlmClient;
use crate::model::{Claim, StudyCard};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;

pub struct ClaimGenerator {
    llm: Arc<dyn LlmClient>,
}

#[derive(Debug, Deserialize)]
struct RawClaim {
    claim_text: String,
    evidence_span_ids: Vec<String>,
    salience: f32,
}

impl ClaimGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Produces 3-8 claims for `theme`, each validated against
    /// `known_span_ids` — claims referencing an unknown span are dropped
    /// (§4.9: "validation rejects claims that reference a span id not
    /// present in the session's span set").
    pub async fn generate_for_theme(
        &self,
        theme: &str,
        cards: &[StudyCard],
        known_span_ids: &HashSet<SpanId>,
    ) -> Vec<Claim> {
        let prompt = build_prompt(theme, cards);
        let response = match self.llm.generate(&prompt, Some(SYSTEM_PROMPT), true).await {
            Ok(text) => text,
            Err(_) => return Vec::new(),
        };

        let raw_claims: Vec<RawClaim> = match serde_json::from_str(&response) {
            Ok(claims) => claims,
            Err(_) => return Vec::new(),
        };

        raw_claims
            .into_iter()
            .filter_map(|raw| build_claim(raw, theme, known_span_ids))
            .take(8)
            .collect()
    }
}

const SYSTEM_PROMPT: &str = "Produce 3 to 8 atomic, declarative claims for the given theme, \
each citing at least one evidence span id from the supplied study cards.";

fn build_prompt(theme: &str, cards: &[StudyCard]) -> String {
    serde_json::json!({ "theme": theme, "cards": cards }).to_string()
}

fn build_claim(raw: RawClaim, theme: &str, known_span_ids: &HashSet<SpanId>) -> Option<Claim> {
    let span_ids: Vec<SpanId> = raw
        .evidence_span_ids
        .into_iter()
        .map(SpanId)
        .filter(|id| known_span_ids.contains(id))
        .collect();
    if span_ids.is_empty() {
        return None;
    }
    let mut claim = Claim::new(raw.claim_text, span_ids);
    claim.theme_id = Some(theme.to_string());
    claim.salience = raw.salience.clamp(0.0, 1.0);
    claim.apply_low_support_uncertainty();
    Some(claim)
}
