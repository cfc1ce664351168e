//! Citation auditor (§4.12): LLM-judge verification with conservative
//! auto-repair.

use crate::llm::LlmClient;
use crate::model::{Claim, EvidenceSpan};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    MinorFail,
    MajorFail,
}

#[derive(Debug, Deserialize)]
struct RawJudgment {
    verdict: String,
    rewritten_claim_text: Option<String>,
}

pub struct AuditedClaim {
    pub claim: Claim,
    pub verdict: Verdict,
    /// Set when a major fail's remedy is to drop the claim rather than
    /// rewrite it conservatively.
    pub dropped: bool,
}

pub struct CitationAuditor {
    llm: Arc<dyn LlmClient>,
    pass_rate_floor: f64,
}

impl CitationAuditor {
    pub fn new(llm: Arc<dyn LlmClient>, pass_rate_floor: f64) -> Self {
        Self { llm, pass_rate_floor }
    }

    /// §4.12: sample claims with salience ≥ 0.3, or all claims if fewer
    /// than 20 total.
    pub fn sample<'a>(&self, claims: &'a [Claim]) -> Vec<&'a Claim> {
        if claims.len() < 20 {
            return claims.iter().collect();
        }
        claims.iter().filter(|c| c.salience >= 0.3).collect()
    }

    /// Judges one claim against its supporting spans, applying the
    /// conservative repair: minor fail rewrites with hedge language and
    /// sets `uncertainty_flag`; major fail rewrites conservatively or drops.
    pub async fn judge_and_repair(&self, claim: &Claim, spans: &[EvidenceSpan]) -> AuditedClaim {
        let prompt = build_prompt(claim, spans);
        let response = match self.llm.generate(&prompt, Some(SYSTEM_PROMPT), true).await {
            Ok(text) => text,
            Err(_) => {
                return AuditedClaim {
                    claim: claim.clone(),
                    verdict: Verdict::MajorFail,
                    dropped: true,
                }
            }
        };

        let Ok(judgment) = serde_json::from_str::<RawJudgment>(&response) else {
            return AuditedClaim {
                claim: claim.clone(),
                verdict: Verdict::MajorFail,
                dropped: true,
            };
        };

        match judgment.verdict.as_str() {
            "pass" => AuditedClaim {
                claim: claim.clone(),
                verdict: Verdict::Pass,
                dropped: false,
            },
            "minor_fail" => {
                let mut repaired = claim.clone();
                if let Some(text) = judgment.rewritten_claim_text {
                    repaired.claim_text = format!("Some work suggests {text}");
                } else {
                    repaired.claim_text = format!("Some work suggests {}", repaired.claim_text);
                }
                repaired.uncertainty_flag = true;
                AuditedClaim {
                    claim: repaired,
                    verdict: Verdict::MinorFail,
                    dropped: false,
                }
            }
            _ => match judgment.rewritten_claim_text {
                Some(text) => {
                    let mut repaired = claim.clone();
                    repaired.claim_text = text;
                    repaired.uncertainty_flag = true;
                    AuditedClaim {
                        claim: repaired,
                        verdict: Verdict::MajorFail,
                        dropped: false,
                    }
                }
                None => AuditedClaim {
                    claim: claim.clone(),
                    verdict: Verdict::MajorFail,
                    dropped: true,
                },
            },
        }
    }

    /// Post-repair pass rate: `passed_claims / audited_claims` (§8).
    pub fn pass_rate(audited: &[AuditedClaim]) -> f64 {
        if audited.is_empty() {
            return 0.0;
        }
        let passed = audited.iter().filter(|a| a.verdict == Verdict::Pass).count();
        passed as f64 / audited.len() as f64
    }

    pub fn floor_unmet(&self, audited: &[AuditedClaim]) -> bool {
        Self::pass_rate(audited) < self.pass_rate_floor
    }
}

const SYSTEM_PROMPT: &str = "Judge whether the cited evidence snippets semantically support the claim. \
Respond pass, minor_fail, or major_fail, with an optional rewritten_claim_text.";

fn build_prompt(claim: &Claim, spans: &[EvidenceSpan]) -> String {
    serde_json::json!({
        "claim_text": claim.claim_text,
        "evidence": spans.iter().map(|s| &s.snippet).collect::<Vec<_>>(),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    struct StubLlm(String);

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn generate(&self, _prompt: &str, _system: Option<&str>, _json_mode: bool) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }

        async fn generate_stream<'a>(
            &'a self,
            _prompt: &'a str,
            _system: Option<&'a str>,
        ) -> Result<BoxStream<'a, Result<String, LlmError>>, LlmError> {
            unimplemented!("not exercised in audit tests")
        }
    }

    #[tokio::test]
    async fn minor_fail_hedges_and_sets_uncertainty() {
        let response = serde_json::json!({ "verdict": "minor_fail", "rewritten_claim_text": null }).to_string();
        let auditor = CitationAuditor::new(Arc::new(StubLlm(response)), 0.8);
        let claim = Claim::new("transformers always outperform RNNs".into(), vec![]);
        let audited = auditor.judge_and_repair(&claim, &[]).await;
        assert_eq!(audited.verdict, Verdict::MinorFail);
        assert!(audited.claim.uncertainty_flag);
        assert!(audited.claim.claim_text.starts_with("Some work suggests"));
    }

    #[tokio::test]
    async fn major_fail_without_rewrite_drops_the_claim() {
        let response = serde_json::json!({ "verdict": "major_fail", "rewritten_claim_text": null }).to_string();
        let auditor = CitationAuditor::new(Arc::new(StubLlm(response)), 0.8);
        let claim = Claim::new("unsupported claim".into(), vec![]);
        let audited = auditor.judge_and_repair(&claim, &[]).await;
        assert!(audited.dropped);
    }

    #[test]
    fn pass_rate_computed_post_repair() {
        let claim = Claim::new("c".into(), vec![]);
        let audited = vec![
            AuditedClaim { claim: claim.clone(), verdict: Verdict::Pass, dropped: false },
            AuditedClaim { claim, verdict: Verdict::MajorFail, dropped: true },
        ];
        assert_eq!(CitationAuditor::pass_rate(&audited), 0.5);
    }

    #[test]
    fn floor_unmet_compares_against_configured_floor() {
        let claim = Claim::new("c".into(), vec![]);
        let auditor = CitationAuditor::new(Arc::new(StubLlm(String::new())), 0.8);
        let audited = vec![AuditedClaim { claim, verdict: Verdict::MajorFail, dropped: true }];
        assert!(auditor.floor_unmet(&audited));
    }
}
