//! Screener (§4.5): produces a `ScreeningRecord` per paper, in batches.

use crate::ids::PaperId;
use crate::llm::LlmClient;
use crate::model::{Paper, ReasonCode, ScreeningRecord, Tier};
use serde::Deserialize;
use std::sync::Arc;

pub struct Screener {
    llm: Arc<dyn LlmClient>,
    batch_size: usize,
}

#[derive(Debug, Deserialize)]
struct RawScreeningEntry {
    paper_id: String,
    tier: String,
    reason_code: String,
    rationale: String,
    scored_relevance: f32,
}

impl Screener {
    pub fn new(llm: Arc<dyn LlmClient>, batch_size: usize) -> Self {
        Self { llm, batch_size }
    }

    /// Screens every paper in `papers`, batching at the configured size.
    pub async fn screen(&self, topic: &str, papers: &[Paper]) -> Vec<ScreeningRecord> {
        let mut records = Vec::with_capacity(papers.len());
        for batch in papers.chunks(self.batch_size) {
            records.extend(self.screen_batch(topic, batch).await);
        }
        records
    }

    async fn screen_batch(&self, topic: &str, batch: &[Paper]) -> Vec<ScreeningRecord> {
        let prompt = build_prompt(topic, batch);
        match self.llm.generate(&prompt, Some(SYSTEM_PROMPT), true).await {
            Ok(response) => match parse_response(&response, batch) {
                Ok(records) => records,
                Err(_) => fail_open(batch),
            },
            Err(_) => fail_open(batch),
        }
    }
}

const SYSTEM_PROMPT: &str = "You screen academic papers for relevance to a research topic. \
Respond with a JSON array; each entry must echo paper_id exactly as given.";

fn build_prompt(topic: &str, batch: &[Paper]) -> String {
    let entries: Vec<_> = batch
        .iter()
        .map(|p| {
            serde_json::json!({
                "paper_id": p.id.as_str(),
                "title": p.title,
                "abstract": p.abstract_text,
            })
        })
        .collect();
    serde_json::json!({ "topic": topic, "papers": entries }).to_string()
}

/// §4.5: "the paper_id echo prevents cross-batch misalignment" — entries
/// are matched back to input papers by id, not by position.
fn parse_response(response: &str, batch: &[Paper]) -> Result<Vec<ScreeningRecord>, ()> {
    let entries: Vec<RawScreeningEntry> = serde_json::from_str(response).map_err(|_| ())?;
    let known_ids: std::collections::HashSet<&str> = batch.iter().map(|p| p.id.as_str()).collect();

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        if !known_ids.contains(entry.paper_id.as_str()) {
            continue;
        }
        let tier = match entry.tier.as_str() {
            "core" => Tier::Core,
            "background" => Tier::Background,
            "exclude" => Tier::Exclude,
            _ => return Err(()),
        };
        let reason_code = parse_reason_code(&entry.reason_code)?;
        records.push(ScreeningRecord {
            paper_id: PaperId::from_raw(entry.paper_id),
            tier,
            reason_code,
            rationale: entry.rationale,
            relevance_score: entry.scored_relevance,
        });
    }
    Ok(records)
}

fn parse_reason_code(raw: &str) -> Result<ReasonCode, ()> {
    Ok(match raw {
        "relevant" => ReasonCode::Relevant,
        "out_of_scope" => ReasonCode::OutOfScope,
        "survey_only" => ReasonCode::SurveyOnly,
        "missing_eval" => ReasonCode::MissingEval,
        "duplicate_work" => ReasonCode::DuplicateWork,
        "insufficient_detail" => ReasonCode::InsufficientDetail,
        _ => return Err(()),
    })
}

/// §4.5: on parse failure, mark every paper in the batch tier=core,
/// reason="parse_failure" — permissive fail-open so work isn't silently
/// dropped.
fn fail_open(batch: &[Paper]) -> Vec<ScreeningRecord> {
    batch
        .iter()
        .map(|p| ScreeningRecord::parse_failure(p.id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::model::{PaperStatus, SourceTag};
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    fn paper(id: &str) -> Paper {
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
            metadata_hash: "h".into(),
            pdf_hash: None,
            page_map: None,
            pdf_skipped: false,
        }
    }

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
            unimplemented!("not exercised in screening tests")
        }
    }

    #[tokio::test]
    async fn well_formed_response_produces_matching_records() {
        let response = serde_json::json!([
            { "paper_id": "p1", "tier": "core", "reason_code": "relevant", "rationale": "on topic", "scored_relevance": 9.0 }
        ])
        .to_string();
        let screener = Screener::new(Arc::new(StubLlm(response)), 15);
        let records = screener.screen("topic", &[paper("p1")]).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tier, Tier::Core);
    }

    #[tokio::test]
    async fn malformed_response_fails_open() {
        let screener = Screener::new(Arc::new(StubLlm("not json".to_string())), 15);
        let records = screener.screen("topic", &[paper("p1"), paper("p2")]).await;
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.reason_code == ReasonCode::ParseFailure));
    }

    #[tokio::test]
    async fn batches_respect_the_configured_size() {
        let response = serde_json::json!([
            { "paper_id": "p1", "tier": "core", "reason_code": "relevant", "rationale": "r", "scored_relevance": 5.0 }
        ])
        .to_string();
        let screener = Screener::new(Arc::new(StubLlm(response)), 1);
        let records = screener.screen("topic", &[paper("p1"), paper("p2")]).await;
        // Each batch of 1 only recognizes its own paper id; p2's batch will
        // have no matching entry in the (identical, stubbed) response, so
        // it yields zero records for that batch rather than misattributing.
        assert_eq!(records.len(), 1);
    }
}
