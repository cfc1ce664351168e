//! Evidence extractor (§4.7): produces a `StudyCard` and its `EvidenceSpan`s
//! from one paper's text.

use crate::ids::PaperId;
use crate::llm::LlmClient;
use crate::model::{EvidenceSpan, FieldTag, Locator, PageMapEntry, StudyCard};
use crate::pdf::loader::locate_page;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

pub struct EvidenceExtractor {
    llm: Arc<dyn LlmClient>,
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    problem: String,
    method: String,
    results: String,
    limitations: String,
    datasets: Vec<String>,
    metrics: Vec<String>,
    /// One snippet per populated field, keyed by field tag, as emitted by
    /// the LLM's structured output.
    supporting_snippets: Vec<RawSnippet>,
}

#[derive(Debug, Deserialize)]
struct RawSnippet {
    field: String,
    snippet: String,
}

pub enum ExtractionOutcome {
    Extracted { card: StudyCard, spans: Vec<EvidenceSpan> },
    Failed,
}

impl EvidenceExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// `source_text` is full text when available, else the abstract (§4.7).
    /// `page_map` is `Some` only when `source_text` is full text loaded via
    /// the PDF loader, and lets a resolved snippet's locator carry a page
    /// number; abstract-only extraction always resolves with `page: None`
    /// (§4.7 "For abstract-only papers, page is always absent").
    /// `source_url` anchors every produced span's `source_url`.
    pub async fn extract(
        &self,
        paper_id: PaperId,
        source_text: &str,
        page_map: Option<&[PageMapEntry]>,
        source_url: &str,
    ) -> ExtractionOutcome {
        let prompt = build_prompt(source_text);
        let raw = match self.llm.generate(&prompt, Some(SYSTEM_PROMPT), true).await {
            Ok(text) => text,
            Err(_) => return ExtractionOutcome::Failed,
        };

        match try_build(&raw, paper_id.clone(), source_text, page_map, source_url) {
            Some(outcome) => outcome,
            None => {
                // One retry with a constrained reminder prompt (§4.7, §7).
                let retry_prompt = format!("{prompt}\n\nYour previous response did not parse. Return ONLY the JSON object.");
                match self.llm.generate(&retry_prompt, Some(SYSTEM_PROMPT), true).await {
                    Ok(retry_raw) => try_build(&retry_raw, paper_id, source_text, page_map, source_url)
                        .unwrap_or(ExtractionOutcome::Failed),
                    Err(_) => ExtractionOutcome::Failed,
                }
            }
        }
    }
}

const SYSTEM_PROMPT: &str = "Extract a structured study card from the given paper text. \
Every non-empty field must be backed by a verbatim supporting snippet from the text.";

fn build_prompt(source_text: &str) -> String {
    serde_json::json!({ "paper_text": source_text }).to_string()
}

fn field_tag_for(field: &str) -> Option<FieldTag> {
    Some(match field {
        "problem" => FieldTag::Problem,
        "method" => FieldTag::Method,
        "dataset" => FieldTag::Dataset,
        "metric" => FieldTag::Metric,
        "results" => FieldTag::Result,
        "limitations" => FieldTag::Limitation,
        _ => return None,
    })
}

fn try_build(
    raw: &str,
    paper_id: PaperId,
    source_text: &str,
    page_map: Option<&[PageMapEntry]>,
    source_url: &str,
) -> Option<ExtractionOutcome> {
    let parsed: RawExtraction = serde_json::from_str(raw).ok()?;

    let mut card = StudyCard::new(paper_id.clone());
    card.problem = parsed.problem;
    card.method = parsed.method;
    card.results = parsed.results;
    card.limitations = parsed.limitations;
    card.datasets = parsed.datasets.into_iter().collect();
    card.metrics = parsed.metrics.into_iter().collect();

    // §4.7: "an extractor that cannot find verbatim support must leave the
    // field empty rather than fabricate" — snippets not found in the source
    // text are discarded, and the field they would have supported is
    // cleared so the populated-field/span invariant stays consistent.
    let mut spans_by_id: HashMap<String, EvidenceSpan> = HashMap::new();
    let mut supported_fields: std::collections::HashSet<&'static str> = std::collections::HashSet::new();

    for snippet in &parsed.supporting_snippets {
        let Some(field_tag) = field_tag_for(&snippet.field) else { continue };
        if !source_text.contains(&snippet.snippet) {
            continue;
        }
        let char_start = source_text.find(&snippet.snippet);
        let page = char_start.and_then(|start| page_map.and_then(|map| locate_page(map, start)));
        let locator = Locator {
            page,
            section: None,
            char_start,
            char_end: char_start.map(|s| s + snippet.snippet.len()),
        };
        let span = EvidenceSpan::new(paper_id.clone(), field_tag, &snippet.snippet, locator, 0.8, source_url.to_string());

        supported_fields.insert(match field_tag {
            FieldTag::Problem => "problem",
            FieldTag::Method => "method",
            FieldTag::Dataset => "datasets",
            FieldTag::Metric => "metrics",
            FieldTag::Result => "results",
            FieldTag::Limitation => "limitations",
            FieldTag::Other => "other",
        });

        // §4.7: duplicate span ids within the same extraction are merged,
        // keeping the higher confidence.
        spans_by_id
            .entry(span.span_id.as_str().to_string())
            .and_modify(|existing| {
                if span.confidence > existing.confidence {
                    *existing = span.clone();
                }
            })
            .or_insert(span);
    }

    if !supported_fields.contains("problem") {
        card.problem.clear();
    }
    if !supported_fields.contains("method") {
        card.method.clear();
    }
    if !supported_fields.contains("results") {
        card.results.clear();
    }
    if !supported_fields.contains("limitations") {
        card.limitations.clear();
    }
    if !supported_fields.contains("datasets") {
        card.datasets.clear();
    }
    if !supported_fields.contains("metrics") {
        card.metrics.clear();
    }

    let spans: Vec<EvidenceSpan> = spans_by_id.into_values().collect();
    card.evidence_span_ids = spans.iter().map(|s| s.span_id.clone()).collect();

    Some(ExtractionOutcome::Extracted { card, spans })
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
            unimplemented!("not exercised in extraction tests")
        }
    }

    const SOURCE: &str = "We study the problem of long-context retrieval. \
We use a 12-layer encoder. Our method improves accuracy by 4 points on SQuAD using F1.";

    #[tokio::test]
    async fn unsupported_snippet_clears_its_field_instead_of_fabricating() {
        let response = serde_json::json!({
            "problem": "long-context retrieval",
            "method": "a method never mentioned in the text",
            "results": "",
            "limitations": "",
            "datasets": [],
            "metrics": [],
            "supporting_snippets": [
                { "field": "problem", "snippet": "We study the problem of long-context retrieval." }
            ]
        })
        .to_string();

        let extractor = EvidenceExtractor::new(Arc::new(StubLlm(response)));
        let outcome = extractor.extract(PaperId::from_raw("p1"), SOURCE, None, "https://x").await;
        match outcome {
            ExtractionOutcome::Extracted { card, spans } => {
                assert_eq!(card.problem, "long-context retrieval");
                assert!(card.method.is_empty());
                assert_eq!(spans.len(), 1);
            }
            ExtractionOutcome::Failed => panic!("expected extraction to succeed"),
        }
    }

    #[tokio::test]
    async fn unparseable_response_marks_extraction_failed() {
        let extractor = EvidenceExtractor::new(Arc::new(StubLlm("not json".to_string())));
        let outcome = extractor.extract(PaperId::from_raw("p1"), SOURCE, None, "https://x").await;
        assert!(matches!(outcome, ExtractionOutcome::Failed));
    }

    #[tokio::test]
    async fn page_map_resolves_the_snippets_containing_page() {
        let response = serde_json::json!({
            "problem": "",
            "method": "a 12-layer encoder",
            "results": "",
            "limitations": "",
            "datasets": [],
            "metrics": [],
            "supporting_snippets": [
                { "field": "method", "snippet": "We use a 12-layer encoder." }
            ]
        })
        .to_string();

        let page_map = vec![
            PageMapEntry {
                page_number: 1,
                char_start: 0,
                char_end: 48,
                preview: String::new(),
            },
            PageMapEntry {
                page_number: 2,
                char_start: 48,
                char_end: SOURCE.len(),
                preview: String::new(),
            },
        ];

        let extractor = EvidenceExtractor::new(Arc::new(StubLlm(response)));
        let outcome = extractor.extract(PaperId::from_raw("p1"), SOURCE, Some(&page_map), "https://x").await;
        match outcome {
            ExtractionOutcome::Extracted { spans, .. } => {
                assert_eq!(spans[0].locator.page, Some(2));
            }
            ExtractionOutcome::Failed => panic!("expected extraction to succeed"),
        }
    }

    #[tokio::test]
    async fn duplicate_span_ids_are_merged_keeping_higher_confidence() {
        let response = serde_json::json!({
            "problem": "long-context retrieval",
            "method": "",
            "results": "",
            "limitations": "",
            "datasets": [],
            "metrics": [],
            "supporting_snippets": [
                { "field": "problem", "snippet": "We study the problem of long-context retrieval." },
                { "field": "problem", "snippet": "We study the problem of long-context retrieval." }
            ]
        })
        .to_string();
        let extractor = EvidenceExtractor::new(Arc::new(StubLlm(response)));
        let outcome = extractor.extract(PaperId::from_raw("p1"), SOURCE, None, "https://x").await;
        match outcome {
            ExtractionOutcome::Extracted { spans, .. } => assert_eq!(spans.len(), 1),
            ExtractionOutcome::Failed => panic!("expected extraction to succeed"),
        }
    }
}
