//! Plan executor (§2 component 9): runs plan steps, invokes the tools they
//! name, and feeds results forward into the collection phase.

use crate::llm::LlmClient;
use crate::model::{PlanStep, StepAction};
use crate::sources::{condense_query, heuristic_reformulations, needs_refinement, RawRecord, SearchSource, SourceError};
use std::collections::HashMap;
use std::sync::Arc;

/// §4.3: an LLM-proposed reformulation, then the heuristic cascade — at
/// most two refinement rounds beyond the original query.
const MAX_REFINEMENT_ROUNDS: usize = 2;

const REFORMULATION_SYSTEM_PROMPT: &str =
    "You refine academic search queries that returned mostly irrelevant results. \
Reply with only the improved query, nothing else.";

pub struct PlanExecutor {
    sources: HashMap<&'static str, Arc<dyn SearchSource>>,
    llm: Arc<dyn LlmClient>,
}

impl PlanExecutor {
    pub fn new(sources: Vec<Arc<dyn SearchSource>>, llm: Arc<dyn LlmClient>) -> Self {
        let mut map: HashMap<&'static str, Arc<dyn SearchSource>> = HashMap::new();
        for source in sources {
            map.insert(tool_name_for(source.name()), source);
        }
        Self { sources: map, llm }
    }

    /// Runs every `research`-action step whose `tool` is set, collecting
    /// the union of raw records. Steps with `tool = None` (demoted, or
    /// analysis/synthesis steps) contribute nothing and are left for later
    /// phases to interpret.
    pub async fn run_research_steps(&self, steps: &mut [PlanStep], max_results: usize) -> Vec<RawRecord> {
        let mut records = Vec::new();
        for step in steps.iter_mut() {
            if step.action != StepAction::Research {
                continue;
            }
            let Some(tool) = &step.tool else { continue };
            let Some(source) = self.sources.get(tool.as_str()) else {
                continue;
            };
            for query in &step.queries {
                records.extend(self.search_with_refinement(source.as_ref(), query, max_results).await);
            }
            step.completed = true;
        }
        records
    }

    /// §4.3's query-quality cascade: if ≥80% of a query's results share no
    /// keyword with it, try one LLM-proposed reformulation, then — if that
    /// still mismatches — the heuristic cascade, in order, until a
    /// candidate clears the check or the round budget is spent.
    async fn search_with_refinement(&self, source: &dyn SearchSource, query: &str, max_results: usize) -> Vec<RawRecord> {
        let mut results = self.search_once(source, query, max_results).await;
        if !needs_refinement(query, &titles_of(&results)) {
            return results;
        }

        let reformulated = self.propose_reformulation(query).await;
        let reformulated_results = self.search_once(source, &reformulated, max_results).await;
        if !needs_refinement(&reformulated, &titles_of(&reformulated_results)) {
            return reformulated_results;
        }
        results = reformulated_results;

        // Round 2 (MAX_REFINEMENT_ROUNDS): the heuristic cascade.
        for candidate in heuristic_reformulations(&reformulated) {
            let candidate_results = self.search_once(source, &candidate, max_results).await;
            if !needs_refinement(&candidate, &titles_of(&candidate_results)) {
                return candidate_results;
            }
            results = candidate_results;
        }
        results
    }

    async fn propose_reformulation(&self, query: &str) -> String {
        let prompt = format!(
            "The search query \"{query}\" returned mostly irrelevant results. Propose a better, more specific search query."
        );
        match self.llm.generate(&prompt, Some(REFORMULATION_SYSTEM_PROMPT), false).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => condense_query(query, 4),
        }
    }

    async fn search_once(&self, source: &dyn SearchSource, query: &str, max_results: usize) -> Vec<RawRecord> {
        match source.search(query, max_results).await {
            Ok(found) => found,
            // §7: permanent/transient item failures degrade the step's
            // yield but do not fail the phase.
            Err(SourceError::Transient(_)) | Err(SourceError::Permanent(_)) => Vec::new(),
        }
    }
}

fn titles_of(records: &[RawRecord]) -> Vec<String> {
    records.iter().map(|r| r.title.clone()).collect()
}

fn tool_name_for(source_name: &'static str) -> &'static str {
    match source_name {
        "arxiv" => "search_arxiv",
        "openalex" => "search_openalex",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::model::SourceTag;
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    struct StubSource(&'static str);

    #[async_trait]
    impl SearchSource for StubSource {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<RawRecord>, SourceError> {
            Ok(vec![RawRecord {
                title: format!("result for {query}"),
                authors: vec!["Author".into()],
                published: None,
                source_id: "id".into(),
                landing_url: "https://example.org".into(),
                pdf_url: None,
                doi: None,
                source: SourceTag::Arxiv,
                abstract_text: String::new(),
            }])
        }
    }

    /// Every result's title contains "result for <query>", so a query
    /// sharing a keyword with that title never needs refinement.
    struct StubLlm;

    #[async_trait]
    impl LlmClient for StubLlm {
        async fn generate(&self, _prompt: &str, _system: Option<&str>, _json_mode: bool) -> Result<String, LlmError> {
            Ok("refined query".to_string())
        }

        async fn generate_stream<'a>(
            &'a self,
            _prompt: &'a str,
            _system: Option<&'a str>,
        ) -> Result<BoxStream<'a, Result<String, LlmError>>, LlmError> {
            unimplemented!("not exercised in executor tests")
        }
    }

    fn executor(sources: Vec<Arc<dyn SearchSource>>) -> PlanExecutor {
        PlanExecutor::new(sources, Arc::new(StubLlm))
    }

    #[tokio::test]
    async fn runs_research_steps_and_marks_them_completed() {
        let executor = executor(vec![Arc::new(StubSource("arxiv"))]);
        let mut steps = vec![PlanStep {
            id: 1,
            action: StepAction::Research,
            title: "search".into(),
            tool: Some("search_arxiv".into()),
            tool_arguments: serde_json::Value::Null,
            queries: vec!["attention".into()],
            expected_output_tag: "papers".into(),
            completed: false,
        }];
        let records = executor.run_research_steps(&mut steps, 10).await;
        assert_eq!(records.len(), 1);
        assert!(steps[0].completed);
    }

    #[tokio::test]
    async fn matching_results_do_not_trigger_refinement() {
        let executor = executor(vec![Arc::new(StubSource("arxiv"))]);
        let source = StubSource("arxiv");
        let results = executor.search_with_refinement(&source, "attention", 10).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "result for attention");
    }
}
