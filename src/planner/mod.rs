//! Plan generator + query parser (§4.2): adaptive mode selection and plan
//! construction.

pub mod executor;
pub mod mode;
pub mod tool_registry;

use crate::llm::LlmClient;
use crate::model::{Plan, PlanStep, StepAction};
use std::sync::Arc;
use tool_registry::ToolRegistry;

pub struct PlanGenerator {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
}

const TRANSLATE_SYSTEM_PROMPT: &str =
    "Translate the given research topic to English. Reply with only the translated topic, nothing else.";

impl PlanGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Self {
        Self { llm, tools }
    }

    /// Builds the plan for `topic` under the already-decided `mode`.
    /// QUICK produces a research-only plan (no synthesize step, per S2);
    /// FULL adds analysis/synthesis steps after research.
    pub async fn generate(&self, topic: &str, mode: mode::Mode) -> Plan {
        let query = self.english_query(topic).await;

        let mut steps = vec![
            PlanStep {
                id: 1,
                action: StepAction::Research,
                title: format!("Search academic sources for \"{topic}\""),
                tool: Some("search_arxiv".to_string()),
                tool_arguments: serde_json::json!({ "query": query }),
                queries: vec![query.clone()],
                expected_output_tag: "papers".to_string(),
                completed: false,
            },
            PlanStep {
                id: 2,
                action: StepAction::Research,
                title: "Search the broader metadata index".to_string(),
                tool: Some("search_openalex".to_string()),
                tool_arguments: serde_json::json!({ "query": query }),
                queries: vec![query.clone()],
                expected_output_tag: "papers".to_string(),
                completed: false,
            },
        ];

        if mode == mode::Mode::Full {
            steps.push(PlanStep {
                id: 3,
                action: StepAction::Analyze,
                title: "Screen and extract evidence from collected papers".to_string(),
                tool: None,
                tool_arguments: serde_json::Value::Null,
                queries: vec![],
                expected_output_tag: "study_cards".to_string(),
                completed: false,
            });
            steps.push(PlanStep {
                id: 4,
                action: StepAction::Synthesize,
                title: "Write the grounded report".to_string(),
                tool: None,
                tool_arguments: serde_json::Value::Null,
                queries: vec![],
                expected_output_tag: "report".to_string(),
                completed: false,
            });
        }

        let mut plan = Plan { steps };
        plan.coerce_unknown_tools(self.tools.names());
        plan
    }

    /// §4.2: internal search queries are always generated in English,
    /// whatever the requested output language. A cheap ASCII check skips
    /// the LLM round-trip for topics that are already English; anything
    /// else is translated, falling back to the original topic on an LLM
    /// error so a translation failure never blocks planning.
    async fn english_query(&self, topic: &str) -> String {
        if topic.is_ascii() {
            return topic.to_string();
        }
        match self.llm.generate(topic, Some(TRANSLATE_SYSTEM_PROMPT), false).await {
            Ok(translated) if !translated.trim().is_empty() => translated.trim().to_string(),
            _ => topic.to_string(),
        }
    }
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
            unimplemented!("not exercised in planner tests")
        }
    }

    fn generator() -> PlanGenerator {
        PlanGenerator::new(Arc::new(StubLlm(String::new())), ToolRegistry::with_defaults())
    }

    #[tokio::test]
    async fn quick_mode_plan_has_no_synthesize_step() {
        let generator = generator();
        let plan = generator.generate("what is attention", mode::Mode::Quick).await;
        assert!(!plan.has_synthesize_step());
    }

    #[tokio::test]
    async fn full_mode_plan_has_a_synthesize_step() {
        let generator = generator();
        let plan = generator.generate("transformer architectures", mode::Mode::Full).await;
        assert!(plan.has_synthesize_step());
    }

    #[tokio::test]
    async fn generated_plans_respect_step_ordering() {
        let generator = generator();
        let plan = generator.generate("transformer architectures", mode::Mode::Full).await;
        assert!(plan.respects_step_ordering());
    }

    #[tokio::test]
    async fn ascii_topics_skip_the_translation_round_trip() {
        let generator = PlanGenerator::new(Arc::new(StubLlm("should not be used".to_string())), ToolRegistry::with_defaults());
        let plan = generator.generate("attention is all you need", mode::Mode::Quick).await;
        assert_eq!(plan.steps[0].queries[0], "attention is all you need");
    }

    #[tokio::test]
    async fn non_ascii_topics_are_translated_via_the_llm() {
        let generator = PlanGenerator::new(Arc::new(StubLlm("attention mechanisms".to_string())), ToolRegistry::with_defaults());
        let plan = generator.generate("m\u{e9}canismes d'attention", mode::Mode::Quick).await;
        assert_eq!(plan.steps[0].queries[0], "attention mechanisms");
    }
}
