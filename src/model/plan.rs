//! `Plan` (§3, §4.2): the ordered list of steps the executor runs.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepAction {
    Research,
    Analyze,
    Synthesize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: u32,
    pub action: StepAction,
    pub title: String,
    /// Must match a registered tool name or be `None`; the planner coerces
    /// unknown names to `None` and demotes the step to analysis-only (§4.2).
    pub tool: Option<String>,
    pub tool_arguments: serde_json::Value,
    pub queries: Vec<String>,
    pub expected_output_tag: String,
    pub completed: bool,
}

impl PlanStep {
    pub fn is_search_step(&self) -> bool {
        self.action == StepAction::Research && self.tool.is_some() && !self.queries.is_empty()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// §4.2 contract: search steps may only live in `research`-action steps,
    /// and must precede every `analyze`/`synthesize` step.
    pub fn respects_step_ordering(&self) -> bool {
        let mut seen_non_research = false;
        for step in &self.steps {
            if step.action != StepAction::Research {
                seen_non_research = true;
                continue;
            }
            if step.is_search_step() && seen_non_research {
                return false;
            }
        }
        true
    }

    /// Coerces any step whose `tool` doesn't match a registered name to
    /// `None`, demoting it to analysis-only (§4.2).
    pub fn coerce_unknown_tools(&mut self, known_tools: &[&str]) {
        for step in &mut self.steps {
            if let Some(tool) = &step.tool {
                if !known_tools.contains(&tool.as_str()) {
                    step.tool = None;
                }
            }
        }
    }

    pub fn has_synthesize_step(&self) -> bool {
        self.steps.iter().any(|s| s.action == StepAction::Synthesize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: u32, action: StepAction, tool: Option<&str>, queries: Vec<&str>) -> PlanStep {
        PlanStep {
            id,
            action,
            title: format!("step {id}"),
            tool: tool.map(str::to_string),
            tool_arguments: serde_json::Value::Null,
            queries: queries.into_iter().map(str::to_string).collect(),
            expected_output_tag: "papers".into(),
            completed: false,
        }
    }

    #[test]
    fn ordering_rejects_search_step_after_analysis() {
        let plan = Plan {
            steps: vec![
                step(1, StepAction::Analyze, None, vec![]),
                step(2, StepAction::Research, Some("search_arxiv"), vec!["q"]),
            ],
        };
        assert!(!plan.respects_step_ordering());
    }

    #[test]
    fn ordering_accepts_search_before_analysis() {
        let plan = Plan {
            steps: vec![
                step(1, StepAction::Research, Some("search_arxiv"), vec!["q"]),
                step(2, StepAction::Analyze, None, vec![]),
            ],
        };
        assert!(plan.respects_step_ordering());
    }

    #[test]
    fn unknown_tool_names_are_coerced_to_none() {
        let mut plan = Plan {
            steps: vec![step(1, StepAction::Research, Some("bogus_tool"), vec!["q"])],
        };
        plan.coerce_unknown_tools(&["search_arxiv", "search_openalex"]);
        assert!(plan.steps[0].tool.is_none());
    }
}
