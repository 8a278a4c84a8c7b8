//! Planner Agent: a ReAct loop that iteratively searches the web and builds an annotated
//! outline, choosing between `{search, write_outline, terminate}` at each step.

use crate::error::Result;
use crate::llm::{LlmClient, TEMPERATURE_DETERMINISTIC};
use crate::models::{Outline, PlannerAction};
use crate::tags::{find_tag_block, parse_tool_call_payload};

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub max_steps: usize,
    pub max_queries_per_step: usize,
    pub max_urls_per_query: usize,
}

const SYSTEM_PROMPT: &str = "\
You are the Planner in a deep-research pipeline. Your job is to gather enough evidence about \
the user's query, then produce a Markdown outline for a research report, citing evidence ids \
inline with <citation>ev_0001, ev_0002</citation> tags.

At each step, respond with exactly one of:
- <tool_call>{\"name\": \"search\", \"arguments\": {\"query\": [\"...\", ...], \"goal\": \"...\"}}</tool_call> \
to search the web for one or more queries.
- <write_outline>\n# Report Title\n## Section One\nbody with <citation>ev_0001</citation>\n...\
</write_outline> to (re)write the full outline.
- <terminate>reason</terminate> once the outline is complete and ready for writing.

Only ever emit one action per step.";

pub struct PlannerAgent {
    llm: LlmClient,
    config: PlannerConfig,
}

impl PlannerAgent {
    pub fn new(llm: LlmClient, config: PlannerConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Run one planner step: build the prompt (query, step/budget, outline, evidence tail,
    /// decision guidance), call the LLM at deterministic temperature, and parse the result.
    pub async fn step(
        &self,
        query: &str,
        step_num: usize,
        outline: &Outline,
        evidence_summaries: &[String],
    ) -> Result<PlannerAction> {
        let user = self.build_user_message(query, step_num, outline, evidence_summaries);
        let response = self.llm.complete(SYSTEM_PROMPT, &user, TEMPERATURE_DETERMINISTIC).await?;
        Ok(parse_planner_action(&response))
    }

    fn build_user_message(
        &self,
        query: &str,
        step_num: usize,
        outline: &Outline,
        evidence_summaries: &[String],
    ) -> String {
        let outline_section = if outline.is_empty() {
            "<none>".to_string()
        } else {
            outline.text.clone()
        };

        let tail: Vec<&String> = evidence_summaries.iter().rev().take(20).collect();
        let evidence_section = if tail.is_empty() {
            "<none>".to_string()
        } else {
            tail.iter().rev().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n")
        };

        let guidance = decision_guidance(
            step_num,
            self.config.max_steps,
            !outline.is_empty(),
            evidence_summaries.len(),
            outline_looks_complete(outline),
        );

        format!(
            "Query: {query}\n\
             Step: {step_num} / {max_steps}\n\n\
             Current outline:\n{outline_section}\n\n\
             Recent evidence summaries:\n{evidence_section}\n\n\
             Guidance: {guidance}",
            max_steps = self.config.max_steps,
        )
    }
}

/// Step/evidence-aware hint appended to the planner's prompt, per the decision table.
fn decision_guidance(
    step_num: usize,
    max_steps: usize,
    has_outline: bool,
    evidence_count: usize,
    outline_complete: bool,
) -> &'static str {
    let steps_remaining = max_steps.saturating_sub(step_num);

    if !has_outline && (step_num >= 4 || evidence_count >= 3) {
        "You have enough evidence to sketch a first outline now. Emit <write_outline>."
    } else if !has_outline {
        "Not enough evidence yet. Emit a <tool_call> search action."
    } else if steps_remaining <= 2 {
        if outline_complete {
            "Budget nearly exhausted and the outline looks complete. Emit <terminate>."
        } else {
            "Budget nearly exhausted. Finalize the outline now with <write_outline>."
        }
    } else if evidence_count >= 8 {
        "Plenty of evidence is available. Consider refining the outline with <write_outline>."
    } else {
        "Continue searching for gaps or refine the outline, whichever best serves the report."
    }
}

/// Heuristic for "this outline is ready to hand to the writer": at least one `## ` section
/// heading and at least one `<citation>` marker somewhere in the text.
fn outline_looks_complete(outline: &Outline) -> bool {
    !outline.is_empty() && outline.text.contains("## ") && outline.text.to_lowercase().contains("<citation>")
}

/// Parsing precedence (a contract, not an implementation detail):
/// 1. `<write_outline>` wins outright.
/// 2. Else `<terminate>` wins.
/// 3. Else a `<tool_call>{"name": "search", ...}` payload.
/// 4. Else non-empty raw text is salvaged as an outline.
/// 5. Else terminate with `unparseable_output`.
fn parse_planner_action(text: &str) -> PlannerAction {
    if let Some(outline_text) = find_tag_block(text, "write_outline") {
        return PlannerAction::WriteOutline { text: outline_text };
    }

    if let Some(reason) = find_tag_block(text, "terminate") {
        return PlannerAction::Terminate { reason };
    }

    if let Some(payload) = parse_tool_call_payload(text) {
        if payload.get("name").and_then(|n| n.as_str()) == Some("search") {
            if let Some(action) = parse_search_arguments(&payload) {
                return action;
            }
        }
    }

    let trimmed = text.trim();
    if !trimmed.is_empty() {
        return PlannerAction::WriteOutline { text: trimmed.to_string() };
    }

    PlannerAction::Terminate { reason: "unparseable_output".to_string() }
}

fn parse_search_arguments(payload: &serde_json::Value) -> Option<PlannerAction> {
    let arguments = payload.get("arguments")?;

    let queries: Vec<String> = match arguments.get("query") {
        Some(serde_json::Value::String(s)) => vec![s.trim().to_string()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .collect(),
        _ => Vec::new(),
    };
    let queries: Vec<String> = queries.into_iter().filter(|q| !q.is_empty()).collect();
    if queries.is_empty() {
        return None;
    }

    let goal = arguments
        .get("goal")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    Some(PlannerAction::Search { queries, goal })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_outline_wins_over_terminate_when_both_present() {
        let text = "<write_outline># Title</write_outline>\n<terminate>done</terminate>";
        assert_eq!(
            parse_planner_action(text),
            PlannerAction::WriteOutline { text: "# Title".to_string() }
        );
    }

    #[test]
    fn terminate_wins_over_tool_call_when_no_outline_tag() {
        let text = "<terminate>done</terminate>\n<tool_call>{\"name\":\"search\",\"arguments\":{\"query\":\"x\"}}</tool_call>";
        assert_eq!(
            parse_planner_action(text),
            PlannerAction::Terminate { reason: "done".to_string() }
        );
    }

    #[test]
    fn search_tool_call_coerces_string_query_to_singleton_list() {
        let text = r#"<tool_call>{"name": "search", "arguments": {"query": "rust async runtimes", "goal": "survey"}}</tool_call>"#;
        assert_eq!(
            parse_planner_action(text),
            PlannerAction::Search {
                queries: vec!["rust async runtimes".to_string()],
                goal: "survey".to_string()
            }
        );
    }

    #[test]
    fn search_tool_call_with_empty_query_falls_through_to_salvage() {
        let text = r#"some preamble <tool_call>{"name": "search", "arguments": {"query": ""}}</tool_call> trailing notes"#;
        match parse_planner_action(text) {
            PlannerAction::WriteOutline { text } => assert!(text.contains("preamble")),
            other => panic!("expected salvage outline, got {other:?}"),
        }
    }

    #[test]
    fn empty_output_terminates_unparseable() {
        assert_eq!(
            parse_planner_action("   "),
            PlannerAction::Terminate { reason: "unparseable_output".to_string() }
        );
    }

    #[test]
    fn decision_guidance_prefers_outline_when_enough_evidence_and_no_outline() {
        let guidance = decision_guidance(5, 12, false, 1, false);
        assert!(guidance.contains("write_outline"));
    }

    #[test]
    fn decision_guidance_prefers_terminate_near_budget_with_complete_outline() {
        let guidance = decision_guidance(11, 12, true, 10, true);
        assert!(guidance.contains("terminate"));
    }
}
