//! Writer Agent: a per-section ReAct loop that drafts the report body, retrieving evidence
//! from the bank and suppressing ids already surfaced in earlier sections.

use std::collections::HashSet;

use crate::error::Result;
use crate::evidence_bank::EvidenceBank;
use crate::llm::{LlmClient, TEMPERATURE_DETERMINISTIC};
use crate::models::{Evidence, WriterAction};
use crate::tags::{extract_citation_ids, find_tag_block, parse_tool_call_payload};

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub max_steps_per_section: usize,
    pub section_max_chars: usize,
    pub section_max_evidences: usize,
    pub retrieve_top_k: usize,
    pub tool_response_max_chars: usize,
    pub evidence_items_per_evidence: usize,
}

const SYSTEM_PROMPT: &str = "\
You are the Writer in a deep-research pipeline, drafting one report section at a time.

At each step, respond with exactly one of:
- <tool_call>{\"name\": \"retrieve\", \"arguments\": {\"query\": \"...\", \"top_k\": 8}}</tool_call> \
to pull evidence from the bank (or supply \"citation_ids\": [\"ev_0001\", ...] to fetch specific \
evidence).
- <write>prose for this section, citing evidence as <citation>ev_0001</citation></write> to \
append to the draft.
- <terminate>reason</terminate> once the section is complete.

Only ever emit one action per step. Do not repeat evidence already shown to you.";

pub struct WriterAgent {
    llm: LlmClient,
    config: WriterConfig,
}

/// Outcome of one completed section: the drafted text and the evidence ids it cited (ever
/// surfaced to the writer during the section, used to grow the run-wide used-ids sieve).
pub struct SectionOutcome {
    pub draft: String,
    pub surfaced_ids: Vec<String>,
}

/// One writer step's observable outcome, emitted by the orchestrator as a `writer_*` event.
/// Collected into a plain `Vec` (rather than an async callback) since the writer loop only ever
/// runs on the single coordinating task — there is nothing to synchronize.
pub enum WriterStepEvent {
    Step,
    RetrieveQuery {
        query: Option<String>,
        top_k: usize,
        citation_ids: Option<Vec<String>>,
    },
    RetrieveResults {
        surfaced_ids: Vec<String>,
    },
    Write {
        text: String,
    },
    Terminate {
        reason: String,
    },
}

impl WriterAgent {
    pub fn new(llm: LlmClient, config: WriterConfig) -> Self {
        Self { llm, config }
    }

    /// Draft one section end to end: loop retrieve/write/terminate until the model
    /// terminates or the per-section step budget is exhausted.
    ///
    /// `used_ids` is the run-wide sieve; ids surfaced here are added to it as a side effect,
    /// visible to subsequent sections via the same shared set.
    pub async fn run_section(
        &self,
        bank: &EvidenceBank,
        used_ids: &mut HashSet<String>,
        query: &str,
        section_title: &str,
        section_body: &str,
        events_out: &mut Vec<WriterStepEvent>,
    ) -> Result<SectionOutcome> {
        let mut draft = String::new();
        let mut last_tool_response: Option<String> = None;
        let mut surfaced_ids: Vec<String> = Vec::new();

        for _step in 1..=self.config.max_steps_per_section {
            let user = self.build_user_message(query, section_title, section_body, &draft, last_tool_response.as_deref());
            let response = self.llm.complete(SYSTEM_PROMPT, &user, TEMPERATURE_DETERMINISTIC).await?;
            let action = parse_writer_action(&response);
            events_out.push(WriterStepEvent::Step);

            match action {
                WriterAction::Retrieve { query: retrieve_query, top_k, citation_ids } => {
                    events_out.push(WriterStepEvent::RetrieveQuery {
                        query: retrieve_query.clone(),
                        top_k,
                        citation_ids: citation_ids.clone(),
                    });
                    let resolved = self.resolve_retrieval(bank, used_ids, section_body, retrieve_query.as_deref(), top_k, citation_ids);
                    let mut newly_surfaced = Vec::new();
                    for ev in &resolved {
                        if used_ids.insert(ev.evidence_id.clone()) {
                            surfaced_ids.push(ev.evidence_id.clone());
                            newly_surfaced.push(ev.evidence_id.clone());
                        }
                    }
                    events_out.push(WriterStepEvent::RetrieveResults { surfaced_ids: newly_surfaced });
                    last_tool_response = Some(self.format_tool_response(&resolved));
                }
                WriterAction::Write { text } => {
                    let text = text.trim();
                    events_out.push(WriterStepEvent::Write { text: text.to_string() });
                    if !text.is_empty() {
                        if !draft.is_empty() {
                            draft.push_str("\n\n");
                        }
                        draft.push_str(text);
                        draft = left_truncate(&draft, self.config.section_max_chars);
                    }
                    last_tool_response = None;
                }
                WriterAction::Terminate { reason } => {
                    events_out.push(WriterStepEvent::Terminate { reason });
                    return Ok(SectionOutcome { draft, surfaced_ids });
                }
            }
        }

        Ok(SectionOutcome { draft, surfaced_ids })
    }

    fn build_user_message(
        &self,
        query: &str,
        section_title: &str,
        section_body: &str,
        draft: &str,
        tool_response: Option<&str>,
    ) -> String {
        let tool_section = tool_response.unwrap_or("<none>");
        format!(
            "Query: {query}\n\n\
             Section: {section_title}\n{section_body}\n\n\
             Current draft:\n{draft}\n\n\
             Latest tool response:\n{tool_section}"
        )
    }

    /// Resolve which evidences a `Retrieve` action should surface, then prune by section
    /// evidence cap, per-evidence item cap + textual dedup, and total char budget.
    fn resolve_retrieval(
        &self,
        bank: &EvidenceBank,
        used_ids: &HashSet<String>,
        section_body: &str,
        query: Option<&str>,
        top_k: usize,
        citation_ids: Option<Vec<String>>,
    ) -> Vec<Evidence> {
        let candidates: Vec<Evidence> = if let Some(ids) = citation_ids {
            bank.bulk_get(&ids)
        } else {
            let body_citations = extract_citation_ids(section_body);
            if !body_citations.is_empty() {
                bank.bulk_get(&body_citations)
            } else {
                bank.retrieve(query.unwrap_or(""), top_k)
            }
        };

        // The used-ids filter always applies, even for explicit citation_ids requests — this
        // is the ported source behavior, not an oversight.
        let filtered: Vec<Evidence> = candidates
            .into_iter()
            .filter(|ev| !used_ids.contains(&ev.evidence_id))
            .collect();

        filtered.into_iter().take(self.config.section_max_evidences).collect()
    }

    /// Format the `<tool_response><material>...</material></tool_response>` block, deduping
    /// evidence items textually within each evidence and stopping early once the total
    /// character budget would be exceeded.
    fn format_tool_response(&self, evidences: &[Evidence]) -> String {
        if evidences.is_empty() {
            return "<tool_response>\n<material>\nNO_NEW_EVIDENCE\n</material>\n</tool_response>".to_string();
        }

        let mut material = String::new();
        for ev in evidences {
            let block = self.format_evidence_block(ev);
            if material.len() + block.len() > self.config.tool_response_max_chars {
                break;
            }
            material.push_str(&block);
        }

        format!("<tool_response>\n<material>\n{material}</material>\n</tool_response>")
    }

    fn format_evidence_block(&self, ev: &Evidence) -> String {
        let mut seen = HashSet::new();
        let mut lines = Vec::new();
        for item in ev.evidence_items.iter().take(self.config.evidence_items_per_evidence) {
            let key = item.content.trim().to_lowercase();
            if seen.insert(key) {
                lines.push(format!("- {}: {}", kind_str(item.kind), item.content));
            }
        }

        format!(
            "<{id}>\nSummary: {summary}\n{items}URL: {url}\n</{id}>\n",
            id = ev.evidence_id,
            summary = ev.summary,
            items = lines.iter().map(|l| format!("{l}\n")).collect::<String>(),
            url = ev.source.url,
        )
    }
}

fn kind_str(kind: crate::models::EvidenceType) -> &'static str {
    use crate::models::EvidenceType::*;
    match kind {
        Quote => "quote",
        Data => "data",
        Definition => "definition",
        Claim => "claim",
        Case => "case",
    }
}

/// Left-truncate: when over the cap, keep the tail (the writing frontier matters more than
/// history) rather than the head.
fn left_truncate(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let char_count = text.chars().count();
    let skip = char_count - cap;
    text.chars().skip(skip).collect()
}

/// Parsing precedence:
/// 1. `<tool_call>{"name": "retrieve", ...}` (other tool names fall through, not an error).
/// 2. `<write>...</write>`.
/// 3. `<terminate>...</terminate>`.
/// 4. Any non-empty fallback text is treated as `Write`.
fn parse_writer_action(text: &str) -> WriterAction {
    if let Some(payload) = parse_tool_call_payload(text) {
        if payload.get("name").and_then(|n| n.as_str()) == Some("retrieve") {
            if let Some(action) = parse_retrieve_arguments(&payload) {
                return action;
            }
        }
    }

    if let Some(write_text) = find_tag_block(text, "write") {
        return WriterAction::Write { text: write_text };
    }

    if let Some(reason) = find_tag_block(text, "terminate") {
        return WriterAction::Terminate { reason };
    }

    let trimmed = text.trim();
    WriterAction::Write { text: trimmed.to_string() }
}

fn parse_retrieve_arguments(payload: &serde_json::Value) -> Option<WriterAction> {
    let arguments = payload.get("arguments")?;

    let query = arguments.get("query").and_then(|v| v.as_str()).map(|s| s.to_string());
    let top_k = arguments
        .get("top_k")
        .and_then(|v| v.as_u64())
        .map(|n| n.clamp(1, 50) as usize)
        .unwrap_or(WriterAction::DEFAULT_TOP_K);
    let citation_ids = arguments.get("citation_ids").and_then(|v| v.as_array()).map(|arr| {
        arr.iter().filter_map(|v| v.as_str()).map(|s| s.to_string()).collect::<Vec<_>>()
    });

    Some(WriterAction::Retrieve { query, top_k, citation_ids })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieve_tool_call_parses_query_and_top_k() {
        let text = r#"<tool_call>{"name": "retrieve", "arguments": {"query": "async runtimes", "top_k": 5}}</tool_call>"#;
        match parse_writer_action(text) {
            WriterAction::Retrieve { query, top_k, citation_ids } => {
                assert_eq!(query.as_deref(), Some("async runtimes"));
                assert_eq!(top_k, 5);
                assert!(citation_ids.is_none());
            }
            other => panic!("expected retrieve, got {other:?}"),
        }
    }

    #[test]
    fn other_tool_call_names_fall_through_to_fallback_write() {
        let text = r#"<tool_call>{"name": "search", "arguments": {}}</tool_call>"#;
        match parse_writer_action(text) {
            WriterAction::Write { text } => assert!(text.contains("tool_call")),
            other => panic!("expected fallback write, got {other:?}"),
        }
    }

    #[test]
    fn write_tag_parses_as_write_action() {
        let text = "<write>Some prose with <citation>ev_0001</citation>.</write>";
        assert_eq!(
            parse_writer_action(text),
            WriterAction::Write { text: "Some prose with <citation>ev_0001</citation>.".to_string() }
        );
    }

    #[test]
    fn left_truncate_keeps_tail_not_head() {
        let text = "0123456789";
        assert_eq!(left_truncate(text, 4), "6789");
    }

    #[test]
    fn empty_evidence_list_yields_no_new_evidence_placeholder() {
        let config = WriterConfig {
            max_steps_per_section: 1,
            section_max_chars: 100,
            section_max_evidences: 10,
            retrieve_top_k: 8,
            tool_response_max_chars: 1000,
            evidence_items_per_evidence: 5,
        };
        let llm = crate::llm::LlmClient::new("test-key", None, "gpt-4o-mini", std::time::Duration::from_secs(1));
        let writer = WriterAgent::new(llm, config);
        let response = writer.format_tool_response(&[]);
        assert!(response.contains("NO_NEW_EVIDENCE"));
    }
}
