//! Orchestrator: the end-to-end run state machine tying the planner, writer, evidence bank,
//! search provider, page pipeline, and event recorder together.
//!
//! ```text
//! INIT -> PLANNING -> (SEARCHING | OUTLINING)* -> (JUDGING)? -> WRITING_SECTION_1 -> ... -> DONE
//!                                              \-> (fallback outline) -/
//! ```

use std::collections::HashMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use tracing::Instrument;

use crate::config::Settings;
use crate::error::Result;
use crate::evidence_bank::EvidenceBank;
use crate::events::{ContentType, EventType, MetaValue};
use crate::ids::generate_run_id;
use crate::llm::{LlmClient, TEMPERATURE_DETERMINISTIC};
use crate::models::{Evidence, EvidenceItem, EvidenceSource, Outline, PlannerAction};
use crate::outline_judge;
use crate::page_pipeline;
use crate::planner::{PlannerAgent, PlannerConfig};
use crate::recording::{FileEventRecorder, Recorder};
use crate::search::SearchProvider;
use crate::tags::find_tag_block;
use crate::url_filter;
use crate::writer::{WriterAgent, WriterConfig, WriterStepEvent};

/// Final artifact of a run: the rendered report and where everything was persisted.
pub struct RunOutcome {
    pub run_id: String,
    pub report: String,
    pub run_dir: PathBuf,
}

/// One research run. Owns the evidence bank, outline, and recorder; the search provider and
/// LLM client are shared (behind `Arc`/clone) since they carry no run-local mutable state.
pub struct Orchestrator {
    settings: Settings,
    llm: LlmClient,
    search: Arc<dyn SearchProvider>,
    run_id: String,
    run_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(settings: Settings, llm: LlmClient, search: Arc<dyn SearchProvider>) -> Self {
        let run_id = generate_run_id();
        let run_dir = Path::new(&settings.artifacts_dir).join(format!("run_{run_id}"));
        Self {
            settings,
            llm,
            search,
            run_id,
            run_dir,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run the full pipeline. `concurrent` selects the async-streaming execution shape (per-URL
    /// fan-out within a search step) over the default sync-streaming one; both produce an
    /// identical event sequence for identical inputs.
    pub async fn run(self, query: &str, concurrent: bool) -> Result<RunOutcome> {
        let span = crate::logging::run_span(&self.run_id);
        self.run_inner(query, concurrent).instrument(span).await
    }

    async fn run_inner(mut self, query: &str, concurrent: bool) -> Result<RunOutcome> {
        tokio::fs::create_dir_all(&self.run_dir).await?;

        let bank = EvidenceBank::open(self.run_dir.join("evidence_bank")).await?;
        let events_path = self.run_dir.join("events.jsonl");
        let mut recorder = Recorder::new(self.run_id.clone())
            .with_sink(Box::new(FileEventRecorder::new(&events_path).await?));
        recorder = self.maybe_with_redis_mirror(recorder);

        recorder
            .emit_simple(EventType::System, ContentType::Message, serde_json::json!({"query": query}))
            .await?;

        let mut outline = Outline::empty();
        self.run_planning_loop(query, &bank, &mut outline, &mut recorder, concurrent).await?;

        if outline.is_empty() {
            self.run_outline_fallback(query, &bank, &mut outline, &mut recorder).await?;
        }

        self.persist_outline(&outline).await?;

        self.maybe_judge_outline(query, &outline, &mut recorder).await?;

        let report = self.run_writing_phase(query, &outline, &bank, &mut recorder).await?;
        self.persist_report(&report).await?;

        recorder
            .emit_simple(EventType::System, ContentType::ReportDone, serde_json::json!({"length": report.len()}))
            .await?;

        Ok(RunOutcome {
            run_id: self.run_id.clone(),
            report,
            run_dir: self.run_dir.clone(),
        })
    }

    /// Attach the optional Redis event mirror when `WEBWEAVER_REDIS_URL` is set and the
    /// `redis-mirror` feature is compiled in. A failure to connect is logged and the run
    /// continues with the file sink alone — the mirror is a convenience, never load-bearing.
    #[cfg(feature = "redis-mirror")]
    fn maybe_with_redis_mirror(&self, recorder: Recorder) -> Recorder {
        let Some(redis_url) = self.settings.redis_url.as_deref() else {
            return recorder;
        };
        match crate::recording::redis_recorder::RedisMirrorRecorder::new(
            redis_url,
            self.settings.redis_key_prefix.clone(),
            self.settings.redis_ttl_s,
        ) {
            Ok(mirror) => recorder.with_sink(Box::new(mirror)),
            Err(e) => {
                tracing::warn!("failed to set up redis event mirror: {e}");
                recorder
            }
        }
    }

    #[cfg(not(feature = "redis-mirror"))]
    fn maybe_with_redis_mirror(&self, recorder: Recorder) -> Recorder {
        if self.settings.redis_url.is_some() {
            tracing::warn!("WEBWEAVER_REDIS_URL is set but the redis-mirror feature is not compiled in");
        }
        recorder
    }

    async fn run_planning_loop(
        &self,
        query: &str,
        bank: &EvidenceBank,
        outline: &mut Outline,
        recorder: &mut Recorder,
        concurrent: bool,
    ) -> Result<()> {
        let planner = PlannerAgent::new(
            self.llm.clone(),
            PlannerConfig {
                max_steps: self.settings.planner_max_steps,
                max_queries_per_step: self.settings.planner_max_queries_per_step,
                max_urls_per_query: self.settings.planner_max_urls_per_query,
            },
        );

        for step_num in 1..=planner.config().max_steps {
            let evidence_summaries: Vec<String> = bank.list_all().into_iter().map(|e| e.summary).collect();

            let action = match planner.step(query, step_num, outline, &evidence_summaries).await {
                Ok(action) => action,
                Err(e) => {
                    recorder
                        .emit_simple(
                            EventType::Error,
                            ContentType::PlannerStep,
                            serde_json::json!({"error": e.to_string(), "step": step_num}),
                        )
                        .await?;
                    continue;
                }
            };

            recorder
                .emit_simple(EventType::Llm, ContentType::PlannerStep, serde_json::json!({"step": step_num}))
                .await?;

            // Early-terminate guard: a Terminate with no outline yet would leave the writer
            // with nothing to work from, so it is rewritten into a Search instead.
            let action = if matches!(action, PlannerAction::Terminate { .. }) && outline.is_empty() {
                PlannerAction::Search {
                    queries: vec![query.to_string()],
                    goal: "collect initial evidence".to_string(),
                }
            } else {
                action
            };

            match action {
                PlannerAction::Search { queries, goal } => {
                    self.run_search_action(query, &queries, &goal, bank, recorder, concurrent).await?;
                }
                PlannerAction::WriteOutline { text } => {
                    outline.update(text);
                    recorder
                        .emit_simple(
                            EventType::Tool,
                            ContentType::OutlineUpdated,
                            serde_json::json!({"version": outline.version}),
                        )
                        .await?;
                }
                PlannerAction::Terminate { reason } => {
                    recorder
                        .emit_simple(EventType::Tool, ContentType::PlannerTerminate, serde_json::json!({"reason": reason}))
                        .await?;
                    return Ok(());
                }
            }
        }

        Ok(())
    }

    async fn run_search_action(
        &self,
        original_query: &str,
        queries: &[String],
        goal: &str,
        bank: &EvidenceBank,
        recorder: &mut Recorder,
        concurrent: bool,
    ) -> Result<()> {
        for search_query in queries.iter().take(self.settings.planner_max_queries_per_step) {
            recorder
                .emit_simple(
                    EventType::Tool,
                    ContentType::SearchQuery,
                    serde_json::json!({"query": search_query, "goal": goal}),
                )
                .await?;

            let results = match self.search.search(search_query, self.settings.search_max_results).await {
                Ok(results) => results,
                Err(e) => {
                    recorder
                        .emit_simple(
                            EventType::Error,
                            ContentType::SearchResults,
                            serde_json::json!({"query": search_query, "error": e.to_string()}),
                        )
                        .await?;
                    continue;
                }
            };

            recorder
                .emit_simple(
                    EventType::Tool,
                    ContentType::SearchResults,
                    serde_json::json!({"query": search_query, "count": results.len()}),
                )
                .await?;

            let selected = url_filter::filter_urls(
                &self.llm,
                search_query,
                results,
                self.settings.planner_max_urls_per_query,
            )
            .await?;

            self.process_selected_urls(original_query, &selected, bank, recorder, concurrent).await?;
        }
        Ok(())
    }

    /// Process every selected URL: in concurrent mode, fetch/parse/summarize/extract/add all
    /// run in parallel with a join barrier, then events are emitted in original selection
    /// order; in sync mode, each URL is awaited in turn. Either way the emitted event sequence
    /// is identical.
    async fn process_selected_urls(
        &self,
        query: &str,
        selected: &[crate::models::SearchResult],
        bank: &EvidenceBank,
        recorder: &mut Recorder,
        concurrent: bool,
    ) -> Result<()> {
        let outcomes: Vec<UrlOutcome> = if concurrent {
            let futures = selected
                .iter()
                .map(|result| self.process_one_url(query.to_string(), result.url.clone(), bank))
                .collect::<Vec<_>>();
            join_all(futures).await
        } else {
            let mut outcomes = Vec::with_capacity(selected.len());
            for result in selected {
                outcomes.push(self.process_one_url(query.to_string(), result.url.clone(), bank).await);
            }
            outcomes
        };

        for outcome in outcomes {
            recorder
                .emit_simple(EventType::Tool, ContentType::UrlSelected, serde_json::json!({"url": outcome.url}))
                .await?;

            match outcome.result {
                Ok(Some(evidence)) => {
                    recorder
                        .emit_simple(
                            EventType::Tool,
                            ContentType::EvidenceAdded,
                            serde_json::json!({"evidence_id": evidence.evidence_id, "url": outcome.url}),
                        )
                        .await?;
                }
                Ok(None) => {
                    // Summarizer judged the page irrelevant; nothing to emit beyond URL_SELECTED.
                }
                Err(message) => {
                    let mut metadata = HashMap::new();
                    metadata.insert("url".to_string(), MetaValue::Str(outcome.url.clone()));
                    recorder
                        .emit(
                            EventType::Error,
                            ContentType::EvidenceAdded,
                            serde_json::json!({"url": outcome.url, "error": message}),
                            metadata,
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn process_one_url(&self, query: String, url: String, bank: &EvidenceBank) -> UrlOutcome {
        let result = self.process_one_url_inner(&query, &url, bank).await;
        UrlOutcome { url, result }
    }

    async fn process_one_url_inner(
        &self,
        query: &str,
        url: &str,
        bank: &EvidenceBank,
    ) -> std::result::Result<Option<Evidence>, String> {
        let (bytes, content_type) = page_pipeline::fetch(url, &self.settings.http_user_agent, self.settings.http_timeout())
            .await
            .map_err(|e| e.to_string())?;
        let doc = page_pipeline::parse(url, &bytes, content_type.as_deref());

        let summary = page_pipeline::summarize(&self.llm, query, &doc).await.map_err(|e| e.to_string())?;
        let Some(summary) = summary else {
            return Ok(None);
        };

        let items: Vec<EvidenceItem> = page_pipeline::extract(
            &self.llm,
            query,
            &doc,
            self.settings.writer_evidence_items_per_evidence,
        )
        .await
        .map_err(|e| e.to_string())?;

        let source = EvidenceSource {
            url: url.to_string(),
            title: doc.title.clone(),
            publisher: None,
            author: None,
            published_at: None,
            retrieved_at: chrono::Utc::now(),
        };

        let evidence = bank
            .add(query, source, summary, items, Some(&doc.text), Vec::new())
            .await
            .map_err(|e| e.to_string())?;
        Ok(Some(evidence))
    }

    async fn run_outline_fallback(
        &self,
        query: &str,
        bank: &EvidenceBank,
        outline: &mut Outline,
        recorder: &mut Recorder,
    ) -> Result<()> {
        let evidence_tail: Vec<String> = bank
            .list_all()
            .into_iter()
            .rev()
            .take(20)
            .map(|e| e.summary)
            .collect();

        let system = "You write complete, well-organized research report outlines in Markdown, \
with `## ` section headings and inline <citation>ev_000N</citation> markers.";
        let user = format!(
            "Query: {query}\nWrite the outline in {}.\n\nEvidence gathered so far:\n{}",
            self.settings.outline_fallback_language,
            evidence_tail.join("\n- ")
        );

        let fallback_text = match self.llm.complete(system, &user, TEMPERATURE_DETERMINISTIC).await {
            Ok(text) => text,
            Err(_) => String::new(),
        };

        let outline_text = find_tag_block(&fallback_text, "write_outline").unwrap_or(fallback_text);
        let outline_text = if outline_text.trim().is_empty() {
            "## Report\n\n(Outline generation failed; this is a placeholder section.)".to_string()
        } else {
            outline_text
        };

        outline.update(outline_text);
        recorder
            .emit_simple(
                EventType::System,
                ContentType::OutlineUpdated,
                serde_json::json!({"version": outline.version, "fallback": true}),
            )
            .await?;
        Ok(())
    }

    async fn maybe_judge_outline(&self, query: &str, outline: &Outline, recorder: &mut Recorder) -> Result<()> {
        let (Some(prompt_path), Some(criteria_path)) = (
            self.settings.outline_judge_prompt_path.as_ref(),
            self.settings.outline_judge_criteria_path.as_ref(),
        ) else {
            return Ok(());
        };

        let judgement = outline_judge::judge_outline(
            &self.llm,
            Path::new(prompt_path),
            Path::new(criteria_path),
            query,
            &outline.text,
        )
        .await;

        match judgement {
            Ok(Some(judgement)) => {
                let path = self.run_dir.join("outline_judgement.json");
                if let Ok(json) = serde_json::to_string_pretty(&judgement) {
                    let _ = tokio::fs::write(&path, json).await;
                }
                recorder
                    .emit_simple(
                        EventType::Tool,
                        ContentType::OutlineJudgeResult,
                        serde_json::to_value(&judgement).unwrap_or(serde_json::Value::Null),
                    )
                    .await?;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("outline judging failed: {e}");
                recorder
                    .emit_simple(EventType::Error, ContentType::OutlineJudgeResult, serde_json::json!({"error": e.to_string()}))
                    .await?;
            }
        }
        Ok(())
    }

    async fn run_writing_phase(
        &self,
        query: &str,
        outline: &Outline,
        bank: &EvidenceBank,
        recorder: &mut Recorder,
    ) -> Result<String> {
        let writer = WriterAgent::new(
            self.llm.clone(),
            WriterConfig {
                max_steps_per_section: self.settings.writer_max_steps_per_section,
                section_max_chars: self.settings.writer_section_max_chars,
                section_max_evidences: self.settings.writer_section_max_evidences,
                retrieve_top_k: self.settings.writer_retrieve_top_k,
                tool_response_max_chars: self.settings.writer_tool_response_max_chars,
                evidence_items_per_evidence: self.settings.writer_evidence_items_per_evidence,
            },
        );

        let sections = outline.split_sections();
        let mut used_ids: HashSet<String> = HashSet::new();
        let mut rendered_sections: Vec<(String, String)> = Vec::new();

        for (title, body) in sections {
            recorder
                .emit_simple(EventType::System, ContentType::WriterSectionStart, serde_json::json!({"title": title}))
                .await?;

            let mut step_events = Vec::new();
            let outcome = match writer
                .run_section(bank, &mut used_ids, query, &title, &body, &mut step_events)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    recorder
                        .emit_simple(EventType::Error, ContentType::WriterStep, serde_json::json!({"error": e.to_string()}))
                        .await?;
                    crate::writer::SectionOutcome { draft: String::new(), surfaced_ids: Vec::new() }
                }
            };

            for event in step_events {
                self.emit_writer_step_event(event, recorder).await?;
            }

            recorder
                .emit_simple(
                    EventType::System,
                    ContentType::WriterSectionDone,
                    serde_json::json!({"title": title, "chars": outcome.draft.len()}),
                )
                .await?;

            rendered_sections.push((title, outcome.draft));
        }

        Ok(render_report(&rendered_sections, bank))
    }

    async fn emit_writer_step_event(&self, event: WriterStepEvent, recorder: &mut Recorder) -> Result<()> {
        match event {
            WriterStepEvent::Step => {
                recorder.emit_simple(EventType::Llm, ContentType::WriterStep, serde_json::Value::Null).await?;
            }
            WriterStepEvent::RetrieveQuery { query, top_k, citation_ids } => {
                recorder
                    .emit_simple(
                        EventType::Tool,
                        ContentType::WriterRetrieveQuery,
                        serde_json::json!({"query": query, "top_k": top_k, "citation_ids": citation_ids}),
                    )
                    .await?;
            }
            WriterStepEvent::RetrieveResults { surfaced_ids } => {
                recorder
                    .emit_simple(
                        EventType::Tool,
                        ContentType::WriterRetrieveResults,
                        serde_json::json!({"surfaced_ids": surfaced_ids}),
                    )
                    .await?;
            }
            WriterStepEvent::Write { text } => {
                recorder
                    .emit_simple(EventType::Tool, ContentType::WriterWrite, serde_json::json!({"chars": text.len()}))
                    .await?;
            }
            WriterStepEvent::Terminate { reason } => {
                recorder
                    .emit_simple(EventType::Tool, ContentType::WriterTerminate, serde_json::json!({"reason": reason}))
                    .await?;
            }
        }
        Ok(())
    }

    async fn persist_outline(&self, outline: &Outline) -> Result<()> {
        tokio::fs::write(self.run_dir.join("outline.md"), &outline.text).await?;
        Ok(())
    }

    async fn persist_report(&self, report: &str) -> Result<()> {
        tokio::fs::write(self.run_dir.join("report.md"), report).await?;
        Ok(())
    }
}

struct UrlOutcome {
    url: String,
    result: std::result::Result<Option<Evidence>, String>,
}

/// Concatenate `## <title>\n\n<draft>` per section, append the references list, then strip
/// known LLM-leakage lines (a bare `retrieve` or a standalone `{...}` JSON object).
fn render_report(sections: &[(String, String)], bank: &EvidenceBank) -> String {
    let mut body = String::new();
    for (title, draft) in sections {
        body.push_str(&format!("## {title}\n\n{draft}\n\n"));
    }

    let cited_ids = crate::tags::extract_citation_ids(&body);
    if !cited_ids.is_empty() {
        body.push_str("## References\n\n");
        for id in &cited_ids {
            if let Ok(ev) = bank.get(id) {
                let title = ev.source.title.clone().unwrap_or_else(|| ev.source.url.clone());
                body.push_str(&format!("[^{id}]: {title}. {}\n", ev.source.url));
            }
        }
    }

    strip_leaked_lines(&body)
}

fn strip_leaked_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            trimmed != "retrieve" && !(trimmed.starts_with('{') && trimmed.ends_with('}'))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_leaked_lines_removes_bare_retrieve_and_json_lines() {
        let text = "## Section\n\nSome prose.\nretrieve\n{\"name\": \"retrieve\"}\nMore prose.";
        let cleaned = strip_leaked_lines(text);
        assert!(!cleaned.contains("\nretrieve\n"));
        assert!(!cleaned.contains("{\"name\""));
        assert!(cleaned.contains("Some prose."));
        assert!(cleaned.contains("More prose."));
    }
}
