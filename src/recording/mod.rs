//! Event recording: an append-only, strictly monotonic log of everything that happened in a run.
//!
//! A [`Recorder`] owns the run's sequence counter and fans each emitted event out to every
//! active [`EventSink`] (the file sink always; an optional network mirror when configured).
//! Replay reconstructs the event stream for a past run without side effects, preferring the
//! local file and falling back to the mirror.

pub mod file_recorder;
#[cfg(feature = "redis-mirror")]
pub mod redis_recorder;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::events::{ContentType, EventType, MetaValue, RunEvent};

pub use file_recorder::FileEventRecorder;

/// A destination events get appended to. Implementors must not reorder or drop events handed
/// to them — ordering is the caller's ([`Recorder`]'s) responsibility, but durability of what
/// is handed over is the sink's.
#[async_trait]
pub trait EventSink: Send {
    async fn append(&mut self, event: &RunEvent) -> Result<()>;
}

/// Owns the run id and sequence counter; emits events to one or more sinks in order.
///
/// Only ever touched from the single coordinating task of a run (the orchestrator loop), even
/// in async-streaming mode where per-URL work is fanned out — the fan-out barrier rejoins
/// before any event is emitted, so there is never contention on the sequence counter.
pub struct Recorder {
    run_id: String,
    next_seq: u64,
    sinks: Vec<Box<dyn EventSink>>,
}

impl Recorder {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            next_seq: 1,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Build, persist, and return one event. Bumps the sequence counter first so a failure
    /// partway through the sink list still leaves `next_seq` consistent with "this event was
    /// attempted" rather than retried under the same seq.
    pub async fn emit(
        &mut self,
        event_type: EventType,
        content_type: ContentType,
        data: serde_json::Value,
        metadata: HashMap<String, MetaValue>,
    ) -> Result<RunEvent> {
        let seq = self.next_seq;
        self.next_seq += 1;

        let mut event = RunEvent::new(self.run_id.clone(), seq, event_type, content_type, data);
        event.metadata = metadata;

        for sink in &mut self.sinks {
            sink.append(&event).await?;
        }
        Ok(event)
    }

    /// Convenience for the common case of no metadata.
    pub async fn emit_simple(
        &mut self,
        event_type: EventType,
        content_type: ContentType,
        data: serde_json::Value,
    ) -> Result<RunEvent> {
        self.emit(event_type, content_type, data, HashMap::new()).await
    }
}

/// Reconstruct the event stream for a run: prefer the local JSONL file; if it is missing or
/// empty and a mirror is configured, fall back to reading the mirror. Pure — no side effects.
pub async fn replay(
    local_path: &Path,
    mirror: Option<&(dyn MirrorReader + Sync)>,
    run_id: &str,
) -> Result<Vec<RunEvent>> {
    let local = file_recorder::iter_events(local_path).await?;
    if !local.is_empty() {
        return Ok(local);
    }
    if let Some(mirror) = mirror {
        return mirror.read_events(run_id).await;
    }
    Ok(local)
}

/// Abstraction over the mirror's read side, so [`replay`] doesn't need the `redis-mirror`
/// feature compiled in just to type-check.
#[async_trait]
pub trait MirrorReader: Send + Sync {
    async fn read_events(&self, run_id: &str) -> Result<Vec<RunEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubMirror {
        events: Vec<RunEvent>,
    }

    #[async_trait]
    impl MirrorReader for StubMirror {
        async fn read_events(&self, _run_id: &str) -> Result<Vec<RunEvent>> {
            Ok(self.events.clone())
        }
    }

    #[tokio::test]
    async fn emit_assigns_gapless_monotonic_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = Recorder::new("run1")
            .with_sink(Box::new(FileEventRecorder::new(dir.path().join("events.jsonl")).await.unwrap()));

        let e1 = recorder.emit_simple(EventType::System, ContentType::Message, serde_json::json!("a")).await.unwrap();
        let e2 = recorder.emit_simple(EventType::Tool, ContentType::SearchQuery, serde_json::json!("b")).await.unwrap();
        let e3 = recorder.emit_simple(EventType::Llm, ContentType::PlannerStep, serde_json::json!("c")).await.unwrap();

        assert_eq!([e1.seq, e2.seq, e3.seq], [1, 2, 3]);
    }

    #[tokio::test]
    async fn replay_prefers_local_file_over_mirror() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let mut recorder =
            Recorder::new("run1").with_sink(Box::new(FileEventRecorder::new(&path).await.unwrap()));
        recorder.emit_simple(EventType::System, ContentType::Message, serde_json::json!("local")).await.unwrap();

        let mirror = StubMirror {
            events: vec![RunEvent::new("run1", 1, EventType::System, ContentType::Message, serde_json::json!("mirror"))],
        };

        let events = replay(&path, Some(&mirror), "run1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, serde_json::json!("local"));
    }

    #[tokio::test]
    async fn replay_falls_back_to_mirror_when_local_missing() {
        let missing = Path::new("/nonexistent/events.jsonl");
        let mirror = StubMirror {
            events: vec![RunEvent::new("run1", 1, EventType::System, ContentType::Message, serde_json::json!("mirror"))],
        };

        let events = replay(missing, Some(&mirror), "run1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, serde_json::json!("mirror"));
    }
}
