//! Run event model: the durable, replayable record of everything that happened in a run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// High-level event category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    System,
    Tool,
    Llm,
    Error,
}

/// The closed set of semantic content kinds an event may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Message,

    PlannerStep,
    SearchQuery,
    SearchResults,
    UrlSelected,
    EvidenceAdded,
    OutlineUpdated,
    PlannerTerminate,

    OutlineJudgeResult,

    WriterSectionStart,
    WriterSectionDone,
    WriterStep,
    WriterRetrieveQuery,
    WriterRetrieveResults,
    WriterWrite,
    WriterTerminate,
    ReportDone,
}

/// A single small-typed metadata value attached to an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Str(v.to_string())
    }
}
impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Str(v)
    }
}
impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}
impl From<usize> for MetaValue {
    fn from(v: usize) -> Self {
        MetaValue::Int(v as i64)
    }
}
impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

/// A single event in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub run_id: String,
    pub seq: u64,
    pub ts: DateTime<Utc>,

    pub event_type: EventType,
    pub content_type: ContentType,

    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, MetaValue>,
}

impl RunEvent {
    pub fn new(
        run_id: impl Into<String>,
        seq: u64,
        event_type: EventType,
        content_type: ContentType,
        data: serde_json::Value,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            seq,
            ts: Utc::now(),
            event_type,
            content_type,
            data,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
