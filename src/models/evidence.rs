//! Evidence records: the unit stored in the evidence bank.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The kind of fact an [`EvidenceItem`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    Quote,
    Data,
    Definition,
    Claim,
    Case,
}

/// Where an evidence record came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    pub retrieved_at: DateTime<Utc>,
}

/// An atomic, citeable fact extracted from a source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    #[serde(rename = "type")]
    pub kind: EvidenceType,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// A source-level evidence record stored in the evidence bank.
///
/// Immutable once constructed: the bank never mutates or deletes a record after `add`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub evidence_id: String,
    pub query: String,
    pub source: EvidenceSource,
    pub summary: String,
    #[serde(default)]
    pub evidence_items: Vec<EvidenceItem>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub raw_text_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Evidence {
    /// Concatenated searchable text for lexical scoring: query, source metadata, summary, items.
    pub fn searchable_text(&self) -> String {
        let mut parts = vec![self.query.clone()];
        if let Some(t) = &self.source.title {
            parts.push(t.clone());
        }
        if let Some(p) = &self.source.publisher {
            parts.push(p.clone());
        }
        parts.push(self.summary.clone());
        for item in &self.evidence_items {
            parts.push(item.content.clone());
        }
        parts.join(" ")
    }
}
