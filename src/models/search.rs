//! Search-related models.

use serde::{Deserialize, Serialize};

/// A single web search result item, 1-based dense rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub url: String,
    pub source: String,
    pub rank: u32,
}
