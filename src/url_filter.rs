//! URL Filter: LLM-assisted selection of the top-k most relevant URLs from a ranked result list.

use serde::Deserialize;

use crate::error::Result;
use crate::llm::{LlmClient, TEMPERATURE_DETERMINISTIC};
use crate::models::SearchResult;
use crate::tags::extract_json_object;

const SYSTEM: &str = "You help select the most relevant search results for a research query. \
Given a numbered list of results (rank, title, snippet), return STRICT JSON of the form \
{\"selected_ranks\": [int, ...], \"rationale\": \"...\"} naming the ranks of the results worth \
reading in full, most relevant first. Return ONLY the JSON object.";

#[derive(Deserialize)]
struct FilterResponse {
    #[serde(default)]
    selected_ranks: Vec<i64>,
    #[serde(default)]
    #[allow(dead_code)]
    rationale: String,
}

/// If `results` already fits within `max_urls`, return it unchanged. Otherwise ask the model to
/// pick; fall back to the top-`max_urls` by rank if the model's output is unparseable or picks
/// nothing valid.
pub async fn filter_urls(
    llm: &LlmClient,
    query: &str,
    results: Vec<SearchResult>,
    max_urls: usize,
) -> Result<Vec<SearchResult>> {
    if results.len() <= max_urls {
        return Ok(results);
    }

    let listing = results
        .iter()
        .map(|r| {
            format!(
                "{}. {} — {}",
                r.rank,
                r.title.as_deref().unwrap_or("(untitled)"),
                r.snippet.as_deref().unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    let user = format!("Query: {query}\nSelect up to {max_urls} results.\n\n{listing}");

    let response = llm.complete(SYSTEM, &user, TEMPERATURE_DETERMINISTIC).await?;

    let selected = extract_json_object(&response)
        .and_then(|v| serde_json::from_value::<FilterResponse>(v).ok())
        .map(|parsed| resolve_ranks(&results, &parsed.selected_ranks, max_urls));

    match selected {
        Some(selected) if !selected.is_empty() => Ok(selected),
        _ => Ok(fallback_top_by_rank(results, max_urls)),
    }
}

fn resolve_ranks(results: &[SearchResult], ranks: &[i64], max_urls: usize) -> Vec<SearchResult> {
    let mut out = Vec::new();
    for rank in ranks.iter().take(max_urls) {
        if let Some(found) = results.iter().find(|r| i64::from(r.rank) == *rank) {
            out.push(found.clone());
        }
    }
    out
}

fn fallback_top_by_rank(mut results: Vec<SearchResult>, max_urls: usize) -> Vec<SearchResult> {
    results.sort_by_key(|r| r.rank);
    results.truncate(max_urls);
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(rank: u32, url: &str) -> SearchResult {
        SearchResult {
            title: Some(format!("title {rank}")),
            snippet: None,
            url: url.to_string(),
            source: "api".to_string(),
            rank,
        }
    }

    #[test]
    fn resolve_ranks_preserves_llm_order() {
        let results = vec![result(1, "a"), result(2, "b"), result(3, "c")];
        let resolved = resolve_ranks(&results, &[3, 1], 5);
        assert_eq!(resolved.iter().map(|r| r.url.clone()).collect::<Vec<_>>(), vec!["c", "a"]);
    }

    #[test]
    fn fallback_truncates_to_top_by_rank() {
        let results = vec![result(2, "b"), result(1, "a"), result(3, "c")];
        let top = fallback_top_by_rank(results, 2);
        assert_eq!(top.iter().map(|r| r.url.clone()).collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
