//! Optional outline-quality evaluation: one LLM call per criterion, each parsed as
//! `{rating: 0..=10, justification}` with brace-salvage fallback on noisy output.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::llm::{LlmClient, TEMPERATURE_DETERMINISTIC};
use crate::tags::extract_json_object;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionResult {
    pub rating: i64,
    pub justification: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineJudgement {
    pub question: String,
    pub answer: String,
    pub results: HashMap<String, CriterionResult>,
}

const JUDGE_SYSTEM: &str = "You evaluate a research report outline against one stated \
criterion. Respond with STRICT JSON {\"rating\": 0-10, \"justification\": \"...\"}. Return \
ONLY the JSON object.";

/// Load the judge prompt and criteria list, then rate the outline against each criterion.
/// Returns `None` if either file is missing — judging is opt-in, not required.
pub async fn judge_outline(
    llm: &LlmClient,
    prompt_path: &Path,
    criteria_path: &Path,
    query: &str,
    outline_text: &str,
) -> Result<Option<OutlineJudgement>> {
    let Ok(prompt) = tokio::fs::read_to_string(prompt_path).await else {
        return Ok(None);
    };
    let Ok(criteria_raw) = tokio::fs::read_to_string(criteria_path).await else {
        return Ok(None);
    };
    let criteria = parse_criteria(&criteria_raw);
    if criteria.is_empty() {
        return Ok(None);
    }

    let mut results = HashMap::new();
    for criterion in &criteria {
        let user = format!(
            "{prompt}\n\nCriterion: {criterion}\n\nQuery: {query}\n\nOutline:\n{outline_text}"
        );
        let response = llm.complete(JUDGE_SYSTEM, &user, TEMPERATURE_DETERMINISTIC).await?;
        let parsed = extract_json_object(&response)
            .and_then(|v| serde_json::from_value::<CriterionResult>(v).ok())
            .unwrap_or(CriterionResult {
                rating: 0,
                justification: "judge output unparseable".to_string(),
            });
        results.insert(criterion.clone(), parsed);
    }

    Ok(Some(OutlineJudgement {
        question: query.to_string(),
        answer: outline_text.to_string(),
        results,
    }))
}

/// Criteria are a strict JSON array of strings; a JSONL (one string per line) file is accepted
/// for backward compatibility with older criteria files.
fn parse_criteria(raw: &str) -> Vec<String> {
    if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
        return list;
    }
    raw.lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| serde_json::from_str::<String>(l).unwrap_or_else(|_| l.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_criteria_accepts_json_array() {
        let raw = r#"["coverage", "clarity"]"#;
        assert_eq!(parse_criteria(raw), vec!["coverage", "clarity"]);
    }

    #[test]
    fn parse_criteria_falls_back_to_jsonl_lines() {
        let raw = "\"coverage\"\n\"clarity\"\n";
        assert_eq!(parse_criteria(raw), vec!["coverage", "clarity"]);
    }
}
