//! Fault-tolerant tag and embedded-JSON extraction for LLM output.
//!
//! LLM responses are free text that *should* contain a well-formed tag or JSON block, but often
//! don't. Every function here degrades gracefully to `None` rather than erroring, so callers can
//! fall back to salvage strategies instead of failing the whole step.

use regex::Regex;
use serde_json::Value;

/// Find the first `<tag_name>...</tag_name>` block and return its inner content, trimmed.
///
/// Matching is case-insensitive and spans newlines.
pub fn find_tag_block(text: &str, tag_name: &str) -> Option<String> {
    if text.is_empty() {
        return None;
    }
    let pattern = format!(r"(?is)<{0}>(?P<body>.*?)</{0}>", regex::escape(tag_name));
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(text)?;
    Some(caps.name("body")?.as_str().trim().to_string())
}

/// Extract a single JSON object from free text, trying progressively looser strategies:
/// 1. A fenced code block (```json ... ``` or ``` ... ```) whose contents look like an object.
/// 2. The whole trimmed text, if it starts with `{` and ends with `}`.
/// 3. The first balanced-looking `{ ... }` substring (one level of nesting).
pub fn extract_json_object(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    let cleaned = text.trim();

    if let Some(obj) = extract_fenced_json(cleaned) {
        return Some(obj);
    }

    if cleaned.starts_with('{') && cleaned.ends_with('}') {
        if let Ok(v) = serde_json::from_str(cleaned) {
            return Some(v);
        }
    }

    extract_braced_json(cleaned)
}

fn extract_fenced_json(text: &str) -> Option<Value> {
    let json_fence = Regex::new(r"(?is)```json\s*\n?(?P<body>.*?)\n?```").ok()?;
    let generic_fence = Regex::new(r"(?s)```\s*\n?(?P<body>.*?)\n?```").ok()?;

    let inner = json_fence
        .captures(text)
        .or_else(|| generic_fence.captures(text))
        .map(|c| c.name("body").unwrap().as_str().trim().to_string())?;

    if inner.starts_with('{') && inner.ends_with('}') {
        serde_json::from_str(&inner).ok()
    } else {
        None
    }
}

fn extract_braced_json(text: &str) -> Option<Value> {
    // One level of nesting, matching the source's `\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}`.
    let re = Regex::new(r"(?s)\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").ok()?;
    let m = re.find(text)?;
    serde_json::from_str(m.as_str()).ok()
}

/// Parse a `<tool_call>{...}</tool_call>` payload, e.g. `{"name": "retrieve", "arguments": {...}}`.
///
/// Falls back to scanning the whole text for a bare JSON object if no `<tool_call>` block is
/// present or its contents don't parse. Never panics; returns `None` on total failure.
pub fn parse_tool_call_payload(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    if let Some(block) = find_tag_block(text, "tool_call") {
        if let Some(obj) = extract_json_object(&block) {
            return Some(obj);
        }
    }
    extract_json_object(text)
}

/// Extract evidence ids from one or more `<citation>id_1, id_2</citation>` tags, comma-split and
/// trimmed, deduplicated while preserving first-seen order across all tags in the text.
pub fn extract_citation_ids(text: &str) -> Vec<String> {
    let re = Regex::new(r"(?i)<citation>(?P<ids>[^<]+)</citation>").expect("static pattern");
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for caps in re.captures_iter(text) {
        let raw = &caps["ids"];
        for part in raw.split(',') {
            let part = part.trim();
            if !part.is_empty() && seen.insert(part.to_string()) {
                out.push(part.to_string());
            }
        }
    }
    out
}

/// Remove `<citation>...</citation>` tags (and their contents) from text.
pub fn strip_citation_tags(text: &str) -> String {
    let re = Regex::new(r"(?i)<citation>[^<]+</citation>").expect("static pattern");
    re.replace_all(text, "").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_tag_block_is_case_insensitive_and_tolerates_prose() {
        let text = "I will now:\n<Write_Outline>\n# Title\nbody\n</WRITE_OUTLINE>\nthanks";
        assert_eq!(
            find_tag_block(text, "write_outline").as_deref(),
            Some("# Title\nbody")
        );
    }

    #[test]
    fn find_tag_block_missing_returns_none() {
        assert_eq!(find_tag_block("no tags here", "terminate"), None);
    }

    #[test]
    fn extract_json_object_whole_text() {
        let v = extract_json_object(r#"{"a": 1, "b": [1,2]}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn extract_json_object_fenced_json() {
        let text = "here you go:\n```json\n{\"selected_ranks\": [1,2], \"rationale\": \"ok\"}\n```\nthanks";
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["rationale"], "ok");
    }

    #[test]
    fn extract_json_object_fenced_generic() {
        let text = "```\n{\"x\": 1}\n```";
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["x"], 1);
    }

    #[test]
    fn extract_json_object_bare_braces_in_prose() {
        let text = "Sure, here's the result: {\"name\": \"retrieve\", \"arguments\": {\"query\": \"q\"}} done.";
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["name"], "retrieve");
    }

    #[test]
    fn extract_json_object_unparseable_returns_none() {
        assert!(extract_json_object("not json at all").is_none());
    }

    #[test]
    fn parse_tool_call_payload_prefers_tool_call_block() {
        let text = "<tool_call>{\"name\": \"search\", \"arguments\": {\"query\": \"q\"}}</tool_call>";
        let v = parse_tool_call_payload(text).unwrap();
        assert_eq!(v["name"], "search");
    }

    #[test]
    fn parse_tool_call_payload_falls_back_to_bare_json() {
        let text = "I forgot the tags: {\"name\": \"retrieve\", \"arguments\": {}}";
        let v = parse_tool_call_payload(text).unwrap();
        assert_eq!(v["name"], "retrieve");
    }

    #[test]
    fn parse_tool_call_payload_returns_none_on_garbage() {
        assert!(parse_tool_call_payload("no structure at all").is_none());
    }

    #[test]
    fn citation_ids_dedup_first_seen_order() {
        let text = "A <citation>ev_0001, ev_0002</citation> B <citation>ev_0002,ev_0003</citation>";
        assert_eq!(
            extract_citation_ids(text),
            vec!["ev_0001", "ev_0002", "ev_0003"]
        );
    }

    #[test]
    fn strip_citation_tags_removes_tag_and_contents() {
        let text = "keep <citation>ev_0001</citation> keep";
        assert_eq!(strip_citation_tags(text), "keep  keep");
    }
}
