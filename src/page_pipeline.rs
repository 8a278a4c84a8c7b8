//! Page Pipeline: fetch -> parse -> summarize-or-skip -> extract, the per-URL processing chain
//! that backs a Planner SearchAction.

use std::time::Duration;

use scraper::{Html, Selector};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::llm::{LlmClient, TEMPERATURE_DETERMINISTIC, TEMPERATURE_PROSE};
use crate::models::{EvidenceItem, EvidenceType, ParsedDocument};
use crate::tags::extract_json_object;

const MAX_PARSED_CHARS: usize = 25_000;
const TRUNCATION_MARKER: &str = "\n[TRUNCATED]";

/// Fetch `url` over HTTPS with a browser-like user agent and redirect following. Runs on a
/// blocking worker thread (the HTTP client is synchronous) and is wrapped in a timeout.
pub async fn fetch(url: &str, user_agent: &str, timeout: Duration) -> Result<(Vec<u8>, Option<String>)> {
    let url_owned = url.to_string();
    let user_agent = user_agent.to_string();
    let blocking_url = url_owned.clone();

    let result = tokio::time::timeout(
        timeout,
        tokio::task::spawn_blocking(move || -> std::result::Result<(Vec<u8>, Option<String>), String> {
            let response = ureq::get(&blocking_url)
                .header("User-Agent", &user_agent)
                .call()
                .map_err(|e| format!("fetch failed: {e}"))?;

            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());

            let mut body = response.into_body();
            let bytes = body
                .read_to_vec()
                .map_err(|e| format!("failed reading response body: {e}"))?;
            Ok((bytes, content_type))
        }),
    )
    .await;

    match result {
        Ok(Ok(Ok(ok))) => Ok(ok),
        Ok(Ok(Err(message))) => Err(Error::Fetch { url: url_owned, message }),
        Ok(Err(join_err)) => Err(Error::Fetch {
            url: url_owned,
            message: format!("fetch task panicked: {join_err}"),
        }),
        Err(_) => Err(Error::Fetch {
            url: url_owned,
            message: "fetch timed out".to_string(),
        }),
    }
}

/// Best-effort readability-style extraction: picks the block element with the largest visible
/// text density as "main content"; falls back to the raw document title + whole-page text on
/// any parse failure. Always normalizes and truncates.
pub fn parse(url: &str, bytes: &[u8], content_type: Option<&str>) -> ParsedDocument {
    let text_body = String::from_utf8_lossy(bytes).to_string();

    if !is_html(content_type, &text_body) {
        let normalized = normalize(&text_body);
        return ParsedDocument {
            url: url.to_string(),
            title: None,
            text: truncate(&normalized),
            content_type: content_type.map(|s| s.to_string()),
        };
    }

    let document = Html::parse_document(&text_body);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| document.select(&sel).next())
        .map(|n| n.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty());

    let main_text = extract_main_content(&document);

    let text = if main_text.trim().is_empty() {
        document.root_element().text().collect::<String>()
    } else {
        main_text
    };

    ParsedDocument {
        url: url.to_string(),
        title,
        text: truncate(&normalize(&text)),
        content_type: content_type.map(|s| s.to_string()),
    }
}

fn is_html(content_type: Option<&str>, body: &str) -> bool {
    if let Some(ct) = content_type {
        if ct.contains("html") {
            return true;
        }
        if !ct.is_empty() && !ct.contains("text") {
            return false;
        }
    }
    body.trim_start().starts_with('<')
}

/// Largest-text-density heuristic: among `article`, `main`, and `div`/`section` block elements,
/// pick the one with the most visible text, since the core doesn't depend on a specific
/// commercial readability algorithm.
fn extract_main_content(document: &Html) -> String {
    let candidate_selectors = ["article", "main", "div", "section"];
    let mut best: Option<(usize, String)> = None;

    for sel_str in candidate_selectors {
        let Ok(sel) = Selector::parse(sel_str) else {
            continue;
        };
        for el in document.select(&sel) {
            let text: String = el.text().collect::<String>();
            let density = text.split_whitespace().count();
            if density < 40 {
                continue;
            }
            if best.as_ref().map(|(best_density, _)| density > *best_density).unwrap_or(true) {
                best = Some((density, text));
            }
        }
    }

    best.map(|(_, text)| text).unwrap_or_default()
}

fn normalize(text: &str) -> String {
    text.lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_PARSED_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(MAX_PARSED_CHARS).collect();
    format!("{truncated}{TRUNCATION_MARKER}")
}

const SUMMARIZE_SYSTEM: &str = "You are a careful research assistant. Given a page's cleaned \
text and a research query, write a 150-250 word summary of the content that is directly \
relevant to the query. If the page is not relevant to the query at all, respond with exactly \
\"NOT RELEVANT\" and nothing else.";

/// Produce a 150-250 word query-relevant summary, or `None` if the model judged the page
/// irrelevant (`NOT RELEVANT`, case-insensitive, after trimming).
pub async fn summarize(llm: &LlmClient, query: &str, doc: &ParsedDocument) -> Result<Option<String>> {
    let user = format!(
        "Query: {query}\n\nPage title: {}\n\nPage text:\n{}",
        doc.title.as_deref().unwrap_or("(untitled)"),
        doc.text
    );
    let response = llm.complete(SUMMARIZE_SYSTEM, &user, TEMPERATURE_PROSE).await?;
    if response.trim_start().to_uppercase().starts_with("NOT RELEVANT") {
        return Ok(None);
    }
    Ok(Some(response))
}

const EXTRACT_SYSTEM: &str = "You extract citeable evidence from a web page for a research \
report. Given the page text and a research query, return STRICT JSON of the form \
{\"items\": [{\"type\": \"quote|data|definition|claim|case\", \"content\": \"...\", \
\"location\"?: \"...\", \"confidence\"?: 0.0-1.0}]}. Return at most the requested number of \
items. Return ONLY the JSON object, no prose.";

#[derive(Deserialize)]
struct ExtractedItems {
    #[serde(default)]
    items: Vec<ExtractedItem>,
}

#[derive(Deserialize)]
struct ExtractedItem {
    #[serde(rename = "type")]
    kind: EvidenceType,
    content: String,
    location: Option<String>,
    confidence: Option<f64>,
}

/// Produce up to `max_items` evidence items via strict JSON. On any parse failure, returns an
/// empty list rather than propagating — extraction failures are never fatal to the page.
pub async fn extract(llm: &LlmClient, query: &str, doc: &ParsedDocument, max_items: usize) -> Result<Vec<EvidenceItem>> {
    let user = format!(
        "Query: {query}\nMax items: {max_items}\n\nPage text:\n{}",
        doc.text
    );
    let response = llm.complete(EXTRACT_SYSTEM, &user, TEMPERATURE_DETERMINISTIC).await?;

    let Some(value) = extract_json_object(&response) else {
        tracing::warn!("evidence extraction returned unparseable JSON, skipping page");
        return Ok(Vec::new());
    };
    let Ok(parsed) = serde_json::from_value::<ExtractedItems>(value) else {
        return Ok(Vec::new());
    };

    Ok(parsed
        .items
        .into_iter()
        .take(max_items)
        .map(|item| EvidenceItem {
            kind: item.kind,
            content: item.content,
            location: item.location,
            confidence: item.confidence,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_extracts_title_and_largest_text_block() {
        let html = r#"
            <html><head><title>My Page</title></head>
            <body>
                <nav>Home About</nav>
                <article>This is the real body content, long enough to be picked as the main
                block because it has many more words than anything else on the page, including
                the navigation bar and footer, by a wide margin in every measurable sense.</article>
                <footer>Copyright</footer>
            </body></html>
        "#;
        let doc = parse("https://x", html.as_bytes(), Some("text/html"));
        assert_eq!(doc.title.as_deref(), Some("My Page"));
        assert!(doc.text.contains("real body content"));
    }

    #[test]
    fn parse_truncates_long_text_with_marker() {
        let long = "word ".repeat(30_000);
        let doc = parse("https://x", long.as_bytes(), Some("text/plain"));
        assert!(doc.text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn normalize_strips_blank_lines_and_trims() {
        let text = "  hello  \n\n\n  world  \n";
        assert_eq!(normalize(text), "hello\nworld");
    }
}
