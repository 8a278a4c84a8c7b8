//! Fallback search provider: no API key required, scrapes a public HTML results page.
//!
//! Degrades gracefully — any failure (network, parse) is caught and yields an empty result
//! set rather than propagating, since this provider exists precisely to keep the pipeline
//! moving when the primary API is unavailable or unconfigured.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::error::Result;
use crate::models::SearchResult;

use super::SearchProvider;

pub struct LiteSearchProvider {
    timeout: Duration,
    user_agent: String,
}

impl LiteSearchProvider {
    pub fn new(timeout: Duration, user_agent: impl Into<String>) -> Self {
        Self {
            timeout,
            user_agent: user_agent.into(),
        }
    }

    fn do_search(&self, query: &str, max_results: usize) -> Vec<SearchResult> {
        let url = format!("https://html.duckduckgo.com/html/?q={}", urlencoding_encode(query));

        let body = match ureq::get(&url).header("User-Agent", &self.user_agent).call() {
            Ok(mut resp) => match resp.body_mut().read_to_string() {
                Ok(s) => s,
                Err(_) => return Vec::new(),
            },
            Err(_) => return Vec::new(),
        };

        parse_results(&body, max_results)
    }
}

fn urlencoding_encode(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') {
                c.to_string()
            } else {
                let mut buf = [0u8; 4];
                c.encode_utf8(&mut buf)
                    .bytes()
                    .map(|b| format!("%{:02X}", b))
                    .collect::<String>()
            }
        })
        .collect()
}

fn parse_results(html: &str, max_results: usize) -> Vec<SearchResult> {
    let Ok(result_sel) = Selector::parse("div.result") else {
        return Vec::new();
    };
    let Ok(link_sel) = Selector::parse("a.result__a") else {
        return Vec::new();
    };
    let Ok(snippet_sel) = Selector::parse("a.result__snippet") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut out = Vec::new();

    for (idx, el) in document.select(&result_sel).enumerate() {
        if out.len() >= max_results {
            break;
        }
        let Some(link) = el.select(&link_sel).next() else {
            continue;
        };
        let Some(url) = link.value().attr("href") else {
            continue;
        };
        let title: String = link.text().collect::<String>().trim().to_string();
        let snippet = el
            .select(&snippet_sel)
            .next()
            .map(|n| n.text().collect::<String>().trim().to_string());

        out.push(SearchResult {
            title: if title.is_empty() { None } else { Some(title) },
            snippet,
            url: url.to_string(),
            source: "lite".to_string(),
            rank: (idx + 1) as u32,
        });
    }
    out
}

#[async_trait]
impl SearchProvider for LiteSearchProvider {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let query = query.to_string();
        let this_timeout = self.timeout;
        let this_ua = self.user_agent.clone();
        let provider = LiteSearchProvider {
            timeout: this_timeout,
            user_agent: this_ua,
        };

        let results = tokio::time::timeout(
            self.timeout,
            tokio::task::spawn_blocking(move || provider.do_search(&query, max_results)),
        )
        .await
        .unwrap_or(Ok(Vec::new()))
        .unwrap_or_default();

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_results_extracts_title_url_snippet() {
        let html = r#"
            <div class="result">
                <a class="result__a" href="https://example.com">Example Title</a>
                <a class="result__snippet">A short snippet</a>
            </div>
        "#;
        let results = parse_results(html, 5);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://example.com");
        assert_eq!(results[0].title.as_deref(), Some("Example Title"));
        assert_eq!(results[0].rank, 1);
    }

    #[test]
    fn parse_results_truncates_to_max() {
        let html = r#"
            <div class="result"><a class="result__a" href="https://a">A</a></div>
            <div class="result"><a class="result__a" href="https://b">B</a></div>
        "#;
        assert_eq!(parse_results(html, 1).len(), 1);
    }
}
