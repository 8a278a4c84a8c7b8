//! Primary search provider: a JSON POST API (Tavily-shaped) with retry/backoff over transient
//! failures.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::SearchResult;

use super::{computed_backoff_secs, is_retryable_status, SearchProvider};

#[derive(Serialize)]
struct ApiSearchRequest<'a> {
    query: &'a str,
    max_results: usize,
    search_depth: &'a str,
    include_answer: bool,
}

#[derive(Deserialize)]
struct ApiSearchResponse {
    #[serde(default)]
    results: Vec<ApiSearchResultItem>,
}

#[derive(Deserialize)]
struct ApiSearchResultItem {
    url: Option<String>,
    title: Option<String>,
    content: Option<String>,
}

pub struct ApiSearchProvider {
    api_key: String,
    base_url: String,
    max_retries: u32,
    backoff_base_s: f64,
    backoff_cap_s: f64,
    timeout: Duration,
    agent: ureq::Agent,
}

impl ApiSearchProvider {
    pub fn new(
        api_key: impl Into<String>,
        max_retries: u32,
        backoff_base_s: f64,
        backoff_cap_s: f64,
        timeout: Duration,
    ) -> Self {
        // Status errors are turned off so a 429 (or any non-2xx) comes back as `Ok(Response)`
        // instead of `Err(StatusCode)`, which is the only way to read the `Retry-After` header.
        let config = ureq::Agent::config_builder().http_status_as_error(false).build();
        Self {
            api_key: api_key.into(),
            base_url: "https://api.tavily.com/search".to_string(),
            max_retries,
            backoff_base_s,
            backoff_cap_s,
            timeout,
            agent: ureq::Agent::new_with_config(config),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn do_request(
        &self,
        query: &str,
        max_results: usize,
    ) -> std::result::Result<Vec<SearchResult>, (bool, Option<u16>, String, Option<Duration>)> {
        let body = ApiSearchRequest {
            query,
            max_results,
            search_depth: "basic",
            include_answer: false,
        };

        let response = self
            .agent
            .post(&self.base_url)
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send_json(&body);

        match response {
            Ok(mut resp) => {
                let status = resp.status().as_u16();
                if status >= 400 {
                    // Per spec, only the 429 branch ever honors a server-supplied hint.
                    let retry_after = (status == 429)
                        .then(|| {
                            resp.headers()
                                .get("retry-after")
                                .and_then(|v| v.to_str().ok())
                                .and_then(|s| s.trim().parse::<u64>().ok())
                                .map(Duration::from_secs)
                        })
                        .flatten();
                    return Err((
                        is_retryable_status(status),
                        Some(status),
                        format!("search API returned HTTP {status}"),
                        retry_after,
                    ));
                }

                match resp.body_mut().read_json::<ApiSearchResponse>() {
                    Ok(parsed) => Ok(parsed
                        .results
                        .into_iter()
                        .filter_map(|r| r.url.map(|url| (url, r.title, r.content)))
                        .enumerate()
                        .map(|(idx, (url, title, content))| SearchResult {
                            title,
                            snippet: content,
                            url,
                            source: "api".to_string(),
                            rank: (idx + 1) as u32,
                        })
                        .collect()),
                    Err(e) => Err((false, None, format!("invalid search response body: {e}"), None)),
                }
            }
            Err(e) => Err((true, None, format!("search transport error: {e}"), None)),
        }
    }
}

#[async_trait]
impl SearchProvider for ApiSearchProvider {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchResult>> {
        let start = Instant::now();
        let mut last_status: Option<u16> = None;
        let mut last_message = String::new();

        for attempt in 0..=self.max_retries {
            let query = query.to_string();
            let this_base = self.base_url.clone();
            let this_key = self.api_key.clone();
            let provider = ApiSearchProvider {
                api_key: this_key,
                base_url: this_base,
                max_retries: self.max_retries,
                backoff_base_s: self.backoff_base_s,
                backoff_cap_s: self.backoff_cap_s,
                timeout: self.timeout,
                agent: self.agent.clone(),
            };

            let attempt_result = tokio::time::timeout(
                self.timeout,
                tokio::task::spawn_blocking(move || provider.do_request(&query, max_results)),
            )
            .await;

            let outcome = match attempt_result {
                Ok(Ok(inner)) => inner,
                Ok(Err(join_err)) => Err((true, None, format!("search task panicked: {join_err}"), None)),
                Err(_) => Err((true, None, "search request timed out".to_string(), None)),
            };

            match outcome {
                Ok(results) => return Ok(results),
                Err((retryable, status, message, retry_after)) => {
                    last_status = status;
                    last_message = message.clone();
                    tracing::warn!(attempt, retryable, status = ?status, "search attempt failed: {message}");

                    if !retryable || attempt == self.max_retries {
                        break;
                    }

                    let backoff = retry_after.unwrap_or_else(|| {
                        Duration::from_secs_f64(computed_backoff_secs(
                            attempt,
                            self.backoff_base_s,
                            self.backoff_cap_s,
                        ))
                    });
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        Err(Error::Search {
            attempts: self.max_retries + 1,
            last_status,
            elapsed_ms: start.elapsed().as_millis(),
            message: last_message,
        })
    }
}
