//! Runtime configuration, loaded from environment variables with a single `WEBWEAVER_` prefix.
//!
//! Mirrors the builder style of [`crate::planner::PlannerConfig`] / [`crate::writer::WriterConfig`]:
//! sensible defaults, explicit overrides, fully constructible in-memory for tests.

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_string(key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Which search backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchProviderKind {
    /// A JSON POST API (rank + title + snippet), e.g. Tavily-style.
    Api,
    /// A best-effort library/HTML fallback requiring no API key.
    Lite,
}

/// Top-level settings surface for a research run.
#[derive(Debug, Clone)]
pub struct Settings {
    // LLM
    pub llm_api_key: String,
    pub llm_base_url: Option<String>,
    pub llm_model: String,
    pub llm_timeout_s: u64,

    // Search
    pub search_provider: SearchProviderKind,
    pub search_api_key: Option<String>,
    pub search_max_results: usize,
    pub search_max_retries: u32,
    pub search_backoff_base_s: f64,
    pub search_backoff_cap_s: f64,

    // Optional Redis event mirror
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub redis_ttl_s: u64,

    // Planner
    pub planner_max_steps: usize,
    pub planner_max_queries_per_step: usize,
    pub planner_max_urls_per_query: usize,

    // Writer
    pub writer_max_steps_per_section: usize,
    pub writer_section_max_chars: usize,
    pub writer_section_max_evidences: usize,
    pub writer_retrieve_top_k: usize,
    pub writer_tool_response_max_chars: usize,
    pub writer_evidence_items_per_evidence: usize,

    // Networking
    pub http_timeout_s: u64,
    pub http_user_agent: String,

    // Artifacts
    pub artifacts_dir: String,

    // Outline judge (optional; both must be present to activate)
    pub outline_judge_prompt_path: Option<String>,
    pub outline_judge_criteria_path: Option<String>,

    /// Target language for the outline-fallback prompt. Defaults to "the same
    /// language as the query" rather than a hardcoded language.
    pub outline_fallback_language: String,
}

impl Settings {
    /// Load settings from the process environment, falling back to documented defaults.
    ///
    /// Only the LLM API key is mandatory; everything else has a usable default.
    pub fn from_env() -> Result<Self> {
        let llm_api_key = env_string("WEBWEAVER_OPENAI_API_KEY").ok_or_else(|| {
            Error::Config(
                "missing WEBWEAVER_OPENAI_API_KEY; set it in the environment or a .env file"
                    .to_string(),
            )
        })?;

        let search_provider = match env_string("WEBWEAVER_SEARCH_PROVIDER").as_deref() {
            Some("lite") | Some("duckduckgo") => SearchProviderKind::Lite,
            _ => SearchProviderKind::Api,
        };

        Ok(Self {
            llm_api_key,
            llm_base_url: env_string("WEBWEAVER_OPENAI_BASE_URL"),
            llm_model: env_string("WEBWEAVER_OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            llm_timeout_s: env_parsed("WEBWEAVER_OPENAI_TIMEOUT_S", 60),

            search_provider,
            search_api_key: env_string("WEBWEAVER_TAVILY_API_KEY"),
            search_max_results: env_parsed("WEBWEAVER_SEARCH_MAX_RESULTS", 10),
            search_max_retries: env_parsed("WEBWEAVER_SEARCH_MAX_RETRIES", 3),
            search_backoff_base_s: env_parsed("WEBWEAVER_SEARCH_BACKOFF_BASE_S", 0.75),
            search_backoff_cap_s: env_parsed("WEBWEAVER_SEARCH_BACKOFF_CAP_S", 8.0),

            redis_url: env_string("WEBWEAVER_REDIS_URL"),
            redis_key_prefix: env_string("WEBWEAVER_REDIS_KEY_PREFIX")
                .unwrap_or_else(|| "webweaver".to_string()),
            redis_ttl_s: env_parsed("WEBWEAVER_REDIS_TTL_S", 60 * 60 * 24 * 7),

            planner_max_steps: env_parsed("WEBWEAVER_PLANNER_MAX_STEPS", 12),
            planner_max_queries_per_step: env_parsed("WEBWEAVER_PLANNER_MAX_QUERIES_PER_STEP", 4),
            planner_max_urls_per_query: env_parsed("WEBWEAVER_PLANNER_MAX_URLS_PER_QUERY", 4),

            writer_max_steps_per_section: env_parsed("WEBWEAVER_WRITER_MAX_STEPS_PER_SECTION", 18),
            writer_section_max_chars: env_parsed("WEBWEAVER_WRITER_SECTION_MAX_CHARS", 20_000),
            writer_section_max_evidences: env_parsed("WEBWEAVER_WRITER_SECTION_MAX_EVIDENCES", 12),
            writer_retrieve_top_k: env_parsed("WEBWEAVER_WRITER_RETRIEVE_TOP_K", 12),
            writer_tool_response_max_chars: env_parsed(
                "WEBWEAVER_WRITER_TOOL_RESPONSE_MAX_CHARS",
                25_000,
            ),
            writer_evidence_items_per_evidence: env_parsed(
                "WEBWEAVER_WRITER_EVIDENCE_ITEMS_PER_EVIDENCE",
                8,
            ),

            http_timeout_s: env_parsed("WEBWEAVER_HTTP_TIMEOUT_S", 30),
            http_user_agent: env_string("WEBWEAVER_HTTP_USER_AGENT").unwrap_or_else(|| {
                "Mozilla/5.0 (compatible; WebWeaver/1.0; +https://example.invalid/bot)".to_string()
            }),

            artifacts_dir: env_string("WEBWEAVER_ARTIFACTS_DIR").unwrap_or_else(|| "artifacts".to_string()),

            outline_judge_prompt_path: env_string("WEBWEAVER_OUTLINE_JUDGE_PROMPT_PATH"),
            outline_judge_criteria_path: env_string("WEBWEAVER_OUTLINE_JUDGE_CRITERIA_PATH"),

            outline_fallback_language: env_string("WEBWEAVER_OUTLINE_FALLBACK_LANGUAGE")
                .unwrap_or_else(|| "the same language as the query".to_string()),
        })
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_s)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parsed_falls_back_to_default_on_missing_or_bad_value() {
        assert_eq!(env_parsed::<usize>("WEBWEAVER_TEST_DOES_NOT_EXIST", 7), 7);
    }

    #[test]
    fn from_env_requires_api_key() {
        // SAFETY: test-only mutation of process env, single-threaded test.
        unsafe {
            env::remove_var("WEBWEAVER_OPENAI_API_KEY");
        }
        let err = Settings::from_env().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
