//! webweaver - a dual-agent deep research pipeline.
//!
//! A Planner agent iteratively searches the web and assembles a source-grounded outline; a
//! Writer agent then drafts each outlined section, retrieving evidence from a content-addressed
//! Evidence Bank as it goes. Every step of a run is recorded to an append-only, strictly
//! monotonic event log that can be replayed without side effects.
//!
//! ```ignore
//! use webweaver::config::Settings;
//! use webweaver::llm::LlmClient;
//! use webweaver::orchestrator::Orchestrator;
//! use webweaver::search::ApiSearchProvider;
//! use std::sync::Arc;
//!
//! # async fn run() -> webweaver::error::Result<()> {
//! let settings = Settings::from_env()?;
//! let llm = LlmClient::new(&settings.llm_api_key, settings.llm_base_url.as_deref(), &settings.llm_model, settings.llm_timeout());
//! let search = Arc::new(ApiSearchProvider::new(
//!     settings.search_api_key.clone().unwrap_or_default(),
//!     settings.search_max_retries,
//!     settings.search_backoff_base_s,
//!     settings.search_backoff_cap_s,
//!     settings.http_timeout(),
//! ));
//! let outcome = Orchestrator::new(settings, llm, search).run("a research query", false).await?;
//! println!("{}", outcome.report);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod events;
pub mod evidence_bank;
pub mod ids;
pub mod llm;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod outline_judge;
pub mod page_pipeline;
pub mod planner;
pub mod rate_limit;
pub mod recording;
pub mod search;
pub mod tags;
pub mod url_filter;
pub mod writer;

pub use error::{Error, Result};
