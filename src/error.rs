//! Error taxonomy for the research pipeline.

use thiserror::Error;

/// Errors that can occur during a research run.
#[derive(Error, Debug)]
pub enum Error {
    /// LLM client error (transport, auth, or malformed response).
    #[error("LLM error: {0}")]
    Llm(#[from] async_openai::error::OpenAIError),

    /// Search provider exhausted its retry budget or hit a terminal error.
    #[error("search error after {attempts} attempt(s) (last status {last_status:?}, elapsed {elapsed_ms}ms): {message}")]
    Search {
        attempts: u32,
        last_status: Option<u16>,
        elapsed_ms: u128,
        message: String,
    },

    /// Page fetch failed (network, TLS, non-2xx status).
    #[error("fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Evidence lookup by id found nothing.
    #[error("evidence not found: {0}")]
    NotFound(String),

    /// I/O against the run's artifacts directory.
    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failure against a persisted artifact.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Planner or writer step exhausted its step budget without terminating.
    #[error("max steps ({0}) reached")]
    MaxSteps(usize),

    /// Required configuration value missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Optional network mirror for the event recorder failed.
    #[error("recorder mirror error: {0}")]
    Recorder(String),
}

/// Result type for research-pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
