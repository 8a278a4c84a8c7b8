//! LLM client: a thin wrapper over an OpenAI-compatible chat-completions endpoint.
//!
//! The research pipeline treats the model as a black-box text-in/text-out service with a
//! temperature knob and a timeout — every call here takes a system prompt, a user message, a
//! temperature, and returns the assistant's raw string. Callers (planner, writer, page pipeline,
//! url filter, outline judge) are responsible for parsing that string with [`crate::tags`].

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;

use crate::error::{Error, Result};

/// Deterministic temperature for parse-sensitive calls (planner/writer parsing, URL
/// selection, outline judging).
pub const TEMPERATURE_DETERMINISTIC: f32 = 0.0;

/// Temperature band used for prose generation (summaries, section drafting, outline
/// fallback).
pub const TEMPERATURE_PROSE: f32 = 0.2;

/// Chat-completions client: owns the model identifier and per-call timeout; stateless
/// otherwise, so it is cheap to clone and share across the planner, writer, and page pipeline.
#[derive(Clone)]
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(api_key: &str, base_url: Option<&str>, model: impl Into<String>, timeout: Duration) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base) = base_url {
            config = config.with_api_base(base);
        }
        Self {
            client: Client::with_config(config),
            model: model.into(),
            timeout,
        }
    }

    /// Run one chat completion and return the assistant's text, trimmed.
    ///
    /// `temperature` should be [`TEMPERATURE_DETERMINISTIC`] for anything whose output will be
    /// parsed as a tag or JSON payload, and [`TEMPERATURE_PROSE`] (or similar) for free prose.
    pub async fn complete(&self, system: &str, user: &str, temperature: f32) -> Result<String> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system)
            .build()
            .map_err(Error::Llm)?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user)
            .build()
            .map_err(Error::Llm)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(temperature)
            .messages(vec![system_msg.into(), user_msg.into()])
            .build()
            .map_err(Error::Llm)?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| Error::Config(format!("LLM call timed out after {:?}", self.timeout)))?
            .map_err(Error::Llm)?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        Ok(text.trim().to_string())
    }
}
