//! LLM-based author affiliation extraction.
//!
//! Page text is sent to an OpenAI-compatible chat endpoint together with a
//! fixed system prompt. The reply must be a single mapping literal from
//! author name to affiliation; see [`crate::literal`] for the accepted
//! syntax. The call and the parse run inside a fixed-delay retry loop.

use crate::error::{Result, ScrapeError};
use crate::http::{build_http_client, HttpConfig};
use crate::literal::parse_mapping;
use crate::prompts::affiliations::SYSTEM_PROMPT;
use crate::retry::{retry_fixed, RetryPolicy};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

/// Default OpenAI-compatible API base URL
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Default chat model
pub const DEFAULT_LLM_MODEL: &str = "gpt-3.5-turbo-16k";

/// Ordered mapping from author name to affiliation.
///
/// An author without a known affiliation maps to `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffiliationMap {
    entries: Vec<(String, String)>,
}

impl AffiliationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a replaced author keeps its original position.
    pub fn insert(&mut self, author: impl Into<String>, affiliation: impl Into<String>) {
        let author = author.into();
        let affiliation = affiliation.into();
        match self.entries.iter_mut().find(|(a, _)| *a == author) {
            Some(entry) => entry.1 = affiliation,
            None => self.entries.push((author, affiliation)),
        }
    }

    pub fn get(&self, author: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(a, _)| a == author)
            .map(|(_, aff)| aff.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(a, aff)| (a.as_str(), aff.as_str()))
    }

    /// Render as `"name, affiliation"` pairs joined by `;`
    pub fn format(&self) -> String {
        self.entries
            .iter()
            .map(|(author, affiliation)| format!("{}, {}", author, affiliation))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl<A: Into<String>, B: Into<String>> FromIterator<(A, B)> for AffiliationMap {
    fn from_iter<I: IntoIterator<Item = (A, B)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (author, affiliation) in iter {
            map.insert(author, affiliation);
        }
        map
    }
}

/// LLM configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f64,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_LLM_MODEL.to_string(),
            temperature: 0.0,
        }
    }
}

/// A chat-completion backend: one system prompt, one user message, raw text back.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// OpenAI-compatible API response structures
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

/// Chat client for OpenAI-compatible `/chat/completions` endpoints
pub struct OpenAiChat {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiChat {
    pub fn new(config: LlmConfig, http: &HttpConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ScrapeError::Config("LLM API key is empty".to_string()));
        }
        Ok(Self {
            client: build_http_client(http)?,
            config,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request_body = serde_json::json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ]
        });

        let api_url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&api_url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(ScrapeError::Api {
                code: status.as_u16() as i32,
                message: format!("LLM API error: {} - {}", status, error_text),
            });
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ScrapeError::Parse(format!("Failed to parse LLM response: {}", e)))?;

        if let Some(usage) = &api_response.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "LLM usage"
            );
        }

        api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ScrapeError::Parse("LLM response has no message content".to_string()))
    }
}

/// Affiliation inference over a [`ChatModel`] with fixed-delay retry
pub struct AffiliationExtractor<M> {
    model: M,
    retry: RetryPolicy,
}

impl<M: ChatModel> AffiliationExtractor<M> {
    pub fn new(model: M, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Extract affiliations from page text.
    ///
    /// Returns `Some(map)` on a parsed reply (possibly empty) and `None` once
    /// every attempt has failed. Blank text yields an empty map without a call.
    pub async fn extract(&self, page_text: &str) -> Option<AffiliationMap> {
        if page_text.trim().is_empty() {
            debug!("Blank page text, skipping LLM call");
            return Some(AffiliationMap::new());
        }

        let result = retry_fixed(&self.retry, "affiliations", |attempt| async move {
            debug!(attempt = attempt, chars = page_text.len(), "Requesting affiliations");
            let content = self.model.complete(SYSTEM_PROMPT, page_text).await?;
            parse_mapping(&content)
        })
        .await;

        if let Some(map) = &result {
            info!(authors = map.len(), "Affiliations extracted");
        }
        result
    }
}
