//! OpenRouter qualitative scorer
//!
//! Sends the selected excerpts to an OpenAI-compatible chat completion
//! endpoint and asks for a JSON verdict with an overall score in `[0, 10]`.

use std::time::Duration;

use async_trait::async_trait;
use codecat_core::{CallKind, CollaboratorError, QualitativeScore, QualitativeScorer, RetryPolicy};
use codecat_state::SourceExcerpt;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::error::{ensure_success, ProviderError};
use crate::USER_AGENT;

pub const ENV_OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
pub const ENV_OPENROUTER_MODEL: &str = "OPENROUTER_MODEL";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

const SYSTEM_PROMPT: &str = "You are an expert code quality analyst. Assess the provided \
code files for readability, maintainability, complexity, adherence to the language's \
conventions and error handling. Answer with JSON only: an object with \
`overall_quality_score` (a number from 0 to 10) and `summary` (two sentences at most).";

/// OpenRouter configuration
#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Lower is more deterministic.
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenRouterConfig {
    pub fn new(api_key: &str) -> Self {
        OpenRouterConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.3,
            timeout: RetryPolicy::default().timeout_for(CallKind::Scoring),
        }
    }

    /// Requires `OPENROUTER_API_KEY`; `OPENROUTER_MODEL` overrides the model.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var(ENV_OPENROUTER_API_KEY)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ProviderError::MissingCredential(ENV_OPENROUTER_API_KEY))?;
        let mut config = Self::new(&api_key);
        if let Ok(model) = std::env::var(ENV_OPENROUTER_MODEL) {
            if !model.trim().is_empty() {
                config.model = model;
            }
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Verdict {
    overall_quality_score: f64,
    summary: Option<String>,
}

/// Render excerpts as fenced blocks, one per file.
fn format_excerpts(excerpts: &[SourceExcerpt]) -> String {
    excerpts
        .iter()
        .map(|e| {
            let fence = e.language.to_ascii_lowercase();
            let marker = if e.truncated { " (truncated)" } else { "" };
            format!("File: {}{}\n```{}\n{}\n```", e.path, marker, fence, e.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn user_prompt(excerpts: &[SourceExcerpt], language: Option<&str>) -> String {
    let language = language.map_or_else(String::new, |l| format!("Primary language: {l}\n\n"));
    format!(
        "{language}Analyze the following code files for quality:\n\n{}",
        format_excerpts(excerpts)
    )
}

/// Pull the verdict out of the model's reply, tolerating a fenced block.
fn parse_verdict(content: &str) -> Result<QualitativeScore, ProviderError> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed)
        .trim();

    let verdict: Verdict = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("verdict is not valid JSON: {e}")))?;
    if !verdict.overall_quality_score.is_finite() {
        return Err(ProviderError::InvalidResponse(
            "overall_quality_score is not a number".into(),
        ));
    }
    Ok(QualitativeScore {
        score: verdict.overall_quality_score,
        commentary: verdict.summary.filter(|s| !s.trim().is_empty()),
    })
}

/// [`QualitativeScorer`] backed by OpenRouter chat completions.
pub struct OpenRouterScorer {
    config: OpenRouterConfig,
    http_client: reqwest::Client,
}

impl OpenRouterScorer {
    pub fn new(config: OpenRouterConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(OpenRouterScorer {
            config,
            http_client,
        })
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(OpenRouterConfig::from_env()?)
    }

    fn request_body(&self, excerpts: &[SourceExcerpt], language: Option<&str>) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user_prompt(excerpts, language)},
            ],
            "response_format": {"type": "json_object"},
        })
    }

    async fn complete(
        &self,
        excerpts: &[SourceExcerpt],
        language: Option<&str>,
    ) -> Result<QualitativeScore, ProviderError> {
        if excerpts.is_empty() {
            return Err(ProviderError::InvalidRequest("no excerpts to score".into()));
        }
        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(excerpts, language))
            .send()
            .await?;
        let response = ensure_success(response, "chat/completions").await?;
        let chat: ChatResponse = response.json().await?;

        if let Some(usage) = &chat.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                model = %self.config.model,
                "scoring completed"
            );
        }
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no message in response".into()))?;
        parse_verdict(&content)
    }
}

#[async_trait]
impl QualitativeScorer for OpenRouterScorer {
    #[instrument(skip(self, excerpts), fields(files = excerpts.len(), model = %self.config.model))]
    async fn score(
        &self,
        excerpts: &[SourceExcerpt],
        language: Option<&str>,
    ) -> Result<QualitativeScore, CollaboratorError> {
        Ok(self.complete(excerpts, language).await?)
    }
}
