//! Together image synthesizer
//!
//! Calls the Together images endpoint with the structured prompt and returns
//! the hosted URL of the result. The image bytes are never downloaded here.

use std::time::Duration;

use async_trait::async_trait;
use codecat_core::{CallKind, CollaboratorError, ImageSynthesizer, RetryPolicy};
use codecat_state::{ImagePrompt, ImageRef};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{ensure_success, ProviderError};
use crate::USER_AGENT;

pub const ENV_TOGETHER_API_KEY: &str = "TOGETHER_API_KEY";
pub const ENV_TOGETHER_MODEL: &str = "TOGETHER_MODEL";
pub const DEFAULT_BASE_URL: &str = "https://api.together.xyz/v1";
pub const DEFAULT_MODEL: &str = "black-forest-labs/FLUX.1.1-pro";
pub const DEFAULT_STEPS: u32 = 20;

/// Together configuration
#[derive(Debug, Clone)]
pub struct TogetherConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    /// Diffusion steps per image.
    pub steps: u32,
    pub timeout: Duration,
}

impl TogetherConfig {
    pub fn new(api_key: &str) -> Self {
        TogetherConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            steps: DEFAULT_STEPS,
            timeout: RetryPolicy::default().timeout_for(CallKind::Imaging),
        }
    }

    /// Requires `TOGETHER_API_KEY`; `TOGETHER_MODEL` overrides the model.
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var(ENV_TOGETHER_API_KEY)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ProviderError::MissingCredential(ENV_TOGETHER_API_KEY))?;
        let mut config = Self::new(&api_key);
        if let Ok(model) = std::env::var(ENV_TOGETHER_MODEL) {
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

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    width: u32,
    height: u32,
    steps: u32,
    n: u32,
    seed: u64,
    response_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    data: Vec<GeneratedImage>,
}

fn first_url(response: GenerationResponse) -> Result<String, ProviderError> {
    response
        .data
        .into_iter()
        .find_map(|image| image.url.filter(|u| !u.is_empty()))
        .ok_or_else(|| ProviderError::InvalidResponse("no image URL in response".into()))
}

/// [`ImageSynthesizer`] backed by Together's image generation API.
pub struct TogetherImageSynthesizer {
    config: TogetherConfig,
    http_client: reqwest::Client,
}

impl TogetherImageSynthesizer {
    pub fn new(config: TogetherConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()?;
        Ok(TogetherImageSynthesizer {
            config,
            http_client,
        })
    }

    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(TogetherConfig::from_env()?)
    }

    fn request<'a>(&'a self, prompt: &'a ImagePrompt) -> GenerationRequest<'a> {
        GenerationRequest {
            model: &self.config.model,
            prompt: &prompt.text,
            width: prompt.width,
            height: prompt.height,
            steps: self.config.steps,
            n: 1,
            // The API takes a signed 64-bit seed.
            seed: prompt.seed >> 1,
            response_format: "url",
        }
    }

    async fn generate(&self, prompt: &ImagePrompt) -> Result<ImageRef, ProviderError> {
        if prompt.text.trim().is_empty() {
            return Err(ProviderError::InvalidRequest("prompt is empty".into()));
        }
        let url = format!("{}/images/generations", self.config.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request(prompt))
            .send()
            .await?;
        let response = ensure_success(response, "images/generations").await?;
        let image_url = first_url(response.json().await?)?;
        info!(model = %self.config.model, url = %image_url, "image generated");

        Ok(ImageRef {
            url: image_url,
            provider: "together".to_string(),
            model: Some(self.config.model.clone()),
        })
    }
}

#[async_trait]
impl ImageSynthesizer for TogetherImageSynthesizer {
    #[instrument(skip(self, prompt), fields(seed = prompt.seed))]
    async fn synthesize(&self, prompt: &ImagePrompt) -> Result<ImageRef, CollaboratorError> {
        Ok(self.generate(prompt).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt(text: &str) -> ImagePrompt {
        ImagePrompt {
            text: text.into(),
            width: 768,
            height: 432,
            seed: u64::MAX,
        }
    }

    #[test]
    fn request_mirrors_the_prompt() {
        let synth = TogetherImageSynthesizer::new(TogetherConfig::new("key").with_steps(4)).unwrap();
        let p = prompt("A groomed senior tabby");
        let body = serde_json::to_value(synth.request(&p)).unwrap();
        assert_eq!(body["width"], 768);
        assert_eq!(body["height"], 432);
        assert_eq!(body["steps"], 4);
        assert_eq!(body["response_format"], "url");
        assert_eq!(body["seed"].as_u64(), Some(i64::MAX as u64));
        assert_eq!(
            TogetherConfig::new("key").timeout,
            RetryPolicy::default().timeout_for(CallKind::Imaging)
        );
    }

    #[test]
    fn first_non_empty_url_wins() {
        let raw = r#"{"data": [{"url": ""}, {"url": "https://cdn.example/cat.png"}]}"#;
        let url = first_url(serde_json::from_str(raw).unwrap()).unwrap();
        assert_eq!(url, "https://cdn.example/cat.png");

        let empty = r#"{"data": []}"#;
        assert!(matches!(
            first_url(serde_json::from_str(empty).unwrap()),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn blank_prompt_is_rejected_without_a_request() {
        let synth = TogetherImageSynthesizer::new(
            TogetherConfig::new("key").with_base_url("http://127.0.0.1:9"),
        )
        .unwrap();
        let err = synth.synthesize(&prompt("   ")).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::Permanent(msg) if msg.contains("prompt is empty")));
    }
}
