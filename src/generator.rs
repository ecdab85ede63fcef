//! Hosted language-model providers implementing [`Generator`].
//!
//! - **[`DisabledGenerator`]**: always fails; used when no provider is configured.
//! - **[`OpenAIGenerator`]**: `POST /chat/completions`.
//! - **[`GeminiGenerator`]**: `POST /models/{model}:generateContent`.
//!
//! Use [`create_generator`] to instantiate the configured provider.
//!
//! Calls are made once. Quota, network and decoding failures all surface as
//! [`Error::GenerationFailure`] for the caller to report; nothing here
//! retries.

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::traits::Generator;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// ============ Disabled Generator ============

/// A generator that refuses every request.
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(Error::GenerationFailure(
            "generator is disabled; set [generator] provider in config".to_string(),
        ))
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::GenerationFailure(format!("failed to build HTTP client: {}", e)))
}

async fn read_error_body(provider: &str, response: reqwest::Response) -> Error {
    let status = response.status();
    let body_text = response.text().await.unwrap_or_default();
    Error::GenerationFailure(format!("{} API error {}: {}", provider, status, body_text))
}

// ============ OpenAI Generator ============

/// Chat-completions generator for OpenAI and compatible gateways.
pub struct OpenAIGenerator {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAIGenerator {
    /// Create a chat-completions client.
    ///
    /// `base_url` defaults to the public OpenAI endpoint.
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| OPENAI_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::GenerationFailure(format!("OpenAI request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(read_error_body("OpenAI", response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::GenerationFailure(format!("invalid OpenAI response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::GenerationFailure("OpenAI returned an empty answer".to_string()))
    }
}

// ============ Gemini Generator ============

/// `generateContent` generator for Google Gemini models.
pub struct GeminiGenerator {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: [GeminiContentOut<'a>; 1],
}

#[derive(Serialize)]
struct GeminiContentOut<'a> {
    parts: [GeminiPartOut<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPartOut<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentIn>,
}

#[derive(Deserialize)]
struct GeminiContentIn {
    #[serde(default)]
    parts: Vec<GeminiPartIn>,
}

#[derive(Deserialize)]
struct GeminiPartIn {
    #[serde(default)]
    text: String,
}

impl GeminiGenerator {
    /// Create a `generateContent` client.
    ///
    /// `base_url` defaults to the public Gemini v1beta endpoint.
    pub fn new(
        model: impl Into<String>,
        api_key: impl Into<String>,
        base_url: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url
                .unwrap_or_else(|| GEMINI_API_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GeminiRequest {
            contents: [GeminiContentOut {
                parts: [GeminiPartOut { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::GenerationFailure(format!("Gemini request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(read_error_body("Gemini", response).await);
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| Error::GenerationFailure(format!("invalid Gemini response: {}", e)))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| content.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(Error::GenerationFailure(
                "Gemini returned an empty answer".to_string(),
            ));
        }
        Ok(text)
    }
}

/// Create the configured [`Generator`].
///
/// | Config Value | Generator |
/// |-------------|-----------|
/// | `"disabled"` | [`DisabledGenerator`] |
/// | `"openai"` | [`OpenAIGenerator`] |
/// | `"gemini"` | [`GeminiGenerator`] |
///
/// # Errors
///
/// Unknown provider, missing `model`, or the API key environment variable
/// not being set.
pub fn create_generator(config: &GeneratorConfig) -> anyhow::Result<Arc<dyn Generator>> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledGenerator));
    }

    let model = config
        .model
        .clone()
        .ok_or_else(|| anyhow::anyhow!("generator.model required for {}", config.provider))?;
    let key_env = config.resolved_api_key_env();
    let api_key = std::env::var(key_env)
        .with_context(|| format!("{} environment variable not set", key_env))?;
    let timeout = Duration::from_secs(config.timeout_secs);

    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIGenerator::new(
            model,
            api_key,
            config.url.clone(),
            timeout,
        )?)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(
            model,
            api_key,
            config.url.clone(),
            timeout,
        )?)),
        other => bail!("Unknown generator provider: {}", other),
    }
}
