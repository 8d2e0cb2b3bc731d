use crate::llm_provider::*;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DASHSCOPE_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DASHSCOPE_US_BASE_URL: &str = "https://dashscope-us.aliyuncs.com/compatible-mode/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const LMSTUDIO_BASE_URL: &str = "http://localhost:1234/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Configuration for OpenAI-compatible chat endpoints (DashScope, OpenAI, LM Studio, Ollama)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAICompatibleConfig {
    /// Base URL for the API (e.g., "http://localhost:1234/v1")
    pub base_url: String,
    /// Model to use
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Optional API key (some providers require it, some don't)
    pub api_key: Option<String>,
    /// Provider name for display purposes
    pub provider_name: String,
    /// Upper bound on generated tokens, when the caller wants one
    pub max_tokens: Option<usize>,
}

impl Default for OpenAICompatibleConfig {
    fn default() -> Self {
        Self {
            base_url: LMSTUDIO_BASE_URL.to_string(),
            model: "local-model".to_string(),
            timeout_secs: 120,
            api_key: None,
            provider_name: "openai-compatible".to_string(),
            max_tokens: None,
        }
    }
}

impl OpenAICompatibleConfig {
    /// Create config for Alibaba DashScope's compatible-mode endpoint
    pub fn dashscope(model: String, api_key: String) -> Self {
        Self {
            base_url: DASHSCOPE_BASE_URL.to_string(),
            model,
            api_key: Some(api_key),
            provider_name: "qwen".to_string(),
            ..Default::default()
        }
    }

    /// Create config for LM Studio
    pub fn lm_studio(model: String) -> Self {
        Self {
            base_url: LMSTUDIO_BASE_URL.to_string(),
            model,
            provider_name: "lmstudio".to_string(),
            ..Default::default()
        }
    }

    /// Create config for Ollama (OpenAI-compatible endpoint)
    pub fn ollama(model: String) -> Self {
        Self {
            base_url: OLLAMA_BASE_URL.to_string(),
            model,
            provider_name: "ollama".to_string(),
            ..Default::default()
        }
    }

    /// DashScope hosts accept (and need) `enable_thinking: false` for plain replies;
    /// other endpoints reject unknown fields.
    pub fn is_dashscope(&self) -> bool {
        self.base_url.contains("dashscope")
    }
}

/// OpenAI-compatible LLM provider
pub struct OpenAICompatibleProvider {
    config: OpenAICompatibleConfig,
    client: Client,
}

impl OpenAICompatibleProvider {
    /// Create a new OpenAI-compatible provider
    pub fn new(config: OpenAICompatibleConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OpenAICompatibleConfig {
        &self.config
    }

    fn build_request(&self, messages: &[Message], config: &GenerationConfig) -> ChatCompletionsRequest {
        ChatCompletionsRequest {
            model: self.config.model.clone(),
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            temperature: config.temperature,
            max_tokens: config.max_tokens.or(self.config.max_tokens),
            enable_thinking: if self.config.is_dashscope() {
                Some(false)
            } else {
                None
            },
        }
    }

    /// One request, no retries: a failure is reported to the caller as-is.
    async fn send_request(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> Result<ChatCompletionsResponse> {
        let request = self.build_request(messages, config);
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let mut request_builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request);

        // Add API key if provided
        if let Some(api_key) = &self.config.api_key {
            request_builder =
                request_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request_builder.send().await.context(format!(
            "Failed to send request to {} Chat Completions API at {}",
            self.config.provider_name, self.config.base_url
        ))?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            return Err(anyhow!(
                "{} API error ({}): {}",
                self.config.provider_name,
                status,
                error_text
            ));
        }

        response.json().await.context(format!(
            "Failed to parse {} Chat Completions API response",
            self.config.provider_name
        ))
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn generate_chat(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
    ) -> LLMResult<LLMResponse> {
        let chat_response = self.send_request(messages, config).await?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices in response"))?;

        debug!(
            "{} replied ({} chars, finish_reason={:?})",
            self.config.provider_name,
            choice.message.content.len(),
            choice.finish_reason
        );

        Ok(LLMResponse {
            content: choice.message.content,
            total_tokens: chat_response.usage.as_ref().map(|u| u.total_tokens),
            prompt_tokens: chat_response.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: chat_response.usage.as_ref().map(|u| u.completion_tokens),
            finish_reason: choice.finish_reason,
            model: chat_response
                .model
                .unwrap_or_else(|| self.config.model.clone()),
        })
    }

    fn provider_name(&self) -> &str {
        &self.config.provider_name
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

// API request/response types for Chat Completions API

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    enable_thinking: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}
