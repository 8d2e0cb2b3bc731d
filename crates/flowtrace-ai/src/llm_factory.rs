use crate::llm_provider::*;
use crate::openai_compatible_provider::{
    OpenAICompatibleConfig, OpenAICompatibleProvider, DASHSCOPE_BASE_URL, DASHSCOPE_US_BASE_URL,
    LMSTUDIO_BASE_URL, OLLAMA_BASE_URL, OPENAI_BASE_URL,
};
use anyhow::{anyhow, Result};
use flowtrace_core::LLMConfig;
use std::sync::Arc;
use tracing::info;

/// Factory for creating LLM providers based on configuration
pub struct LLMProviderFactory;

impl LLMProviderFactory {
    /// Create an LLM provider from configuration
    pub fn create_from_config(config: &LLMConfig) -> Result<Arc<dyn LLMProvider>> {
        let compat_config = Self::resolve(config)?;
        info!(
            "Using {} provider at {} (model {})",
            compat_config.provider_name, compat_config.base_url, compat_config.model
        );
        Ok(Arc::new(OpenAICompatibleProvider::new(compat_config)?))
    }

    /// Endpoint, credentials and display name for a configured provider.
    /// An explicit `base_url` always wins over the provider's default endpoint.
    pub fn resolve(config: &LLMConfig) -> Result<OpenAICompatibleConfig> {
        let provider_name = config.provider.to_lowercase();

        let (default_url, needs_key) = match provider_name.as_str() {
            "qwen" | "dashscope" => (Some(DASHSCOPE_BASE_URL), true),
            "qwen-us" | "dashscope-us" => (Some(DASHSCOPE_US_BASE_URL), true),
            "openai" => (Some(OPENAI_BASE_URL), true),
            "lmstudio" => (Some(LMSTUDIO_BASE_URL), false),
            "ollama" => (Some(OLLAMA_BASE_URL), false),
            "openai-compatible" => (None, false),
            _ => {
                return Err(anyhow!(
                    "Unsupported LLM provider: {}. Available providers: {}",
                    provider_name,
                    Self::supported_providers().join(", ")
                ))
            }
        };

        let base_url = config
            .base_url
            .clone()
            .or_else(|| default_url.map(str::to_string))
            .ok_or_else(|| {
                anyhow!(
                    "OpenAI-compatible base URL not found. Set 'base_url' in [llm] \
                     or FLOWTRACE_LLM_BASE_URL"
                )
            })?;

        if needs_key && config.api_key.is_none() {
            return Err(anyhow!(
                "{} API key not found. Set DASHSCOPE_API_KEY or OPENAI_API_KEY",
                provider_name
            ));
        }

        if config.model.trim().is_empty() {
            return Err(anyhow!("Model name is required for {} provider", provider_name));
        }

        Ok(OpenAICompatibleConfig {
            base_url,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
            api_key: config.api_key.clone(),
            provider_name,
            max_tokens: config.max_tokens,
        })
    }

    pub fn supported_providers() -> Vec<&'static str> {
        vec![
            "qwen",
            "dashscope",
            "qwen-us",
            "dashscope-us",
            "openai",
            "lmstudio",
            "ollama",
            "openai-compatible",
        ]
    }
}
