//! Z.AI chat completion provider.
//!
//! Wraps the generic OpenAI-compatible provider and uses `[llm.zai]` config
//! so GLM-family endpoints can be selected explicitly with `llm.default = "zai"`
//! or per request with `provider = "zai"`.

use crate::llm::{ChatMessage, LlmResponse, ProviderError, TokenStream};

use super::openai_compatible::OpenAiCompatibleProvider;

#[derive(Debug, Clone)]
pub struct ZaiProvider {
    inner: OpenAiCompatibleProvider,
}

impl ZaiProvider {
    pub fn new(
        api_base_url: String,
        model: String,
        timeout_seconds: u64,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        let inner =
            OpenAiCompatibleProvider::new(api_base_url, model, timeout_seconds, api_key)?;
        Ok(Self { inner })
    }

    pub fn model(&self) -> &str {
        self.inner.model()
    }

    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<LlmResponse, ProviderError> {
        self.inner.complete(messages, temperature, max_tokens).await
    }

    pub async fn complete_json(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<LlmResponse, ProviderError> {
        self.inner.complete_json(messages, temperature, max_tokens).await
    }

    pub async fn stream_tokens(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<TokenStream, ProviderError> {
        self.inner.stream_tokens(messages, temperature, max_tokens).await
    }
}
