pub mod gemini;
pub mod openai;

use crate::domain::error::Result;
use crate::domain::llm_config::{LLMConfig, LLMProvider, LlmResponse};
use async_trait::async_trait;
use gemini::GeminiClient;
use openai::OpenAICompatibleClient;

/// The external generation capability: accepts a prompt, returns text.
/// Callers impose their own timeout; dropping the future aborts the request.
#[async_trait]
pub trait LLMClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<LlmResponse>;
}

pub struct RouterClient {
    openai: OpenAICompatibleClient,
    gemini: GeminiClient,
}

impl RouterClient {
    pub fn new() -> Self {
        Self {
            openai: OpenAICompatibleClient::new(),
            gemini: GeminiClient::new(),
        }
    }
}

impl Default for RouterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for RouterClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<LlmResponse> {
        match config.provider {
            LLMProvider::Google => self.gemini.generate(config, system, user).await,
            _ => self.openai.generate(config, system, user).await,
        }
    }
}
