use super::LLMClient;
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, LLMProvider, LlmResponse, UsageMetadata};
use async_trait::async_trait;
use serde_json::json;

/// Chat-completions client for OpenAI, OpenRouter and local OpenAI-compatible servers.
pub struct OpenAICompatibleClient {
    client: reqwest::Client,
}

impl OpenAICompatibleClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn api_key(config: &LLMConfig) -> Result<Option<String>> {
        match (&config.api_key, config.provider) {
            (Some(key), _) => Ok(Some(key.clone())),
            (None, LLMProvider::Local) => Ok(None),
            (None, provider) => Err(AppError::LLMError(format!(
                "Missing API key for {:?} provider",
                provider
            ))),
        }
    }
}

impl Default for OpenAICompatibleClient {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn parse_usage(json: &serde_json::Value) -> Option<UsageMetadata> {
    let usage = json.get("usage")?;
    let read = |key: &str| usage.get(key).and_then(|v| v.as_u64()).map(|v| v as u32);
    Some(UsageMetadata {
        prompt_tokens: read("prompt_tokens"),
        completion_tokens: read("completion_tokens"),
        total_tokens: read("total_tokens"),
    })
}

#[async_trait]
impl LLMClient for OpenAICompatibleClient {
    async fn generate(&self, config: &LLMConfig, system: &str, user: &str) -> Result<LlmResponse> {
        let api_key = Self::api_key(config)?;
        let url = format!("{}/chat/completions", config.base_url.trim_end_matches('/'));

        let body = json!({
            "model": config.model,
            "messages": [
                {
                    "role": "system",
                    "content": system
                },
                {
                    "role": "user",
                    "content": user
                }
            ],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(api_key) = api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::LLMError(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::LLMError(format!(
                "API error ({}): {}",
                status, text
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to parse JSON: {}", e)))?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::LLMError("Invalid response format".to_string()))?;

        Ok(LlmResponse {
            text,
            usage: parse_usage(&json),
        })
    }
}
