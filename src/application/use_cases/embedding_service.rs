use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{LLMConfig, LLMProvider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Produces vectors for text. Retrieval only compares vectors and never
/// depends on how they were made.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Deterministic feature-hashing embedder. Tokens are hashed into signed
/// buckets and the result is L2-normalised, so shared vocabulary yields a
/// positive similarity without any model.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| token.len() > 1)
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % self.dimensions;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in vector.iter_mut() {
                *value /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct OpenAIEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct GeminiEmbeddingRequest {
    content: GeminiEmbeddingContent,
}

#[derive(Debug, Serialize)]
struct GeminiEmbeddingContent {
    parts: Vec<GeminiEmbeddingPart>,
}

#[derive(Debug, Serialize)]
struct GeminiEmbeddingPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbeddingResponse {
    embedding: GeminiEmbeddingResult,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbeddingResult {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embedding over HTTP: OpenAI-compatible, Gemini, or Ollama (Local).
pub struct RemoteEmbedder {
    client: Client,
    config: LLMConfig,
}

impl RemoteEmbedder {
    pub fn new(config: LLMConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn resolve_gemini_embedding_model(model: &str) -> String {
        let trimmed = model.trim().trim_start_matches("models/");
        if trimmed.contains("embedding") {
            trimmed.to_string()
        } else {
            "text-embedding-004".to_string()
        }
    }

    async fn post_json<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R> {
        let mut req = self.client.post(url);
        if let Some(api_key) = &self.config.api_key {
            if self.config.provider != LLMProvider::Google {
                req = req.bearer_auth(api_key);
            }
        }

        let response = req.json(body).send().await.map_err(|e| {
            AppError::LLMError(format!("Failed to call embedding API ({}): {}", url, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::LLMError(format!(
                "Embedding API returned error {}: {}",
                status, error_text
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| AppError::LLMError(format!("Failed to parse embedding response: {}", e)))
    }

    async fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let request = OpenAIEmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };
        let response: OpenAIEmbeddingResponse = self.post_json(&url, &request).await?;
        if response.data.len() != texts.len() {
            return Err(AppError::LLMError(format!(
                "Embedding API returned {} vectors for {} inputs",
                response.data.len(),
                texts.len()
            )));
        }
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn embed_gemini(&self, text: &str) -> Result<Vec<f32>> {
        let api_key = self
            .config
            .api_key
            .clone()
            .ok_or_else(|| AppError::LLMError("Missing API key for Google provider".to_string()))?;
        let mut base_url = self.config.base_url.trim_end_matches('/').to_string();
        if !base_url.ends_with("/models") {
            base_url = format!("{}/models", base_url);
        }
        let model_id = Self::resolve_gemini_embedding_model(&self.config.model);
        let url = format!("{}/{}:embedContent?key={}", base_url, model_id, api_key);

        let request = GeminiEmbeddingRequest {
            content: GeminiEmbeddingContent {
                parts: vec![GeminiEmbeddingPart {
                    text: text.to_string(),
                }],
            },
        };
        let response: GeminiEmbeddingResponse = self.post_json(&url, &request).await?;
        Ok(response.embedding.values)
    }

    async fn embed_ollama(&self, text: &str) -> Result<Vec<f32>> {
        let base = self
            .config
            .base_url
            .trim_end_matches('/')
            .trim_end_matches("/v1")
            .to_string();
        let url = format!("{}/api/embeddings", base);
        let request = OllamaEmbeddingRequest {
            model: &self.config.model,
            prompt: text,
        };
        let response: OllamaEmbeddingResponse = self.post_json(&url, &request).await?;
        Ok(response.embedding)
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let embeddings = match self.config.provider {
            LLMProvider::OpenAI | LLMProvider::OpenRouter => self.embed_openai(texts).await?,
            LLMProvider::Google => {
                let mut out = Vec::with_capacity(texts.len());
                for text in texts {
                    out.push(self.embed_gemini(text).await?);
                }
                out
            }
            LLMProvider::Local => {
                let mut out = Vec::with_capacity(texts.len());
                for text in texts {
                    out.push(self.embed_ollama(text).await?);
                }
                out
            }
        };

        if embeddings.iter().any(|e| e.is_empty()) {
            return Err(AppError::LLMError("Empty embedding response".to_string()));
        }
        Ok(embeddings)
    }
}

/// `dot(a, b) / (|a| * |b|)`, or 0 when either norm is 0 or lengths differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);
    }

    #[test]
    fn test_cosine_self_and_zero() {
        let v = vec![0.3, -1.2, 4.5, 0.01];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
        assert_eq!(cosine_similarity(&v, &[0.0; 4]), 0.0);
        assert_eq!(cosine_similarity(&[0.0; 4], &[0.0; 4]), 0.0);
    }

    #[test]
    fn test_cosine_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic_and_normalised() {
        let embedder = HashingEmbedder::new(64);
        let texts = vec![
            "Customer onboarding requires KYC".to_string(),
            "Customer onboarding requires KYC".to_string(),
        ];
        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors[0], vectors[1]);
        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_prefers_shared_vocabulary() {
        let embedder = HashingEmbedder::new(512);
        let query = embedder.embed_one("payment refund policy");
        let related = embedder.embed_one("the refund policy for a payment dispute");
        let unrelated = embedder.embed_one("office parking allocation rules");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_hashing_embedder_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(8);
        assert!(embedder.embed_one("").iter().all(|x| *x == 0.0));
    }
}
