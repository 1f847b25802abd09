use crate::domain::llm_config::{LLMConfig, UsageMetadata};
use crate::domain::test_case::TestCaseDraft;
use serde::{Deserialize, Serialize};

/// A bounded slice of document text. Immutable once produced by a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub document_id: String,
    pub chunk_index: usize,
}

/// A chunk selected as generation context, with its ranking score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextChunk {
    pub chunk_index: usize,
    pub content: String,
    pub similarity: f32,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub document_title: String,
    pub document_type: String,
    pub context: Vec<ContextChunk>,
    pub requirements: Option<String>,
    pub config: LLMConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    pub model: String,
    pub prompt_version: String,
    pub usage: Option<UsageMetadata>,
    pub repaired: bool,
    pub received: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutput {
    pub test_cases: Vec<TestCaseDraft>,
    pub metadata: GenerationMetadata,
    pub context_used: Vec<usize>,
    pub processing_time_ms: u64,
}
