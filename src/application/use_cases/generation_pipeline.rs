use crate::application::use_cases::chunking::ChunkEngine;
use crate::application::use_cases::embedding_service::Embedder;
use crate::application::use_cases::job_tracker::JobTracker;
use crate::application::use_cases::retrieval_service::{RetrievalConfig, RetrievalService};
use crate::application::use_cases::test_generation::GenerationOrchestrator;
use crate::domain::error::{AppError, GenerationError, Result};
use crate::domain::generation::{ContextChunk, GenerationRequest};
use crate::domain::llm_config::LLMConfig;
use crate::domain::processing_job::{JobType, ProcessingJob};
use crate::domain::test_case::NewTestCase;
use crate::infrastructure::config::PipelineConfig;
use crate::infrastructure::llm_clients::LLMClient;
use crate::infrastructure::storage::Storage;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const PROGRESS_STARTED: u8 = 10;
pub const PROGRESS_CHUNKED: u8 = 30;
pub const PROGRESS_CONTEXT_SELECTED: u8 = 50;
pub const PROGRESS_GENERATED: u8 = 85;

/// Everything one generation run needs about its document.
#[derive(Debug, Clone)]
pub struct GenerationInput {
    pub document_id: String,
    pub document_title: String,
    pub document_type: String,
    pub content: String,
    pub requirements: Option<String>,
    /// Overrides the configured model for this run. Endpoint and key stay server-side.
    pub model: Option<String>,
}

/// Runs chunk, rank, generate and persist for one document in a background task,
/// recording the lifecycle on its job.
pub struct GenerationPipeline {
    tracker: Arc<JobTracker>,
    storage: Arc<dyn Storage>,
    chunker: ChunkEngine,
    retrieval: RetrievalService,
    orchestrator: GenerationOrchestrator,
    llm_config: LLMConfig,
}

impl GenerationPipeline {
    pub fn new(
        tracker: Arc<JobTracker>,
        storage: Arc<dyn Storage>,
        llm_client: Arc<dyn LLMClient + Send + Sync>,
        embedder: Arc<dyn Embedder>,
        llm_config: LLMConfig,
        settings: &PipelineConfig,
    ) -> Self {
        Self {
            tracker,
            storage,
            chunker: ChunkEngine::with_max_size(settings.chunk_max_size),
            retrieval: RetrievalService::new(
                embedder,
                RetrievalConfig {
                    top_k: settings.top_k,
                    min_similarity: settings.min_similarity,
                },
            ),
            orchestrator: GenerationOrchestrator::new(llm_client, settings.generation_timeout()),
            llm_config,
        }
    }

    /// Creates the job and returns it without waiting for the run.
    pub async fn dispatch(self: &Arc<Self>, input: GenerationInput) -> Result<ProcessingJob> {
        if input.content.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Document content is required.".to_string(),
            ));
        }
        if input.document_title.trim().is_empty() {
            return Err(AppError::ValidationError(
                "Document title is required.".to_string(),
            ));
        }

        let job = self
            .tracker
            .create_job(&input.document_id, JobType::TestCaseGeneration)
            .await?;

        let pipeline = Arc::clone(self);
        let job_id = job.id.clone();
        tokio::spawn(async move {
            pipeline.run(&job_id, input).await;
        });

        Ok(job)
    }

    async fn run(&self, job_id: &str, input: GenerationInput) {
        match self.execute(job_id, &input).await {
            Ok(generated) => {
                info!(job_id = %job_id, document_id = %input.document_id, generated, "Generation run finished");
            }
            Err(err) => {
                error!(job_id = %job_id, document_id = %input.document_id, "Generation run failed: {}", err);
                if let Err(fail_err) = self.tracker.fail(job_id, err.to_string()).await {
                    warn!(job_id = %job_id, "Could not record job failure: {}", fail_err);
                }
            }
        }
    }

    async fn execute(&self, job_id: &str, input: &GenerationInput) -> Result<usize> {
        self.tracker.start(job_id).await?;
        self.tracker
            .report_progress(job_id, PROGRESS_STARTED)
            .await?;

        let mut chunks = self
            .chunker
            .chunk_document(&input.document_id, &input.content);
        if chunks.is_empty() {
            return Err(AppError::ValidationError(
                "Document produced no text chunks.".to_string(),
            ));
        }
        self.tracker
            .report_progress(job_id, PROGRESS_CHUNKED)
            .await?;

        let candidates = chunks.len();
        let context = if candidates == 1 {
            chunks
                .into_iter()
                .map(|chunk| ContextChunk {
                    chunk_index: chunk.chunk_index,
                    content: chunk.content,
                    similarity: 1.0,
                })
                .collect()
        } else {
            self.retrieval
                .select_context(&retrieval_query(input), &mut chunks)
                .await?
        };
        if context.is_empty() {
            warn!(job_id = %job_id, candidates, "No chunk met the similarity threshold");
            return Err(GenerationError::NoRelevantContext { candidates }.into());
        }
        self.tracker
            .report_progress(job_id, PROGRESS_CONTEXT_SELECTED)
            .await?;

        let request = GenerationRequest {
            document_title: input.document_title.clone(),
            document_type: input.document_type.clone(),
            context,
            requirements: input.requirements.clone(),
            config: generation_config(&self.llm_config, input.model.as_deref()),
        };
        let confidence = confidence_score(&request.context);
        let output = self.orchestrator.generate(&request).await?;
        self.tracker
            .report_progress(job_id, PROGRESS_GENERATED)
            .await?;

        let generated = output.test_cases.len();
        let new_cases = output
            .test_cases
            .into_iter()
            .map(|draft| {
                NewTestCase::from_draft(draft, &input.document_id, confidence, &output.context_used)
            })
            .collect();
        self.storage.create_test_cases(new_cases).await?;

        self.tracker
            .complete(
                job_id,
                json!({
                    "generated": generated,
                    "contextUsed": output.context_used,
                    "processingTimeMs": output.processing_time_ms,
                    "metadata": output.metadata,
                }),
            )
            .await?;
        Ok(generated)
    }
}

fn retrieval_query(input: &GenerationInput) -> String {
    let mut parts = vec![input.document_title.trim(), input.document_type.trim()];
    if let Some(requirements) = input.requirements.as_deref() {
        parts.push(requirements.trim());
    }
    parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The configured settings with only the model swapped in.
fn generation_config(base: &LLMConfig, model: Option<&str>) -> LLMConfig {
    let mut config = base.clone();
    if let Some(model) = model.map(str::trim).filter(|model| !model.is_empty()) {
        config.model = model.to_string();
    }
    config
}

/// Mean similarity of the context used, clamped to `[0, 1]`.
fn confidence_score(context: &[ContextChunk]) -> f32 {
    if context.is_empty() {
        return 0.0;
    }
    let mean = context.iter().map(|c| c.similarity).sum::<f32>() / context.len() as f32;
    mean.clamp(0.0, 1.0)
}
