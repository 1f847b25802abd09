use crate::application::use_cases::embedding_service::{Embedder, HashingEmbedder, RemoteEmbedder};
use crate::application::{CsvImportUseCase, GenerationPipeline, JobTracker, ReconcileUseCase};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::{AppConfig, EmbeddingProvider};
use crate::infrastructure::db::SqliteStorage;
use crate::infrastructure::llm_clients::{LLMClient, RouterClient};
use crate::infrastructure::storage::Storage;
use crate::interfaces::http::{start_server, HttpState};
use actix_web::web;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn build_embedder(config: &AppConfig) -> Arc<dyn Embedder> {
    match config.embedding.provider {
        EmbeddingProvider::Hashing => {
            Arc::new(HashingEmbedder::new(config.embedding.dimensions))
        }
        EmbeddingProvider::Remote => Arc::new(RemoteEmbedder::new(config.embedding_llm_config())),
    }
}

/// Wires storage, use cases and the HTTP server from the loaded configuration.
pub async fn build_state(config: &AppConfig) -> Result<HttpState> {
    let storage: Arc<dyn Storage> = Arc::new(
        SqliteStorage::connect(&config.database.path, config.database.max_connections).await?,
    );
    let llm_client: Arc<dyn LLMClient + Send + Sync> = Arc::new(RouterClient::new());
    let tracker = Arc::new(JobTracker::new(storage.clone()));
    let pipeline = Arc::new(GenerationPipeline::new(
        tracker.clone(),
        storage.clone(),
        llm_client,
        build_embedder(config),
        config.llm.clone(),
        &config.pipeline,
    ));

    Ok(HttpState {
        pipeline,
        tracker,
        csv_import: CsvImportUseCase::new(storage.clone()),
        reconciler: ReconcileUseCase::new(storage.clone()),
        storage,
    })
}

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;
    init_tracing(&config.log_level);

    tracing::info!(
        database = %config.database.path.display(),
        provider = ?config.llm.provider,
        model = %config.llm.model,
        embedding = ?config.embedding.provider,
        "Starting testcase-forge"
    );

    let state = web::Data::new(build_state(&config).await?);
    let (host, port) = config.bind_address();
    let server = start_server(state, &host, port)?;
    server
        .await
        .map_err(|e| AppError::IoError(format!("HTTP server stopped: {}", e)))
}
