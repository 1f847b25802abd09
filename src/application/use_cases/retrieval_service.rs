use crate::application::use_cases::embedding_service::{cosine_similarity, Embedder};
use crate::domain::error::{AppError, Result};
use crate::domain::generation::{ContextChunk, DocumentChunk};
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_TOP_K: usize = 5;
/// Threshold used when filtering is switched on without an explicit value.
pub const DEFAULT_MIN_SIMILARITY: f32 = 0.7;

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub min_similarity: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_similarity: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankedChunk<'a> {
    pub chunk: &'a DocumentChunk,
    pub similarity: f32,
}

pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    config: RetrievalConfig,
}

impl RetrievalService {
    pub fn new(embedder: Arc<dyn Embedder>, config: RetrievalConfig) -> Self {
        Self { embedder, config }
    }

    pub async fn embed_chunks(&self, chunks: &mut [DocumentChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self.embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(AppError::Internal(format!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = vector;
        }
        Ok(())
    }

    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("Embedder returned no query vector".to_string()))
    }

    pub fn rank<'a>(&self, query: &[f32], chunks: &'a [DocumentChunk]) -> Vec<RankedChunk<'a>> {
        rank_chunks(query, chunks, &self.config)
    }

    /// Embeds chunks and query, then returns the selected context in rank order.
    pub async fn select_context(
        &self,
        query: &str,
        chunks: &mut [DocumentChunk],
    ) -> Result<Vec<ContextChunk>> {
        self.embed_chunks(chunks).await?;
        let query_vector = self.embed_query(query).await?;
        let ranked = self.rank(&query_vector, chunks);
        debug!(
            candidates = chunks.len(),
            selected = ranked.len(),
            "Ranked document chunks"
        );
        Ok(ranked
            .into_iter()
            .map(|r| ContextChunk {
                chunk_index: r.chunk.chunk_index,
                content: r.chunk.content.clone(),
                similarity: r.similarity,
            })
            .collect())
    }
}

/// Top-k by cosine similarity, highest first. Ties keep chunk order.
pub fn rank_chunks<'a>(
    query: &[f32],
    chunks: &'a [DocumentChunk],
    config: &RetrievalConfig,
) -> Vec<RankedChunk<'a>> {
    let mut results: Vec<RankedChunk<'a>> = chunks
        .iter()
        .map(|chunk| RankedChunk {
            chunk,
            similarity: cosine_similarity(query, &chunk.embedding),
        })
        .filter(|r| match config.min_similarity {
            Some(threshold) => r.similarity >= threshold,
            None => true,
        })
        .collect();

    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    results.truncate(config.top_k);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::use_cases::embedding_service::HashingEmbedder;

    fn chunk(index: usize, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            id: format!("c{}", index),
            content: format!("chunk {}", index),
            embedding,
            document_id: "doc".to_string(),
            chunk_index: index,
        }
    }

    #[test]
    fn test_rank_orders_by_similarity_and_truncates() {
        let chunks: Vec<DocumentChunk> = (0..8)
            .map(|i| chunk(i, vec![1.0, i as f32]))
            .collect();
        let ranked = rank_chunks(&[0.0, 1.0], &chunks, &RetrievalConfig::default());

        assert_eq!(ranked.len(), DEFAULT_TOP_K);
        let indexes: Vec<usize> = ranked.iter().map(|r| r.chunk.chunk_index).collect();
        assert_eq!(indexes, vec![7, 6, 5, 4, 3]);
        assert!(ranked.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }

    #[test]
    fn test_threshold_drops_low_scores() {
        let chunks = vec![
            chunk(0, vec![1.0, 0.0]),
            chunk(1, vec![0.0, 1.0]),
            chunk(2, vec![1.0, 0.1]),
        ];
        let config = RetrievalConfig {
            top_k: 5,
            min_similarity: Some(DEFAULT_MIN_SIMILARITY),
        };
        let ranked = rank_chunks(&[1.0, 0.0], &chunks, &config);
        let indexes: Vec<usize> = ranked.iter().map(|r| r.chunk.chunk_index).collect();
        assert_eq!(indexes, vec![0, 2]);
    }

    #[test]
    fn test_zero_vectors_rank_with_zero_similarity() {
        let chunks = vec![chunk(0, Vec::new()), chunk(1, vec![0.0, 0.0])];
        let ranked = rank_chunks(&[1.0, 0.0], &chunks, &RetrievalConfig::default());
        assert!(ranked.iter().all(|r| r.similarity == 0.0));
    }

    #[tokio::test]
    async fn test_select_context_prefers_relevant_chunk() {
        let service = RetrievalService::new(
            Arc::new(HashingEmbedder::new(512)),
            RetrievalConfig {
                top_k: 1,
                min_similarity: None,
            },
        );
        let mut chunks = vec![
            chunk(0, Vec::new()),
            chunk(1, Vec::new()),
        ];
        chunks[0].content = "Cafeteria menu and parking rules".to_string();
        chunks[1].content = "Refund requests must be approved within five business days".to_string();

        let context = service
            .select_context("refund approval business days", &mut chunks)
            .await
            .unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(context[0].chunk_index, 1);
        assert!(!chunks[0].embedding.is_empty());
    }
}
