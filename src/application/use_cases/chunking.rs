use crate::domain::generation::DocumentChunk;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n[ \t]*\r?\n").unwrap());

const PARAGRAPH_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Upper bound in characters, separators included. A single paragraph
    /// longer than this is still emitted whole.
    pub max_chunk_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1000,
        }
    }
}

pub struct ChunkEngine {
    config: ChunkConfig,
}

impl ChunkEngine {
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    pub fn with_max_size(max_chunk_size: usize) -> Self {
        Self::new(ChunkConfig { max_chunk_size })
    }

    /// Paragraph-accumulating chunking, no overlap.
    pub fn chunk_text(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for para in split_paragraphs(text) {
            let para_len = para.chars().count();

            if !current.is_empty()
                && current_len + PARAGRAPH_SEPARATOR.len() + para_len > self.config.max_chunk_size
            {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }

            if !current.is_empty() {
                current.push_str(PARAGRAPH_SEPARATOR);
                current_len += PARAGRAPH_SEPARATOR.len();
            }
            current.push_str(para);
            current_len += para_len;
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    /// Chunks a document into owned records with fresh ids and no embedding yet.
    pub fn chunk_document(&self, document_id: &str, text: &str) -> Vec<DocumentChunk> {
        self.chunk_text(text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| DocumentChunk {
                id: Uuid::new_v4().to_string(),
                content,
                embedding: Vec::new(),
                document_id: document_id.to_string(),
                chunk_index,
            })
            .collect()
    }
}

/// Splits on blank lines, trimming each paragraph and dropping empty ones.
pub fn split_paragraphs(text: &str) -> Vec<&str> {
    PARAGRAPH_BREAK
        .split(text)
        .map(|para| para.trim())
        .filter(|para| !para.is_empty())
        .collect()
}

pub fn chunk(text: &str, max_size: usize) -> Vec<String> {
    ChunkEngine::with_max_size(max_size).chunk_text(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text() {
        let text = "This is a short text.";
        let chunks = chunk(text, 1000);
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk("  \n\n  ", 100).is_empty());
    }

    #[test]
    fn test_three_paragraphs_of_400() {
        let p1 = "a".repeat(400);
        let p2 = "b".repeat(400);
        let p3 = "c".repeat(400);
        let text = format!("{}\n\n{}\n\n{}", p1, p2, p3);

        let chunks = chunk(&text, 1000);
        assert_eq!(chunks, vec![format!("{}\n\n{}", p1, p2), p3]);
    }

    #[test]
    fn test_oversized_paragraph_is_kept_whole() {
        let small = "short paragraph".to_string();
        let big = "x".repeat(250);
        let text = format!("{}\n\n{}\n\n{}", small, big, small);

        let chunks = chunk(&text, 100);
        assert_eq!(chunks, vec![small.clone(), big, small]);
    }

    #[test]
    fn test_chunks_respect_bound_and_cover_paragraphs() {
        let paragraphs: Vec<String> = (0..25)
            .map(|i| format!("Paragraph {} {}", i, "word ".repeat(i * 7 % 40)))
            .map(|p| p.trim().to_string())
            .collect();
        let text = paragraphs.join("\n\n  \n");
        let max = 120;

        let chunks = chunk(&text, max);
        for c in &chunks {
            let single_paragraph = !c.contains(PARAGRAPH_SEPARATOR);
            assert!(c.chars().count() <= max || single_paragraph);
        }

        let rebuilt: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.split(PARAGRAPH_SEPARATOR))
            .collect();
        assert_eq!(rebuilt, paragraphs);
    }

    #[test]
    fn test_chunk_document_indexes_in_order() {
        let engine = ChunkEngine::with_max_size(10);
        let chunks = engine.chunk_document("doc-1", "first one\n\nsecond one\n\nthird");
        assert_eq!(chunks.len(), 3);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i);
            assert_eq!(c.document_id, "doc-1");
            assert!(c.embedding.is_empty());
        }
    }
}
