//! Domain types shared by the dense and sparse retrievers.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type ChunkId = String;

/// Provenance of a chunk inside its source document.
///
/// - `page` is 1-based
/// - `chunk_index` is 0-based and increases monotonically within a page
/// - `start_char`/`end_char` are offsets into the page text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub subject: String,
    pub source_id: String,
    pub source_title: String,
    pub page: u32,
    pub chunk_index: u32,
    pub start_char: usize,
    pub end_char: usize,
}

/// A bounded span of source text, the smallest retrievable unit.
///
/// Chunks are written once by ingestion and only read afterwards. Their order
/// in `chunks.json` is the row order of every index built over them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// One row of `vector_metadata.json`: the chunk id plus its flattened metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: ChunkId,
    #[serde(flatten)]
    pub metadata: ChunkMetadata,
}

impl From<&Chunk> for VectorRecord {
    fn from(chunk: &Chunk) -> Self {
        Self { id: chunk.id.clone(), metadata: chunk.metadata.clone() }
    }
}

/// The unit every retriever returns.
///
/// `score` is on the producing retriever's scale (raw cosine for dense,
/// min-max normalized for sparse, fused for hybrid). Higher is always better
/// and the value is always finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub score: f32,
    pub id: ChunkId,
    pub source_id: String,
    pub page: u32,
    pub chunk_index: u32,
}

impl RetrievalResult {
    pub fn from_metadata(id: &str, metadata: &ChunkMetadata, score: f32) -> Self {
        Self {
            score,
            id: id.to_string(),
            source_id: metadata.source_id.clone(),
            page: metadata.page,
            chunk_index: metadata.chunk_index,
        }
    }
}

/// Per-query parameters. Both fields are validated on construction, so a
/// `RetrievalConfig` value always satisfies `top_k > 0` and `alpha ∈ [0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalConfig {
    top_k: usize,
    alpha: Option<f32>,
}

impl RetrievalConfig {
    pub fn new(top_k: usize) -> Result<Self> {
        if top_k == 0 {
            return Err(Error::InvalidConfig("top_k must be a positive integer".to_string()));
        }
        Ok(Self { top_k, alpha: None })
    }

    pub fn with_alpha(mut self, alpha: f32) -> Result<Self> {
        validate_alpha(alpha)?;
        self.alpha = Some(alpha);
        Ok(self)
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn alpha(&self) -> Option<f32> {
        self.alpha
    }
}

pub fn validate_alpha(alpha: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&alpha) {
        return Err(Error::InvalidConfig(format!("alpha must be in [0, 1], got {alpha}")));
    }
    Ok(())
}

/// Rejects empty or whitespace-only query text.
pub fn validate_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(Error::InvalidInput("query must be a non-empty string".to_string()));
    }
    Ok(())
}
