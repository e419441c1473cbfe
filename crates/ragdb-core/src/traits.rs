use crate::error::Result;
use crate::types::{RetrievalConfig, RetrievalResult};

/// Turns text into fixed-dimension vectors.
///
/// Implementations may call a local model or a remote service. A call must
/// return exactly one vector per input text, each of length `dim()`, or fail.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// The single retrieval capability shared by dense, sparse and hybrid retrievers.
pub trait Retriever: Send + Sync {
    fn retrieve(&self, query: &str, config: &RetrievalConfig) -> Result<Vec<RetrievalResult>>;

    /// Short label used in logs.
    fn name(&self) -> &'static str;
}
