use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use ragdb_core::artifacts::SubjectPaths;
use ragdb_core::config::StrategyConfig;
use ragdb_core::error::{Error, Result};
use ragdb_core::traits::{Embedder, Retriever};
use ragdb_core::types::validate_alpha;
use ragdb_text::SparseRetriever;
use ragdb_vector::DenseRetriever;

use crate::fusion::HybridRetriever;

pub const DEFAULT_ALPHA: f32 = 0.5;

/// Builds retrievers from a [`StrategyConfig`].
///
/// Owns the data directory and the embedding function; nothing else in the
/// workspace names a concrete retriever type.
#[derive(Clone)]
pub struct RetrieverFactory {
    data_dir: PathBuf,
    embedder: Option<Arc<dyn Embedder>>,
}

impl RetrieverFactory {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into(), embedder: None }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn create(&self, strategy: &StrategyConfig) -> Result<Arc<dyn Retriever>> {
        let retriever: Arc<dyn Retriever> = match strategy.kind.as_str() {
            "dense" => {
                let subject = subject_for(strategy, None, "dense")?;
                Arc::new(self.dense(strategy, subject)?)
            }
            "hybrid" => Arc::new(self.hybrid(strategy)?),
            other => {
                return Err(Error::InvalidConfig(format!(
                    "unknown retrieval strategy type '{other}' (expected 'dense' or 'hybrid')"
                )))
            }
        };
        info!(kind = %strategy.kind, retriever = retriever.name(), "retriever created");
        Ok(retriever)
    }

    fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        self.embedder
            .clone()
            .ok_or_else(|| Error::InvalidConfig("dense retrieval requires an embedding function".to_string()))
    }

    fn dense(&self, strategy: &StrategyConfig, subject: &str) -> Result<DenseRetriever> {
        let embedder = self.embedder()?;
        let timeout = match strategy.embed_timeout_ms {
            Some(0) => return Err(Error::InvalidConfig("embed_timeout_ms must be a positive integer".to_string())),
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };
        let retriever = DenseRetriever::open(&SubjectPaths::new(&self.data_dir, subject), embedder)?;
        Ok(match timeout {
            Some(t) => retriever.with_embed_timeout(t),
            None => retriever,
        })
    }

    fn hybrid(&self, strategy: &StrategyConfig) -> Result<HybridRetriever> {
        let alpha = strategy.alpha.unwrap_or(DEFAULT_ALPHA);
        validate_alpha(alpha)?;
        let dense_subject = subject_for(strategy, strategy.dense_subject.as_deref(), "dense")?;
        let sparse_subject = subject_for(strategy, strategy.sparse_subject.as_deref(), "sparse")?;

        let dense = self.dense(strategy, dense_subject)?;
        let sparse = SparseRetriever::open(&SubjectPaths::new(&self.data_dir, sparse_subject))?;
        Ok(HybridRetriever::new(Arc::new(dense), Arc::new(sparse), alpha)?.with_dense_scores(strategy.dense_scores))
    }
}

fn subject_for<'a>(strategy: &'a StrategyConfig, specific: Option<&'a str>, role: &str) -> Result<&'a str> {
    specific
        .or(strategy.subject.as_deref())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::InvalidConfig(format!("no {role} subject configured for strategy '{}'", strategy.kind)))
}
