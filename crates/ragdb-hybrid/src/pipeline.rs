use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use ragdb_core::config::StrategyConfig;
use ragdb_core::error::Result;
use ragdb_core::traits::Retriever;
use ragdb_core::types::{RetrievalConfig, RetrievalResult};

use crate::factory::RetrieverFactory;

/// Query entry point: one retriever, built once, asked many times.
pub struct RetrievalPipeline {
    retriever: Arc<dyn Retriever>,
}

impl RetrievalPipeline {
    pub fn new(factory: &RetrieverFactory, strategy: &StrategyConfig) -> Result<Self> {
        Ok(Self::from_retriever(factory.create(strategy)?))
    }

    pub fn from_retriever(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }

    pub fn retriever_name(&self) -> &'static str {
        self.retriever.name()
    }

    pub fn run(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        let config = RetrievalConfig::new(top_k)?;
        self.run_with(query, &config)
    }

    /// Like [`run`](Self::run) with a caller-built config, e.g. one carrying
    /// a per-query fusion weight.
    pub fn run_with(&self, query: &str, config: &RetrievalConfig) -> Result<Vec<RetrievalResult>> {
        let started = Instant::now();
        let results = self.retriever.retrieve(query, config)?;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            retriever = self.retriever.name(),
            top_k = config.top_k(),
            elapsed_ms,
            results = results.len(),
            "retrieval complete"
        );
        Ok(results)
    }
}
