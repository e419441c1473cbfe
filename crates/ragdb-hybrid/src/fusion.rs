use std::cmp::Ordering;
use std::collections::HashMap;
use std::panic;
use std::sync::Arc;
use std::thread;

use tracing::debug;

use ragdb_core::config::DenseScoreMode;
use ragdb_core::error::Result;
use ragdb_core::traits::Retriever;
use ragdb_core::types::{validate_alpha, validate_query, RetrievalConfig, RetrievalResult};

/// Weighted fusion of a dense and a sparse retriever:
/// `fused = alpha * dense + (1 - alpha) * sparse`, a missing side counting as 0.
pub struct HybridRetriever {
    dense: Arc<dyn Retriever>,
    sparse: Arc<dyn Retriever>,
    alpha: f32,
    dense_scores: DenseScoreMode,
}

impl HybridRetriever {
    pub fn new(dense: Arc<dyn Retriever>, sparse: Arc<dyn Retriever>, alpha: f32) -> Result<Self> {
        validate_alpha(alpha)?;
        Ok(Self { dense, sparse, alpha, dense_scores: DenseScoreMode::Raw })
    }

    pub fn with_dense_scores(mut self, mode: DenseScoreMode) -> Self {
        self.dense_scores = mode;
        self
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn dense_scores(&self) -> DenseScoreMode {
        self.dense_scores
    }
}

impl Retriever for HybridRetriever {
    fn retrieve(&self, query: &str, config: &RetrievalConfig) -> Result<Vec<RetrievalResult>> {
        validate_query(query)?;
        let alpha = config.alpha().unwrap_or(self.alpha);

        let (dense, sparse) = thread::scope(|s| {
            let dense = s.spawn(|| self.dense.retrieve(query, config));
            let sparse = self.sparse.retrieve(query, config);
            (dense.join().unwrap_or_else(|payload| panic::resume_unwind(payload)), sparse)
        });
        let mut dense = dense?;
        let sparse = sparse?;

        if self.dense_scores == DenseScoreMode::Clip {
            for r in &mut dense {
                r.score = r.score.clamp(0.0, 1.0);
            }
        }

        let fused = fuse(&dense, &sparse, alpha, config.top_k());
        debug!(
            alpha,
            dense = dense.len(),
            sparse = sparse.len(),
            fused = fused.len(),
            "hybrid fusion"
        );
        Ok(fused)
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }
}

/// Merges two ranked lists into one by weighted score addition.
///
/// Dense results seed the table, sparse results add to or extend it. The
/// output is sorted by fused score descending; the sort is stable, so equal
/// scores keep first-insertion order. At most `top_k` results are returned.
pub fn fuse(dense: &[RetrievalResult], sparse: &[RetrievalResult], alpha: f32, top_k: usize) -> Vec<RetrievalResult> {
    let mut merged: Vec<RetrievalResult> = Vec::with_capacity(dense.len() + sparse.len());
    let mut slot: HashMap<String, usize> = HashMap::with_capacity(dense.len() + sparse.len());

    let mut add = |r: &RetrievalResult, weighted: f32| match slot.get(&r.id).copied() {
        Some(i) => merged[i].score += weighted,
        None => {
            slot.insert(r.id.clone(), merged.len());
            merged.push(RetrievalResult { score: weighted, ..r.clone() });
        }
    };
    for r in dense {
        add(r, alpha * r.score);
    }
    for r in sparse {
        add(r, (1.0 - alpha) * r.score);
    }

    merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    merged.truncate(top_k);
    merged
}
