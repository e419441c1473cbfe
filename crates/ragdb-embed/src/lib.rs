//! ragdb-embed
//!
//! Embedding functions for the dense retriever: a deterministic hashing
//! embedder for tests and offline work, and a local BGE-M3 model on candle.

pub mod device;
pub mod hashing;
pub mod model;
pub mod pool;
pub mod tokenize;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use ragdb_core::config::{expand_path, EmbeddingSettings};
use ragdb_core::traits::Embedder;

pub use hashing::HashEmbedder;
pub use model::LocalModelEmbedder;
pub use pool::masked_mean_l2;

/// Builds the embedder described by `settings`.
///
/// `APP_USE_FAKE_EMBEDDINGS=1` forces the hashing embedder regardless of the
/// settings, which keeps tests and CI away from model files.
pub fn default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let forced = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if forced || settings.fake {
        info!(dim = settings.dim, "using hashing embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dim)));
    }
    let configured = settings.model_dir.as_deref().map(expand_path);
    let model_dir = model::resolve_model_dir(configured.as_deref())?;
    Ok(Arc::new(LocalModelEmbedder::load(&model_dir, settings.max_len)?))
}
