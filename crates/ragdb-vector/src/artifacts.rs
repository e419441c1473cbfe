//! Offline writer for a subject's dense artifacts.
//!
//! Embeds every chunk in row order, normalizes the rows, builds the index and
//! writes `embeddings.json`, `vector.index` and `vector_metadata.json`. Runs
//! once per subject; query-time code only reads what this produces.

use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use ragdb_core::artifacts::{write_json, SubjectPaths};
use ragdb_core::error::{Error, Result};
use ragdb_core::normalize::l2_normalize_rows;
use ragdb_core::traits::Embedder;
use ragdb_core::types::{Chunk, VectorRecord};

use crate::index::FlatIpIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenseArtifacts {
    pub rows: usize,
    pub dim: usize,
}

pub fn write_dense_artifacts(
    paths: &SubjectPaths,
    chunks: &[Chunk],
    embedder: &dyn Embedder,
    batch_size: usize,
) -> Result<DenseArtifacts> {
    if chunks.is_empty() {
        return Err(Error::InvalidInput(format!("subject '{}' has no chunks to embed", paths.subject())));
    }
    if batch_size == 0 {
        return Err(Error::InvalidConfig("batch_size must be a positive integer".to_string()));
    }

    let pb = ProgressBar::new(chunks.len() as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
    for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
        let batch_start = batch_no * batch_size;
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed_batch(&texts).map_err(|e| {
            Error::upstream(
                "embedding",
                format!("subject '{}', batch_start={batch_start}, batch_size={}: {e:#}", paths.subject(), batch.len()),
            )
        })?;
        if embedded.len() != batch.len() {
            return Err(Error::Consistency(format!(
                "subject '{}': embedder returned {} vectors for batch of {} at {batch_start}",
                paths.subject(),
                embedded.len(),
                batch.len()
            )));
        }
        vectors.extend(embedded);
        pb.set_position(vectors.len() as u64);
    }
    pb.finish_and_clear();

    let vectors = l2_normalize_rows(&vectors)?;
    let index = FlatIpIndex::build(&vectors)?;
    let records: Vec<VectorRecord> = chunks.iter().map(VectorRecord::from).collect();

    write_json(&paths.embeddings(), &vectors)?;
    index.save(&paths.index())?;
    write_json(&paths.vector_metadata(), &records)?;

    info!(subject = paths.subject(), rows = index.len(), dim = index.dim(), "wrote dense artifacts");
    Ok(DenseArtifacts { rows: index.len(), dim: index.dim() })
}
