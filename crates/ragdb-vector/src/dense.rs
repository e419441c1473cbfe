use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use ragdb_core::artifacts::{load_chunks, load_vector_metadata, read_json, SubjectPaths};
use ragdb_core::error::{Error, Result};
use ragdb_core::normalize::l2_normalize;
use ragdb_core::traits::{Embedder, Retriever};
use ragdb_core::types::{validate_query, RetrievalConfig, RetrievalResult, VectorRecord};

use crate::index::FlatIpIndex;

/// Embedding-based retriever over a read-only [`FlatIpIndex`].
///
/// Scores are raw cosine similarities in `[-1, 1]`.
pub struct DenseRetriever {
    subject: String,
    index: FlatIpIndex,
    records: Vec<VectorRecord>,
    embedder: Arc<dyn Embedder>,
    embed_timeout: Option<Duration>,
}

impl DenseRetriever {
    /// Assembles a retriever from already-loaded parts. `records[i]` must
    /// describe index row `i`.
    pub fn new(
        subject: &str,
        index: FlatIpIndex,
        records: Vec<VectorRecord>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        if records.len() != index.len() {
            return Err(Error::Consistency(format!(
                "subject '{subject}': {} metadata records for {} index rows",
                records.len(),
                index.len()
            )));
        }
        if embedder.dim() != index.dim() {
            return Err(Error::Consistency(format!(
                "subject '{subject}': embedder dimension {} does not match index dimension {}",
                embedder.dim(),
                index.dim()
            )));
        }
        Ok(Self { subject: subject.to_string(), index, records, embedder, embed_timeout: None })
    }

    /// Loads the vector matrix, the serialized index and the metadata list
    /// for a subject and checks that all three agree on shape. When the
    /// subject also has a chunk store, the metadata must list the same ids in
    /// the same row order, so dense artifacts left over from an earlier
    /// ingestion are refused.
    pub fn open(paths: &SubjectPaths, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let matrix: Vec<Vec<f32>> = read_json(paths, &paths.embeddings())?;
        let index = FlatIpIndex::load(paths)?;
        let records = load_vector_metadata(paths)?;

        if matrix.len() != index.len() {
            return Err(Error::Consistency(format!(
                "subject '{}': vector matrix has {} rows, index has {}",
                paths.subject(),
                matrix.len(),
                index.len()
            )));
        }
        if let Some((row, v)) = matrix.iter().enumerate().find(|(_, v)| v.len() != index.dim()) {
            return Err(Error::Consistency(format!(
                "subject '{}': vector matrix row {row} has dimension {}, index has {}",
                paths.subject(),
                v.len(),
                index.dim()
            )));
        }

        if paths.chunks().is_file() {
            ensure_matches_chunk_store(paths, &records)?;
        }

        let retriever = Self::new(paths.subject(), index, records, embedder)?;
        info!(
            subject = paths.subject(),
            rows = retriever.index.len(),
            dim = retriever.index.dim(),
            "dense retriever ready"
        );
        Ok(retriever)
    }

    /// Bounds the embedding call; an expired call fails the retrieval.
    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = Some(timeout);
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn call_embedder(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let outcome = match self.embed_timeout {
            None => self.embedder.embed_batch(&texts),
            Some(timeout) => {
                let embedder = Arc::clone(&self.embedder);
                let (tx, rx) = mpsc::channel();
                thread::Builder::new()
                    .name("ragdb-embed-query".to_string())
                    .spawn(move || {
                        let _ = tx.send(embedder.embed_batch(&texts));
                    })?;
                match rx.recv_timeout(timeout) {
                    Ok(outcome) => outcome,
                    Err(RecvTimeoutError::Timeout) => {
                        return Err(Error::upstream(
                            "embedding",
                            format!("subject '{}': timed out after {} ms", self.subject, timeout.as_millis()),
                        ))
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(Error::upstream(
                            "embedding",
                            format!("subject '{}': embedding worker exited without a result", self.subject),
                        ))
                    }
                }
            }
        };
        outcome.map_err(|e| Error::upstream("embedding", format!("subject '{}': {e:#}", self.subject)))
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let vectors = self.call_embedder(vec![query.to_string()])?;
        if vectors.len() != 1 {
            return Err(Error::Consistency(format!(
                "subject '{}': embedder returned {} vectors for one query",
                self.subject,
                vectors.len()
            )));
        }
        let v = &vectors[0];
        if v.len() != self.index.dim() {
            return Err(Error::Consistency(format!(
                "subject '{}': query embedding has dimension {}, index has {}",
                self.subject,
                v.len(),
                self.index.dim()
            )));
        }
        l2_normalize(v)
    }
}

impl Retriever for DenseRetriever {
    fn retrieve(&self, query: &str, config: &RetrievalConfig) -> Result<Vec<RetrievalResult>> {
        validate_query(query)?;
        let q = self.embed_query(query)?;
        let k = config.top_k().min(self.index.len());
        let neighbors = self.index.search(&q, k)?;

        let mut results = Vec::with_capacity(k);
        for (score, row) in neighbors.iter() {
            let Some(record) = usize::try_from(row).ok().and_then(|r| self.records.get(r)) else {
                continue;
            };
            if !score.is_finite() {
                return Err(Error::Consistency(format!(
                    "subject '{}': non-finite similarity for chunk '{}'",
                    self.subject, record.id
                )));
            }
            results.push(RetrievalResult::from_metadata(&record.id, &record.metadata, score));
        }
        if results.is_empty() {
            warn!(subject = %self.subject, "dense search returned no rows");
        }
        debug!(subject = %self.subject, top_k = config.top_k(), results = results.len(), "dense retrieval");
        Ok(results)
    }

    fn name(&self) -> &'static str {
        "dense"
    }
}

fn ensure_matches_chunk_store(paths: &SubjectPaths, records: &[VectorRecord]) -> Result<()> {
    let chunks = load_chunks(paths)?;
    if chunks.len() != records.len() {
        return Err(Error::Consistency(format!(
            "subject '{}': chunk store has {} chunks, dense metadata has {} rows; re-run embedding",
            paths.subject(),
            chunks.len(),
            records.len()
        )));
    }
    if let Some((row, (chunk, record))) =
        chunks.iter().zip(records).enumerate().find(|(_, (c, r))| c.id != r.id)
    {
        return Err(Error::Consistency(format!(
            "subject '{}': row {row} is chunk '{}' in the chunk store but '{}' in dense metadata",
            paths.subject(),
            chunk.id,
            record.id
        )));
    }
    Ok(())
}
