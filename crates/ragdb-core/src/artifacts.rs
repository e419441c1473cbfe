//! On-disk layout of a subject's artifacts and the read-only chunk store.
//!
//! Every file under `<data_dir>/<subject>/` is keyed by the same row order:
//! row `i` of `chunks.json`, `embeddings.json`, `vector.index` and
//! `vector_metadata.json` all describe the same chunk.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::{Chunk, VectorRecord};

pub const CHUNKS_FILENAME: &str = "chunks.json";
pub const EMBEDDINGS_FILENAME: &str = "embeddings.json";
pub const INDEX_FILENAME: &str = "vector.index";
pub const VECTOR_METADATA_FILENAME: &str = "vector_metadata.json";

#[derive(Debug, Clone)]
pub struct SubjectPaths {
    subject: String,
    dir: PathBuf,
}

impl SubjectPaths {
    pub fn new(data_dir: &Path, subject: &str) -> Self {
        Self { subject: subject.to_string(), dir: data_dir.join(subject) }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn chunks(&self) -> PathBuf {
        self.dir.join(CHUNKS_FILENAME)
    }

    pub fn embeddings(&self) -> PathBuf {
        self.dir.join(EMBEDDINGS_FILENAME)
    }

    pub fn index(&self) -> PathBuf {
        self.dir.join(INDEX_FILENAME)
    }

    pub fn vector_metadata(&self) -> PathBuf {
        self.dir.join(VECTOR_METADATA_FILENAME)
    }

    /// Fails with [`Error::MissingArtifact`] unless `path` is an existing file.
    pub fn require(&self, path: &Path) -> Result<()> {
        if path.is_file() {
            Ok(())
        } else {
            Err(Error::MissingArtifact { subject: self.subject.clone(), path: path.to_path_buf() })
        }
    }
}

/// Reads and decodes a JSON artifact belonging to `paths`' subject.
pub fn read_json<T: DeserializeOwned>(paths: &SubjectPaths, path: &Path) -> Result<T> {
    paths.require(path)?;
    let raw = fs::read_to_string(path).map_err(|_| Error::MissingArtifact {
        subject: paths.subject.clone(),
        path: path.to_path_buf(),
    })?;
    serde_json::from_str(&raw)
        .map_err(|e| Error::MalformedArtifact { path: path.to_path_buf(), reason: e.to_string() })
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Operation(format!("serialize {}: {e}", path.display())))?;
    fs::write(path, body)?;
    Ok(())
}

/// Loads the ordered chunk store for a subject.
///
/// Rejects chunks with empty text and duplicate ids: both would break the
/// one-id-one-chunk guarantee results rely on. An empty store is returned as
/// is; retrievers decide whether they can work with it.
pub fn load_chunks(paths: &SubjectPaths) -> Result<Vec<Chunk>> {
    let path = paths.chunks();
    let chunks: Vec<Chunk> = read_json(paths, &path)?;
    if let Some((row, chunk)) = chunks.iter().enumerate().find(|(_, c)| c.text.trim().is_empty()) {
        return Err(Error::MalformedArtifact {
            path,
            reason: format!("chunk '{}' at row {row} has empty text", chunk.id),
        });
    }
    ensure_unique_ids(&path, chunks.iter().map(|c| c.id.as_str()))?;
    debug!(subject = paths.subject(), chunks = chunks.len(), "loaded chunk store");
    Ok(chunks)
}

/// Loads `vector_metadata.json`, rejecting duplicate ids.
pub fn load_vector_metadata(paths: &SubjectPaths) -> Result<Vec<VectorRecord>> {
    let path = paths.vector_metadata();
    let records: Vec<VectorRecord> = read_json(paths, &path)?;
    ensure_unique_ids(&path, records.iter().map(|r| r.id.as_str()))?;
    Ok(records)
}

fn ensure_unique_ids<'a>(path: &Path, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for (row, id) in ids.enumerate() {
        if !seen.insert(id) {
            return Err(Error::MalformedArtifact {
                path: path.to_path_buf(),
                reason: format!("duplicate chunk id '{id}' at row {row}"),
            });
        }
    }
    Ok(())
}
