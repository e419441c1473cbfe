//! Corpus registry: which source documents make up a subject.
//!
//! The registry is a JSON object keyed by subject:
//! `{"<subject>": {"sources": [{"id", "title", "path"}]}}`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusSource {
    pub id: String,
    pub title: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
struct SubjectEntry {
    sources: Vec<CorpusSource>,
}

pub fn load_corpus(registry_path: &Path, subject: &str) -> Result<Vec<CorpusSource>> {
    let raw = fs::read_to_string(registry_path).map_err(|_| Error::MissingArtifact {
        subject: subject.to_string(),
        path: registry_path.to_path_buf(),
    })?;
    let registry: HashMap<String, serde_json::Value> = serde_json::from_str(&raw).map_err(|e| {
        Error::MalformedArtifact { path: registry_path.to_path_buf(), reason: e.to_string() }
    })?;
    let entry = registry
        .get(subject)
        .ok_or_else(|| Error::NotFound(format!("unknown corpus subject '{subject}'")))?;
    let entry: SubjectEntry = serde_json::from_value(entry.clone()).map_err(|e| Error::MalformedArtifact {
        path: registry_path.to_path_buf(),
        reason: format!("invalid sources for subject '{subject}': {e}"),
    })?;
    Ok(entry.sources)
}
