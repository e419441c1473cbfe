use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing artifact for subject '{subject}': {}", path.display())]
    MissingArtifact { subject: String, path: PathBuf },

    #[error("Malformed artifact {}: {reason}", path.display())]
    MalformedArtifact { path: PathBuf, reason: String },

    #[error("Consistency error: {0}")]
    Consistency(String),

    /// The embedding call (or another collaborator outside the core) failed.
    #[error("Retrieval failed during {stage}: {message}")]
    Upstream { stage: &'static str, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn upstream(stage: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Upstream { stage, message: err.to_string() }
    }

    /// Input errors are the only ones a caller can fix by retrying with different arguments.
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
