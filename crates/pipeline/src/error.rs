//! Error types for pipeline runs and per-bundle publication.

use rulecast_core::CoreError;

/// Errors that abort a whole pipeline run (or prevent wiring it).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A rule, allow-list or settings collaborator failed.
    #[error("{name} source failed: {message}")]
    Source { name: &'static str, message: String },

    /// Catalog or configuration contract violation.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Notify watcher error: {0}")]
    Notify(#[from] notify::Error),
}

impl PipelineError {
    pub fn source_failed(name: &'static str, message: impl Into<String>) -> Self {
        Self::Source {
            name,
            message: message.into(),
        }
    }
}

/// Failure of a single bundle publication. Never crosses bundle boundaries.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode bundle payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to emit bundle update: {0}")]
    Emit(String),
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;
