use crate::domain::jobs::JobKind;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by the prediction, retraining and simulation pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Data unavailable: {reason}")]
    DataUnavailable { reason: String },

    #[error("No model is loaded")]
    ModelNotLoaded,

    #[error("Model version not found: {version}")]
    VersionNotFound { version: String },

    #[error("Validation failed: {reason}")]
    Validation { reason: String },

    #[error("A {kind} job is already running (started at {started_at})")]
    ConcurrencyConflict {
        kind: JobKind,
        started_at: DateTime<Utc>,
    },

    #[error("Feature schema mismatch: expected {expected} columns, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("Artifact {version} is corrupted: {reason}")]
    CorruptArtifact { version: String, reason: String },

    #[error("Training failed: {reason}")]
    Training { reason: String },

    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl PipelineError {
    pub fn data_unavailable(reason: impl Into<String>) -> Self {
        PipelineError::DataUnavailable {
            reason: reason.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        PipelineError::Validation {
            reason: reason.into(),
        }
    }

    pub fn training(reason: impl Into<String>) -> Self {
        PipelineError::Training {
            reason: reason.into(),
        }
    }

    /// True for the NotFound family: nothing active, or the requested artifact is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PipelineError::ModelNotLoaded | PipelineError::VersionNotFound { .. }
        )
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        // Typed errors that crossed an anyhow boundary keep their identity.
        match err.downcast::<PipelineError>() {
            Ok(typed) => typed,
            Err(other) => PipelineError::Storage(other),
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
