//! Error types for the discovery engine
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use std::path::PathBuf;
use thiserror::Error;

use crate::vector::VectorError;

/// Coarse error taxonomy exposed to callers of the search surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The request itself is unusable (no modality, wrong dimension, bad limit).
    InvalidInput,
    /// An id is unknown to the index or the search history.
    NotFound,
    /// A collaborator failed; a less refined result is still valid.
    Degraded,
    /// Index or mapping storage is unusable.
    Fatal,
}

/// Main error type for index and search operations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error(transparent)]
    InvalidVector(#[from] VectorError),

    #[error("No search input supplied. Provide text, images, or a social URL")]
    NoInput,

    #[error("Product '{id}' not found in the index")]
    NotFound { id: String },

    #[error("Search '{id}' not found in the search history")]
    SearchNotFound { id: String },

    #[error("Stage '{stage}' degraded: {reason}")]
    Degraded { stage: String, reason: String },

    #[error("Index storage at '{path}' is unusable: {reason}")]
    Fatal { path: PathBuf, reason: String },

    #[error("Failed to persist '{path}': {source}")]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Search did not finish within {millis} ms")]
    DeadlineExceeded { millis: u64 },

    #[error("Search worker pool is unavailable: {reason}")]
    WorkerUnavailable { reason: String },

    #[error("Invalid configuration: {reason}")]
    Config { reason: String },
}

impl EngineError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn fatal(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Fatal {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Maps the error onto the caller-facing taxonomy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput { .. } | Self::InvalidVector(_) | Self::NoInput => {
                ErrorCategory::InvalidInput
            }
            Self::NotFound { .. } | Self::SearchNotFound { .. } => ErrorCategory::NotFound,
            Self::Degraded { .. } | Self::DeadlineExceeded { .. } => ErrorCategory::Degraded,
            Self::Fatal { .. }
            | Self::Persistence { .. }
            | Self::WorkerUnavailable { .. }
            | Self::Config { .. } => ErrorCategory::Fatal,
        }
    }

    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::InvalidVector(_) => "INVALID_VECTOR",
            Self::NoInput => "NO_INPUT",
            Self::NotFound { .. } => "PRODUCT_NOT_FOUND",
            Self::SearchNotFound { .. } => "SEARCH_NOT_FOUND",
            Self::Degraded { .. } => "DEGRADED",
            Self::Fatal { .. } => "INDEX_CORRUPTED",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::DeadlineExceeded { .. } => "DEADLINE_EXCEEDED",
            Self::WorkerUnavailable { .. } => "WORKER_UNAVAILABLE",
            Self::Config { .. } => "CONFIG_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Fatal { .. } => vec![
                "Restore vectors.arena and mapping.json from the same backup",
                "Re-run 'seekstyle index <catalog>' against an empty index directory",
            ],
            Self::Persistence { .. } => vec![
                "Check disk space and permissions in the index directory",
                "The in-memory index was left unchanged; retry the mutation",
            ],
            Self::InvalidVector(_) => vec![
                "Ensure every vector comes from the configured embedding model",
                "Check 'vector.dimension' in settings.toml",
            ],
            Self::NoInput => vec!["Pass --text, --image or --social"],
            Self::DeadlineExceeded { .. } => vec![
                "Raise 'vector.search_deadline_ms' or add search workers",
                "Run 'seekstyle compact' if the index has many tombstones",
            ],
            Self::Config { .. } => vec!["Run 'seekstyle init --force' to regenerate settings"],
            _ => vec![],
        }
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Error raised by an external collaborator (cache, signals, history, social).
///
/// Collaborator failures are caught at the point of use and never fail a search.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{collaborator} failed: {reason}")]
pub struct ProviderError {
    pub collaborator: &'static str,
    pub reason: String,
}

impl ProviderError {
    pub fn new(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Self {
            collaborator,
            reason: reason.into(),
        }
    }
}

/// Result type alias for collaborator calls
pub type ProviderResult<T> = Result<T, ProviderError>;
