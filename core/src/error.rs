use crate::WindowId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or querying the retrieval structures.
///
/// `StartupConfig`, `CorruptStatistics`, `MalformedWindow` and
/// `DimensionMismatch` are fatal: the structures cannot be built or queried
/// safely. The remaining variants are recovered
/// locally and surface as warnings on a query outcome.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Missing or invalid startup input: {0}\nSuggestion: Check the command line flags and input paths")]
    StartupConfig(String),

    #[error("Corrupt document statistics: {0}\nSuggestion: Regenerate the statistics files from the same collection pass")]
    CorruptStatistics(String),

    #[error("Unknown term: {0}")]
    UnknownTerm(String),

    #[error("Window {window} unavailable: {reason}")]
    WindowUnavailable { window: WindowId, reason: String },

    #[error("Malformed cluster file {path}: {reason}\nSuggestion: Re-export centroids and assignments for this window")]
    MalformedWindow { path: PathBuf, reason: String },

    #[error("Degenerate vector: {0}")]
    DegenerateVector(String),

    #[error("Embedding has {found} components, the clusters were built with {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("Query budget of {budget_ms} ms exceeded after {completed} top-k levels")]
    BudgetExceeded { budget_ms: u64, completed: usize },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RetrievalError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// True when the error only degrades a single query or window.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnknownTerm(_)
                | Self::WindowUnavailable { .. }
                | Self::DegenerateVector(_)
                | Self::BudgetExceeded { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
