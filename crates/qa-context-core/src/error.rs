//! Error taxonomy for the retrieval engine.

use thiserror::Error;

/// Failures surfaced by the retrieval core.
///
/// `Load` is fatal at startup. `Encoding` and `Generation` are per-request
/// and reach the caller. `DimensionMismatch` and `EmptyResultSet` signal a
/// broken invariant rather than bad user input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrievalError {
    #[error("load failed: {0}")]
    Load(String),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("dimension mismatch: index has {expected} dims, query vector has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("empty result set: top_k resolved to 0")]
    EmptyResultSet,

    #[error("engine is not ready (state: {0})")]
    NotReady(String),

    #[error("generation failed: {0}")]
    Generation(String),
}

impl RetrievalError {
    /// Stable machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RetrievalError::Load(_) => "load_failed",
            RetrievalError::Encoding(_) => "encoding_failed",
            RetrievalError::DimensionMismatch { .. } => "internal",
            RetrievalError::EmptyResultSet => "internal",
            RetrievalError::NotReady(_) => "not_ready",
            RetrievalError::Generation(_) => "generation_failed",
        }
    }
}

pub type Result<T, E = RetrievalError> = std::result::Result<T, E>;
