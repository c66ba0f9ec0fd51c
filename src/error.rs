//! Error types for the IC50 model.
//!
//! Shape and configuration problems abort the forward pass that hit them.
//! Numerical problems are reported, never repaired.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = ModelError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ModelError {
    /// A construction constant is unusable (zero width, kernel too wide, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An input does not have the shape fixed at construction time.
    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },

    #[error("token id {token} is outside the vocabulary (size {vocab_size})")]
    TokenOutOfVocabulary { token: i64, vocab_size: usize },

    /// Token sequences longer than `max_len` are rejected, not truncated.
    #[error("token sequence of length {len} exceeds max_len {max_len}")]
    SequenceTooLong { len: usize, max_len: usize },

    #[error("ragged batch: row {row} has {actual} entries, expected {expected}")]
    RaggedBatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("{count} non-finite value(s) in {what}")]
    NonFinite { what: &'static str, count: usize },

    #[error("latent sampling: {0}")]
    Sampling(String),

    #[error("weights {path}: {message}")]
    Weights { path: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ModelError {
    pub(crate) fn shape(what: &'static str, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        ModelError::ShapeMismatch {
            what,
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
