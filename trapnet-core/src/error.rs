//! Error types shared across the trapnet workspace.

use thiserror::Error;

/// Top-level error type for attack and defense operations.
#[derive(Debug, Error)]
pub enum TrapnetError {
    /// Unsupported or inconsistent configuration. Always fatal, never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A cluster analyzer precondition failed (for example more than two
    /// clusters where a binary analyzer is required). Signals a deeper
    /// pipeline misconfiguration such as a wrong `nb_clusters`.
    #[error("Analysis error: {0}")]
    Analysis(String),

    /// Malformed dataset input (empty set, label/sample length mismatch).
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Malformed model input or output (shape mismatch, empty logits).
    #[error("Model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl TrapnetError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, TrapnetError>;
