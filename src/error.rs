use std::path::PathBuf;

use thiserror::Error;

/// Failures while reading or normalizing the corpus document.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus matches no known shape (expected `positions` or `integrated_core_positions`)")]
    Format,

    #[error("failed to read corpus {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("corpus is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures while building or loading the embedding store.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding generation failed: {0}")]
    Generation(String),

    #[error("embedding function returned malformed data: {0}")]
    Malformed(String),

    #[error("embedding store I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("embedding store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("failed to read rule table {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("rule table is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Generation provider failures. Surfaced to callers as a terminal stream event.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0} API key not configured")]
    NotConfigured(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("{provider} request failed: {message}")]
    Request { provider: String, message: String },
}
