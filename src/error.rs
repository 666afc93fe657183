//! Error types for the mesh sync engine.

use thiserror::Error;

/// Errors that can occur while reconciling or persisting mesh state.
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for mesh sync operations.
pub type MeshResult<T> = Result<T, MeshError>;
