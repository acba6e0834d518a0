//! Error types for semdex.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Unsupported model output: {0}")]
    UnsupportedOutput(String),

    #[error("Pad length unknown for index '{0}'")]
    PadLengthUnknown(String),

    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("Engine rejected request: {0}")]
    EngineRejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
