use thiserror::Error;

/// Error kinds surfaced by collaborators to the lifecycle engine.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vision error: {0}")]
    Vision(String),

    #[error("action error: {0}")]
    Action(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("plan blocked: {0}")]
    SecurityBlock(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("task cancelled")]
    Cancelled,

    #[error("unknown error: {0}")]
    Unknown(String),
}

pub type AppResult<T> = Result<T, AppError>;
