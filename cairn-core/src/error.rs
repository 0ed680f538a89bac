use thiserror::Error;

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid media file: {0}")]
    InvalidMedia(String),

    #[error("Media not found: {0}")]
    NotFound(String),

    /// Cancellation is a distinct outcome, never folded into the generic
    /// failure path; callers own cleanup of any partial output.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MediaError::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
