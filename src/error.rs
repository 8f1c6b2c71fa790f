use serde::Serialize;

use crate::document::DocumentError;

#[derive(Debug, thiserror::Error)]
pub enum BadgeError {
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("No async runtime available: {0}")]
    NoRuntime(String),

    #[error("Unread count out of range: {0}")]
    OutOfRange(String),

    #[error("Invalid badge payload: {0}")]
    InvalidPayload(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Serialize for BadgeError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type BadgeResult<T> = Result<T, BadgeError>;
