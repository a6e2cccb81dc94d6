//! Error types for choircheck

use thiserror::Error;

/// Result type alias using choircheck's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in choircheck
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Permission error: {0}")]
    Permission(String),

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Remote API error: {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
