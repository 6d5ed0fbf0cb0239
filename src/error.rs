//! Error handling and custom error types
//!
//! Provides unified error handling across the application using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Credential rejected: {0}")]
    InvalidCredential(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("AI provider error: {0}")]
    AiProvider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl Error {
    /// True for provider throttling responses, the only errors worth retrying.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited(_))
    }

    /// Credential problems stop the whole batch rather than a single item.
    pub fn is_credential(&self) -> bool {
        matches!(self, Error::MissingCredential(_) | Error::InvalidCredential(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
