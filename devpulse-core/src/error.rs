//! Error types for devpulse-core

use thiserror::Error;

/// Main error type for the devpulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level HTTP failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the remote API
    #[error("API error ({status}) for {url}: {body}")]
    Api {
        status: u16,
        url: String,
        body: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A paginated resource never stopped returning continuation tokens
    #[error("pagination error for {key}: {message}")]
    Pagination { key: String, message: String },
}

/// Result type alias for devpulse-core
pub type Result<T> = std::result::Result<T, Error>;
