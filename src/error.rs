//! Error types for the balance watcher

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the balance watcher
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Key derivation errors
    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Key derivation failed: {0}")]
    Derivation(String),

    // Remote API errors
    #[error("Rate limited by remote API: {0}")]
    RateLimited(String),

    #[error("Remote API error {code}: {msg}")]
    RemoteApi { code: String, msg: String },

    #[error("Request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    // Persistence errors
    #[error("Store error: {0}")]
    Store(String),

    // Notification errors
    #[error("Notification failed: {0}")]
    Notification(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::RateLimited(_) | Error::Transport(_) | Error::Parse(_)
        )
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Parse(e.to_string())
        } else {
            Error::Transport(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
