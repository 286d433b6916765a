use thiserror::Error;

use crate::http::Method;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Precache failed for {url}: {reason}")]
    Install { url: String, reason: String },

    #[error("Only GET requests can be cached, got {0}")]
    UnsupportedMethod(Method),

    #[error("Invalid partition name: {0:?}")]
    InvalidPartitionName(String),

    #[error("Invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Cannot {operation} while agent is {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to (de)serialize partition: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::Network(err.to_string())
    }
}

impl CacheError {
    /// True for failures of the fetch itself, as opposed to non-OK statuses
    /// (which are not errors) or local storage problems.
    pub fn is_network(&self) -> bool {
        matches!(self, CacheError::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
