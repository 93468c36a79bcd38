//! Error types for the Taco bridge.
//!
//! One enum covers both sides: client-surfaced errors (remote exceptions,
//! protocol violations) and server execution errors (name lookup, handle
//! resolution), which the dispatch boundary flattens into exception
//! responses.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Taco operations.
#[derive(Debug, Error)]
pub enum TacoError {
    // Client-side: response interpretation
    #[error("received exception: {0}")]
    Received(String),

    #[error("received unknown action: {0}")]
    UnknownAction(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    // Transport and framing
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("malformed message: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Server-side execution
    #[error("object {0} not found")]
    ObjectNotFound(u64),

    #[error("cannot find \"{0}\"")]
    NameNotFound(String),

    #[error("no attribute \"{name}\" on {target}")]
    NoSuchAttribute { target: String, name: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    // Client construction
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to launch server {script:?}: {message}")]
    Spawn {
        script: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Generic
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Taco operations.
pub type Result<T> = std::result::Result<T, TacoError>;

impl From<std::io::Error> for TacoError {
    fn from(err: std::io::Error) -> Self {
        TacoError::Transport {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for TacoError {
    fn from(err: serde_json::Error) -> Self {
        TacoError::Decode {
            message: err.to_string(),
            source: Some(err),
        }
    }
}
