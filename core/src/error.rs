//! Error types for the Feedy API client.
//!
//! # Design
//! Every operation returns `ApiResult<T>`. `Transport` is the only variant
//! that represents a genuine network fault; the others describe what the
//! API answered (or what was rejected locally), so callers can tell them
//! apart with `is_transport()` and otherwise handle failure uniformly.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by `FeedyClient` and `FeedyApi`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced an HTTP response (DNS, connect, TLS, I/O).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a status other than 200.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The body was not JSON, or lacked the field the caller needed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A local precondition failed; nothing was sent.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The file to upload could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The client configuration is invalid or incomplete.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for network-level failures, false for anything the API answered.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// The HTTP status carried by an `HttpStatus` error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A failure inside a `Transport` implementation.
#[derive(Debug, Error)]
#[error("transport failure: {message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying error, keeping it reachable through `source()`.
    pub fn with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
