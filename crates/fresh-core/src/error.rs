//! Error types for fresh-core

use crate::StatusCode;
use fresh_router::InsertError;
use thiserror::Error;

/// Result type alias for fresh operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the fresh router
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid HTTP method
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),

    /// Invalid path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Route registration rejected by the trie (includes parameter conflicts)
    #[error("Invalid route: {0}")]
    Route(#[from] InsertError),

    /// Route not found
    #[error("Route not found: {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// Path matched, method did not
    #[error("Method not allowed: {method} {path}")]
    MethodNotAllowed { method: String, path: String },

    /// A before/after middleware failed
    #[error("middleware failed: {0}")]
    Middleware(Box<Error>),

    /// The route controller failed
    #[error("controller failed: {0}")]
    Controller(Box<Error>),

    /// A global response filter failed
    #[error("filter failed: {0}")]
    Filter(Box<Error>),

    /// Handler-chosen status and message
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// Redirect with a non-3xx code
    #[error("Invalid redirect status: {0}")]
    InvalidRedirect(u16),

    /// Body too large
    #[error("Body too large: {size} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { size: usize, limit: usize },

    /// Handler panicked
    #[error("Handler panicked: {0}")]
    Panic(String),

    /// The WebSocket peer is gone
    #[error("WebSocket closed")]
    WebSocketClosed,

    /// Config parse error
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Hyper error (server only)
    #[cfg(feature = "server")]
    #[error("HTTP error: {0}")]
    Hyper(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Error carrying an explicit response status
    pub fn status(status: impl Into<StatusCode>, message: impl Into<String>) -> Self {
        Error::Status {
            status: status.into(),
            message: message.into(),
        }
    }

    pub(crate) fn middleware(self) -> Self {
        Error::Middleware(Box::new(self))
    }

    pub(crate) fn controller(self) -> Self {
        Error::Controller(Box::new(self))
    }

    pub(crate) fn filter(self) -> Self {
        Error::Filter(Box::new(self))
    }

    /// The error with stage wrappers removed
    pub fn root(&self) -> &Error {
        match self {
            Error::Middleware(inner) | Error::Controller(inner) | Error::Filter(inner) => inner.root(),
            other => other,
        }
    }

    /// Stage that produced the error, if it came from a request chain
    pub fn stage(&self) -> &'static str {
        match self {
            Error::Middleware(_) => "middleware",
            Error::Controller(_) => "controller",
            Error::Filter(_) => "filter",
            _ => "dispatch",
        }
    }

    /// Status this error maps to when it carries one
    pub fn explicit_status(&self) -> Option<StatusCode> {
        match self.root() {
            Error::Status { status, .. } => Some(*status),
            Error::RouteNotFound { .. } => Some(StatusCode::NOT_FOUND),
            Error::MethodNotAllowed { .. } => Some(StatusCode::METHOD_NOT_ALLOWED),
            Error::InvalidMethod(_) => Some(StatusCode::NOT_IMPLEMENTED),
            Error::BodyTooLarge { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            _ => None,
        }
    }
}
