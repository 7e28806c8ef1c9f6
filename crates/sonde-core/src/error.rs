//! Error types and handling for conformance runs

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for sonde operations
///
/// These are harness-side failures. Server misbehavior is never an error: it is
/// reported as a `Fail` step outcome. A `SondeError` that reaches a step turns
/// into an `Error` outcome instead.
#[derive(Debug, Error)]
pub enum SondeError {
    /// The transport could not complete the exchange (refused, timed out, ...)
    #[error("Transport error for {url}: {message}")]
    Transport { url: String, message: String },

    /// A response arrived but the harness cannot interpret it
    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// The external profile validator failed to produce a verdict
    #[error("Validator error: {message}")]
    Validator { message: String },

    /// Configuration loading or validation errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Unknown resource type requested from the catalog
    #[error("No sequence is defined for resource type '{resource_type}'")]
    UnknownResourceType { resource_type: String },

    /// File system I/O errors
    #[error("IO error for path '{path}': {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

/// Error kind enumeration for categorizing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Response,
    Validator,
    Config,
    Catalog,
    Io,
    Json,
    Internal,
}

impl SondeError {
    /// Get the error kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SondeError::Transport { .. } => ErrorKind::Transport,
            SondeError::InvalidResponse { .. } => ErrorKind::Response,
            SondeError::Validator { .. } => ErrorKind::Validator,
            SondeError::ConfigError { .. } => ErrorKind::Config,
            SondeError::UnknownResourceType { .. } => ErrorKind::Catalog,
            SondeError::IoError { .. } => ErrorKind::Io,
            SondeError::Json(_) => ErrorKind::Json,
            SondeError::InternalError { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this error is recoverable (the run can carry on with the next step)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transport | ErrorKind::Response | ErrorKind::Validator | ErrorKind::Json
        )
    }

    /// Create a transport error
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an invalid response error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Create a validator error
    pub fn validator(message: impl Into<String>) -> Self {
        Self::Validator {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create an unknown resource type error
    pub fn unknown_resource_type(resource_type: impl Into<String>) -> Self {
        Self::UnknownResourceType {
            resource_type: resource_type.into(),
        }
    }

    /// Create an IO error with path context
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }
}

/// Convert from std::io::Error
impl From<std::io::Error> for SondeError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError {
            path: PathBuf::new(),
            source: err,
        }
    }
}
