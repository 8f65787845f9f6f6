//! Unified error handling for the keywind crate
//!
//! Most of the resolution pipeline is best-effort and reports failures as
//! missing result entries rather than errors. The `Error` type here covers the
//! few places where a hard failure is the right answer: configuration problems
//! and client construction.

use thiserror::Error;

// Re-export the client error for convenience
pub use crate::client::ClientError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Network-related errors (HTTP, timeout, rate limit)
    Network,
    /// Wire-protocol and response-validation errors
    Protocol,
    /// Configuration and validation errors
    Config,
    /// Other/unknown errors
    Other,
}

/// Unified error type for the keywind crate
#[derive(Error, Debug)]
pub enum Error {
    /// Batch client errors (transport, status, validation)
    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Client(e) => e.is_transient(),
            Self::Config(_) => false,
            Self::Other { .. } => false,
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Client(ClientError::InvalidResponse(_)) => ErrorCategory::Protocol,
            Self::Client(_) => ErrorCategory::Network,
            Self::Config(_) => ErrorCategory::Config,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
