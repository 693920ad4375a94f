//! Error types for the sync core.

use datafront_protocol::ResourcePath;
use thiserror::Error;

/// Result type for sync core operations.
pub type FrontResult<T> = Result<T, FrontError>;

/// Errors that can occur handling requests and managing resources.
#[derive(Debug, Error)]
pub enum FrontError {
    /// No data source is attached under the requested path.
    #[error("path not found: {path}")]
    PathNotFound {
        /// The path that was requested.
        path: ResourcePath,
    },

    /// Request content was malformed or out of range.
    #[error("invalid request: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// A payload did not match the structure its data source expects.
    ///
    /// The data source is never invoked when decoding fails.
    #[error("payload decode failed: {message}")]
    Decode {
        /// Description from the deserializer.
        message: String,
    },

    /// An idempotency token was already used on this action within its
    /// lifetime. The original invocation's effects are unaffected.
    #[error("duplicate idempotency token: {token}")]
    DuplicateToken {
        /// The repeated token.
        token: String,
    },

    /// A resource is already attached under the path.
    #[error("path already occupied: {path}")]
    PathOccupied {
        /// The contested path.
        path: ResourcePath,
    },

    /// The resource instance is already attached to a registry.
    #[error("resource is already attached")]
    AlreadyAttached,

    /// The resource is not attached to any registry.
    #[error("resource is not attached")]
    NotAttached,

    /// The command discriminator is reserved or unknown.
    #[error("unsupported command: {command}")]
    UnsupportedCommand {
        /// The discriminator received.
        command: String,
    },

    /// A data source or action handler failed.
    #[error(transparent)]
    Source(Box<dyn std::error::Error + Send + Sync>),
}

impl FrontError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a source error from any error value.
    pub fn source(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Source(error.into())
    }

    /// Returns true if the error blames the request rather than the host
    /// or a data source.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FrontError::PathNotFound { .. }
                | FrontError::Validation { .. }
                | FrontError::Decode { .. }
                | FrontError::DuplicateToken { .. }
                | FrontError::UnsupportedCommand { .. }
        )
    }

    /// Returns true if the error signals a host wiring mistake made at
    /// setup time.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            FrontError::PathOccupied { .. } | FrontError::AlreadyAttached | FrontError::NotAttached
        )
    }

    /// Returns true if the error was propagated from a data source or
    /// action handler.
    pub fn is_source_error(&self) -> bool {
        matches!(self, FrontError::Source(_))
    }
}

impl From<serde_json::Error> for FrontError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode {
            message: error.to_string(),
        }
    }
}
