//! Error types and result aliases shared by the roster crates.
//!
//! Errors are structured for programmatic handling. Higher layers translate
//! them into their own taxonomies before anything is formatted as text.

/// The result type used throughout `roster-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in storage, credential and configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A storage operation failed in transport (network, service, I/O).
    ///
    /// This is the only variant considered transient.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A path or object was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Service credentials could not be retrieved or decoded.
    #[error("credential error: {message}")]
    Credential {
        /// Description of the credential failure.
        message: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new credential error.
    #[must_use]
    pub fn credential(message: impl Into<String>) -> Self {
        Self::Credential {
            message: message.into(),
        }
    }

    /// Returns true when retrying the same request may succeed.
    ///
    /// Missing objects, bad input and credential failures are semantic and
    /// never transient.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}
