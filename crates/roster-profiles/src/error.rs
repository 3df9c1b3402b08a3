//! Error types for profile store operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for profile operations.
pub type Result<T> = std::result::Result<T, ProfileError>;

/// Errors that can occur while reading or rewriting the profile roster.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// The remote roster object does not exist.
    #[error("object not found: {path}")]
    ObjectNotFound {
        /// Remote object path.
        path: String,
    },

    /// A field name or column layout does not match the profile schema.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// The query engine rejected or failed a statement.
    #[error("query failed: {message}")]
    Query {
        /// Message from the query engine.
        message: String,
    },

    /// Records could not be encoded to Parquet.
    #[error("encode failed: {message}")]
    Encode {
        /// Description of the failure.
        message: String,
    },

    /// Bytes or result rows could not be decoded into records.
    #[error("decode failed: {message}")]
    Decode {
        /// Description of the failure.
        message: String,
    },

    /// Service credentials could not be obtained.
    #[error("credential error: {message}")]
    Credential {
        /// Description of the failure.
        message: String,
    },

    /// The object store could not be reached or returned a failure.
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// Another writer kept replacing the object during a read-modify-write.
    #[error("version conflict on {path} after {attempts} attempts")]
    VersionConflict {
        /// Remote object path.
        path: String,
        /// Attempts made before giving up.
        attempts: u32,
    },

    /// Invalid tool or operation input.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// Description of the problem.
        message: String,
    },

    /// A temporary local copy could not be written.
    #[error("scratch file error at {}: {message}", path.display())]
    Scratch {
        /// Local path involved.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl ProfileError {
    /// Creates a schema mismatch error.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }

    /// Creates a query error.
    #[must_use]
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Creates an encode error.
    #[must_use]
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates an invalid input error.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

impl From<roster_core::Error> for ProfileError {
    fn from(err: roster_core::Error) -> Self {
        match err {
            roster_core::Error::NotFound(path) => Self::ObjectNotFound { path },
            roster_core::Error::Credential { message } => Self::Credential { message },
            roster_core::Error::InvalidInput(message) => Self::InvalidInput { message },
            roster_core::Error::Serialization { message } => Self::Encode { message },
            roster_core::Error::Internal { message } => Self::Internal { message },
            err @ roster_core::Error::Storage { .. } => Self::Transport {
                message: err.to_string(),
            },
        }
    }
}
