//! Error types for Strata STM
//!
//! This module defines every error a caller can observe. Restart and retry are
//! not errors: they are control outcomes handled inside the concurrency layer
//! and never escape it. We use `thiserror` for automatic `Display` and `Error`
//! trait implementations.

use thiserror::Error;

/// Result type alias for STM operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the STM engine and the structures built on it
#[derive(Debug, Error)]
pub enum Error {
    /// Peek or pop on an empty finger tree
    #[error("This tree is empty")]
    EmptyTree,

    /// Non-blocking collection operation found no data
    #[error("No data available")]
    Empty,

    /// Index past the end of a sequence
    #[error("Index {index} out of bounds for length {len}")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Length of the sequence at the time of the request
        len: usize,
    },

    /// Mutually exclusive or malformed options
    ///
    /// Reported immediately and never retried.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A one-shot transaction was requested on a thread already running one
    ///
    /// Inside a transaction body, pass the `Transaction` handle instead of
    /// starting an independent top-level attempt.
    #[error("atomically called while this thread is already running a transaction")]
    NestedAtomically,

    /// The configured restart budget ran out before a commit succeeded
    #[error("Transaction restarted {restarts} times without committing")]
    TooManyRestarts {
        /// Number of restarts performed
        restarts: usize,
    },

    /// Broken internal invariant
    #[error("Internal error: {0}")]
    Internal(String),

    /// User error raised from a transaction body or watcher callback
    #[error("Transaction aborted: {0}")]
    Aborted(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary user error
    pub fn aborted<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::Aborted(error.into())
    }

    /// Build an internal error from a message
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Build a configuration error from a message
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Error::InvalidConfig(message.into())
    }

    /// Whether this error reports a usage mistake rather than a runtime condition
    pub fn is_usage_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_) | Error::NestedAtomically)
    }
}
