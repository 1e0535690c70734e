//! Control outcomes of a transaction attempt
//!
//! A body returns `Ok(value)` to commit, or one of three signals:
//!
//! | Signal | Raised by | Handled by |
//! |--------|-----------|------------|
//! | `Restart` | a stale read, failed validation, or a finished retry wait | top-level loop, re-runs the body |
//! | `Retry` | [`retry`] or a blocking collection operation | `or_else` alternatives, else the top level blocks |
//! | `Abort` | any `strata_core::Error` converted with `?` | nothing, returned to the caller |
//!
//! Nested attempts pass every signal through untouched.

use strata_core::Error;
use thiserror::Error as ThisError;

/// Outcome of a transaction step that did not produce a value
#[derive(Debug, ThisError)]
pub enum StmError {
    /// The attempt observed stale state and must run again from scratch
    #[error("transaction must restart")]
    Restart,

    /// The attempt asked to block until something it read changes
    #[error("transaction requested retry")]
    Retry,

    /// The attempt failed with an error that is returned to the caller
    #[error(transparent)]
    Abort(#[from] Error),
}

/// Result of a step inside a transaction
pub type StmResult<T> = std::result::Result<T, StmError>;

impl StmError {
    /// Whether this is a control signal rather than a user-visible error
    pub fn is_control(&self) -> bool {
        matches!(self, StmError::Restart | StmError::Retry)
    }
}

/// Block the enclosing top-level attempt until one of the cells it read changes.
///
/// Inside [`Transaction::or_else`](crate::Transaction::or_else) this moves on
/// to the next alternative instead.
pub fn retry<T>() -> StmResult<T> {
    Err(StmError::Retry)
}

/// Abort the attempt with a user error.
///
/// The error reaches the caller of `atomically` as `Error::Aborted`; the
/// attempt's writes are discarded and the body is not run again.
pub fn abort<T, E>(error: E) -> StmResult<T>
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Err(StmError::Abort(Error::aborted(error)))
}
