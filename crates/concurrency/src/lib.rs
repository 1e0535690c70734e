//! Software transactional memory for Strata
//!
//! This crate implements optimistic transactions over shared cells:
//! - [`TVar`]: a transactional variable
//! - [`atomically`]: run a body as a top-level attempt until it commits
//! - [`Transaction`]: the explicit context passed to every body, with
//!   nested attempts, `or_else` alternatives, historical views and
//!   deadline checks
//! - [`Watcher`]: a reactive probe and callback re-run when what the probe
//!   read changes
//!
//! Reads never block and never lock except to load a cell for the first
//! time. Commits are serialized by one process-wide critical section and
//! totally ordered by the global commit counter; an attempt that observed
//! state changed after it started is discarded and re-run.
//!
//! ```
//! use strata_concurrency::{atomically, retry, TVar};
//!
//! let stock = TVar::new(3u32);
//! let taken = atomically(|tx| {
//!     let n = stock.read(tx)?;
//!     if n == 0 {
//!         return retry();
//!     }
//!     stock.write(tx, n - 1);
//!     Ok(n)
//! })
//! .unwrap();
//! assert_eq!(taken, 3);
//! assert_eq!(stock.get().unwrap(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic;
pub mod cell;
mod log;
pub mod manager;
mod notifier;
pub mod outcome;
pub mod transaction;
pub mod validation;
mod waiter;
pub mod watcher;

pub use atomic::{atomically, atomically_with, in_transaction, watch};
pub use cell::TVar;
pub use manager::{stats, StmStats, TransactionManager};
pub use outcome::{abort, retry, StmError, StmResult};
pub use transaction::{Timeout, Transaction};
pub use validation::{ConflictType, ValidationResult};
pub use watcher::Watcher;
