//! Transactional collections for Strata
//!
//! Provides collections built purely on cells, `atomically` and the
//! persistent finger tree:
//! - **TArray**: indexed sequence with O(log n) positional edits
//! - **BroadcastQueue**: multi-reader queue; every endpoint sees every value
//!
//! ## Composition
//!
//! Every operation takes the running transaction, so operations on several
//! collections and plain cells commit together or not at all:
//!
//! ```
//! use strata_concurrency::{atomically, TVar};
//! use strata_primitives::{BroadcastQueue, TArray};
//!
//! let history = TArray::new();
//! let events = BroadcastQueue::new();
//! let count = TVar::new(0usize);
//! let reader = atomically(|tx| events.new_endpoint(tx)).unwrap();
//!
//! atomically(|tx| {
//!     history.push(tx, "started")?;
//!     events.put(tx, "started")?;
//!     count.modify(tx, |n| n + 1)
//! })
//! .unwrap();
//!
//! assert_eq!(atomically(|tx| reader.get(tx, false)).unwrap(), "started");
//! assert_eq!(count.get().unwrap(), 1);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broadcast_queue;
pub mod tarray;

pub use broadcast_queue::{BroadcastEndpoint, BroadcastQueue};
pub use tarray::TArray;
