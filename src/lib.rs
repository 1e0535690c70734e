//! StrataSTM - software transactional memory with reactive watchers
//!
//! StrataSTM provides composable in-process transactions over shared cells,
//! a persistent finger tree, and transactional collections built from both.
//!
//! # Quick Start
//!
//! ```
//! use stratastm::prelude::*;
//!
//! let from = TVar::new(100i64);
//! let to = TVar::new(0i64);
//!
//! atomically(|tx| {
//!     let amount = 30;
//!     from.modify(tx, |balance| balance - amount)?;
//!     to.modify(tx, |balance| balance + amount)
//! })
//! .unwrap();
//!
//! assert_eq!(from.get().unwrap(), 70);
//! assert_eq!(to.get().unwrap(), 30);
//! ```
//!
//! # Architecture
//!
//! - [`common`]: errors and configuration
//! - [`fingertree`]: persistent measure-annotated sequences
//! - [`concurrency`]: cells, transactions, watchers and the commit protocol
//! - [`primitives`]: `TArray` and `BroadcastQueue`

pub use strata_concurrency as concurrency;
pub use strata_core as common;
pub use strata_fingertree as fingertree;
pub use strata_primitives as primitives;

pub use strata_concurrency::{
    abort, atomically, atomically_with, retry, watch, StmError, StmResult, TVar, Timeout,
    Transaction, Watcher,
};
pub use strata_core::{Error, Result, StmConfig};
pub use strata_fingertree::{FingerTree, ItemCount, Measure};
pub use strata_primitives::{BroadcastEndpoint, BroadcastQueue, TArray};

/// Everything a typical transaction body needs
pub mod prelude {
    pub use strata_concurrency::{
        abort, atomically, atomically_with, retry, watch, StmError, StmResult, TVar, Timeout,
        Transaction, Watcher,
    };
    pub use strata_core::{Error, Result, StmConfig};
    pub use strata_fingertree::{FingerTree, ItemCount, Measure};
    pub use strata_primitives::{BroadcastEndpoint, BroadcastQueue, TArray};
}
