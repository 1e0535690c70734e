//! Transactional variables
//!
//! A [`TVar`] is a shared, identity-based cell. Its committed value, stamp,
//! waiter set and watcher set live in a [`CellState`] that is only reachable
//! through a [`CommitGuard`], so every real access happens inside the
//! commit critical section.

use crate::atomic::atomically;
use crate::manager::CommitGuard;
use crate::outcome::{StmError, StmResult};
use crate::transaction::Transaction;
use crate::waiter::Waiter;
use crate::watcher::WatcherRef;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use strata_core::{Error, Result};

static NEXT_CELL_ID: AtomicU64 = AtomicU64::new(1);

/// Type-erased cell value, shared between the committed state and log caches
pub(crate) type Value = Arc<dyn Any + Send + Sync>;

pub(crate) struct CellState {
    pub(crate) value: Value,
    /// Commit version that last touched this cell
    pub(crate) modified: u64,
    pub(crate) waiters: FxHashMap<u64, Arc<Waiter>>,
    pub(crate) watchers: BTreeSet<WatcherRef>,
}

pub(crate) struct CellCore {
    id: u64,
    state: Mutex<CellState>,
}

/// Shared handle to a cell, ordered and hashed by identity
#[derive(Clone)]
pub(crate) struct CellRef(Arc<CellCore>);

impl CellRef {
    fn new(value: Value) -> Self {
        CellRef(Arc::new(CellCore {
            id: NEXT_CELL_ID.fetch_add(1, Ordering::Relaxed),
            state: Mutex::new(CellState {
                value,
                modified: 0,
                waiters: FxHashMap::default(),
                watchers: BTreeSet::new(),
            }),
        }))
    }

    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    /// Real state of the cell; requires the commit critical section
    pub(crate) fn state<'a>(&'a self, _guard: &CommitGuard<'_>) -> MutexGuard<'a, CellState> {
        self.0.state.lock()
    }

    pub(crate) fn downgrade(&self) -> Weak<CellCore> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<CellCore>) -> Option<CellRef> {
        weak.upgrade().map(CellRef)
    }
}

impl PartialEq for CellRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for CellRef {}

impl Hash for CellRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl PartialOrd for CellRef {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for CellRef {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.id().cmp(&other.id())
    }
}

impl fmt::Debug for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellRef({})", self.id())
    }
}

/// A transactional variable holding a `T`
///
/// Cloning a `TVar` yields another handle to the same cell.
///
/// ```
/// use strata_concurrency::{atomically, TVar};
///
/// let balance = TVar::new(10);
/// atomically(|tx| balance.modify(tx, |b| b + 5)).unwrap();
/// assert_eq!(balance.get().unwrap(), 15);
/// ```
pub struct TVar<T> {
    cell: CellRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TVar<T>
where
    T: Any + Send + Sync + Clone,
{
    /// Create a cell holding `value`
    pub fn new(value: T) -> Self {
        TVar {
            cell: CellRef::new(Arc::new(value)),
            _marker: PhantomData,
        }
    }

    /// Identity of the underlying cell
    pub fn id(&self) -> u64 {
        self.cell.id()
    }

    pub(crate) fn cell(&self) -> &CellRef {
        &self.cell
    }

    /// Read the value as seen by `tx`
    pub fn read(&self, tx: &mut Transaction) -> StmResult<T> {
        let value = tx.load(&self.cell)?;
        value.downcast_ref::<T>().cloned().ok_or_else(|| {
            StmError::Abort(Error::internal(format!(
                "cell {} holds a value of another type",
                self.cell.id()
            )))
        })
    }

    /// Write `value` into `tx`; visible to others once the top level commits
    pub fn write(&self, tx: &mut Transaction, value: T) {
        tx.store(&self.cell, Arc::new(value));
    }

    /// Replace the value with `f(old)`
    pub fn modify<F>(&self, tx: &mut Transaction, f: F) -> StmResult<()>
    where
        F: FnOnce(T) -> T,
    {
        let old = self.read(tx)?;
        self.write(tx, f(old));
        Ok(())
    }

    /// Write `value` and return the previous one
    pub fn replace(&self, tx: &mut Transaction, value: T) -> StmResult<T> {
        let old = self.read(tx)?;
        self.write(tx, value);
        Ok(old)
    }

    /// Read the committed value in a single-operation transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::NestedAtomically` when called from inside a
    /// transaction body; use [`TVar::read`] there.
    pub fn get(&self) -> Result<T> {
        atomically(|tx| self.read(tx))
    }

    /// Write a value in a single-operation transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::NestedAtomically` when called from inside a
    /// transaction body; use [`TVar::write`] there.
    pub fn set(&self, value: T) -> Result<()> {
        atomically(move |tx| {
            self.write(tx, value.clone());
            Ok(())
        })
    }
}

impl<T> Clone for TVar<T> {
    fn clone(&self) -> Self {
        TVar {
            cell: self.cell.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for TVar<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cell == other.cell
    }
}

impl<T> Eq for TVar<T> {}

impl<T> fmt::Debug for TVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TVar").field("id", &self.cell.id()).finish()
    }
}

impl<T> Default for TVar<T>
where
    T: Any + Send + Sync + Clone + Default,
{
    fn default() -> Self {
        TVar::new(T::default())
    }
}
