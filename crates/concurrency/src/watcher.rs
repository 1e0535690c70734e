//! Reactive watchers
//!
//! A watcher pairs a probe with a callback. Whenever a commit changes a cell
//! the probe read on its last run, the probe runs again in its own nested
//! attempt and its result is handed to the callback. The set of cells read
//! by that run becomes the new watched set.
//!
//! Cells keep their watchers alive; watchers point back at their cells
//! weakly, and dead entries are swept whenever the watched set is loaded or
//! replaced.

use crate::cell::{CellCore, CellRef};
use crate::manager::CommitGuard;
use crate::outcome::{StmError, StmResult};
use crate::transaction::Transaction;
use parking_lot::{Mutex, MutexGuard};
use std::any::Any;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use strata_core::Error;

static NEXT_WATCHER_ID: AtomicU64 = AtomicU64::new(1);

/// Type-erased probe and callback
pub(crate) trait WatchFn: Send + Sync {
    fn probe(&self, tx: &mut Transaction) -> StmResult<Box<dyn Any + Send>>;
    fn callback(&self, tx: &mut Transaction, value: Box<dyn Any + Send>) -> StmResult<()>;
}

struct TypedWatch<P, C, V> {
    probe: P,
    callback: C,
    _value: PhantomData<fn() -> V>,
}

impl<P, C, V> WatchFn for TypedWatch<P, C, V>
where
    P: Fn(&mut Transaction) -> StmResult<V> + Send + Sync,
    C: Fn(&mut Transaction, V) -> StmResult<()> + Send + Sync,
    V: Send + 'static,
{
    fn probe(&self, tx: &mut Transaction) -> StmResult<Box<dyn Any + Send>> {
        let value = (self.probe)(tx)?;
        Ok(Box::new(value))
    }

    fn callback(&self, tx: &mut Transaction, value: Box<dyn Any + Send>) -> StmResult<()> {
        let value = value.downcast::<V>().map_err(|_| {
            StmError::Abort(Error::internal("watcher probe produced a value of another type"))
        })?;
        (self.callback)(tx, *value)
    }
}

pub(crate) struct WatcherState {
    /// Commit version that last touched this watcher
    pub(crate) modified: u64,
    pub(crate) watched: BTreeMap<u64, Weak<CellCore>>,
    /// Token of the pending time-driven notification, if any
    pub(crate) notifier: Option<u64>,
}

impl WatcherState {
    /// Live watched cells; dead back-references are dropped.
    pub(crate) fn sweep(&mut self) -> BTreeSet<CellRef> {
        let mut live = BTreeSet::new();
        self.watched.retain(|_, weak| match CellRef::upgrade(weak) {
            Some(cell) => {
                live.insert(cell);
                true
            }
            None => false,
        });
        live
    }

    pub(crate) fn replace_watched(&mut self, cells: &BTreeSet<CellRef>) {
        self.watched = cells
            .iter()
            .map(|cell| (cell.id(), cell.downgrade()))
            .collect();
    }
}

pub(crate) struct WatcherCore {
    id: u64,
    body: Box<dyn WatchFn>,
    state: Mutex<WatcherState>,
}

/// Shared handle to a watcher, ordered and hashed by identity
#[derive(Clone)]
pub(crate) struct WatcherRef(Arc<WatcherCore>);

impl WatcherRef {
    pub(crate) fn new<P, C, V>(probe: P, callback: C) -> Self
    where
        P: Fn(&mut Transaction) -> StmResult<V> + Send + Sync + 'static,
        C: Fn(&mut Transaction, V) -> StmResult<()> + Send + Sync + 'static,
        V: Send + 'static,
    {
        WatcherRef(Arc::new(WatcherCore {
            id: NEXT_WATCHER_ID.fetch_add(1, Ordering::Relaxed),
            body: Box::new(TypedWatch {
                probe,
                callback,
                _value: PhantomData,
            }),
            state: Mutex::new(WatcherState {
                modified: 0,
                watched: BTreeMap::new(),
                notifier: None,
            }),
        }))
    }

    pub(crate) fn id(&self) -> u64 {
        self.0.id
    }

    pub(crate) fn body(&self) -> &dyn WatchFn {
        self.0.body.as_ref()
    }

    /// Real state of the watcher; requires the commit critical section
    pub(crate) fn state<'a>(&'a self, _guard: &CommitGuard<'_>) -> MutexGuard<'a, WatcherState> {
        self.0.state.lock()
    }
}

impl PartialEq for WatcherRef {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for WatcherRef {}

impl Hash for WatcherRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl PartialOrd for WatcherRef {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for WatcherRef {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.id().cmp(&other.id())
    }
}

impl fmt::Debug for WatcherRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WatcherRef({})", self.id())
    }
}

/// Handle to a registered watcher
///
/// Dropping the handle does not unregister the watcher; it stays attached to
/// the cells its probe reads.
#[derive(Clone, Debug)]
pub struct Watcher {
    inner: WatcherRef,
}

impl Watcher {
    pub(crate) fn new(inner: WatcherRef) -> Self {
        Watcher { inner }
    }

    /// Identity of this watcher
    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Number of live cells read by the probe's last committed run
    pub fn watched_count(&self) -> usize {
        let state = self.inner.0.state.lock();
        state
            .watched
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Whether a time-driven re-evaluation is pending
    pub fn has_pending_notification(&self) -> bool {
        self.inner.0.state.lock().notifier.is_some()
    }
}
