//! Per-attempt transaction logs
//!
//! A [`Transaction`](crate::Transaction) keeps a stack of logs: the bottom
//! one belongs to the top-level attempt, and every nested attempt, watcher
//! probe, watcher callback or historical view pushes one more. A log caches
//! the values it has seen or written; a cache miss is resolved through the
//! log's parent chain and, past the bottom, from real cell state.

use crate::cell::{CellRef, Value};
use crate::watcher::WatcherRef;
use rustc_hash::{FxHashMap, FxHashSet};
use std::time::Instant;

/// What a log was pushed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LogKind {
    /// The top-level attempt
    TopLevel,
    /// A nested attempt or watcher callback; merged into its parent on success
    Nested,
    /// A watcher probe; its read set becomes the watcher's watched set
    Probe,
    /// A historical view; discarded on exit except for its reads
    Snapshot,
}

/// One attempt's record of reads, writes and resume hints
pub(crate) struct TransactionLog {
    pub(crate) kind: LogKind,
    /// Index of the log a cache miss is resolved through (`None` = real state)
    pub(crate) parent: Option<usize>,
    pub(crate) cache: FxHashMap<CellRef, Value>,
    pub(crate) read_set: FxHashSet<CellRef>,
    pub(crate) write_set: FxHashSet<CellRef>,
    pub(crate) proposed_watchers: Vec<WatcherRef>,
    /// Earliest time a blocked retry should wake up by itself
    pub(crate) resume_at: Option<Instant>,
    /// Earliest time the watcher owning this probe should re-run by itself
    pub(crate) watcher_resume_at: Option<Instant>,
}

fn earliest(current: Option<Instant>, candidate: Instant) -> Option<Instant> {
    Some(current.map_or(candidate, |at| at.min(candidate)))
}

impl TransactionLog {
    pub(crate) fn new(kind: LogKind, parent: Option<usize>) -> Self {
        TransactionLog {
            kind,
            parent,
            cache: FxHashMap::default(),
            read_set: FxHashSet::default(),
            write_set: FxHashSet::default(),
            proposed_watchers: Vec::new(),
            resume_at: None,
            watcher_resume_at: None,
        }
    }

    pub(crate) fn cached(&self, cell: &CellRef) -> Option<&Value> {
        self.cache.get(cell)
    }

    /// Cache a value pulled from the parent chain and remember it was read.
    pub(crate) fn record_read(&mut self, cell: &CellRef, value: &Value) {
        self.read_set.insert(cell.clone());
        self.cache.insert(cell.clone(), value.clone());
    }

    pub(crate) fn write(&mut self, cell: &CellRef, value: Value) {
        self.write_set.insert(cell.clone());
        self.cache.insert(cell.clone(), value);
    }

    pub(crate) fn update_resume_at(&mut self, at: Instant) {
        self.resume_at = earliest(self.resume_at, at);
    }

    pub(crate) fn update_watcher_resume_at(&mut self, at: Instant) {
        self.watcher_resume_at = earliest(self.watcher_resume_at, at);
    }

    /// Whether this log would change anything if it committed
    pub(crate) fn is_read_only(&self) -> bool {
        self.write_set.is_empty() && self.proposed_watchers.is_empty()
    }

    /// Fold a finished child log into this one.
    ///
    /// Written values are copied up and proposed watchers appended; reads
    /// were already recorded here when the child resolved its cache misses.
    pub(crate) fn absorb(&mut self, child: TransactionLog) {
        let TransactionLog {
            mut cache,
            write_set,
            proposed_watchers,
            ..
        } = child;
        for cell in write_set {
            if let Some(value) = cache.remove(&cell) {
                self.write(&cell, value);
            }
        }
        self.proposed_watchers.extend(proposed_watchers);
    }
}
