//! Process-wide commit sequencing
//!
//! One [`TransactionManager`] exists per process. It owns:
//! - the global commit counter, bumped once per committing attempt
//! - the single critical section guarding real cell and watcher state
//! - relaxed atomic counters exposed as [`StmStats`]
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. lock()              - enter the critical section
//! 2. validate            - every cell/watcher in the access set has stamp <= start
//! 3. IF stale: drop the guard and restart the attempt
//! 4. allocate_version()  - bump the counter
//! 5. apply writes and watcher relations, stamping them with the new version
//! 6. drop the guard
//! ```
//!
//! Real state may only be touched while a [`CommitGuard`] is held, so a
//! stamp never exceeds the counter and validation plus apply is atomic with
//! respect to every other thread.

use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};

static MANAGER: Lazy<TransactionManager> = Lazy::new(|| TransactionManager::new(0));

/// Proof that the caller is inside the commit critical section
pub(crate) struct CommitGuard<'a> {
    _lock: MutexGuard<'a, ()>,
}

/// Snapshot of engine counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StmStats {
    /// Value of the global commit counter
    pub current_version: u64,
    /// Attempts started, including restarts
    pub started: u64,
    /// Attempts that committed by taking the critical section
    pub committed: u64,
    /// Attempts that committed without writing anything
    pub read_only_commits: u64,
    /// Attempts discarded because they observed stale state
    pub restarts: u64,
    /// Times a top-level attempt blocked on retry
    pub retry_waits: u64,
    /// Time-driven watcher re-evaluations that fired
    pub notifications_fired: u64,
}

/// Global commit counter, critical section and counters
pub struct TransactionManager {
    /// Global commit counter
    ///
    /// Monotonically increasing. Each writing commit increments it by 1.
    version: AtomicU64,
    commit_lock: Mutex<()>,
    started: AtomicU64,
    committed: AtomicU64,
    read_only_commits: AtomicU64,
    restarts: AtomicU64,
    retry_waits: AtomicU64,
    notifications_fired: AtomicU64,
}

impl TransactionManager {
    fn new(initial_version: u64) -> Self {
        TransactionManager {
            version: AtomicU64::new(initial_version),
            commit_lock: Mutex::new(()),
            started: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            read_only_commits: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            retry_waits: AtomicU64::new(0),
            notifications_fired: AtomicU64::new(0),
        }
    }

    /// The process-wide manager
    pub fn global() -> &'static TransactionManager {
        &MANAGER
    }

    /// Get current global version
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Enter the commit critical section
    pub(crate) fn lock(&self) -> CommitGuard<'_> {
        CommitGuard {
            _lock: self.commit_lock.lock(),
        }
    }

    /// Allocate next commit version (increment global version)
    pub(crate) fn allocate_version(&self, _guard: &CommitGuard<'_>) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_start(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.committed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read_only_commit(&self) {
        self.read_only_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_restart(&self) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry_wait(&self) {
        self.retry_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_notification(&self) {
        self.notifications_fired.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of engine counters.
    pub fn stats(&self) -> StmStats {
        StmStats {
            current_version: self.current_version(),
            started: self.started.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            read_only_commits: self.read_only_commits.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            retry_waits: self.retry_waits.load(Ordering::Relaxed),
            notifications_fired: self.notifications_fired.load(Ordering::Relaxed),
        }
    }
}

/// Counters of the process-wide manager
pub fn stats() -> StmStats {
    TransactionManager::global().stats()
}
