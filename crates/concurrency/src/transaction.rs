//! Transaction handle and commit protocol
//!
//! A [`Transaction`] is the explicit context threaded through every body,
//! probe and callback. It owns a stack of [`TransactionLog`]s: the bottom
//! log is the top-level attempt, nested attempts push and pop above it.
//!
//! ## Reads
//!
//! A read first looks in the innermost log, then follows parent links down
//! the stack. Every log passed on the way records the read. A miss at the
//! bottom loads real state inside the critical section and restarts at once
//! if the cell changed after the attempt's start watermark, so a body never
//! sees state from two commit points.
//!
//! ## Commit
//!
//! ```text
//! 1. Watcher fixpoint, all inside the log:
//!    triggered = watchers of written cells + proposed watchers
//!    for each: probe in a Probe log, re-wire watched cells by set
//!    difference, callback in a Nested log merged into the bottom log,
//!    watchers of the callback's writes join the next round
//! 2. Read-only attempts stop here
//! 3. lock; validate reads, writes and loaded relations against start
//! 4. allocate version; apply writes (waking waiters) and relations
//! 5. unlock; schedule pending time-driven notifications
//! ```

use crate::atomic::atomically;
use crate::cell::{CellRef, Value};
use crate::log::{LogKind, TransactionLog};
use crate::manager::TransactionManager;
use crate::notifier::{NotifierScheduler, NotifyKey};
use crate::outcome::{StmError, StmResult};
use crate::validation::{check_cell, check_watcher, validate_cells, validate_watchers, ValidationResult};
use crate::waiter::Waiter;
use crate::watcher::{Watcher, WatcherRef};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strata_core::Error;
use tracing::{debug, trace, warn};

static NEXT_NOTIFIER_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Deadline for [`Transaction::elapsed`]
///
/// `after` is measured from the moment the outermost `atomically` call
/// began, so it stays fixed across restarts. Give exactly one of the two.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timeout {
    /// Relative to the start of the outermost attempt sequence
    pub after: Option<Duration>,
    /// Absolute point in time
    pub at: Option<Instant>,
}

impl Timeout {
    /// Deadline relative to the start of the attempt sequence
    pub fn after(duration: Duration) -> Self {
        Timeout {
            after: Some(duration),
            at: None,
        }
    }

    /// Absolute deadline
    pub fn at(instant: Instant) -> Self {
        Timeout {
            after: None,
            at: Some(instant),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::after(duration)
    }
}

impl From<Instant> for Timeout {
    fn from(instant: Instant) -> Self {
        Timeout::at(instant)
    }
}

/// Watcher wiring loaded or changed by this attempt
#[derive(Default)]
struct Relations {
    watchers_of: FxHashMap<CellRef, BTreeSet<WatcherRef>>,
    watched_by: FxHashMap<WatcherRef, BTreeSet<CellRef>>,
    changed_cells: FxHashSet<CellRef>,
    changed_watchers: FxHashSet<WatcherRef>,
    watcher_resume_at: FxHashMap<WatcherRef, Option<Instant>>,
}

impl Relations {
    fn is_unchanged(&self) -> bool {
        self.changed_cells.is_empty() && self.changed_watchers.is_empty()
    }
}

/// A running transaction attempt
///
/// Obtained from [`atomically`](crate::atomically); never constructed
/// directly. All writes stay private until the top-level attempt commits.
pub struct Transaction {
    manager: &'static TransactionManager,
    logs: Vec<TransactionLog>,
    /// Commit counter value when this attempt began
    start: u64,
    overall_start: Instant,
    current_start: Instant,
    relations: Relations,
}

impl Transaction {
    pub(crate) fn begin(
        manager: &'static TransactionManager,
        overall_start: Instant,
        current_start: Instant,
    ) -> Self {
        manager.record_start();
        Transaction {
            manager,
            logs: vec![TransactionLog::new(LogKind::TopLevel, None)],
            start: manager.current_version(),
            overall_start,
            current_start,
            relations: Relations::default(),
        }
    }

    /// Commit counter value this attempt reads at
    pub fn start_version(&self) -> u64 {
        self.start
    }

    /// Logical start time of this attempt
    pub fn started_at(&self) -> Instant {
        self.current_start
    }

    /// Number of nested attempts currently open above the top level
    pub fn depth(&self) -> usize {
        self.logs.len().saturating_sub(1)
    }

    // ========================================================================
    // Cell access
    // ========================================================================

    pub(crate) fn load(&mut self, cell: &CellRef) -> StmResult<Value> {
        let mut passed = Vec::new();
        let mut next = self.logs.len().checked_sub(1);
        let mut found = None;
        while let Some(index) = next {
            let log = &self.logs[index];
            if let Some(value) = log.cached(cell) {
                found = Some(value.clone());
                break;
            }
            passed.push(index);
            next = log.parent;
        }

        let value = match found {
            Some(value) => value,
            None => self.load_real(cell)?,
        };
        for index in passed {
            self.logs[index].record_read(cell, &value);
        }
        Ok(value)
    }

    pub(crate) fn store(&mut self, cell: &CellRef, value: Value) {
        if let Some(log) = self.logs.last_mut() {
            log.write(cell, value);
        }
    }

    fn load_real(&self, cell: &CellRef) -> StmResult<Value> {
        let manager = self.manager;
        let guard = manager.lock();
        if let Some(conflict) = check_cell(&guard, cell, self.start) {
            drop(guard);
            return Err(self.conflict(&ValidationResult::conflict(conflict)));
        }
        let value = cell.state(&guard).value.clone();
        Ok(value)
    }

    fn load_watchers(&mut self, cell: &CellRef) -> StmResult<BTreeSet<WatcherRef>> {
        if let Some(watchers) = self.relations.watchers_of.get(cell) {
            return Ok(watchers.clone());
        }
        let manager = self.manager;
        let watchers = {
            let guard = manager.lock();
            if let Some(conflict) = check_cell(&guard, cell, self.start) {
                drop(guard);
                return Err(self.conflict(&ValidationResult::conflict(conflict)));
            }
            cell.state(&guard).watchers.clone()
        };
        self.relations
            .watchers_of
            .insert(cell.clone(), watchers.clone());
        Ok(watchers)
    }

    fn load_watched(&mut self, watcher: &WatcherRef) -> StmResult<BTreeSet<CellRef>> {
        if let Some(cells) = self.relations.watched_by.get(watcher) {
            return Ok(cells.clone());
        }
        let manager = self.manager;
        let cells = {
            let guard = manager.lock();
            if let Some(conflict) = check_watcher(&guard, watcher, self.start) {
                drop(guard);
                return Err(self.conflict(&ValidationResult::conflict(conflict)));
            }
            watcher.state(&guard).sweep()
        };
        self.relations
            .watched_by
            .insert(watcher.clone(), cells.clone());
        Ok(cells)
    }

    fn set_watchers(&mut self, cell: &CellRef, watchers: BTreeSet<WatcherRef>) {
        self.relations.changed_cells.insert(cell.clone());
        self.relations.watchers_of.insert(cell.clone(), watchers);
    }

    fn set_watched(&mut self, watcher: &WatcherRef, cells: BTreeSet<CellRef>) {
        self.relations.changed_watchers.insert(watcher.clone());
        self.relations.watched_by.insert(watcher.clone(), cells);
    }

    fn conflict(&self, result: &ValidationResult) -> StmError {
        self.manager.record_restart();
        debug!(
            target: "strata::stm",
            start = self.start,
            conflicts = result.conflict_count(),
            "Transaction restarting on stale state"
        );
        StmError::Restart
    }

    // ========================================================================
    // Combinators
    // ========================================================================

    /// Push a log, run `body` against it, and pop it again.
    fn run_in_log<T, F>(
        &mut self,
        kind: LogKind,
        parent: Option<usize>,
        body: F,
    ) -> (StmResult<T>, TransactionLog)
    where
        F: FnOnce(&mut Transaction) -> StmResult<T>,
    {
        let depth = self.logs.len();
        self.logs.push(TransactionLog::new(kind, parent));
        let result = body(self);
        self.logs.truncate(depth + 1);
        let log = self
            .logs
            .pop()
            .unwrap_or_else(|| TransactionLog::new(kind, parent));
        (result, log)
    }

    /// Run `body` as a nested attempt.
    ///
    /// Its writes and proposed watchers reach this attempt only if it
    /// succeeds. Restart, retry and errors pass through unchanged.
    pub fn nested<T, F>(&mut self, body: F) -> StmResult<T>
    where
        F: FnOnce(&mut Transaction) -> StmResult<T>,
    {
        let parent = self.logs.len().checked_sub(1);
        let (result, log) = self.run_in_log(LogKind::Nested, parent, body);
        let value = result?;
        if let Some(top) = self.logs.last_mut() {
            top.absorb(log);
        }
        Ok(value)
    }

    /// Try each alternative in order as a nested attempt.
    ///
    /// An alternative that requests retry is discarded and the next one is
    /// tried. Retry propagates only if every alternative requested it; the
    /// enclosing attempt then waits on everything any of them read.
    pub fn or_else<T, I, F>(&mut self, alternatives: I) -> StmResult<T>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(&mut Transaction) -> StmResult<T>,
    {
        for alternative in alternatives {
            match self.nested(alternative) {
                Err(StmError::Retry) => continue,
                outcome => return outcome,
            }
        }
        Err(StmError::Retry)
    }

    /// Two-alternative form of [`Transaction::or_else`]
    pub fn or<T, A, B>(&mut self, first: A, second: B) -> StmResult<T>
    where
        A: FnOnce(&mut Transaction) -> StmResult<T>,
        B: FnOnce(&mut Transaction) -> StmResult<T>,
    {
        match self.nested(first) {
            Err(StmError::Retry) => self.nested(second),
            outcome => outcome,
        }
    }

    /// Run `body` against the state this attempt started from.
    ///
    /// With `toplevel` false the view is the enclosing attempt's state,
    /// without the writes made by the current nested attempt. With
    /// `toplevel` true, or at the top level, the view is committed state
    /// as of the start watermark. Writes made inside are discarded; reads
    /// and resume hints count towards the current attempt.
    pub fn previously<T, F>(&mut self, toplevel: bool, body: F) -> StmResult<T>
    where
        F: FnOnce(&mut Transaction) -> StmResult<T>,
    {
        let current = self.logs.len().saturating_sub(1);
        let parent = if toplevel || current == 0 {
            None
        } else {
            self.logs[current].parent
        };
        let (result, snapshot) = self.run_in_log(LogKind::Snapshot, parent, body);

        let mut next = Some(current);
        while let Some(index) = next {
            let log = &mut self.logs[index];
            log.read_set.extend(snapshot.read_set.iter().cloned());
            next = log.parent;
        }
        result
    }

    /// Whether a deadline has passed, without blocking.
    ///
    /// Returns `false` when no deadline is given.
    /// When the deadline is still ahead it becomes a resume hint: a retry
    /// wait wakes by itself once it passes. A watcher probe that asks with
    /// an absolute `at` deadline is re-run at that time; `after` is measured
    /// from each run's own start and never re-arms a watcher.
    ///
    /// # Errors
    ///
    /// Aborts with `Error::InvalidConfig` if both `after` and `at` are given.
    pub fn elapsed(&mut self, timeout: impl Into<Timeout>) -> StmResult<bool> {
        let timeout = timeout.into();
        let (deadline, absolute) = match (timeout.after, timeout.at) {
            (Some(_), Some(_)) => {
                return Err(StmError::Abort(Error::invalid_config(
                    "only one of `after` and `at` may be given",
                )))
            }
            (None, None) => return Ok(false),
            (Some(after), None) => match self.overall_start.checked_add(after) {
                Some(deadline) => (deadline, false),
                None => return Ok(false),
            },
            (None, Some(at)) => (at, true),
        };

        if self.current_start >= deadline {
            return Ok(true);
        }
        for log in &mut self.logs {
            log.update_resume_at(deadline);
        }
        // A relative deadline moves with every re-run, so only `at` re-arms a watcher.
        if !absolute {
            return Ok(false);
        }
        if let Some(probe) = self
            .logs
            .iter_mut()
            .rev()
            .find(|log| log.kind == LogKind::Probe)
        {
            probe.update_watcher_resume_at(deadline);
        }
        Ok(false)
    }

    /// Register a watcher, installed when this attempt commits.
    ///
    /// `probe` runs at commit and again whenever a cell it read changes;
    /// each result is passed to `callback`, whose writes commit together
    /// with the change that triggered it.
    pub fn watch<P, C, V>(&mut self, probe: P, callback: C) -> Watcher
    where
        P: Fn(&mut Transaction) -> StmResult<V> + Send + Sync + 'static,
        C: Fn(&mut Transaction, V) -> StmResult<()> + Send + Sync + 'static,
        V: Send + 'static,
    {
        let watcher = WatcherRef::new(probe, callback);
        self.propose(watcher.clone());
        Watcher::new(watcher)
    }

    pub(crate) fn propose(&mut self, watcher: WatcherRef) {
        if let Some(log) = self.logs.last_mut() {
            log.proposed_watchers.push(watcher);
        }
    }

    // ========================================================================
    // Top-level commit
    // ========================================================================

    fn run_watchers(&mut self) -> StmResult<()> {
        let mut pending = BTreeSet::new();
        let written: Vec<CellRef> = self.logs[0].write_set.iter().cloned().collect();
        for cell in &written {
            pending.extend(self.load_watchers(cell)?);
        }
        pending.extend(self.logs[0].proposed_watchers.drain(..));

        while !pending.is_empty() {
            let mut triggered = BTreeSet::new();
            for watcher in &pending {
                triggered.extend(self.run_watcher(watcher)?);
            }
            triggered.extend(self.logs[0].proposed_watchers.drain(..));
            pending = triggered;
        }
        Ok(())
    }

    fn run_watcher(&mut self, watcher: &WatcherRef) -> StmResult<BTreeSet<WatcherRef>> {
        trace!(target: "strata::stm", watcher = watcher.id(), "Running watcher probe");
        let formerly = self.load_watched(watcher)?;
        let (result, probe_log) =
            self.run_in_log(LogKind::Probe, Some(0), |tx| watcher.body().probe(tx));
        let value = result?;

        let newly: BTreeSet<CellRef> = probe_log.read_set.iter().cloned().collect();
        for cell in formerly.difference(&newly) {
            let mut watchers = self.load_watchers(cell)?;
            watchers.remove(watcher);
            self.set_watchers(cell, watchers);
        }
        for cell in newly.difference(&formerly) {
            let mut watchers = self.load_watchers(cell)?;
            watchers.insert(watcher.clone());
            self.set_watchers(cell, watchers);
        }
        self.set_watched(watcher, newly);
        self.relations
            .watcher_resume_at
            .insert(watcher.clone(), probe_log.watcher_resume_at);

        let (result, callback_log) = self.run_in_log(LogKind::Nested, Some(0), |tx| {
            watcher.body().callback(tx, value)
        });
        result?;
        let written: Vec<CellRef> = callback_log.write_set.iter().cloned().collect();
        self.logs[0].absorb(callback_log);

        let mut triggered = BTreeSet::new();
        for cell in &written {
            triggered.extend(self.load_watchers(cell)?);
        }
        Ok(triggered)
    }

    /// Run the watcher fixpoint, validate, and publish this attempt.
    pub(crate) fn commit(&mut self) -> StmResult<()> {
        self.logs.truncate(1);
        self.run_watchers()?;

        let log = &self.logs[0];
        if log.is_read_only() && self.relations.is_unchanged() {
            self.manager.record_read_only_commit();
            trace!(target: "strata::stm", reads = log.read_set.len(), "Read-only transaction committed");
            return Ok(());
        }

        let writes: Vec<(CellRef, Value)> = log
            .write_set
            .iter()
            .filter_map(|cell| log.cached(cell).map(|value| (cell.clone(), value.clone())))
            .collect();
        let mut notifications = Vec::new();

        let manager = self.manager;
        let version = {
            let guard = manager.lock();
            let mut result = validate_cells(
                &guard,
                log.read_set.iter().chain(log.write_set.iter()),
                self.start,
            );
            result.merge(validate_cells(
                &guard,
                self.relations.watchers_of.keys(),
                self.start,
            ));
            result.merge(validate_watchers(
                &guard,
                self.relations.watched_by.keys(),
                self.start,
            ));
            if !result.is_valid() {
                drop(guard);
                return Err(self.conflict(&result));
            }

            let version = manager.allocate_version(&guard);
            for (cell, value) in &writes {
                let mut state = cell.state(&guard);
                state.value = value.clone();
                state.modified = version;
                for waiter in state.waiters.values() {
                    waiter.notify();
                }
            }
            for cell in &self.relations.changed_cells {
                if let Some(watchers) = self.relations.watchers_of.get(cell) {
                    let mut state = cell.state(&guard);
                    state.watchers = watchers.clone();
                    state.modified = version;
                }
            }
            for watcher in &self.relations.changed_watchers {
                let mut state = watcher.state(&guard);
                if let Some(cells) = self.relations.watched_by.get(watcher) {
                    state.replace_watched(cells);
                }
                state.modified = version;
                state.notifier = None;
                if let Some(Some(at)) = self.relations.watcher_resume_at.get(watcher) {
                    let token = NEXT_NOTIFIER_TOKEN.fetch_add(1, Ordering::Relaxed);
                    state.notifier = Some(token);
                    notifications.push((watcher.clone(), token, *at));
                }
            }
            version
        };

        manager.record_commit();
        debug!(
            target: "strata::stm",
            version,
            writes = writes.len(),
            watchers = self.relations.changed_watchers.len(),
            "Transaction committed"
        );
        for (watcher, token, at) in notifications {
            schedule_notification(watcher, token, at);
        }
        Ok(())
    }

    /// Block until a cell this attempt read is written or its resume hint
    /// passes; returns the start time for the next attempt.
    pub(crate) fn wait_for_change(&mut self) -> StmResult<Instant> {
        self.logs.truncate(1);
        let log = &self.logs[0];
        let waiter = Arc::new(Waiter::new(log.resume_at));
        let manager = self.manager;
        {
            let guard = manager.lock();
            let mut result = validate_cells(
                &guard,
                log.read_set.iter().chain(log.write_set.iter()),
                self.start,
            );
            result.merge(validate_cells(
                &guard,
                self.relations.watchers_of.keys(),
                self.start,
            ));
            result.merge(validate_watchers(
                &guard,
                self.relations.watched_by.keys(),
                self.start,
            ));
            if !result.is_valid() {
                drop(guard);
                return Err(self.conflict(&result));
            }
            for cell in &log.read_set {
                cell.state(&guard)
                    .waiters
                    .insert(waiter.id(), Arc::clone(&waiter));
            }
        }

        manager.record_retry_wait();
        debug!(
            target: "strata::stm",
            reads = log.read_set.len(),
            deadline = log.resume_at.is_some(),
            "Transaction blocked on retry"
        );
        let notified = waiter.wait();

        {
            let guard = manager.lock();
            for cell in &log.read_set {
                cell.state(&guard).waiters.remove(&waiter.id());
            }
        }
        debug!(target: "strata::stm", notified, "Transaction woke from retry");

        let now = Instant::now();
        Ok(log.resume_at.map_or(now, |at| at.min(now)))
    }
}

/// Re-run `watcher` at `at`, unless a later commit superseded `token`.
fn schedule_notification(watcher: WatcherRef, token: u64, at: Instant) {
    let key = NotifyKey {
        owner: watcher.id(),
        generation: token,
    };
    NotifierScheduler::global().schedule_keyed(at, key, move || {
        let manager = TransactionManager::global();
        {
            let guard = manager.lock();
            let mut state = watcher.state(&guard);
            if state.notifier != Some(token) {
                return;
            }
            state.notifier = None;
        }
        manager.record_notification();
        trace!(target: "strata::stm", watcher = watcher.id(), "Deadline reached, re-running watcher");
        let result = atomically(|tx| {
            tx.propose(watcher.clone());
            Ok(())
        });
        if let Err(e) = result {
            warn!(target: "strata::stm", watcher = watcher.id(), error = %e, "Time-driven watcher run failed");
        }
    });
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("start", &self.start)
            .field("depth", &self.depth())
            .field("reads", &self.logs[0].read_set.len())
            .field("writes", &self.logs[0].write_set.len())
            .finish()
    }
}
