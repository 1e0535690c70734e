//! Deadline scheduler for time-driven watcher re-evaluation
//!
//! One lazily started thread, `strata-stm-notifier`, holds a heap of pending
//! notifications ordered by deadline and runs each one when it comes due.
//! Entries scheduled under a key replace older entries with the same key, so
//! a re-armed watcher keeps at most one notification in the heap. Unkeyed
//! entries always run.

use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;
use tracing::error;

static NOTIFIER: Lazy<NotifierScheduler> = Lazy::new(NotifierScheduler::start);

/// Owner of a keyed notification and the generation it was armed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NotifyKey {
    pub(crate) owner: u64,
    pub(crate) generation: u64,
}

struct Pending {
    deadline: Instant,
    sequence: u64,
    key: Option<NotifyKey>,
    work: Box<dyn FnOnce() + Send>,
}

impl Eq for Pending {}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

// Earliest deadline first, then lower sequence (older) first
impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then(other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct NotifierInner {
    queue: Mutex<BinaryHeap<Pending>>,
    ready: Condvar,
    sequence: AtomicU64,
}

pub(crate) struct NotifierScheduler {
    inner: Arc<NotifierInner>,
}

impl NotifierScheduler {
    fn start() -> Self {
        let inner = Arc::new(NotifierInner {
            queue: Mutex::new(BinaryHeap::new()),
            ready: Condvar::new(),
            sequence: AtomicU64::new(0),
        });
        let worker = Arc::clone(&inner);
        if let Err(e) = std::thread::Builder::new()
            .name("strata-stm-notifier".to_string())
            .spawn(move || notifier_loop(&worker))
        {
            error!(target: "strata::stm", error = %e, "failed to spawn notifier thread");
        }
        NotifierScheduler { inner }
    }

    pub(crate) fn global() -> &'static NotifierScheduler {
        &NOTIFIER
    }

    /// Run `work` on the notifier thread once `deadline` has passed.
    pub(crate) fn schedule(&self, deadline: Instant, work: impl FnOnce() + Send + 'static) {
        self.push(deadline, None, Box::new(work));
    }

    /// Like `schedule`, but replaces any pending entry for the same owner.
    ///
    /// An older generation is dropped; if a newer generation is already
    /// pending, `work` is dropped instead.
    pub(crate) fn schedule_keyed(
        &self,
        deadline: Instant,
        key: NotifyKey,
        work: impl FnOnce() + Send + 'static,
    ) {
        self.push(deadline, Some(key), Box::new(work));
    }

    /// Number of entries waiting in the heap
    #[cfg(test)]
    pub(crate) fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    fn push(&self, deadline: Instant, key: Option<NotifyKey>, work: Box<dyn FnOnce() + Send>) {
        let sequence = self.inner.sequence.fetch_add(1, AtomicOrdering::Relaxed);
        let mut queue = self.inner.queue.lock();
        if let Some(key) = key {
            let newer_pending = queue.iter().any(|pending| {
                pending
                    .key
                    .is_some_and(|k| k.owner == key.owner && k.generation > key.generation)
            });
            if newer_pending {
                return;
            }
            queue.retain(|pending| pending.key.map_or(true, |k| k.owner != key.owner));
        }
        queue.push(Pending {
            deadline,
            sequence,
            key,
            work,
        });
        self.inner.ready.notify_one();
    }
}

fn notifier_loop(inner: &NotifierInner) {
    loop {
        let due = {
            let mut queue = inner.queue.lock();
            loop {
                let next_deadline = queue.peek().map(|pending| pending.deadline);
                match next_deadline {
                    None => inner.ready.wait(&mut queue),
                    Some(deadline) if deadline <= Instant::now() => {
                        if let Some(pending) = queue.pop() {
                            break pending;
                        }
                    }
                    Some(deadline) => {
                        // Woken early by a new entry or by the deadline; re-check either way.
                        let _ = inner.ready.wait_until(&mut queue, deadline);
                    }
                }
            }
        };

        // Execute outside lock. catch_unwind keeps the scheduler alive.
        if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(due.work)) {
            error!(
                target: "strata::stm",
                "notification panicked: {:?}",
                e.downcast_ref::<&str>().copied().unwrap_or("(non-string panic)")
            );
        }
    }
}
