//! Deadline-aware blocking primitive for retry waits

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static NEXT_WAITER_ID: AtomicU64 = AtomicU64::new(1);

/// Parks one thread until notified or until its deadline passes.
///
/// The notified flag is sticky, so a notification delivered between
/// registration and the call to [`Waiter::wait`] is not lost.
pub(crate) struct Waiter {
    id: u64,
    resume_at: Option<Instant>,
    notified: Mutex<bool>,
    condvar: Condvar,
}

impl Waiter {
    pub(crate) fn new(resume_at: Option<Instant>) -> Self {
        Waiter {
            id: NEXT_WAITER_ID.fetch_add(1, Ordering::Relaxed),
            resume_at,
            notified: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Block until notified or the deadline passes. Returns whether a
    /// notification arrived.
    pub(crate) fn wait(&self) -> bool {
        let mut notified = self.notified.lock();
        while !*notified {
            match self.resume_at {
                Some(deadline) => {
                    if self.condvar.wait_until(&mut notified, deadline).timed_out() {
                        break;
                    }
                }
                None => self.condvar.wait(&mut notified),
            }
        }
        *notified
    }

    /// Wake every thread parked on this waiter.
    pub(crate) fn notify(&self) {
        let mut notified = self.notified.lock();
        *notified = true;
        self.condvar.notify_all();
    }
}
