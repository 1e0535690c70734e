//! Blocking Retry Tests
//!
//! Tests for retry wake-up:
//! - Only writes to cells the attempt read wake it
//! - `or_else` waits on everything any alternative read
//! - Deadlines wake a retry without any write

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

struct Waiting {
    receiver: mpsc::Receiver<i32>,
    handle: thread::JoinHandle<()>,
    runs: Arc<AtomicUsize>,
}

impl Waiting {
    fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    fn finish(self) -> i32 {
        let value = self.receiver.recv_timeout(WAIT_LIMIT).unwrap();
        self.handle.join().unwrap();
        value
    }
}

/// Spawn a thread that waits for `cell` to become non-zero and sends it.
fn wait_for_nonzero(cell: &TVar<i32>) -> Waiting {
    let (sender, receiver) = mpsc::channel();
    let cell = cell.clone();
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let handle = thread::spawn(move || {
        let value = atomically(|tx| {
            counter.fetch_add(1, Ordering::SeqCst);
            let n = cell.read(tx)?;
            if n == 0 {
                return retry();
            }
            Ok(n)
        })
        .unwrap();
        sender.send(value).unwrap();
    });
    Waiting {
        receiver,
        handle,
        runs,
    }
}

#[test]
fn retry_wakes_on_relevant_write() {
    init_tracing();
    let x = TVar::new(0);
    let waiting = wait_for_nonzero(&x);

    thread::sleep(Duration::from_millis(50));
    assert!(waiting.receiver.try_recv().is_err());
    assert_eq!(waiting.runs(), 1);

    x.set(5).unwrap();
    assert_eq!(waiting.finish(), 5);
}

#[test]
fn unrelated_write_does_not_wake() {
    let x = TVar::new(0);
    let unrelated = TVar::new(0);
    let waiting = wait_for_nonzero(&x);

    thread::sleep(Duration::from_millis(50));
    for i in 1..=5 {
        unrelated.set(i).unwrap();
    }
    thread::sleep(Duration::from_millis(100));
    assert!(waiting.receiver.try_recv().is_err());
    assert_eq!(waiting.runs(), 1);

    x.set(3).unwrap();
    assert_eq!(waiting.finish(), 3);
}

#[test]
fn write_of_same_value_wakes_and_blocks_again() {
    let x = TVar::new(0);
    let waiting = wait_for_nonzero(&x);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(waiting.runs(), 1);
    x.set(0).unwrap();
    assert!(eventually(|| waiting.runs() == 2));
    assert!(waiting.receiver.try_recv().is_err());

    x.set(9).unwrap();
    assert_eq!(waiting.finish(), 9);
}

#[test]
fn or_else_waits_on_every_alternative() {
    let a = TVar::new(0);
    let b = TVar::new(0);
    let (sender, receiver) = mpsc::channel();

    let (ta, tb) = (a.clone(), b.clone());
    let handle = thread::spawn(move || {
        let which = atomically(|tx| {
            tx.or(
                |tx| {
                    if ta.read(tx)? == 0 {
                        return retry();
                    }
                    Ok("a")
                },
                |tx| {
                    if tb.read(tx)? == 0 {
                        return retry();
                    }
                    Ok("b")
                },
            )
        })
        .unwrap();
        sender.send(which).unwrap();
    });

    thread::sleep(Duration::from_millis(50));
    assert!(receiver.try_recv().is_err());

    b.set(1).unwrap();
    assert_eq!(receiver.recv_timeout(WAIT_LIMIT).unwrap(), "b");
    handle.join().unwrap();
    assert_eq!(value_of(&a), 0);
}

#[test]
fn deadline_wakes_retry_without_writes() {
    let start = Instant::now();
    let waited = atomically(|tx| {
        if tx.elapsed(Duration::from_millis(60))? {
            return Ok(tx.started_at());
        }
        retry()
    })
    .unwrap();

    assert!(start.elapsed() >= Duration::from_millis(60));
    assert!(waited >= start + Duration::from_millis(60));
}

#[test]
fn write_before_deadline_wakes_early() {
    let flag = TVar::new(false);
    let (sender, receiver) = mpsc::channel();

    let f = flag.clone();
    let handle = thread::spawn(move || {
        let outcome = atomically(|tx| {
            if f.read(tx)? {
                return Ok("written");
            }
            if tx.elapsed(Duration::from_secs(30))? {
                return Ok("timed out");
            }
            retry()
        })
        .unwrap();
        sender.send(outcome).unwrap();
    });

    thread::sleep(Duration::from_millis(50));
    flag.set(true).unwrap();
    assert_eq!(receiver.recv_timeout(WAIT_LIMIT).unwrap(), "written");
    handle.join().unwrap();
}

#[test]
fn many_waiters_all_wake() {
    let gate = TVar::new(0);
    let waiters: Vec<_> = (0..4).map(|_| wait_for_nonzero(&gate)).collect();

    thread::sleep(Duration::from_millis(50));
    gate.set(1).unwrap();

    for waiting in waiters {
        assert_eq!(waiting.finish(), 1);
    }
}
