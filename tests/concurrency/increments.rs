//! Increment and Serializability Tests
//!
//! Tests that concurrent committed attempts behave as if run one at a time:
//! - No lost updates under contention
//! - Paired cells are always observed together
//! - Transfers preserve totals

use crate::common::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// ============================================================================
// Lost Updates
// ============================================================================

#[test]
fn concurrent_increments_are_all_counted() {
    init_tracing();
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;

    let counter = TVar::new(0usize);
    let c = counter.clone();
    let handles = spawn_together(THREADS, move |_| {
        for _ in 0..PER_THREAD {
            atomically(|tx| c.modify(tx, |n| n + 1)).unwrap();
        }
    });
    join_all(handles);

    assert_eq!(value_of(&counter), THREADS * PER_THREAD);
}

#[test]
fn increments_spread_over_many_cells() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 200;

    let cells: Arc<Vec<TVar<u64>>> = Arc::new((0..16).map(|_| TVar::new(0)).collect());
    let shared = Arc::clone(&cells);
    let handles = spawn_together(THREADS, move |thread| {
        for round in 0..ROUNDS {
            let index = (thread * 7 + round * 3) % shared.len();
            atomically(|tx| shared[index].modify(tx, |n| n + 1)).unwrap();
        }
    });
    join_all(handles);

    let total: u64 = atomically(|tx| {
        let mut sum = 0;
        for cell in cells.iter() {
            sum += cell.read(tx)?;
        }
        Ok(sum)
    })
    .unwrap();
    assert_eq!(total, (THREADS * ROUNDS) as u64);
}

// ============================================================================
// Consistent Snapshots
// ============================================================================

#[test]
fn paired_cells_never_observed_apart() {
    let left = TVar::new(0u64);
    let right = TVar::new(0u64);
    let violations = Arc::new(AtomicUsize::new(0));

    let (l, r) = (left.clone(), right.clone());
    let writers = spawn_together(2, move |_| {
        for _ in 0..300 {
            atomically(|tx| {
                l.modify(tx, |n| n + 1)?;
                r.modify(tx, |n| n + 1)
            })
            .unwrap();
        }
    });

    let (l, r, v) = (left.clone(), right.clone(), Arc::clone(&violations));
    let readers = spawn_together(2, move |_| {
        for _ in 0..300 {
            // Checked inside the body: even attempts that later restart must
            // see a consistent pair.
            atomically(|tx| {
                let a = l.read(tx)?;
                let b = r.read(tx)?;
                if a != b {
                    v.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            })
            .unwrap();
        }
    });

    join_all(writers);
    join_all(readers);
    assert_eq!(violations.load(Ordering::SeqCst), 0);
    assert_eq!(value_of(&left), 600);
    assert_eq!(value_of(&right), 600);
}

#[test]
fn random_transfers_preserve_total() {
    const ACCOUNTS: usize = 10;
    const INITIAL: i64 = 1_000;

    let accounts: Arc<Vec<TVar<i64>>> =
        Arc::new((0..ACCOUNTS).map(|_| TVar::new(INITIAL)).collect());
    let shared = Arc::clone(&accounts);
    let handles = spawn_together(6, move |thread| {
        let mut rng = StdRng::seed_from_u64(0xC0FFEE + thread as u64);
        for _ in 0..200 {
            let from = rng.gen_range(0..ACCOUNTS);
            let to = rng.gen_range(0..ACCOUNTS);
            let amount = rng.gen_range(1..50);
            atomically(|tx| {
                let balance = shared[from].read(tx)?;
                if balance < amount {
                    return Ok(());
                }
                shared[from].write(tx, balance - amount);
                shared[to].modify(tx, |b| b + amount)
            })
            .unwrap();
        }
    });
    join_all(handles);

    let (total, min) = atomically(|tx| {
        let mut total = 0;
        let mut min = i64::MAX;
        for account in accounts.iter() {
            let balance = account.read(tx)?;
            total += balance;
            min = min.min(balance);
        }
        Ok((total, min))
    })
    .unwrap();
    assert_eq!(total, INITIAL * ACCOUNTS as i64);
    assert!(min >= 0);
}

// ============================================================================
// Statistics
// ============================================================================

#[test]
fn stats_count_commits_and_read_only_commits() {
    let cell = TVar::new(1);
    let before = stats();

    cell.set(2).unwrap();
    assert_eq!(value_of(&cell), 2);

    let after = stats();
    assert!(after.committed > before.committed);
    assert!(after.read_only_commits > before.read_only_commits);
    assert!(after.current_version > before.current_version);
    assert!(after.started >= before.started + 2);
}
