//! Watcher Tests
//!
//! Tests for reactive dataflow:
//! - One probe and callback run per change of a watched cell
//! - Unrelated writes never trigger a watcher
//! - Re-wiring follows what the probe last read
//! - Deadline-driven re-evaluation on the notifier thread

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Watch `source`, bumping `counter` on every probe result.
fn count_changes(source: &TVar<i32>, counter: &TVar<usize>) -> Watcher {
    let (s, c) = (source.clone(), counter.clone());
    watch(
        move |tx| s.read(tx),
        move |tx, _: i32| c.modify(tx, |n| n + 1),
    )
    .unwrap()
}

#[test]
fn one_callback_per_change() {
    init_tracing();
    let y = TVar::new(0);
    let runs = TVar::new(0usize);
    let watcher = count_changes(&y, &runs);
    assert_eq!(value_of(&runs), 1);
    assert_eq!(watcher.watched_count(), 1);

    for i in 1..=3 {
        y.set(i).unwrap();
    }
    assert_eq!(value_of(&runs), 4);
}

#[test]
fn unrelated_cells_never_trigger() {
    let y = TVar::new(0);
    let unrelated = TVar::new(0);
    let runs = TVar::new(0usize);
    let _watcher = count_changes(&y, &runs);

    for i in 1..=5 {
        unrelated.set(i).unwrap();
    }
    assert_eq!(value_of(&runs), 1);
}

#[test]
fn reading_a_watched_cell_does_not_trigger() {
    let y = TVar::new(0);
    let runs = TVar::new(0usize);
    let _watcher = count_changes(&y, &runs);

    for _ in 0..3 {
        assert_eq!(value_of(&y), 0);
    }
    assert_eq!(value_of(&runs), 1);
}

#[test]
fn concurrent_changes_each_counted_once() {
    const THREADS: usize = 4;
    const PER_THREAD: usize = 50;

    let y = TVar::new(0);
    let runs = TVar::new(0usize);
    let _watcher = count_changes(&y, &runs);

    let source = y.clone();
    join_all(spawn_together(THREADS, move |_| {
        for _ in 0..PER_THREAD {
            atomically(|tx| source.modify(tx, |n| n + 1)).unwrap();
        }
    }));

    assert_eq!(value_of(&y), (THREADS * PER_THREAD) as i32);
    assert_eq!(value_of(&runs), 1 + THREADS * PER_THREAD);
}

#[test]
fn derived_cell_commits_with_its_source() {
    let y = TVar::new(1);
    let doubled = TVar::new(0);
    let (s, d) = (y.clone(), doubled.clone());
    let _watcher = watch(move |tx| s.read(tx), move |tx, v: i32| {
        d.write(tx, v * 2);
        Ok(())
    })
    .unwrap();
    assert_eq!(value_of(&doubled), 2);

    let (inside, after_commit) = (
        atomically(|tx| {
            y.write(tx, 5);
            doubled.read(tx)
        })
        .unwrap(),
        value_of(&doubled),
    );
    // Watchers run at commit, after the body.
    assert_eq!(inside, 2);
    assert_eq!(after_commit, 10);
}

#[test]
fn watchers_chain_within_one_commit() {
    let y = TVar::new(0);
    let z = TVar::new(0);
    let seen = TVar::new(0);

    let (src, dst) = (y.clone(), z.clone());
    let _first = watch(move |tx| src.read(tx), move |tx, v: i32| {
        dst.write(tx, v + 100);
        Ok(())
    })
    .unwrap();
    let (src, dst) = (z.clone(), seen.clone());
    let _second = watch(move |tx| src.read(tx), move |tx, v: i32| {
        dst.write(tx, v);
        Ok(())
    })
    .unwrap();

    y.set(7).unwrap();
    let (z_now, seen_now) = atomically(|tx| Ok((z.read(tx)?, seen.read(tx)?))).unwrap();
    assert_eq!(z_now, 107);
    assert_eq!(seen_now, 107);
}

#[test]
fn rewiring_follows_latest_probe() {
    let use_left = TVar::new(true);
    let left = TVar::new(0);
    let right = TVar::new(0);
    let runs = TVar::new(0usize);

    let (flag, l, r, c) = (use_left.clone(), left.clone(), right.clone(), runs.clone());
    let watcher = watch(
        move |tx| {
            if flag.read(tx)? {
                l.read(tx)
            } else {
                r.read(tx)
            }
        },
        move |tx, _: i32| c.modify(tx, |n| n + 1),
    )
    .unwrap();
    assert_eq!(watcher.watched_count(), 2);

    right.set(1).unwrap();
    assert_eq!(value_of(&runs), 1);
    left.set(1).unwrap();
    assert_eq!(value_of(&runs), 2);

    use_left.set(false).unwrap();
    assert_eq!(value_of(&runs), 3);
    assert_eq!(watcher.watched_count(), 2);

    left.set(2).unwrap();
    assert_eq!(value_of(&runs), 3);
    right.set(2).unwrap();
    assert_eq!(value_of(&runs), 4);
}

#[test]
fn probe_can_compare_with_previous_state() {
    let y = TVar::new(0);
    let changes = TVar::new(Vec::<(i32, i32)>::new());

    let (s, log) = (y.clone(), changes.clone());
    let _watcher = watch(
        move |tx| {
            let before = tx.previously(true, |tx| s.read(tx))?;
            let now = s.read(tx)?;
            Ok((before, now))
        },
        move |tx, pair| {
            log.modify(tx, |mut pairs| {
                pairs.push(pair);
                pairs
            })
        },
    )
    .unwrap();

    y.set(1).unwrap();
    y.set(2).unwrap();
    assert_eq!(value_of(&changes), vec![(0, 0), (0, 1), (1, 2)]);
}

#[test]
fn watcher_registered_inside_transaction_installs_on_commit() {
    let y = TVar::new(0);
    let runs = TVar::new(0usize);

    let (s, c) = (y.clone(), runs.clone());
    let watcher = atomically(|tx| {
        let (s, c) = (s.clone(), c.clone());
        let watcher = tx.watch(move |tx| s.read(tx), move |tx, _: i32| c.modify(tx, |n| n + 1));
        y.write(tx, 1);
        Ok(watcher)
    })
    .unwrap();
    assert_eq!(value_of(&runs), 1);
    assert_eq!(watcher.watched_count(), 1);

    y.set(2).unwrap();
    assert_eq!(value_of(&runs), 2);
}

#[test]
fn failing_callback_aborts_the_triggering_commit() {
    let y = TVar::new(0);
    let s = y.clone();
    let _watcher = watch(
        move |tx| s.read(tx),
        |_, v: i32| {
            if v < 0 {
                return Err(StmError::Abort(Error::invalid_config("negative")));
            }
            Ok(())
        },
    )
    .unwrap();

    let result = y.set(-1);
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
    assert_eq!(value_of(&y), 0);
}

// ============================================================================
// Time-driven Re-evaluation
// ============================================================================

#[test]
fn deadline_reruns_watcher() {
    let deadline = Instant::now() + Duration::from_millis(80);
    let passed = TVar::new(false);

    let p = passed.clone();
    let watcher = watch(
        move |tx| tx.elapsed(deadline),
        move |tx, elapsed: bool| {
            p.write(tx, elapsed);
            Ok(())
        },
    )
    .unwrap();
    assert!(!value_of(&passed));
    assert!(watcher.has_pending_notification());

    assert!(eventually(|| value_of(&passed)));
    assert!(Instant::now() >= deadline);
    assert!(eventually(|| !watcher.has_pending_notification()));
}

#[test]
fn write_before_deadline_supersedes_notification() {
    let deadline = Instant::now() + Duration::from_millis(150);
    let trigger = TVar::new(0);
    let runs = TVar::new(0usize);

    let (t, c) = (trigger.clone(), runs.clone());
    let _watcher = watch(
        move |tx| {
            let n = t.read(tx)?;
            // Only the first evaluation asks to be re-run.
            if n == 0 {
                tx.elapsed(deadline)?;
            }
            Ok(n)
        },
        move |tx, _: i32| c.modify(tx, |n| n + 1),
    )
    .unwrap();
    assert_eq!(value_of(&runs), 1);

    trigger.set(1).unwrap();
    assert_eq!(value_of(&runs), 2);

    std::thread::sleep(Duration::from_millis(250));
    assert_eq!(value_of(&runs), 2);
}

#[test]
fn relative_deadline_does_not_rearm_watcher() {
    let runs = Arc::new(AtomicUsize::new(0));
    let passed = Arc::new(AtomicUsize::new(0));

    let (r, p) = (Arc::clone(&runs), Arc::clone(&passed));
    let watcher = watch(
        |tx| tx.elapsed(Duration::from_millis(30)),
        move |_, elapsed: bool| {
            r.fetch_add(1, Ordering::SeqCst);
            if elapsed {
                p.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        },
    )
    .unwrap();
    assert!(!watcher.has_pending_notification());

    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(passed.load(Ordering::SeqCst), 0);
}

#[test]
fn rearming_keeps_one_pending_notification() {
    let trigger = TVar::new(0);
    let runs = TVar::new(0usize);
    let far = Instant::now() + Duration::from_secs(3600);

    let (t, c) = (trigger.clone(), runs.clone());
    let watcher = watch(
        move |tx| {
            let n = t.read(tx)?;
            tx.elapsed(far + Duration::from_millis(n as u64))?;
            Ok(n)
        },
        move |tx, _: i32| c.modify(tx, |n| n + 1),
    )
    .unwrap();

    for i in 1..=20 {
        trigger.set(i).unwrap();
    }
    assert_eq!(value_of(&runs), 21);
    assert!(watcher.has_pending_notification());
}
