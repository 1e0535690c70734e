//! Configuration Tests
//!
//! Tests that `stm.toml` settings drive the top-level loop.

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Body that conflicts on every run by committing to `x` behind its back.
fn always_conflicting<'a>(
    x: &'a TVar<i32>,
    runs: &'a AtomicUsize,
) -> impl FnMut(&mut Transaction) -> StmResult<()> + 'a {
    move |tx| {
        runs.fetch_add(1, Ordering::SeqCst);
        let n = x.read(tx)?;
        let other = x.clone();
        thread::spawn(move || other.set(n + 100).unwrap())
            .join()
            .unwrap();
        x.write(tx, n + 1);
        Ok(())
    }
}

#[test]
fn restart_budget_from_toml() {
    let config = StmConfig::from_toml_str("max_restarts = 2").unwrap();
    let x = TVar::new(0);
    let runs = AtomicUsize::new(0);

    let result = atomically_with(&config, always_conflicting(&x, &runs));

    assert!(matches!(result, Err(Error::TooManyRestarts { restarts: 2 })));
    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert_eq!(value_of(&x), 300);
}

#[test]
fn backoff_delays_restarts() {
    let config = StmConfig::from_toml_str(
        r#"
        max_restarts = 3
        backoff_base_ms = 10
        backoff_max_ms = 20
        "#,
    )
    .unwrap();
    let x = TVar::new(0);
    let runs = AtomicUsize::new(0);

    let start = Instant::now();
    let result = atomically_with(&config, always_conflicting(&x, &runs));

    assert!(matches!(result, Err(Error::TooManyRestarts { restarts: 3 })));
    // 10 + 20 + 20 ms between the four runs
    assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
fn invalid_toml_is_rejected() {
    let result = StmConfig::from_toml_str("backoff_base_ms = 30\nbackoff_max_ms = 10");
    assert!(matches!(result, Err(Error::InvalidConfig(_))));
}

#[test]
fn retry_waits_do_not_use_restart_budget() {
    let config = StmConfig::new().with_max_restarts(0);
    let gate = TVar::new(false);

    let g = gate.clone();
    let opener = thread::spawn(move || {
        for _ in 0..3 {
            thread::sleep(Duration::from_millis(20));
            g.set(false).unwrap();
        }
        g.set(true).unwrap();
    });

    let result = atomically_with(&config, |tx| {
        if !gate.read(tx)? {
            return retry();
        }
        Ok("open")
    });
    opener.join().unwrap();
    assert_eq!(result.unwrap(), "open");
}
