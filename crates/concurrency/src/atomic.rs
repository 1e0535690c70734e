//! Top-level entry points
//!
//! [`atomically`] runs a body as a top-level attempt and repeats it until it
//! commits. Restarts are transparent: the body may run several times, so
//! effects outside cells must tolerate repetition. A retry request blocks
//! the thread until a cell the attempt read is written, then runs the body
//! again.

use crate::manager::TransactionManager;
use crate::outcome::{StmError, StmResult};
use crate::transaction::Transaction;
use crate::watcher::{Watcher, WatcherRef};
use std::cell::Cell;
use std::time::Instant;
use strata_core::{Error, Result, StmConfig};
use tracing::{debug, warn};

thread_local! {
    static IN_TRANSACTION: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running a top-level attempt
struct ScopeGuard;

impl ScopeGuard {
    fn enter() -> Result<Self> {
        IN_TRANSACTION.with(|flag| {
            if flag.replace(true) {
                Err(Error::NestedAtomically)
            } else {
                Ok(ScopeGuard)
            }
        })
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        IN_TRANSACTION.with(|flag| flag.set(false));
    }
}

/// Whether the calling thread is inside an `atomically` body
pub fn in_transaction() -> bool {
    IN_TRANSACTION.with(|flag| flag.get())
}

/// Run `body` atomically with the default configuration.
///
/// # Errors
///
/// Returns the error a body aborted with, or `Error::NestedAtomically` when
/// called from inside another body on the same thread.
pub fn atomically<T, F>(body: F) -> Result<T>
where
    F: FnMut(&mut Transaction) -> StmResult<T>,
{
    atomically_with(&StmConfig::default(), body)
}

/// Run `body` atomically, restarting according to `config`.
///
/// # Errors
///
/// In addition to the errors of [`atomically`], returns
/// `Error::TooManyRestarts` once `config.max_restarts` conflict restarts
/// have happened, and `Error::InvalidConfig` for an invalid `config`.
pub fn atomically_with<T, F>(config: &StmConfig, mut body: F) -> Result<T>
where
    F: FnMut(&mut Transaction) -> StmResult<T>,
{
    config.validate()?;
    let _scope = ScopeGuard::enter()?;
    let manager = TransactionManager::global();
    let overall_start = Instant::now();
    let mut current_start = overall_start;
    let mut restarts = 0usize;

    loop {
        let mut tx = Transaction::begin(manager, overall_start, current_start);
        let outcome = match body(&mut tx) {
            Ok(value) => tx.commit().map(|()| value),
            Err(signal) => Err(signal),
        };

        let conflict = match outcome {
            Ok(value) => return Ok(value),
            Err(StmError::Abort(e)) => return Err(e),
            Err(StmError::Restart) => true,
            Err(StmError::Retry) => match tx.wait_for_change() {
                Ok(next_start) => {
                    current_start = next_start;
                    false
                }
                Err(StmError::Abort(e)) => return Err(e),
                Err(_) => true,
            },
        };
        if !conflict {
            continue;
        }

        if !config.allows_restart(restarts) {
            warn!(target: "strata::stm", restarts, "Restart budget exhausted");
            return Err(Error::TooManyRestarts { restarts });
        }
        let delay = config.calculate_delay(restarts);
        restarts += 1;
        if !delay.is_zero() {
            debug!(target: "strata::stm", restarts, delay_ms = delay.as_millis() as u64, "Backing off before restart");
            std::thread::sleep(delay);
        }
    }
}

/// Register a watcher in its own transaction.
///
/// The probe runs once before this returns; see [`Transaction::watch`].
///
/// # Errors
///
/// Returns an error if the first probe or callback run aborts, or when
/// called from inside a transaction body.
pub fn watch<P, C, V>(probe: P, callback: C) -> Result<Watcher>
where
    P: Fn(&mut Transaction) -> StmResult<V> + Send + Sync + 'static,
    C: Fn(&mut Transaction, V) -> StmResult<()> + Send + Sync + 'static,
    V: Send + 'static,
{
    let watcher = WatcherRef::new(probe, callback);
    atomically(|tx| {
        tx.propose(watcher.clone());
        Ok(())
    })?;
    Ok(Watcher::new(watcher))
}
