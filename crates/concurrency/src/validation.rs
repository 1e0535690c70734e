//! Commit-time validation
//!
//! An attempt may commit only if nothing in its full access set changed
//! after its start watermark. The access set is every cell read or written
//! by the attempt, every cell whose watcher set it loaded, and every watcher
//! whose watched set it loaded. Both checks compare stamps against the
//! watermark and must run while the commit critical section is held.

use crate::cell::CellRef;
use crate::manager::CommitGuard;
use crate::watcher::WatcherRef;

/// Types of staleness found during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// A cell in the access set was committed after the attempt started
    StaleCell {
        /// Identity of the cell
        cell_id: u64,
        /// Commit version that last touched the cell
        modified: u64,
        /// Start watermark of the attempt
        start: u64,
    },

    /// A watcher in the access set was re-wired after the attempt started
    StaleWatcher {
        /// Identity of the watcher
        watcher_id: u64,
        /// Commit version that last touched the watcher
        modified: u64,
        /// Start watermark of the attempt
        start: u64,
    },
}

/// Result of transaction validation
///
/// Accumulates all conflicts found during validation.
/// A transaction commits only if is_valid() returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        ValidationResult {
            conflicts: Vec::new(),
        }
    }

    /// Create a validation result with a single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

/// Check one cell against the watermark.
pub(crate) fn check_cell(
    guard: &CommitGuard<'_>,
    cell: &CellRef,
    start: u64,
) -> Option<ConflictType> {
    let modified = cell.state(guard).modified;
    (modified > start).then(|| ConflictType::StaleCell {
        cell_id: cell.id(),
        modified,
        start,
    })
}

/// Check one watcher against the watermark.
pub(crate) fn check_watcher(
    guard: &CommitGuard<'_>,
    watcher: &WatcherRef,
    start: u64,
) -> Option<ConflictType> {
    let modified = watcher.state(guard).modified;
    (modified > start).then(|| ConflictType::StaleWatcher {
        watcher_id: watcher.id(),
        modified,
        start,
    })
}

/// Validate every cell in `cells` against `start`
pub(crate) fn validate_cells<'a, I>(guard: &CommitGuard<'_>, cells: I, start: u64) -> ValidationResult
where
    I: IntoIterator<Item = &'a CellRef>,
{
    ValidationResult {
        conflicts: cells
            .into_iter()
            .filter_map(|cell| check_cell(guard, cell, start))
            .collect(),
    }
}

/// Validate every watcher in `watchers` against `start`
pub(crate) fn validate_watchers<'a, I>(
    guard: &CommitGuard<'_>,
    watchers: I,
    start: u64,
) -> ValidationResult
where
    I: IntoIterator<Item = &'a WatcherRef>,
{
    ValidationResult {
        conflicts: watchers
            .into_iter()
            .filter_map(|watcher| check_watcher(guard, watcher, start))
            .collect(),
    }
}
