//! TArray: a transactional indexed sequence
//!
//! ## Design
//!
//! The whole sequence lives in one cell holding a persistent
//! [`FingerTree`] under the item-count measure. Every operation reads the
//! tree, splits it by position in O(log n), and writes back the rebuilt
//! tree. Unchanged structure is shared between the old and new versions, so
//! a write costs O(log n) allocations regardless of length.
//!
//! Because the array is a single cell, two transactions that touch the same
//! array conflict even when they use different indices.
//!
//! ## Usage
//!
//! Methods take the running [`Transaction`] and compose with any other cell
//! operation inside the same body:
//!
//! ```
//! use strata_concurrency::atomically;
//! use strata_primitives::TArray;
//!
//! let array = TArray::new();
//! atomically(|tx| array.insert(tx, 0, ["a", "b", "c"])).unwrap();
//! let removed = atomically(|tx| array.delete_at(tx, 1)).unwrap();
//! assert_eq!(removed, Some("b"));
//! assert_eq!(atomically(|tx| array.to_vec(tx)).unwrap(), vec!["a", "c"]);
//! ```

use std::any::Any;
use std::fmt;
use strata_concurrency::{StmError, StmResult, TVar, Transaction};
use strata_core::Error;
use strata_fingertree::{FingerTree, ItemCount};

type Sequence<T> = FingerTree<ItemCount<T>>;

/// Transactional array backed by a finger tree
///
/// Cloning yields another handle to the same array.
pub struct TArray<T> {
    tree: TVar<Sequence<T>>,
}

impl<T> TArray<T>
where
    T: Any + Send + Sync + Clone,
{
    /// Create an empty array
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Create an array holding `items` in order
    pub fn from_vec(items: Vec<T>) -> Self {
        TArray {
            tree: TVar::new(FingerTree::from_items(ItemCount::new(), items)),
        }
    }

    /// Element at `index`, or `None` when out of bounds
    pub fn get(&self, tx: &mut Transaction, index: usize) -> StmResult<Option<T>> {
        let tree = self.tree.read(tx)?;
        Ok(tree.get(index).cloned())
    }

    /// Replace the element at `index`.
    ///
    /// Fails with `Error::IndexOutOfBounds` when `index >= len`.
    pub fn set(&self, tx: &mut Transaction, index: usize, value: T) -> StmResult<()> {
        let tree = self.tree.read(tx)?;
        let (left, right) = tree.split_at(index);
        let rest = right.without_first().map_err(|_| {
            StmError::from(Error::IndexOutOfBounds {
                index,
                len: tree.len(),
            })
        })?;
        self.tree.write(tx, left.push_back(value).append(&rest));
        Ok(())
    }

    /// Remove and return the element at `index`; `None` when out of bounds
    pub fn delete_at(&self, tx: &mut Transaction, index: usize) -> StmResult<Option<T>> {
        let tree = self.tree.read(tx)?;
        let (left, right) = tree.split_at(index);
        match right.pop_front() {
            Ok((removed, rest)) => {
                self.tree.write(tx, left.append(&rest));
                Ok(Some(removed))
            }
            Err(_) => Ok(None),
        }
    }

    /// Insert `values` before position `index`, in order.
    ///
    /// An index past the end appends.
    pub fn insert<I>(&self, tx: &mut Transaction, index: usize, values: I) -> StmResult<()>
    where
        I: IntoIterator<Item = T>,
    {
        let tree = self.tree.read(tx)?;
        let (left, right) = tree.split_at(index);
        let middle = FingerTree::from_items(ItemCount::new(), values);
        if middle.is_empty() {
            return Ok(());
        }
        self.tree.write(tx, left.append(&middle).append(&right));
        Ok(())
    }

    /// Append one element at the end
    pub fn push(&self, tx: &mut Transaction, value: T) -> StmResult<()> {
        self.tree.modify(tx, |tree| tree.push_back(value))
    }

    /// Remove and return the last element
    pub fn pop(&self, tx: &mut Transaction) -> StmResult<Option<T>> {
        let tree = self.tree.read(tx)?;
        match tree.pop_back() {
            Ok((last, rest)) => {
                self.tree.write(tx, rest);
                Ok(Some(last))
            }
            Err(_) => Ok(None),
        }
    }

    /// Number of elements
    pub fn len(&self, tx: &mut Transaction) -> StmResult<usize> {
        Ok(self.tree.read(tx)?.len())
    }

    /// Whether the array holds no elements
    pub fn is_empty(&self, tx: &mut Transaction) -> StmResult<bool> {
        Ok(self.tree.read(tx)?.is_empty())
    }

    /// Copy the elements into a `Vec`
    pub fn to_vec(&self, tx: &mut Transaction) -> StmResult<Vec<T>> {
        Ok(self.tree.read(tx)?.iter().cloned().collect())
    }

    /// The persistent tree as seen by `tx`.
    ///
    /// The snapshot is immutable; iterate it after the transaction without
    /// holding anything open.
    pub fn snapshot(&self, tx: &mut Transaction) -> StmResult<Sequence<T>> {
        self.tree.read(tx)
    }
}

impl<T> Clone for TArray<T> {
    fn clone(&self) -> Self {
        TArray {
            tree: self.tree.clone(),
        }
    }
}

impl<T> Default for TArray<T>
where
    T: Any + Send + Sync + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TArray").field("cell", &self.tree).finish()
    }
}
