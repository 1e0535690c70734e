//! BroadcastQueue: a multi-reader transactional queue
//!
//! ## Design
//!
//! The queue is a singly linked list of cells. Each link cell holds either
//! nothing (the open end) or a value plus the next link. The queue keeps
//! one cell pointing at the open end; `put` fills that link and moves the
//! pointer to a fresh empty one.
//!
//! Readers are [`BroadcastEndpoint`]s. Each endpoint has its own cursor cell
//! pointing at the next link it will read, so every endpoint sees every
//! value put after it was created, independently of the others. Links no
//! endpoint can reach any more are dropped with their last handle.
//!
//! A blocking read of an exhausted endpoint requests retry: the attempt
//! sleeps until a `put` fills the link it was waiting on.
//!
//! ```
//! use strata_concurrency::atomically;
//! use strata_primitives::BroadcastQueue;
//!
//! let queue = BroadcastQueue::new();
//! let reader = atomically(|tx| queue.new_endpoint(tx)).unwrap();
//! atomically(|tx| queue.put(tx, "hello")).unwrap();
//! assert_eq!(atomically(|tx| reader.get(tx, true)).unwrap(), "hello");
//! ```

use std::any::Any;
use std::fmt;
use strata_concurrency::{retry, StmError, StmResult, TVar, Transaction};
use strata_core::Error;

/// One filled position in the list
struct Item<T> {
    value: T,
    next: Link<T>,
}

impl<T: Clone> Clone for Item<T> {
    fn clone(&self) -> Self {
        Item {
            value: self.value.clone(),
            next: self.next.clone(),
        }
    }
}

type Link<T> = TVar<Option<Item<T>>>;

// ============================================================================
// Queue
// ============================================================================

/// Writer side of a broadcast queue
///
/// Cloning yields another handle to the same queue.
pub struct BroadcastQueue<T> {
    tail: TVar<Link<T>>,
    written: TVar<usize>,
}

impl<T> BroadcastQueue<T>
where
    T: Any + Send + Sync + Clone,
{
    /// Create an empty queue
    pub fn new() -> Self {
        BroadcastQueue {
            tail: TVar::new(TVar::new(None)),
            written: TVar::new(0),
        }
    }

    /// Append `value`; every existing endpoint will see it
    pub fn put(&self, tx: &mut Transaction, value: T) -> StmResult<()> {
        let next: Link<T> = TVar::new(None);
        let tail = self.tail.replace(tx, next.clone())?;
        tail.write(tx, Some(Item { value, next }));
        self.written.modify(tx, |n| n.wrapping_add(1))
    }

    /// Create a reader positioned after everything put so far
    pub fn new_endpoint(&self, tx: &mut Transaction) -> StmResult<BroadcastEndpoint<T>> {
        let cursor = self.tail.read(tx)?;
        let written = self.written.read(tx)?;
        Ok(BroadcastEndpoint {
            written: self.written.clone(),
            cursor: TVar::new(cursor),
            read: TVar::new(written),
        })
    }

    /// Total number of values ever put
    pub fn written(&self, tx: &mut Transaction) -> StmResult<usize> {
        self.written.read(tx)
    }
}

impl<T> Clone for BroadcastQueue<T> {
    fn clone(&self) -> Self {
        BroadcastQueue {
            tail: self.tail.clone(),
            written: self.written.clone(),
        }
    }
}

impl<T> Default for BroadcastQueue<T>
where
    T: Any + Send + Sync + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BroadcastQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastQueue")
            .field("tail", &self.tail)
            .field("written", &self.written)
            .finish()
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// Reader side of a broadcast queue
///
/// Cloning shares the cursor; use [`BroadcastEndpoint::duplicate`] for an
/// independent reader at the same position.
pub struct BroadcastEndpoint<T> {
    written: TVar<usize>,
    cursor: TVar<Link<T>>,
    /// Position in the queue's write count; wraps on `replace` past zero
    read: TVar<usize>,
}

impl<T> BroadcastEndpoint<T>
where
    T: Any + Send + Sync + Clone,
{
    /// Take the next value.
    ///
    /// With nothing available, `block == true` requests retry and
    /// `block == false` fails with `Error::Empty`.
    pub fn get(&self, tx: &mut Transaction, block: bool) -> StmResult<T> {
        let link = self.cursor.read(tx)?;
        match link.read(tx)? {
            Some(Item { value, next }) => {
                self.cursor.write(tx, next);
                self.read.modify(tx, |n| n.wrapping_add(1))?;
                Ok(value)
            }
            None if block => retry(),
            None => Err(StmError::from(Error::Empty)),
        }
    }

    /// Look at the next value without taking it
    pub fn peek(&self, tx: &mut Transaction, block: bool) -> StmResult<T> {
        let value = self.get(tx, block)?;
        self.replace(tx, value.clone())?;
        Ok(value)
    }

    /// Push `value` back in front of this endpoint only.
    ///
    /// Other endpoints are unaffected.
    pub fn replace(&self, tx: &mut Transaction, value: T) -> StmResult<()> {
        let next = self.cursor.read(tx)?;
        self.cursor.write(tx, TVar::new(Some(Item { value, next })));
        self.read.modify(tx, |n| n.wrapping_sub(1))
    }

    /// Whether no value is available right now
    pub fn is_empty(&self, tx: &mut Transaction) -> StmResult<bool> {
        let link = self.cursor.read(tx)?;
        Ok(link.read(tx)?.is_none())
    }

    /// An independent endpoint at the same position
    pub fn duplicate(&self, tx: &mut Transaction) -> StmResult<Self> {
        Ok(BroadcastEndpoint {
            written: self.written.clone(),
            cursor: TVar::new(self.cursor.read(tx)?),
            read: TVar::new(self.read.read(tx)?),
        })
    }

    /// Number of values this endpoint has yet to read
    pub fn remaining(&self, tx: &mut Transaction) -> StmResult<usize> {
        let written = self.written.read(tx)?;
        let read = self.read.read(tx)?;
        Ok(written.wrapping_sub(read))
    }
}

impl<T> Clone for BroadcastEndpoint<T> {
    fn clone(&self) -> Self {
        BroadcastEndpoint {
            written: self.written.clone(),
            cursor: self.cursor.clone(),
            read: self.read.clone(),
        }
    }
}

impl<T> fmt::Debug for BroadcastEndpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastEndpoint")
            .field("cursor", &self.cursor)
            .field("read", &self.read)
            .finish()
    }
}
