//! Persistent 2-3 finger trees annotated by a monoid
//!
//! A [`FingerTree`] is an immutable sequence with amortized O(1) access to
//! both ends and O(log n) splitting and concatenation. Every node caches the
//! fold of its elements under a [`Measure`]; [`FingerTree::partition`] uses
//! those cached annotations to find a split point without visiting every
//! element.
//!
//! ```
//! use strata_fingertree::{FingerTree, ItemCount};
//!
//! let tree: FingerTree<ItemCount<char>> = "finger".chars().collect();
//! let (left, right) = tree.split_at(3);
//! assert_eq!(left.iter().collect::<String>(), "fin");
//! assert_eq!(right.iter().collect::<String>(), "ger");
//! assert_eq!(tree.len(), 6);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod finger_tree;
pub mod measure;
mod node;
mod tree;

pub use finger_tree::FingerTree;
pub use measure::{
    FnMeasure, FromSemigroup, ItemCount, LastItem, Measure, MinMax, Semigroup, Translate,
};
pub use tree::Iter;
