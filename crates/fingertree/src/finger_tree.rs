//! Public persistent sequence type

use crate::measure::{ItemCount, Measure};
use crate::node::Entry;
use crate::tree::{Iter, Tree};
use std::fmt;
use strata_core::{Error, Result};

/// A persistent sequence annotated by a [`Measure`]
///
/// Every operation takes `&self` and returns new trees; the receiver stays
/// valid and shares unchanged structure with the results. Cloning is O(1).
pub struct FingerTree<M: Measure> {
    measure: M,
    tree: Tree<M::Item, M::Annotation>,
}

impl<M> FingerTree<M>
where
    M: Measure,
    M::Item: Clone,
{
    /// An empty tree annotated by `measure`
    pub fn new(measure: M) -> Self {
        FingerTree {
            measure,
            tree: Tree::Empty,
        }
    }

    /// Build a tree holding `items` in order
    pub fn from_items<I>(measure: M, items: I) -> Self
    where
        I: IntoIterator<Item = M::Item>,
    {
        let tree = Tree::from_entries(&measure, items.into_iter().map(Entry::Leaf));
        FingerTree { measure, tree }
    }

    fn with_tree(&self, tree: Tree<M::Item, M::Annotation>) -> Self {
        FingerTree {
            measure: self.measure.clone(),
            tree,
        }
    }

    /// The measure this tree is annotated with
    pub fn measure(&self) -> &M {
        &self.measure
    }

    /// Fold of every element's annotation (identity when empty)
    pub fn annotation(&self) -> M::Annotation {
        self.tree.annotation(&self.measure)
    }

    /// Whether the tree has no elements
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// First element.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyTree` if the tree is empty.
    pub fn first(&self) -> Result<&M::Item> {
        leaf(self.tree.first())
    }

    /// Last element.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyTree` if the tree is empty.
    pub fn last(&self) -> Result<&M::Item> {
        leaf(self.tree.last())
    }

    /// A tree with `item` added at the front
    pub fn push_front(&self, item: M::Item) -> Self {
        self.with_tree(self.tree.push_front(&self.measure, Entry::Leaf(item)))
    }

    /// A tree with `item` added at the back
    pub fn push_back(&self, item: M::Item) -> Self {
        self.with_tree(self.tree.push_back(&self.measure, Entry::Leaf(item)))
    }

    /// Split off the first element.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyTree` if the tree is empty.
    pub fn pop_front(&self) -> Result<(M::Item, Self)> {
        match self.tree.pop_front(&self.measure) {
            Some((Entry::Leaf(item), rest)) => Ok((item, self.with_tree(rest))),
            Some((Entry::Node(_), _)) => Err(Error::internal("node entry at the top level")),
            None => Err(Error::EmptyTree),
        }
    }

    /// Split off the last element.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptyTree` if the tree is empty.
    pub fn pop_back(&self) -> Result<(M::Item, Self)> {
        match self.tree.pop_back(&self.measure) {
            Some((Entry::Leaf(item), rest)) => Ok((item, self.with_tree(rest))),
            Some((Entry::Node(_), _)) => Err(Error::internal("node entry at the top level")),
            None => Err(Error::EmptyTree),
        }
    }

    /// The tree without its first element
    pub fn without_first(&self) -> Result<Self> {
        self.pop_front().map(|(_, rest)| rest)
    }

    /// The tree without its last element
    pub fn without_last(&self) -> Result<Self> {
        self.pop_back().map(|(_, rest)| rest)
    }

    /// Elements of `self` followed by elements of `other`
    pub fn append(&self, other: &Self) -> Self {
        self.with_tree(Tree::concat(
            &self.measure,
            &self.tree,
            Vec::new(),
            &other.tree,
        ))
    }

    /// Elements of `other` followed by elements of `self`
    pub fn prepend(&self, other: &Self) -> Self {
        other.append(self)
    }

    /// Split where the running prefix annotation first satisfies `pred`.
    ///
    /// `pred` must be monotonic over growing prefixes: false up to some
    /// point, true afterwards. The element that flips it starts the right
    /// tree. If it never flips, the right tree is empty; if it holds for the
    /// first element, the left tree is empty. Concatenating the two halves
    /// always reproduces `self`.
    pub fn partition<P>(&self, pred: P) -> (Self, Self)
    where
        P: Fn(&M::Annotation) -> bool,
    {
        let (left, right) = self
            .tree
            .split(&self.measure, &self.measure.identity(), &pred);
        (self.with_tree(left), self.with_tree(right))
    }

    /// The element at which the running prefix annotation first satisfies `pred`
    pub fn find<P>(&self, pred: P) -> Option<&M::Item>
    where
        P: Fn(&M::Annotation) -> bool,
    {
        self.tree.find(&self.measure, &self.measure.identity(), &pred)
    }

    /// Front-to-back iterator over the elements
    pub fn iter(&self) -> Iter<'_, M::Item, M::Annotation> {
        Iter::new(&self.tree)
    }
}

fn leaf<T, A>(entry: Option<&Entry<T, A>>) -> Result<&T> {
    match entry {
        Some(Entry::Leaf(item)) => Ok(item),
        Some(Entry::Node(_)) => Err(Error::internal("node entry at the top level")),
        None => Err(Error::EmptyTree),
    }
}

// ============================================================================
// Positional access
// ============================================================================

impl<T: Clone> FingerTree<ItemCount<T>> {
    /// Number of elements, read from the root annotation
    pub fn len(&self) -> usize {
        self.annotation()
    }

    /// Element at `index`, or `None` when out of bounds
    pub fn get(&self, index: usize) -> Option<&T> {
        self.find(|count| *count > index)
    }

    /// The first `index` elements and the rest
    pub fn split_at(&self, index: usize) -> (Self, Self) {
        self.partition(|count| *count > index)
    }
}

// ============================================================================
// Trait impls
// ============================================================================

impl<M> Clone for FingerTree<M>
where
    M: Measure,
    M::Item: Clone,
{
    fn clone(&self) -> Self {
        self.with_tree(self.tree.clone())
    }
}

impl<M> Default for FingerTree<M>
where
    M: Measure + Default,
    M::Item: Clone,
{
    fn default() -> Self {
        Self::new(M::default())
    }
}

impl<M> fmt::Debug for FingerTree<M>
where
    M: Measure,
    M::Item: Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<M> PartialEq for FingerTree<M>
where
    M: Measure,
    M::Item: Clone + PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl<M> Eq for FingerTree<M>
where
    M: Measure,
    M::Item: Clone + Eq,
{
}

impl<M> FromIterator<M::Item> for FingerTree<M>
where
    M: Measure + Default,
    M::Item: Clone,
{
    fn from_iter<I: IntoIterator<Item = M::Item>>(iter: I) -> Self {
        Self::from_items(M::default(), iter)
    }
}

impl<'a, M> IntoIterator for &'a FingerTree<M>
where
    M: Measure,
    M::Item: Clone,
{
    type Item = &'a M::Item;
    type IntoIter = Iter<'a, M::Item, M::Annotation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
