//! Annotated grouping primitive shared by digits and spine nodes
//!
//! Every level of a finger tree stores [`Entry`] values: a leaf holding a
//! user element, or a shared [`Node`] grouping entries of the level below.
//! Using one entry type at every depth keeps the spine a plain tree of
//! entries instead of a tree of trees, which Rust could not monomorphize.

use crate::measure::Measure;
use smallvec::SmallVec;
use std::sync::Arc;

/// Entries of one node or digit
pub(crate) type Entries<T, A> = SmallVec<[Entry<T, A>; 4]>;

/// An element at some depth of the tree
#[derive(Debug, Clone)]
pub(crate) enum Entry<T, A> {
    /// A user element
    Leaf(T),
    /// A group of 2–3 entries from the level below
    Node(Arc<Node<T, A>>),
}

/// Annotation of one entry
pub(crate) fn measure_entry<M>(m: &M, entry: &Entry<M::Item, M::Annotation>) -> M::Annotation
where
    M: Measure,
{
    match entry {
        Entry::Leaf(item) => m.convert(item),
        Entry::Node(node) => node.annotation.clone(),
    }
}

/// A sequence of entries with its cached fold
///
/// Used for 1–4 entry digits and for 2–3 entry spine nodes.
#[derive(Debug, Clone)]
pub(crate) struct Node<T, A> {
    pub(crate) annotation: A,
    pub(crate) entries: Entries<T, A>,
}

impl<T: Clone, A: Clone> Node<T, A> {
    pub(crate) fn new<M>(m: &M, entries: Entries<T, A>) -> Self
    where
        M: Measure<Item = T, Annotation = A>,
    {
        let annotation = entries
            .iter()
            .fold(m.identity(), |acc, e| m.combine(&acc, &measure_entry(m, e)));
        Node {
            annotation,
            entries,
        }
    }

    pub(crate) fn from_slice<M>(m: &M, entries: &[Entry<T, A>]) -> Self
    where
        M: Measure<Item = T, Annotation = A>,
    {
        Self::new(m, entries.iter().cloned().collect())
    }

    /// Turn a spine entry back into a digit.
    ///
    /// Spine entries are always nodes; a stray leaf becomes a one-entry digit.
    pub(crate) fn from_entry<M>(m: &M, entry: Entry<T, A>) -> Self
    where
        M: Measure<Item = T, Annotation = A>,
    {
        match entry {
            Entry::Node(node) => Arc::try_unwrap(node).unwrap_or_else(|shared| (*shared).clone()),
            leaf @ Entry::Leaf(_) => Self::new(m, smallvec::smallvec![leaf]),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn first(&self) -> Option<&Entry<T, A>> {
        self.entries.first()
    }

    pub(crate) fn last(&self) -> Option<&Entry<T, A>> {
        self.entries.last()
    }

    /// Split at the first entry whose running annotation satisfies `pred`.
    ///
    /// The running annotation starts at `initial`. The entry that flips the
    /// predicate begins the right half; if none does, the right half is empty.
    pub(crate) fn split<M, P>(
        &self,
        m: &M,
        initial: &A,
        pred: &P,
    ) -> (Entries<T, A>, Entries<T, A>)
    where
        M: Measure<Item = T, Annotation = A>,
        P: Fn(&A) -> bool,
    {
        let mut running = initial.clone();
        for (index, entry) in self.entries.iter().enumerate() {
            let next = m.combine(&running, &measure_entry(m, entry));
            if pred(&next) {
                return (
                    self.entries[..index].iter().cloned().collect(),
                    self.entries[index..].iter().cloned().collect(),
                );
            }
            running = next;
        }
        (self.entries.clone(), Entries::new())
    }
}

/// Regroup a run of adjoining entries into 2- and 3-entry nodes.
///
/// Takes threes while more than four remain, then finishes with one node of
/// two or three, or two nodes of two.
pub(crate) fn group_into_nodes<M>(
    m: &M,
    entries: &[Entry<M::Item, M::Annotation>],
) -> Vec<Entry<M::Item, M::Annotation>>
where
    M: Measure,
    M::Item: Clone,
{
    let mut grouped = Vec::with_capacity(entries.len() / 2 + 1);
    let mut rest = entries;
    while rest.len() > 4 {
        grouped.push(Entry::Node(Arc::new(Node::from_slice(m, &rest[..3]))));
        rest = &rest[3..];
    }
    match rest.len() {
        0 => {}
        4 => {
            grouped.push(Entry::Node(Arc::new(Node::from_slice(m, &rest[..2]))));
            grouped.push(Entry::Node(Arc::new(Node::from_slice(m, &rest[2..]))));
        }
        _ => grouped.push(Entry::Node(Arc::new(Node::from_slice(m, rest)))),
    }
    grouped
}
