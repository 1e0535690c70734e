//! Tree shapes and the structural algorithms over them
//!
//! The shape set is closed: [`Tree::Empty`], [`Tree::Single`] and
//! [`Tree::Deep`]. A deep tree has a 1–4 entry digit on each side and a spine
//! that is itself a tree whose entries are 2–3 entry nodes. Every function
//! here returns a new tree and leaves its inputs untouched; unchanged
//! substructure is shared through `Arc`.

use crate::measure::Measure;
use crate::node::{group_into_nodes, measure_entry, Entries, Entry, Node};
use smallvec::smallvec;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub(crate) enum Tree<T, A> {
    Empty,
    Single(Entry<T, A>),
    Deep(Arc<Deep<T, A>>),
}

#[derive(Debug)]
pub(crate) struct Deep<T, A> {
    pub(crate) annotation: A,
    pub(crate) left: Node<T, A>,
    pub(crate) spine: Tree<T, A>,
    pub(crate) right: Node<T, A>,
}

impl<T: Clone, A: Clone> Tree<T, A> {
    pub(crate) fn annotation<M>(&self, m: &M) -> A
    where
        M: Measure<Item = T, Annotation = A>,
    {
        match self {
            Tree::Empty => m.identity(),
            Tree::Single(entry) => measure_entry(m, entry),
            Tree::Deep(deep) => deep.annotation.clone(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, Tree::Empty)
    }

    pub(crate) fn first(&self) -> Option<&Entry<T, A>> {
        match self {
            Tree::Empty => None,
            Tree::Single(entry) => Some(entry),
            Tree::Deep(deep) => deep.left.first(),
        }
    }

    pub(crate) fn last(&self) -> Option<&Entry<T, A>> {
        match self {
            Tree::Empty => None,
            Tree::Single(entry) => Some(entry),
            Tree::Deep(deep) => deep.right.last(),
        }
    }

    fn deep<M>(m: &M, left: Node<T, A>, spine: Tree<T, A>, right: Node<T, A>) -> Self
    where
        M: Measure<Item = T, Annotation = A>,
    {
        let annotation = m.combine(
            &m.combine(&left.annotation, &spine.annotation(m)),
            &right.annotation,
        );
        Tree::Deep(Arc::new(Deep {
            annotation,
            left,
            spine,
            right,
        }))
    }

    /// Build by repeated `push_back`.
    pub(crate) fn from_entries<M, I>(m: &M, entries: I) -> Self
    where
        M: Measure<Item = T, Annotation = A>,
        I: IntoIterator<Item = Entry<T, A>>,
    {
        entries
            .into_iter()
            .fold(Tree::Empty, |tree, entry| tree.push_back(m, entry))
    }

    pub(crate) fn push_front<M>(&self, m: &M, entry: Entry<T, A>) -> Self
    where
        M: Measure<Item = T, Annotation = A>,
    {
        match self {
            Tree::Empty => Tree::Single(entry),
            Tree::Single(only) => Self::deep(
                m,
                Node::new(m, smallvec![entry]),
                Tree::Empty,
                Node::new(m, smallvec![only.clone()]),
            ),
            Tree::Deep(deep) if deep.left.len() < 4 => {
                let mut entries: Entries<T, A> = smallvec![entry];
                entries.extend(deep.left.entries.iter().cloned());
                Self::deep(
                    m,
                    Node::new(m, entries),
                    deep.spine.clone(),
                    deep.right.clone(),
                )
            }
            Tree::Deep(deep) => {
                // Full digit: keep the new entry and the old head, push the other three down.
                let packed = Node::from_slice(m, &deep.left.entries[1..]);
                let left = Node::new(m, smallvec![entry, deep.left.entries[0].clone()]);
                Self::deep(
                    m,
                    left,
                    deep.spine.push_front(m, Entry::Node(Arc::new(packed))),
                    deep.right.clone(),
                )
            }
        }
    }

    pub(crate) fn push_back<M>(&self, m: &M, entry: Entry<T, A>) -> Self
    where
        M: Measure<Item = T, Annotation = A>,
    {
        match self {
            Tree::Empty => Tree::Single(entry),
            Tree::Single(only) => Self::deep(
                m,
                Node::new(m, smallvec![only.clone()]),
                Tree::Empty,
                Node::new(m, smallvec![entry]),
            ),
            Tree::Deep(deep) if deep.right.len() < 4 => {
                let mut entries = deep.right.entries.clone();
                entries.push(entry);
                Self::deep(
                    m,
                    deep.left.clone(),
                    deep.spine.clone(),
                    Node::new(m, entries),
                )
            }
            Tree::Deep(deep) => {
                let packed = Node::from_slice(m, &deep.right.entries[..3]);
                let right = Node::new(m, smallvec![deep.right.entries[3].clone(), entry]);
                Self::deep(
                    m,
                    deep.left.clone(),
                    deep.spine.push_back(m, Entry::Node(Arc::new(packed))),
                    right,
                )
            }
        }
    }

    /// Remove the first entry, or `None` when empty.
    pub(crate) fn pop_front<M>(&self, m: &M) -> Option<(Entry<T, A>, Self)>
    where
        M: Measure<Item = T, Annotation = A>,
    {
        match self {
            Tree::Empty => None,
            Tree::Single(only) => Some((only.clone(), Tree::Empty)),
            Tree::Deep(deep) => {
                let first = deep.left.first()?.clone();
                let rest = Self::deep_left(m, &deep.left.entries[1..], &deep.spine, &deep.right);
                Some((first, rest))
            }
        }
    }

    /// Remove the last entry, or `None` when empty.
    pub(crate) fn pop_back<M>(&self, m: &M) -> Option<(Entry<T, A>, Self)>
    where
        M: Measure<Item = T, Annotation = A>,
    {
        match self {
            Tree::Empty => None,
            Tree::Single(only) => Some((only.clone(), Tree::Empty)),
            Tree::Deep(deep) => {
                let last = deep.right.last()?.clone();
                let keep = deep.right.len() - 1;
                let rest = Self::deep_right(m, &deep.left, &deep.spine, &deep.right.entries[..keep]);
                Some((last, rest))
            }
        }
    }

    /// Rebuild a deep tree whose left digit may have run dry.
    fn deep_left<M>(m: &M, left: &[Entry<T, A>], spine: &Tree<T, A>, right: &Node<T, A>) -> Self
    where
        M: Measure<Item = T, Annotation = A>,
    {
        if !left.is_empty() {
            return Self::deep(m, Node::from_slice(m, left), spine.clone(), right.clone());
        }
        match spine.pop_front(m) {
            Some((entry, rest)) => Self::deep(m, Node::from_entry(m, entry), rest, right.clone()),
            None => Self::from_entries(m, right.entries.iter().cloned()),
        }
    }

    /// Rebuild a deep tree whose right digit may have run dry.
    fn deep_right<M>(m: &M, left: &Node<T, A>, spine: &Tree<T, A>, right: &[Entry<T, A>]) -> Self
    where
        M: Measure<Item = T, Annotation = A>,
    {
        if !right.is_empty() {
            return Self::deep(m, left.clone(), spine.clone(), Node::from_slice(m, right));
        }
        match spine.pop_back(m) {
            Some((entry, rest)) => Self::deep(m, left.clone(), rest, Node::from_entry(m, entry)),
            None => Self::from_entries(m, left.entries.iter().cloned()),
        }
    }

    /// Concatenate `left ++ middle ++ right`.
    ///
    /// Two deep trees keep their outer digits; their inner digits and the
    /// middle entries are regrouped into nodes and carried into the
    /// concatenation of the spines.
    pub(crate) fn concat<M>(m: &M, left: &Self, middle: Vec<Entry<T, A>>, right: &Self) -> Self
    where
        M: Measure<Item = T, Annotation = A>,
    {
        match (left, right) {
            (Tree::Empty, _) => middle
                .into_iter()
                .rev()
                .fold(right.clone(), |tree, entry| tree.push_front(m, entry)),
            (_, Tree::Empty) => middle
                .into_iter()
                .fold(left.clone(), |tree, entry| tree.push_back(m, entry)),
            (Tree::Single(only), _) => middle
                .into_iter()
                .rev()
                .fold(right.clone(), |tree, entry| tree.push_front(m, entry))
                .push_front(m, only.clone()),
            (_, Tree::Single(only)) => middle
                .into_iter()
                .fold(left.clone(), |tree, entry| tree.push_back(m, entry))
                .push_back(m, only.clone()),
            (Tree::Deep(a), Tree::Deep(b)) => {
                let mut joined: Vec<Entry<T, A>> = a.right.entries.iter().cloned().collect();
                joined.extend(middle);
                joined.extend(b.left.entries.iter().cloned());
                let nodes = group_into_nodes(m, &joined);
                let spine = Self::concat(m, &a.spine, nodes, &b.spine);
                Self::deep(m, a.left.clone(), spine, b.right.clone())
            }
        }
    }

    /// Split where the running annotation (seeded with `initial`) first satisfies `pred`.
    pub(crate) fn split<M, P>(&self, m: &M, initial: &A, pred: &P) -> (Self, Self)
    where
        M: Measure<Item = T, Annotation = A>,
        P: Fn(&A) -> bool,
    {
        match self {
            Tree::Empty => (Tree::Empty, Tree::Empty),
            Tree::Single(only) => {
                if pred(&m.combine(initial, &measure_entry(m, only))) {
                    (Tree::Empty, self.clone())
                } else {
                    (self.clone(), Tree::Empty)
                }
            }
            Tree::Deep(deep) => {
                let through_left = m.combine(initial, &deep.left.annotation);
                if pred(&through_left) {
                    let (before, after) = deep.left.split(m, initial, pred);
                    return (
                        Self::from_entries(m, before),
                        Self::deep_left(m, &after, &deep.spine, &deep.right),
                    );
                }

                let through_spine = m.combine(&through_left, &deep.spine.annotation(m));
                if pred(&through_spine) {
                    let (spine_before, spine_after) = deep.spine.split(m, &through_left, pred);
                    if let Some((entry, spine_after)) = spine_after.pop_front(m) {
                        let seed = m.combine(&through_left, &spine_before.annotation(m));
                        let node = Node::from_entry(m, entry);
                        let (before, after) = node.split(m, &seed, pred);
                        return (
                            Self::deep_right(m, &deep.left, &spine_before, &before),
                            Self::deep_left(m, &after, &spine_after, &deep.right),
                        );
                    }
                }

                let (before, after) = deep.right.split(m, &through_spine, pred);
                (
                    Self::deep_right(m, &deep.left, &deep.spine, &before),
                    Self::from_entries(m, after),
                )
            }
        }
    }
}

/// First entry of `entries` whose running annotation satisfies `pred`, with the
/// annotation accumulated before it.
fn find_in<'a, M, P>(
    m: &M,
    entries: &'a [Entry<M::Item, M::Annotation>],
    initial: &M::Annotation,
    pred: &P,
) -> Option<(M::Annotation, &'a Entry<M::Item, M::Annotation>)>
where
    M: Measure,
    P: Fn(&M::Annotation) -> bool,
{
    let mut running = initial.clone();
    for entry in entries {
        let next = m.combine(&running, &measure_entry(m, entry));
        if pred(&next) {
            return Some((running, entry));
        }
        running = next;
    }
    None
}

impl<T: Clone, A: Clone> Tree<T, A> {
    fn find_entry<M, P>(&self, m: &M, initial: &A, pred: &P) -> Option<(A, &Entry<T, A>)>
    where
        M: Measure<Item = T, Annotation = A>,
        P: Fn(&A) -> bool,
    {
        match self {
            Tree::Empty => None,
            Tree::Single(only) => {
                if pred(&m.combine(initial, &measure_entry(m, only))) {
                    Some((initial.clone(), only))
                } else {
                    None
                }
            }
            Tree::Deep(deep) => {
                let through_left = m.combine(initial, &deep.left.annotation);
                if pred(&through_left) {
                    return find_in(m, &deep.left.entries, initial, pred);
                }
                let through_spine = m.combine(&through_left, &deep.spine.annotation(m));
                if pred(&through_spine) {
                    return deep.spine.find_entry(m, &through_left, pred);
                }
                find_in(m, &deep.right.entries, &through_spine, pred)
            }
        }
    }

    /// The element at which the running annotation first satisfies `pred`,
    /// located without rebuilding any part of the tree.
    pub(crate) fn find<M, P>(&self, m: &M, initial: &A, pred: &P) -> Option<&T>
    where
        M: Measure<Item = T, Annotation = A>,
        P: Fn(&A) -> bool,
    {
        let (mut prefix, mut entry) = self.find_entry(m, initial, pred)?;
        loop {
            match entry {
                Entry::Leaf(item) => return Some(item),
                Entry::Node(node) => {
                    let (next_prefix, next) = find_in(m, &node.entries, &prefix, pred)?;
                    prefix = next_prefix;
                    entry = next;
                }
            }
        }
    }
}

/// Front-to-back iterator over the elements of a tree
pub struct Iter<'a, T, A> {
    stack: Vec<Pending<'a, T, A>>,
}

enum Pending<'a, T, A> {
    Tree(&'a Tree<T, A>),
    Entry(&'a Entry<T, A>),
}

impl<'a, T, A> Iter<'a, T, A> {
    pub(crate) fn new(tree: &'a Tree<T, A>) -> Self {
        Iter {
            stack: vec![Pending::Tree(tree)],
        }
    }
}

impl<'a, T, A> Iterator for Iter<'a, T, A> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        loop {
            match self.stack.pop()? {
                Pending::Entry(Entry::Leaf(item)) => return Some(item),
                Pending::Entry(Entry::Node(node)) => {
                    self.stack
                        .extend(node.entries.iter().rev().map(Pending::Entry));
                }
                Pending::Tree(Tree::Empty) => {}
                Pending::Tree(Tree::Single(entry)) => self.stack.push(Pending::Entry(entry)),
                Pending::Tree(Tree::Deep(deep)) => {
                    self.stack
                        .extend(deep.right.entries.iter().rev().map(Pending::Entry));
                    self.stack.push(Pending::Tree(&deep.spine));
                    self.stack
                        .extend(deep.left.entries.iter().rev().map(Pending::Entry));
                }
            }
        }
    }
}
