//! Measures: monoids that annotate finger tree nodes
//!
//! A [`Measure`] converts each element to an annotation and combines
//! annotations with an associative operator that has an identity. Every node
//! of a tree caches the fold of its elements' annotations, which is what makes
//! logarithmic splitting possible.
//!
//! ## Laws
//!
//! For every measure `m` and annotations `a`, `b`, `c`:
//! - `m.combine(&m.identity(), &a) == a`
//! - `m.combine(&a, &m.identity()) == a`
//! - `m.combine(&m.combine(&a, &b), &c) == m.combine(&a, &m.combine(&b, &c))`
//!
//! ## Provided measures
//!
//! - [`ItemCount`]: number of elements (positional indexing)
//! - [`FromSemigroup`]: lifts a [`Semigroup`] by injecting a synthetic identity
//! - [`LastItem`] and [`MinMax`]: semigroups meant for [`FromSemigroup`]
//! - [`Translate`]: measure a transformed view of each element
//! - tuples `(A, B)` and `(A, B, C)`: run several measures in parallel
//! - [`FnMeasure`]: a measure assembled from closures

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A monoid used to annotate tree nodes
pub trait Measure: Clone {
    /// Element type being measured
    type Item;
    /// Annotation cached on every node
    type Annotation: Clone;

    /// Identity annotation (the measure of an empty sequence)
    fn identity(&self) -> Self::Annotation;

    /// Annotation of a single element
    fn convert(&self, item: &Self::Item) -> Self::Annotation;

    /// Associative combining operator
    fn combine(&self, left: &Self::Annotation, right: &Self::Annotation) -> Self::Annotation;

    /// Fold a sequence of elements into one annotation
    fn fold<'a, I>(&self, items: I) -> Self::Annotation
    where
        I: IntoIterator<Item = &'a Self::Item>,
        Self::Item: 'a,
    {
        items
            .into_iter()
            .fold(self.identity(), |acc, item| self.combine(&acc, &self.convert(item)))
    }
}

// ============================================================================
// Item count
// ============================================================================

/// Counts elements; the annotation of a tree is its length
pub struct ItemCount<T>(PhantomData<fn(&T)>);

impl<T> ItemCount<T> {
    /// Create the item-count measure
    pub fn new() -> Self {
        ItemCount(PhantomData)
    }
}

impl<T> Default for ItemCount<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ItemCount<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ItemCount<T> {}

impl<T> fmt::Debug for ItemCount<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ItemCount")
    }
}

impl<T> Measure for ItemCount<T> {
    type Item = T;
    type Annotation = usize;

    fn identity(&self) -> usize {
        0
    }

    fn convert(&self, _item: &T) -> usize {
        1
    }

    fn combine(&self, left: &usize, right: &usize) -> usize {
        left + right
    }
}

// ============================================================================
// Semigroups
// ============================================================================

/// An associative operator without a natural identity
pub trait Semigroup: Clone {
    /// Element type being measured
    type Item;
    /// Combined value
    type Value: Clone;

    /// Value of a single element
    fn convert(&self, item: &Self::Item) -> Self::Value;

    /// Associative combining operator
    fn combine(&self, left: &Self::Value, right: &Self::Value) -> Self::Value;
}

/// Lifts a [`Semigroup`] into a [`Measure`]
///
/// The annotation is `Option<S::Value>`; `None` is the injected identity and
/// is absorbed by every real value.
#[derive(Debug, Clone, Default)]
pub struct FromSemigroup<S>(pub S);

impl<S: Semigroup> Measure for FromSemigroup<S> {
    type Item = S::Item;
    type Annotation = Option<S::Value>;

    fn identity(&self) -> Self::Annotation {
        None
    }

    fn convert(&self, item: &S::Item) -> Self::Annotation {
        Some(self.0.convert(item))
    }

    fn combine(&self, left: &Self::Annotation, right: &Self::Annotation) -> Self::Annotation {
        match (left, right) {
            (None, other) | (other, None) => other.clone(),
            (Some(a), Some(b)) => Some(self.0.combine(a, b)),
        }
    }
}

/// Keeps the right-most element
pub struct LastItem<T>(PhantomData<fn(&T) -> T>);

impl<T> LastItem<T> {
    /// The last-item measure, lifted with a synthetic identity
    pub fn measure() -> FromSemigroup<Self> {
        FromSemigroup(LastItem(PhantomData))
    }
}

impl<T> Clone for LastItem<T> {
    fn clone(&self) -> Self {
        LastItem(PhantomData)
    }
}

impl<T> fmt::Debug for LastItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LastItem")
    }
}

impl<T: Clone> Semigroup for LastItem<T> {
    type Item = T;
    type Value = T;

    fn convert(&self, item: &T) -> T {
        item.clone()
    }

    fn combine(&self, _left: &T, right: &T) -> T {
        right.clone()
    }
}

/// Tracks the smallest and largest element as `(min, max)`
pub struct MinMax<T>(PhantomData<fn(&T) -> T>);

impl<T> MinMax<T> {
    /// The min/max measure, lifted with a synthetic identity
    pub fn measure() -> FromSemigroup<Self> {
        FromSemigroup(MinMax(PhantomData))
    }
}

impl<T> Clone for MinMax<T> {
    fn clone(&self) -> Self {
        MinMax(PhantomData)
    }
}

impl<T> fmt::Debug for MinMax<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MinMax")
    }
}

impl<T: Ord + Clone> Semigroup for MinMax<T> {
    type Item = T;
    type Value = (T, T);

    fn convert(&self, item: &T) -> (T, T) {
        (item.clone(), item.clone())
    }

    fn combine(&self, left: &(T, T), right: &(T, T)) -> (T, T) {
        let min = if right.0 < left.0 { &right.0 } else { &left.0 };
        let max = if right.1 > left.1 { &right.1 } else { &left.1 };
        (min.clone(), max.clone())
    }
}

// ============================================================================
// Combinators
// ============================================================================

/// Measures `U` elements by first mapping them into the inner measure's items
pub struct Translate<M, U, F> {
    measure: M,
    transform: F,
    _item: PhantomData<fn(&U)>,
}

impl<M, U, F> Translate<M, U, F>
where
    M: Measure,
    F: Fn(&U) -> M::Item + Clone,
{
    /// Wrap `measure` so it sees `transform(item)` instead of `item`
    pub fn new(measure: M, transform: F) -> Self {
        Translate {
            measure,
            transform,
            _item: PhantomData,
        }
    }
}

impl<M: Clone, U, F: Clone> Clone for Translate<M, U, F> {
    fn clone(&self) -> Self {
        Translate {
            measure: self.measure.clone(),
            transform: self.transform.clone(),
            _item: PhantomData,
        }
    }
}

impl<M, U, F> Measure for Translate<M, U, F>
where
    M: Measure,
    F: Fn(&U) -> M::Item + Clone,
{
    type Item = U;
    type Annotation = M::Annotation;

    fn identity(&self) -> M::Annotation {
        self.measure.identity()
    }

    fn convert(&self, item: &U) -> M::Annotation {
        self.measure.convert(&(self.transform)(item))
    }

    fn combine(&self, left: &M::Annotation, right: &M::Annotation) -> M::Annotation {
        self.measure.combine(left, right)
    }
}

impl<A, B> Measure for (A, B)
where
    A: Measure,
    B: Measure<Item = A::Item>,
{
    type Item = A::Item;
    type Annotation = (A::Annotation, B::Annotation);

    fn identity(&self) -> Self::Annotation {
        (self.0.identity(), self.1.identity())
    }

    fn convert(&self, item: &A::Item) -> Self::Annotation {
        (self.0.convert(item), self.1.convert(item))
    }

    fn combine(&self, left: &Self::Annotation, right: &Self::Annotation) -> Self::Annotation {
        (
            self.0.combine(&left.0, &right.0),
            self.1.combine(&left.1, &right.1),
        )
    }
}

impl<A, B, C> Measure for (A, B, C)
where
    A: Measure,
    B: Measure<Item = A::Item>,
    C: Measure<Item = A::Item>,
{
    type Item = A::Item;
    type Annotation = (A::Annotation, B::Annotation, C::Annotation);

    fn identity(&self) -> Self::Annotation {
        (self.0.identity(), self.1.identity(), self.2.identity())
    }

    fn convert(&self, item: &A::Item) -> Self::Annotation {
        (
            self.0.convert(item),
            self.1.convert(item),
            self.2.convert(item),
        )
    }

    fn combine(&self, left: &Self::Annotation, right: &Self::Annotation) -> Self::Annotation {
        (
            self.0.combine(&left.0, &right.0),
            self.1.combine(&left.1, &right.1),
            self.2.combine(&left.2, &right.2),
        )
    }
}

type ConvertFn<T, A> = Arc<dyn Fn(&T) -> A + Send + Sync>;
type CombineFn<A> = Arc<dyn Fn(&A, &A) -> A + Send + Sync>;

/// A measure built from a conversion closure, an operator closure and an identity
pub struct FnMeasure<T, A> {
    identity: A,
    convert: ConvertFn<T, A>,
    combine: CombineFn<A>,
}

impl<T, A> FnMeasure<T, A> {
    /// Assemble a measure; the caller guarantees the monoid laws
    pub fn new<C, O>(convert: C, combine: O, identity: A) -> Self
    where
        C: Fn(&T) -> A + Send + Sync + 'static,
        O: Fn(&A, &A) -> A + Send + Sync + 'static,
    {
        FnMeasure {
            identity,
            convert: Arc::new(convert),
            combine: Arc::new(combine),
        }
    }
}

impl<T, A: Clone> Clone for FnMeasure<T, A> {
    fn clone(&self) -> Self {
        FnMeasure {
            identity: self.identity.clone(),
            convert: Arc::clone(&self.convert),
            combine: Arc::clone(&self.combine),
        }
    }
}

impl<T, A: fmt::Debug> fmt::Debug for FnMeasure<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMeasure")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl<T, A: Clone> Measure for FnMeasure<T, A> {
    type Item = T;
    type Annotation = A;

    fn identity(&self) -> A {
        self.identity.clone()
    }

    fn convert(&self, item: &T) -> A {
        (self.convert)(item)
    }

    fn combine(&self, left: &A, right: &A) -> A {
        (self.combine)(left, right)
    }
}
