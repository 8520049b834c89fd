//! Persistent (immutable) ordered set built on the tree engine.
//!
//! [`PersistentTreeSet`] stores its elements as the keys of a
//! [`PersistentTreeMap`] with unit values, so it inherits the engine's
//! ordering, structural sharing, and order statistics without any algorithm
//! of its own.

use super::ordering::{Comparator, NaturalOrder};
use super::tree::{BalancedTree, PersistentTreeMap, PersistentTreeMapIterator, TreeFactory};
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;

// =============================================================================
// PersistentTreeSet Definition
// =============================================================================

/// A persistent (immutable) ordered set with structural sharing.
///
/// Elements are kept in the order of the comparator the set was constructed
/// with ([`NaturalOrder`], i.e. `Ord`, by default). Every mutating operation
/// returns a new set that shares untouched subtrees with the original.
///
/// The third type parameter selects the construction strategy of the
/// underlying tree; the default [`BalancedTree`] keeps the height
/// logarithmic. See [`TreeFactory`].
///
/// # Examples
///
/// ```rust
/// use sylva::persistent::PersistentTreeSet;
///
/// let set = PersistentTreeSet::new().insert(3).insert(1).insert(2);
///
/// assert!(set.contains(&2));
/// let elements: Vec<&i32> = set.iter().collect();
/// assert_eq!(elements, vec![&1, &2, &3]);
///
/// // Structural sharing: the original set is preserved
/// let smaller = set.remove(&2);
/// assert_eq!(set.len(), 3);
/// assert_eq!(smaller.len(), 2);
/// ```
pub struct PersistentTreeSet<T, C = NaturalOrder, F = BalancedTree> {
    inner: PersistentTreeMap<T, (), C, F>,
}

impl<T, C: Clone, F> Clone for PersistentTreeSet<T, C, F> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> PersistentTreeSet<T> {
    /// Creates a new empty set ordered by `Ord`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeSet;
    ///
    /// let set: PersistentTreeSet<i32> = PersistentTreeSet::new();
    /// assert!(set.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: PersistentTreeMap::new(),
        }
    }
}

impl<T: Clone + Ord> PersistentTreeSet<T> {
    /// Creates a set containing a single element, ordered by `Ord`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::singleton(42);
    /// assert!(set.contains(&42));
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(element: T) -> Self {
        Self::new().insert(element)
    }
}

impl<T, C> PersistentTreeSet<T, C> {
    /// Creates a new empty set ordered by the given comparator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::{NaturalOrder, PersistentTreeSet, ReverseOrder};
    ///
    /// let set = PersistentTreeSet::with_comparator(ReverseOrder::<NaturalOrder>::default())
    ///     .insert(1)
    ///     .insert(2);
    ///
    /// assert_eq!(set.first(), &2);
    /// ```
    #[inline]
    #[must_use]
    pub const fn with_comparator(comparator: C) -> Self {
        Self::empty_with_comparator(comparator)
    }
}

impl<T, C, F> PersistentTreeSet<T, C, F> {
    /// Creates a new empty set of this tree kind ordered by the given
    /// comparator.
    ///
    /// The construction strategy is taken from the annotated type; see
    /// [`PersistentTreeMap::empty_with_comparator`].
    #[inline]
    #[must_use]
    pub const fn empty_with_comparator(comparator: C) -> Self {
        Self {
            inner: PersistentTreeMap::empty_with_comparator(comparator),
        }
    }

    /// Returns the number of elements in the set.
    ///
    /// O(1): subtree sizes are cached in every node.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the set contains no elements.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The ordering function this set was constructed with.
    #[inline]
    pub const fn comparator(&self) -> &C {
        self.inner.comparator()
    }
}

// =============================================================================
// Read Operations
// =============================================================================

impl<T, C, F> PersistentTreeSet<T, C, F> {
    /// Returns `true` if the set contains the element.
    ///
    /// The element may be any borrowed form of the set's element type,
    /// provided the comparator orders the borrowed form consistently with
    /// the element type.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::new().insert("hello".to_string());
    ///
    /// assert!(set.contains("hello"));
    /// assert!(!set.contains("world"));
    /// ```
    #[must_use]
    pub fn contains<Q>(&self, element: &Q) -> bool
    where
        T: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        self.inner.contains_key(element)
    }

    /// Returns the stored element equal to the given one under the
    /// comparator, or `None` if absent.
    ///
    /// Useful when the comparator considers distinct values equal and the
    /// stored representative matters.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::new().insert("stored".to_string());
    /// assert_eq!(set.lookup("stored"), Some(&"stored".to_string()));
    /// ```
    #[must_use]
    pub fn lookup<Q>(&self, element: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        self.inner.get_key_value(element).map(|(stored, ())| stored)
    }

    /// Returns the first element satisfying the predicate.
    ///
    /// The search is structural, not in-order: each node tests its own
    /// element before descending, first into the left subtree, then the
    /// right.
    #[must_use]
    pub fn find<P>(&self, predicate: P) -> Option<&T>
    where
        P: FnMut(&T) -> bool,
    {
        self.inner.find_entry(predicate).map(|(element, ())| element)
    }

    /// Returns `true` if any element satisfies the predicate.
    ///
    /// Same traversal order as [`find`](Self::find).
    #[must_use]
    pub fn exists<P>(&self, predicate: P) -> bool
    where
        P: FnMut(&T) -> bool,
    {
        self.inner.exists(predicate)
    }

    /// Returns the element at the given in-order rank.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::new().insert(30).insert(10).insert(20);
    /// assert_eq!(set.element_at(1), &20);
    /// ```
    #[must_use]
    pub fn element_at(&self, index: usize) -> &T {
        self.inner.entry_at(index).0
    }

    /// Returns the in-order rank of the element, or `None` if absent.
    #[must_use]
    pub fn rank_of<Q>(&self, element: &Q) -> Option<usize>
    where
        T: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        self.inner.rank_of(element)
    }

    /// Returns the smallest element.
    ///
    /// # Panics
    ///
    /// Panics if the set is empty: an empty tree has no minimum by
    /// definition.
    #[must_use]
    pub fn first(&self) -> &T {
        self.inner.first().0
    }

    /// Returns the largest element.
    ///
    /// # Panics
    ///
    /// Panics if the set is empty.
    #[must_use]
    pub fn last(&self) -> &T {
        self.inner.last().0
    }

    /// Strict left-to-right accumulation over the elements in comparator
    /// order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::new().insert(2).insert(1).insert(3);
    /// let sum = set.fold(0, |accumulator, element| accumulator + element);
    /// assert_eq!(sum, 6);
    /// ```
    #[must_use]
    pub fn fold<A, G>(&self, seed: A, mut combine: G) -> A
    where
        G: FnMut(A, &T) -> A,
    {
        self.inner
            .fold(seed, |accumulator, (element, ())| combine(accumulator, element))
    }
}

// =============================================================================
// Mutating Operations
// =============================================================================

impl<T, C, F> PersistentTreeSet<T, C, F>
where
    T: Clone,
    C: Comparator<T> + Clone,
    F: TreeFactory,
{
    /// Inserts an element, returning the new set.
    ///
    /// If an equal element is already present it is replaced, so the set
    /// never holds duplicates.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeSet;
    ///
    /// let set1 = PersistentTreeSet::new().insert(1);
    /// let set2 = set1.insert(2);
    ///
    /// assert_eq!(set1.len(), 1); // Original unchanged
    /// assert_eq!(set2.len(), 2); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, element: T) -> Self {
        Self {
            inner: self.inner.insert(element, ()),
        }
    }

    /// Removes an element, returning the new set.
    ///
    /// If the element is absent, the set is returned unchanged.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::new().insert(1).insert(2);
    /// let removed = set.remove(&1);
    ///
    /// assert_eq!(set.len(), 2);     // Original unchanged
    /// assert!(!removed.contains(&1));
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, element: &Q) -> Self
    where
        T: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        Self {
            inner: self.inner.remove(element),
        }
    }

    /// Keeps only the elements satisfying the predicate, preserving their
    /// relative order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeSet;
    ///
    /// let set: PersistentTreeSet<i32> = (1..=5).collect();
    /// let odd = set.filter(|element| element % 2 == 1);
    ///
    /// let elements: Vec<&i32> = odd.iter().collect();
    /// assert_eq!(elements, vec![&1, &3, &5]);
    /// ```
    #[must_use]
    pub fn filter<P>(&self, mut predicate: P) -> Self
    where
        P: FnMut(&T) -> bool,
    {
        Self {
            inner: self.inner.filter_keys(|element| predicate(element)),
        }
    }

    /// Applies a function to every element, collecting the results into a
    /// new set with the same comparator.
    ///
    /// The transform may map distinct elements to equal results; such
    /// collisions collapse, so the result can be smaller than the input.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeSet;
    ///
    /// let set: PersistentTreeSet<i32> = (1..=3).collect();
    /// let halved = set.map(|element| element / 2);
    ///
    /// assert_eq!(halved.len(), 2); // 0, 1 — 2/2 and 3/2 collide
    /// ```
    #[must_use]
    pub fn map<U, G>(&self, mut transform: G) -> PersistentTreeSet<U, C, F>
    where
        U: Clone,
        C: Comparator<U>,
        G: FnMut(&T) -> U,
    {
        self.fold(
            PersistentTreeSet::empty_with_comparator(self.comparator().clone()),
            |result, element| result.insert(transform(element)),
        )
    }

    /// Returns the union of two sets: every element in either.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeSet;
    ///
    /// let left: PersistentTreeSet<i32> = [1, 2].into_iter().collect();
    /// let right: PersistentTreeSet<i32> = [2, 3].into_iter().collect();
    ///
    /// assert_eq!(left.union(&right).len(), 3);
    /// ```
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        other.fold(self.clone(), |result, element| {
            if result.contains(element) {
                result
            } else {
                result.insert(element.clone())
            }
        })
    }

    /// Returns the intersection of two sets: only the elements in both.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        // Iterate over the smaller set
        let (smaller, larger) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        smaller.filter(|element| larger.contains(element))
    }

    /// Returns the difference of two sets: the elements of `self` not in
    /// `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.filter(|element| !other.contains(element))
    }

    /// Returns the symmetric difference: elements in either set but not
    /// both.
    #[must_use]
    pub fn symmetric_difference(&self, other: &Self) -> Self {
        self.difference(other).union(&other.difference(self))
    }

    /// Returns `true` if every element of `self` is in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && !self.exists(|element| !other.contains(element))
    }

    /// Returns `true` if every element of `other` is in `self`.
    #[must_use]
    pub fn is_superset(&self, other: &Self) -> bool {
        other.is_subset(self)
    }

    /// Returns `true` if the sets share no element.
    #[must_use]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        let (smaller, larger) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        !smaller.exists(|element| larger.contains(element))
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

impl<T, C, F> PersistentTreeSet<T, C, F> {
    /// Returns a lazy iterator over the elements in comparator order.
    ///
    /// Each call builds a fresh iterator over the current snapshot; later
    /// operations on the set never affect an iterator already handed out.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeSet;
    ///
    /// let set = PersistentTreeSet::new().insert(2).insert(1).insert(3);
    /// let elements: Vec<&i32> = set.iter().collect();
    /// assert_eq!(elements, vec![&1, &2, &3]);
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentTreeSetIterator<'_, T> {
        PersistentTreeSetIterator {
            inner: self.inner.iter(),
        }
    }
}

/// A lazy in-order iterator over the elements of a [`PersistentTreeSet`].
pub struct PersistentTreeSetIterator<'a, T> {
    inner: PersistentTreeMapIterator<'a, T, ()>,
}

impl<'a, T> Iterator for PersistentTreeSetIterator<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(element, ())| element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T> ExactSizeIterator for PersistentTreeSetIterator<'_, T> {
    fn len(&self) -> usize {
        self.inner.len()
    }
}

/// An owning iterator over the elements of a [`PersistentTreeSet`].
pub struct PersistentTreeSetIntoIterator<T> {
    elements: std::vec::IntoIter<T>,
}

impl<T> Iterator for PersistentTreeSetIntoIterator<T> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.elements.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.elements.size_hint()
    }
}

impl<T> ExactSizeIterator for PersistentTreeSetIntoIterator<T> {
    fn len(&self) -> usize {
        self.elements.len()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<T, C: Default, F> Default for PersistentTreeSet<T, C, F> {
    #[inline]
    fn default() -> Self {
        Self::empty_with_comparator(C::default())
    }
}

impl<T, C, F> FromIterator<T> for PersistentTreeSet<T, C, F>
where
    T: Clone,
    C: Comparator<T> + Clone + Default,
    F: TreeFactory,
{
    fn from_iter<I: IntoIterator<Item = T>>(iterator: I) -> Self {
        let mut set = Self::empty_with_comparator(C::default());
        for element in iterator {
            set = set.insert(element);
        }
        set
    }
}

impl<T: Clone, C, F> IntoIterator for PersistentTreeSet<T, C, F> {
    type Item = T;
    type IntoIter = PersistentTreeSetIntoIterator<T>;

    fn into_iter(self) -> Self::IntoIter {
        let elements: Vec<T> = self.iter().cloned().collect();
        PersistentTreeSetIntoIterator {
            elements: elements.into_iter(),
        }
    }
}

impl<'a, T, C, F> IntoIterator for &'a PersistentTreeSet<T, C, F> {
    type Item = &'a T;
    type IntoIter = PersistentTreeSetIterator<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Content-based equality: two sets are equal iff their in-order element
/// sequences are equal, independent of tree shape.
impl<T: PartialEq, C, F> PartialEq for PersistentTreeSet<T, C, F> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<T: Eq, C, F> Eq for PersistentTreeSet<T, C, F> {}

/// Hashes the length, then each element in comparator order; consistent
/// with the content-based equality.
impl<T: Hash, C, F> Hash for PersistentTreeSet<T, C, F> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for element in self {
            element.hash(state);
        }
    }
}

impl<T: fmt::Debug, C, F> fmt::Debug for PersistentTreeSet<T, C, F> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_set().entries(self.iter()).finish()
    }
}

impl<T: fmt::Display, C, F> fmt::Display for PersistentTreeSet<T, C, F> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{")?;
        let mut first = true;
        for element in self {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{element}")?;
        }
        write!(formatter, "}}")
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<T, C, F> serde::Serialize for PersistentTreeSet<T, C, F>
where
    T: serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeSeq;
        let mut sequence = serializer.serialize_seq(Some(self.len()))?;
        for element in self {
            sequence.serialize_element(element)?;
        }
        sequence.end()
    }
}

#[cfg(feature = "serde")]
struct PersistentTreeSetVisitor<T, C, F> {
    marker: std::marker::PhantomData<(T, C, F)>,
}

#[cfg(feature = "serde")]
impl<'de, T, C, F> serde::de::Visitor<'de> for PersistentTreeSetVisitor<T, C, F>
where
    T: serde::Deserialize<'de> + Clone,
    C: Comparator<T> + Clone + Default,
    F: TreeFactory,
{
    type Value = PersistentTreeSet<T, C, F>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a sequence of elements")
    }

    fn visit_seq<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut set = PersistentTreeSet::empty_with_comparator(C::default());
        while let Some(element) = access.next_element()? {
            set = set.insert(element);
        }
        Ok(set)
    }
}

#[cfg(feature = "serde")]
impl<'de, T, C, F> serde::Deserialize<'de> for PersistentTreeSet<T, C, F>
where
    T: serde::Deserialize<'de> + Clone,
    C: Comparator<T> + Clone + Default,
    F: TreeFactory,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(PersistentTreeSetVisitor {
            marker: std::marker::PhantomData,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
