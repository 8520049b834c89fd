//! Persistent (immutable) trie keyed by path segments.
//!
//! [`PersistentTrie`] nests one instance of the tree engine inside every
//! node: each node holds an optional value plus a [`PersistentTreeMap`] from
//! one path segment to the child trie below it. Paths sharing a prefix share
//! the nodes along that prefix, and every mutating operation returns a new
//! trie that shares untouched branches with the original.

use super::ordering::{Comparator, NaturalOrder};
use super::tree::{BalancedTree, PersistentTreeMap, TreeFactory};
use std::fmt;

// =============================================================================
// PersistentTrie Definition
// =============================================================================

/// A persistent (immutable) trie keyed by sequences of path segments.
///
/// A value lives at the exact node its path terminates on; intermediate
/// nodes may exist purely to carry shared prefixes and hold no value of
/// their own. A path is *contained* iff its terminal node's value is
/// present — a path with only populated descendants is not.
///
/// Segments are ordered by the comparator of the nested child tables
/// ([`NaturalOrder`] by default), and the fourth type parameter selects the
/// construction strategy of those tables. See [`TreeFactory`].
///
/// # Examples
///
/// ```rust
/// use sylva::persistent::PersistentTrie;
///
/// let trie = PersistentTrie::new()
///     .put("ab".chars(), "Foo")
///     .put("aa".chars(), "Bar");
///
/// assert_eq!(trie.get("ab".chars()), Some(&"Foo"));
/// assert!(!trie.contains("a".chars())); // prefix only, no value
///
/// let removed = trie.remove("ab".chars());
/// assert!(!removed.contains("ab".chars()));
/// assert!(removed.contains("aa".chars())); // original branch untouched
/// ```
pub struct PersistentTrie<K, V, C = NaturalOrder, F = BalancedTree> {
    value: Option<V>,
    children: PersistentTreeMap<K, Self, C, F>,
}

impl<K, V: Clone, C: Clone, F> Clone for PersistentTrie<K, V, C, F> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            children: self.children.clone(),
        }
    }
}

impl<K, V> PersistentTrie<K, V> {
    /// Creates a new empty trie with segments ordered by `Ord`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTrie;
    ///
    /// let trie: PersistentTrie<char, i32> = PersistentTrie::new();
    /// assert!(trie.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: None,
            children: PersistentTreeMap::new(),
        }
    }
}

impl<K, V, C> PersistentTrie<K, V, C> {
    /// Creates a new empty trie with segments ordered by the given
    /// comparator.
    ///
    /// The comparator is propagated into every child table the trie ever
    /// creates.
    #[inline]
    #[must_use]
    pub const fn with_comparator(comparator: C) -> Self {
        Self::empty_with_comparator(comparator)
    }
}

impl<K, V, C, F> PersistentTrie<K, V, C, F> {
    /// Creates a new empty trie of this tree kind with segments ordered by
    /// the given comparator.
    ///
    /// The construction strategy of the nested child tables is taken from
    /// the annotated type; see
    /// [`PersistentTreeMap::empty_with_comparator`].
    #[inline]
    #[must_use]
    pub const fn empty_with_comparator(comparator: C) -> Self {
        Self {
            value: None,
            children: PersistentTreeMap::empty_with_comparator(comparator),
        }
    }

    /// Returns `true` if the trie stores no value anywhere.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    /// Returns the number of values stored in the trie.
    ///
    /// Walks every branch: O(n) in the number of nodes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTrie;
    ///
    /// let trie = PersistentTrie::new()
    ///     .put("ab".chars(), 1)
    ///     .put("aa".chars(), 2)
    ///     .put("a".chars(), 3);
    ///
    /// assert_eq!(trie.len(), 3);
    /// ```
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.fold(usize::from(self.value.is_some()), |count, (_, child)| {
            count + child.len()
        })
    }

    /// Returns a reference to the value stored at the path, or `None`.
    ///
    /// Mirrors the insertion traversal: each segment selects a child table
    /// entry; an absent child ends the search, and an exhausted path yields
    /// the node's own optional value.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTrie;
    ///
    /// let trie = PersistentTrie::new().put("ab".chars(), "Foo");
    ///
    /// assert_eq!(trie.get("ab".chars()), Some(&"Foo"));
    /// assert_eq!(trie.get("a".chars()), None);
    /// assert_eq!(trie.get("abc".chars()), None);
    /// ```
    #[must_use]
    pub fn get<I>(&self, path: I) -> Option<&V>
    where
        I: IntoIterator<Item = K>,
        C: Comparator<K>,
    {
        let mut node = self;
        for segment in path {
            node = node.children.get(&segment)?;
        }
        node.value.as_ref()
    }

    /// Returns `true` if a value is stored at exactly this path.
    ///
    /// A path with populated descendants but no value of its own is not
    /// contained.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTrie;
    ///
    /// let trie = PersistentTrie::new().put("ab".chars(), "Foo");
    ///
    /// assert!(trie.contains("ab".chars()));
    /// assert!(!trie.contains("a".chars()));
    /// ```
    #[must_use]
    pub fn contains<I>(&self, path: I) -> bool
    where
        I: IntoIterator<Item = K>,
        C: Comparator<K>,
    {
        self.get(path).is_some()
    }
}

// =============================================================================
// Mutating Operations
// =============================================================================

impl<K, V, C, F> PersistentTrie<K, V, C, F>
where
    K: Clone,
    V: Clone,
    C: Comparator<K> + Clone,
    F: TreeFactory,
{
    /// Stores a value at the path, returning the new trie.
    ///
    /// Walks the path segment by segment, creating child nodes as needed;
    /// an exhausted path replaces the node's optional value, and a value
    /// already stored there is overwritten. Branches off the path are
    /// shared with the original trie.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTrie;
    ///
    /// let trie = PersistentTrie::new().put("ab".chars(), "Foo");
    /// let updated = trie.put("ab".chars(), "Bar");
    ///
    /// assert_eq!(trie.get("ab".chars()), Some(&"Foo")); // Original unchanged
    /// assert_eq!(updated.get("ab".chars()), Some(&"Bar"));
    /// ```
    #[must_use]
    pub fn put<I>(&self, path: I, value: V) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        self.put_segments(&mut path.into_iter(), value)
    }

    fn put_segments<I>(&self, path: &mut I, value: V) -> Self
    where
        I: Iterator<Item = K>,
    {
        match path.next() {
            None => Self {
                value: Some(value),
                children: self.children.clone(),
            },
            Some(head) => {
                let child = self
                    .children
                    .get(&head)
                    .map_or_else(|| self.empty_child(), Clone::clone)
                    .put_segments(path, value);
                Self {
                    value: self.value.clone(),
                    children: self.children.insert(head, child),
                }
            }
        }
    }

    /// Removes the value at the path, returning the new trie.
    ///
    /// Only the terminal node's value is cleared; descendants below it
    /// survive. Nodes left with no value and no children are pruned on the
    /// way back up, so a removed leaf never leaves a dangling prefix
    /// behind. Removing an absent path returns an equivalent trie.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTrie;
    ///
    /// let trie = PersistentTrie::new()
    ///     .put("ab".chars(), "Foo")
    ///     .put("aa".chars(), "Bar");
    /// let removed = trie.remove("ab".chars());
    ///
    /// assert!(!removed.contains("ab".chars()));
    /// assert!(removed.contains("aa".chars()));
    /// ```
    #[must_use]
    pub fn remove<I>(&self, path: I) -> Self
    where
        I: IntoIterator<Item = K>,
    {
        self.remove_segments(&mut path.into_iter())
    }

    fn remove_segments<I>(&self, path: &mut I) -> Self
    where
        I: Iterator<Item = K>,
    {
        match path.next() {
            None => Self {
                value: None,
                children: self.children.clone(),
            },
            Some(head) => match self.children.get(&head) {
                None => self.clone(),
                Some(child) => {
                    let pruned = child.remove_segments(path);
                    let children = if pruned.is_empty() {
                        self.children.remove(&head)
                    } else {
                        self.children.insert(head, pruned)
                    };
                    Self {
                        value: self.value.clone(),
                        children,
                    }
                }
            },
        }
    }

    /// An empty child carrying this trie's comparator.
    fn empty_child(&self) -> Self {
        Self {
            value: None,
            children: self.children.empty(),
        }
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V, C: Default, F> Default for PersistentTrie<K, V, C, F> {
    #[inline]
    fn default() -> Self {
        Self::empty_with_comparator(C::default())
    }
}

/// Content-based equality: same optional value here and equal child tables,
/// segment for segment, all the way down.
impl<K, V, C, F> PartialEq for PersistentTrie<K, V, C, F>
where
    K: PartialEq,
    V: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value && self.children == other.children
    }
}

impl<K: Eq, V: Eq, C, F> Eq for PersistentTrie<K, V, C, F> {}

impl<K: fmt::Debug, V: fmt::Debug, C, F> fmt::Debug for PersistentTrie<K, V, C, F> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PersistentTrie")
            .field("value", &self.value)
            .field("children", &self.children)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
