//! Persistent (immutable) ordered map: the binary-search-tree engine.
//!
//! This module provides [`PersistentTreeMap`], an immutable ordered map with
//! structural sharing, and the construction machinery that lets multiple
//! concrete tree shapes share one algorithm set.
//!
//! # Overview
//!
//! Every mutating operation (insert, remove, filter, join) returns a *new*
//! map. Subtrees the operation did not touch are shared by reference between
//! the old and new versions; only the path from the modified node to the root
//! is reconstructed. Old versions therefore remain valid and cheap to keep.
//!
//! - O(height) get, insert, remove
//! - O(height) order statistics (`entry_at`, `rank_of`)
//! - O(1) len and `is_empty` (subtree sizes are cached in every node)
//!
//! # Construction Strategy
//!
//! The generic algorithms never construct nodes directly; they go through a
//! [`TreeFactory`]. Two factories ship with this crate:
//!
//! - [`BalancedTree`] (the default): weight-balanced construction driven by
//!   the cached subtree sizes, built on the rotation primitives. Bounds the
//!   tree height to O(log n).
//! - [`UnbalancedTree`]: plain construction; the shape is whatever the
//!   operation sequence produces. Guarantees ordering and sharing, not
//!   balance.
//!
//! A custom balancing discipline is layered on the engine by implementing
//! [`TreeFactory`] — the traversal algorithms are inherited unchanged.
//!
//! # Examples
//!
//! ```rust
//! use sylva::persistent::PersistentTreeMap;
//!
//! let map = PersistentTreeMap::new()
//!     .insert(3, "three")
//!     .insert(1, "one")
//!     .insert(2, "two");
//!
//! // Entries are always in comparator order
//! let keys: Vec<&i32> = map.keys().collect();
//! assert_eq!(keys, vec![&1, &2, &3]);
//!
//! // Order statistics: rank-indexed access both ways
//! assert_eq!(map.entry_at(1), (&2, &"two"));
//! assert_eq!(map.rank_of(&3), Some(2));
//! ```

use super::ReferenceCounter;
use super::ordering::{Comparator, NaturalOrder};
use smallvec::SmallVec;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FromIterator;
use std::marker::PhantomData;

// =============================================================================
// Node Definition
// =============================================================================

/// A shared handle to a subtree; `None` is the empty tree.
pub type Link<K, V> = Option<ReferenceCounter<TreeNode<K, V>>>;

/// An immutable node of the tree engine.
///
/// A node owns its entry and two child links and caches the size of the
/// subtree rooted at it. Nodes are only ever constructed, never mutated;
/// child links may be shared by any number of tree versions.
pub struct TreeNode<K, V> {
    key: K,
    value: V,
    size: usize,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> TreeNode<K, V> {
    /// Returns the number of entries in the subtree behind `link`.
    #[inline]
    pub fn size_of(link: &Link<K, V>) -> usize {
        link.as_deref().map_or(0, |node| node.size)
    }

    /// The node's key.
    #[inline]
    pub const fn key(&self) -> &K {
        &self.key
    }

    /// The node's value.
    #[inline]
    pub const fn value(&self) -> &V {
        &self.value
    }

    /// The left subtree: every key in it orders strictly before [`key`](Self::key).
    #[inline]
    pub const fn left(&self) -> &Link<K, V> {
        &self.left
    }

    /// The right subtree: every key in it orders strictly after [`key`](Self::key).
    #[inline]
    pub const fn right(&self) -> &Link<K, V> {
        &self.right
    }
}

impl<K: Clone, V: Clone> TreeNode<K, V> {
    /// Builds a single node, recomputing the cached subtree size.
    ///
    /// Callers must uphold the order invariant: every key in `left` orders
    /// strictly before `key` and every key in `right` strictly after, under
    /// the comparator of the tree the link will live in.
    pub fn link(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Link<K, V> {
        let size = Self::size_of(&left) + Self::size_of(&right) + 1;
        Some(ReferenceCounter::new(Self {
            key,
            value,
            size,
            left,
            right,
        }))
    }

    /// Rotates the tree behind `link` to the left.
    ///
    /// The right child becomes the new root; its left subtree is demoted to
    /// be the old root's new right side. A pure re-association: no entry is
    /// created or destroyed and the in-order sequence is unchanged. Returns
    /// the tree unchanged when there is no right child to promote.
    pub fn rotate_left(link: &Link<K, V>) -> Link<K, V> {
        let Some(node) = link.as_deref() else {
            return None;
        };
        let Some(pivot) = node.right.as_deref() else {
            return link.clone();
        };
        Self::link(
            pivot.key.clone(),
            pivot.value.clone(),
            Self::link(
                node.key.clone(),
                node.value.clone(),
                node.left.clone(),
                pivot.left.clone(),
            ),
            pivot.right.clone(),
        )
    }

    /// Rotates the tree behind `link` to the right.
    ///
    /// Mirror image of [`rotate_left`](Self::rotate_left): the left child
    /// becomes the new root. Returns the tree unchanged when there is no left
    /// child to promote.
    pub fn rotate_right(link: &Link<K, V>) -> Link<K, V> {
        let Some(node) = link.as_deref() else {
            return None;
        };
        let Some(pivot) = node.left.as_deref() else {
            return link.clone();
        };
        Self::link(
            pivot.key.clone(),
            pivot.value.clone(),
            pivot.left.clone(),
            Self::link(
                node.key.clone(),
                node.value.clone(),
                pivot.right.clone(),
                node.right.clone(),
            ),
        )
    }
}

// =============================================================================
// Tree Factory
// =============================================================================

/// The construction capability of a concrete tree kind.
///
/// The generic algorithms (insert, remove, filter) are written once against
/// this trait and construct every node through it, so a derived kind changes
/// the tree's *shape* discipline without rewriting any traversal logic.
///
/// The contract mirrors [`TreeNode::link`]: every key in `left` must order
/// strictly before `key` and every key in `right` strictly after. The
/// returned tree must contain exactly the entries of `left`, `key`/`value`,
/// and `right`, in that order; the factory is free to re-associate the shape
/// (e.g. via [`TreeNode::rotate_left`]/[`TreeNode::rotate_right`]).
pub trait TreeFactory {
    /// Builds a tree of this kind from an entry and two subtrees.
    fn node<K: Clone, V: Clone>(key: K, value: V, left: Link<K, V>, right: Link<K, V>)
    -> Link<K, V>;
}

/// Plain binary-search-tree construction.
///
/// The tree's shape is determined entirely by the operation sequence: keys
/// inserted in sorted order degenerate to a spine. Ordering, sizes, and
/// structural sharing are guaranteed; height is not.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct UnbalancedTree;

impl TreeFactory for UnbalancedTree {
    #[inline]
    fn node<K: Clone, V: Clone>(
        key: K,
        value: V,
        left: Link<K, V>,
        right: Link<K, V>,
    ) -> Link<K, V> {
        TreeNode::link(key, value, left, right)
    }
}

/// Weight-balanced tree construction.
///
/// Keeps sibling subtree sizes within a bounded ratio of each other, which
/// bounds the height to O(log n). The discipline is driven entirely by the
/// size field every node already caches for order statistics, and restores
/// balance with the generic rotation primitives. Construction accepts
/// arbitrarily lopsided child pairs (it descends into the heavier side), so
/// bulk operations such as `filter` and `join` also come out balanced.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct BalancedTree;

/// A subtree may outweigh its sibling by at most this factor.
const DELTA: usize = 3;

/// Decides between a single and a double rotation when rebalancing.
const RATIO: usize = 2;

impl TreeFactory for BalancedTree {
    fn node<K: Clone, V: Clone>(
        key: K,
        value: V,
        left: Link<K, V>,
        right: Link<K, V>,
    ) -> Link<K, V> {
        let left_size = TreeNode::size_of(&left);
        let right_size = TreeNode::size_of(&right);
        if left_size + right_size <= 1 {
            return TreeNode::link(key, value, left, right);
        }
        if right_size > DELTA * left_size
            && let Some(heavy) = right.as_deref()
        {
            // Push the entry down into the heavy side, then fix up locally.
            let merged = Self::node(key, value, left, heavy.left.clone());
            return rebalance(
                heavy.key.clone(),
                heavy.value.clone(),
                merged,
                heavy.right.clone(),
            );
        }
        if left_size > DELTA * right_size
            && let Some(heavy) = left.as_deref()
        {
            let merged = Self::node(key, value, heavy.right.clone(), right);
            return rebalance(
                heavy.key.clone(),
                heavy.value.clone(),
                heavy.left.clone(),
                merged,
            );
        }
        TreeNode::link(key, value, left, right)
    }
}

/// Local rebalancing step: one single or double rotation.
///
/// Expects children whose sizes are within one rotation of the balance
/// bound, which holds along every recursive construction path.
fn rebalance<K: Clone, V: Clone>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Link<K, V> {
    let left_size = TreeNode::size_of(&left);
    let right_size = TreeNode::size_of(&right);
    if left_size + right_size <= 1 {
        return TreeNode::link(key, value, left, right);
    }
    if right_size > DELTA * left_size {
        let needs_double = right.as_deref().is_some_and(|node| {
            TreeNode::size_of(&node.left) >= RATIO * TreeNode::size_of(&node.right)
        });
        let pivot = if needs_double {
            TreeNode::rotate_right(&right)
        } else {
            right
        };
        return TreeNode::rotate_left(&TreeNode::link(key, value, left, pivot));
    }
    if left_size > DELTA * right_size {
        let needs_double = left.as_deref().is_some_and(|node| {
            TreeNode::size_of(&node.right) >= RATIO * TreeNode::size_of(&node.left)
        });
        let pivot = if needs_double {
            TreeNode::rotate_left(&left)
        } else {
            left
        };
        return TreeNode::rotate_right(&TreeNode::link(key, value, pivot, right));
    }
    TreeNode::link(key, value, left, right)
}

// =============================================================================
// PersistentTreeMap Definition
// =============================================================================

/// A persistent (immutable) ordered map with structural sharing.
///
/// `PersistentTreeMap` is the public face of the tree engine. Entries are
/// kept in the order of the comparator the map was constructed with
/// ([`NaturalOrder`], i.e. `Ord`, by default), and every mutating operation
/// returns a new map that shares untouched subtrees with the original.
///
/// The fourth type parameter selects the construction strategy; the default
/// [`BalancedTree`] keeps the height logarithmic. See [`TreeFactory`].
///
/// # Time Complexity
///
/// | Operation            | Complexity (balanced) |
/// |----------------------|-----------------------|
/// | `new`                | O(1)                  |
/// | `get`                | O(log N)              |
/// | `insert`             | O(log N)              |
/// | `remove`             | O(log N)              |
/// | `entry_at`/`rank_of` | O(log N)              |
/// | `first`/`last`       | O(log N)              |
/// | `len`/`is_empty`     | O(1)                  |
/// | `filter`/`fold`      | O(N log N) / O(N)     |
///
/// # Examples
///
/// ```rust
/// use sylva::persistent::PersistentTreeMap;
///
/// let map = PersistentTreeMap::singleton(42, "answer");
/// assert_eq!(map.get(&42), Some(&"answer"));
///
/// let map = PersistentTreeMap::new()
///     .insert(3, "three")
///     .insert(1, "one")
///     .insert(2, "two");
///
/// let keys: Vec<&i32> = map.keys().collect();
/// assert_eq!(keys, vec![&1, &2, &3]);
/// ```
pub struct PersistentTreeMap<K, V, C = NaturalOrder, F = BalancedTree> {
    /// Root of the tree; `None` is the empty map
    root: Link<K, V>,
    /// Ordering function, propagated unchanged into every derived map
    comparator: C,
    /// Construction strategy marker
    kind: PhantomData<F>,
}

impl<K, V, C: Clone, F> Clone for PersistentTreeMap<K, V, C, F> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            comparator: self.comparator.clone(),
            kind: PhantomData,
        }
    }
}

impl<K, V> PersistentTreeMap<K, V> {
    /// Creates a new empty map ordered by `Ord`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map: PersistentTreeMap<i32, String> = PersistentTreeMap::new();
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            root: None,
            comparator: NaturalOrder,
            kind: PhantomData,
        }
    }
}

impl<K: Clone + Ord, V: Clone> PersistentTreeMap<K, V> {
    /// Creates a map containing a single entry, ordered by `Ord`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::singleton(42, "answer");
    /// assert_eq!(map.len(), 1);
    /// ```
    #[inline]
    #[must_use]
    pub fn singleton(key: K, value: V) -> Self {
        Self::new().insert(key, value)
    }
}

impl<K, V, C> PersistentTreeMap<K, V, C> {
    /// Creates a new empty map ordered by the given comparator.
    ///
    /// The comparator is carried through every operation: all maps derived
    /// from this one order their keys the same way.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::{NaturalOrder, PersistentTreeMap, ReverseOrder};
    ///
    /// let map = PersistentTreeMap::with_comparator(ReverseOrder::<NaturalOrder>::default())
    ///     .insert(1, "one")
    ///     .insert(2, "two");
    ///
    /// assert_eq!(map.first(), (&2, &"two"));
    /// ```
    #[inline]
    #[must_use]
    pub const fn with_comparator(comparator: C) -> Self {
        Self::empty_with_comparator(comparator)
    }
}

impl<K, V, C, F> PersistentTreeMap<K, V, C, F> {
    /// Creates a new empty map of this tree kind ordered by the given
    /// comparator.
    ///
    /// Unlike [`with_comparator`](Self::with_comparator), which always
    /// builds the default balanced kind, the construction strategy here is
    /// taken from the annotated type — the entry point for custom
    /// [`TreeFactory`] implementations.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::{NaturalOrder, PersistentTreeMap, UnbalancedTree};
    ///
    /// let map: PersistentTreeMap<i32, &str, NaturalOrder, UnbalancedTree> =
    ///     PersistentTreeMap::empty_with_comparator(NaturalOrder);
    /// assert!(map.is_empty());
    /// ```
    #[inline]
    #[must_use]
    pub const fn empty_with_comparator(comparator: C) -> Self {
        Self {
            root: None,
            comparator,
            kind: PhantomData,
        }
    }

    /// Returns the number of entries in the map.
    ///
    /// O(1): subtree sizes are cached in every node.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        TreeNode::size_of(&self.root)
    }

    /// Returns `true` if the map contains no entries.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// The ordering function this map was constructed with.
    #[inline]
    pub const fn comparator(&self) -> &C {
        &self.comparator
    }

    /// Derived-map constructor: same comparator, new root.
    fn with_root(&self, root: Link<K, V>) -> Self
    where
        C: Clone,
    {
        Self {
            root,
            comparator: self.comparator.clone(),
            kind: PhantomData,
        }
    }

    /// Returns an empty map with the same comparator.
    #[must_use]
    pub fn empty(&self) -> Self
    where
        C: Clone,
    {
        self.with_root(None)
    }
}

// =============================================================================
// Read Operations
// =============================================================================

impl<K, V, C, F> PersistentTreeMap<K, V, C, F> {
    /// Returns a reference to the value corresponding to the key.
    ///
    /// The key may be any borrowed form of the map's key type, provided the
    /// comparator orders the borrowed form consistently with the key type
    /// ([`NaturalOrder`] does, for any `Ord` borrow).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert("hello".to_string(), 42);
    ///
    /// assert_eq!(map.get("hello"), Some(&42));
    /// assert_eq!(map.get("world"), None);
    /// ```
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        self.get_key_value(key).map(|(_, value)| value)
    }

    /// Returns the stored key and value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert(1, "one");
    /// assert_eq!(map.get_key_value(&1), Some((&1, &"one")));
    /// ```
    #[must_use]
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        Self::get_from_node(self.root.as_deref(), &self.comparator, key)
    }

    /// Recursive helper for get.
    fn get_from_node<'a, Q>(
        node: Option<&'a TreeNode<K, V>>,
        comparator: &C,
        key: &Q,
    ) -> Option<(&'a K, &'a V)>
    where
        K: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        node.and_then(
            |node_ref| match comparator.compare(key, node_ref.key.borrow()) {
                Ordering::Less => Self::get_from_node(node_ref.left.as_deref(), comparator, key),
                Ordering::Greater => {
                    Self::get_from_node(node_ref.right.as_deref(), comparator, key)
                }
                Ordering::Equal => Some((&node_ref.key, &node_ref.value)),
            },
        )
    }

    /// Returns `true` if the map contains a value for the specified key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert("key".to_string(), 42);
    ///
    /// assert!(map.contains_key("key"));
    /// assert!(!map.contains_key("other"));
    /// ```
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        self.get(key).is_some()
    }

    /// Returns the value of the first node whose key satisfies the predicate.
    ///
    /// The search is structural, not in-order: each node tests its own key
    /// before descending, first into the left subtree, then the right.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new()
    ///     .insert(2, "two")
    ///     .insert(1, "one")
    ///     .insert(3, "three");
    ///
    /// // The root's key (2) is tested before the smaller key 1
    /// assert_eq!(map.find(|key| *key <= 2), Some(&"two"));
    /// assert_eq!(map.find(|key| *key > 10), None);
    /// ```
    #[must_use]
    pub fn find<P>(&self, predicate: P) -> Option<&V>
    where
        P: FnMut(&K) -> bool,
    {
        self.find_entry(predicate).map(|(_, value)| value)
    }

    /// Returns the entry of the first node whose key satisfies the predicate.
    ///
    /// Same traversal order as [`find`](Self::find).
    #[must_use]
    pub fn find_entry<P>(&self, mut predicate: P) -> Option<(&K, &V)>
    where
        P: FnMut(&K) -> bool,
    {
        Self::find_in_node(self.root.as_deref(), &mut predicate)
    }

    /// Recursive helper for find: self, then left, then right.
    fn find_in_node<'a, P>(
        node: Option<&'a TreeNode<K, V>>,
        predicate: &mut P,
    ) -> Option<(&'a K, &'a V)>
    where
        P: FnMut(&K) -> bool,
    {
        node.and_then(|node_ref| {
            if predicate(&node_ref.key) {
                return Some((&node_ref.key, &node_ref.value));
            }
            Self::find_in_node(node_ref.left.as_deref(), predicate)
                .or_else(|| Self::find_in_node(node_ref.right.as_deref(), predicate))
        })
    }

    /// Returns `true` if any key satisfies the predicate.
    ///
    /// Same traversal order as [`find`](Self::find).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert(1, "one").insert(2, "two");
    /// assert!(map.exists(|key| key % 2 == 0));
    /// assert!(!map.exists(|key| *key > 10));
    /// ```
    #[must_use]
    pub fn exists<P>(&self, mut predicate: P) -> bool
    where
        P: FnMut(&K) -> bool,
    {
        Self::exists_in_node(self.root.as_deref(), &mut predicate)
    }

    fn exists_in_node<P>(node: Option<&TreeNode<K, V>>, predicate: &mut P) -> bool
    where
        P: FnMut(&K) -> bool,
    {
        node.is_some_and(|node_ref| {
            predicate(&node_ref.key)
                || Self::exists_in_node(node_ref.left.as_deref(), predicate)
                || Self::exists_in_node(node_ref.right.as_deref(), predicate)
        })
    }

    /// Returns the entry at the given in-order rank.
    ///
    /// Rank 0 is the first entry in comparator order. Runs in O(height) by
    /// steering on the cached subtree sizes.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.len()`; an out-of-range rank is a contract
    /// violation, exactly as with slice indexing.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new()
    ///     .insert(30, "thirty")
    ///     .insert(10, "ten")
    ///     .insert(20, "twenty");
    ///
    /// assert_eq!(map.entry_at(0), (&10, &"ten"));
    /// assert_eq!(map.entry_at(2), (&30, &"thirty"));
    /// ```
    #[must_use]
    pub fn entry_at(&self, index: usize) -> (&K, &V) {
        assert!(
            index < self.len(),
            "entry index {index} out of bounds for tree of size {size}",
            size = self.len()
        );
        Self::entry_at_node(self.root.as_deref(), index)
    }

    /// Recursive helper for `entry_at`; steers on the left subtree size.
    fn entry_at_node(node: Option<&TreeNode<K, V>>, index: usize) -> (&K, &V) {
        let Some(node_ref) = node else {
            unreachable!("entry index within bounds never reaches an empty subtree")
        };
        let left_size = TreeNode::size_of(&node_ref.left);
        match index.cmp(&left_size) {
            Ordering::Equal => (&node_ref.key, &node_ref.value),
            Ordering::Less => Self::entry_at_node(node_ref.left.as_deref(), index),
            Ordering::Greater => {
                Self::entry_at_node(node_ref.right.as_deref(), index - left_size - 1)
            }
        }
    }

    /// Returns the in-order rank of the given key, or `None` if absent.
    ///
    /// Inverse of [`entry_at`](Self::entry_at): descending right adds the
    /// left subtree's size plus one to the rank found below.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new()
    ///     .insert(30, "thirty")
    ///     .insert(10, "ten")
    ///     .insert(20, "twenty");
    ///
    /// assert_eq!(map.rank_of(&30), Some(2));
    /// assert_eq!(map.rank_of(&15), None);
    /// ```
    #[must_use]
    pub fn rank_of<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        Self::rank_in_node(self.root.as_deref(), &self.comparator, key)
    }

    fn rank_in_node<Q>(node: Option<&TreeNode<K, V>>, comparator: &C, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        node.and_then(|node_ref| {
            let left_size = TreeNode::size_of(&node_ref.left);
            match comparator.compare(key, node_ref.key.borrow()) {
                Ordering::Equal => Some(left_size),
                Ordering::Less => Self::rank_in_node(node_ref.left.as_deref(), comparator, key),
                Ordering::Greater => {
                    Self::rank_in_node(node_ref.right.as_deref(), comparator, key)
                        .map(|rank| left_size + 1 + rank)
                }
            }
        })
    }

    /// Returns the entry with the smallest key.
    ///
    /// # Panics
    ///
    /// Panics if the map is empty: an empty tree has no minimum by
    /// definition.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert(3, "three").insert(1, "one");
    /// assert_eq!(map.first(), (&1, &"one"));
    /// ```
    #[must_use]
    pub fn first(&self) -> (&K, &V) {
        let Some(node) = self.root.as_deref() else {
            panic!("first entry of an empty tree")
        };
        Self::leftmost(node)
    }

    fn leftmost(node: &TreeNode<K, V>) -> (&K, &V) {
        node.left
            .as_deref()
            .map_or_else(|| (&node.key, &node.value), |left| Self::leftmost(left))
    }

    /// Returns the entry with the largest key.
    ///
    /// # Panics
    ///
    /// Panics if the map is empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert(3, "three").insert(1, "one");
    /// assert_eq!(map.last(), (&3, &"three"));
    /// ```
    #[must_use]
    pub fn last(&self) -> (&K, &V) {
        let Some(node) = self.root.as_deref() else {
            panic!("last entry of an empty tree")
        };
        Self::rightmost(node)
    }

    fn rightmost(node: &TreeNode<K, V>) -> (&K, &V) {
        node.right
            .as_deref()
            .map_or_else(|| (&node.key, &node.value), |right| Self::rightmost(right))
    }

    /// Returns the entry at the root of the tree.
    ///
    /// Which entry sits at the root depends on the construction history (and
    /// on the factory's balancing); the head is *not* the minimum — use
    /// [`first`](Self::first) for that.
    ///
    /// # Panics
    ///
    /// Panics if the map is empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new()
    ///     .insert(2, "two")
    ///     .insert(1, "one")
    ///     .insert(3, "three");
    ///
    /// assert_eq!(map.head(), (&2, &"two"));
    /// ```
    #[must_use]
    pub fn head(&self) -> (&K, &V) {
        let Some(node) = self.root.as_deref() else {
            panic!("head of an empty tree")
        };
        (&node.key, &node.value)
    }

    /// Returns the root entry, or `None` if the map is empty.
    #[must_use]
    pub fn head_option(&self) -> Option<(&K, &V)> {
        self.root.as_deref().map(|node| (&node.key, &node.value))
    }

    /// Strict left-to-right accumulation over the entries in comparator
    /// order: the left subtree folds into the seed, the node's own entry is
    /// combined next, and the right subtree folds into that result.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new()
    ///     .insert(2, 20)
    ///     .insert(1, 10)
    ///     .insert(3, 30);
    ///
    /// let keys = map.fold(Vec::new(), |mut order, (key, _)| {
    ///     order.push(*key);
    ///     order
    /// });
    /// assert_eq!(keys, vec![1, 2, 3]);
    /// ```
    #[must_use]
    pub fn fold<A, G>(&self, seed: A, mut combine: G) -> A
    where
        G: FnMut(A, (&K, &V)) -> A,
    {
        Self::fold_node(self.root.as_deref(), seed, &mut combine)
    }

    fn fold_node<A, G>(node: Option<&TreeNode<K, V>>, seed: A, combine: &mut G) -> A
    where
        G: FnMut(A, (&K, &V)) -> A,
    {
        match node {
            None => seed,
            Some(node_ref) => {
                let after_left = Self::fold_node(node_ref.left.as_deref(), seed, combine);
                let after_self = combine(after_left, (&node_ref.key, &node_ref.value));
                Self::fold_node(node_ref.right.as_deref(), after_self, combine)
            }
        }
    }
}

// =============================================================================
// Mutating Operations
// =============================================================================

impl<K, V, C, F> PersistentTreeMap<K, V, C, F>
where
    K: Clone,
    V: Clone,
    C: Comparator<K> + Clone,
    F: TreeFactory,
{
    /// Inserts an entry, returning the new map.
    ///
    /// If the key is already present its value is replaced at the same
    /// structural position. Every node on the descent path is rebuilt
    /// through the factory; all other nodes are shared by reference with the
    /// original map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map1 = PersistentTreeMap::new().insert(1, "one");
    /// let map2 = map1.insert(1, "ONE");
    ///
    /// assert_eq!(map1.get(&1), Some(&"one")); // Original unchanged
    /// assert_eq!(map2.get(&1), Some(&"ONE")); // New version
    /// ```
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        self.with_root(Self::insert_into_node(
            self.root.as_deref(),
            &self.comparator,
            key,
            value,
        ))
    }

    /// Recursive helper for insert.
    fn insert_into_node(
        node: Option<&TreeNode<K, V>>,
        comparator: &C,
        key: K,
        value: V,
    ) -> Link<K, V> {
        match node {
            None => F::node(key, value, None, None),
            Some(node_ref) => match comparator.compare(&key, &node_ref.key) {
                Ordering::Equal => F::node(key, value, node_ref.left.clone(), node_ref.right.clone()),
                Ordering::Less => {
                    let new_left =
                        Self::insert_into_node(node_ref.left.as_deref(), comparator, key, value);
                    F::node(
                        node_ref.key.clone(),
                        node_ref.value.clone(),
                        new_left,
                        node_ref.right.clone(),
                    )
                }
                Ordering::Greater => {
                    let new_right =
                        Self::insert_into_node(node_ref.right.as_deref(), comparator, key, value);
                    F::node(
                        node_ref.key.clone(),
                        node_ref.value.clone(),
                        node_ref.left.clone(),
                        new_right,
                    )
                }
            },
        }
    }

    /// Appends one entry to the ordered tree, which means inserting it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().cons((1, "one")).cons((2, "two"));
    /// assert_eq!(map.len(), 2);
    /// ```
    #[inline]
    #[must_use]
    pub fn cons(&self, entry: (K, V)) -> Self {
        self.insert(entry.0, entry.1)
    }

    /// Removes a key, returning the new map.
    ///
    /// If the key is absent, the map is returned unchanged. A node with one
    /// child is replaced by that child; a node with two children takes over
    /// the entry of the maximum of its left subtree (the in-order
    /// predecessor, adjacent in key order, so the order invariant holds
    /// without re-sorting anything).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert(1, "one").insert(2, "two");
    /// let removed = map.remove(&1);
    ///
    /// assert_eq!(map.len(), 2);     // Original unchanged
    /// assert_eq!(removed.len(), 1); // New version
    /// assert_eq!(removed.get(&1), None);
    /// ```
    #[must_use]
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        if !self.contains_key(key) {
            return self.clone();
        }
        self.with_root(Self::remove_from_node(
            self.root.as_deref(),
            &self.comparator,
            key,
        ))
    }

    /// Recursive helper for remove; only called when the key is present.
    fn remove_from_node<Q>(node: Option<&TreeNode<K, V>>, comparator: &C, key: &Q) -> Link<K, V>
    where
        K: Borrow<Q>,
        C: Comparator<Q>,
        Q: ?Sized,
    {
        let Some(node_ref) = node else {
            return None;
        };
        match comparator.compare(key, node_ref.key.borrow()) {
            Ordering::Less => F::node(
                node_ref.key.clone(),
                node_ref.value.clone(),
                Self::remove_from_node(node_ref.left.as_deref(), comparator, key),
                node_ref.right.clone(),
            ),
            Ordering::Greater => F::node(
                node_ref.key.clone(),
                node_ref.value.clone(),
                node_ref.left.clone(),
                Self::remove_from_node(node_ref.right.as_deref(), comparator, key),
            ),
            Ordering::Equal => match (node_ref.left.as_deref(), &node_ref.right) {
                (None, _) => node_ref.right.clone(),
                (_, None) => node_ref.left.clone(),
                (Some(left), Some(_)) => {
                    let (new_left, (predecessor_key, predecessor_value)) =
                        Self::remove_last_from_node(left);
                    F::node(
                        predecessor_key,
                        predecessor_value,
                        new_left,
                        node_ref.right.clone(),
                    )
                }
            },
        }
    }

    /// Removes the smallest entry.
    ///
    /// Returns the remaining map together with the removed entry, or `None`
    /// if the map is empty.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert(2, "two").insert(1, "one");
    /// let (rest, removed) = map.remove_first().unwrap();
    ///
    /// assert_eq!(removed, (1, "one"));
    /// assert_eq!(rest.len(), 1);
    /// ```
    #[must_use]
    pub fn remove_first(&self) -> Option<(Self, (K, V))> {
        self.root.as_deref().map(|root| {
            let (remaining, removed) = Self::remove_first_from_node(root);
            (self.with_root(remaining), removed)
        })
    }

    fn remove_first_from_node(node: &TreeNode<K, V>) -> (Link<K, V>, (K, V)) {
        match node.left.as_deref() {
            None => (
                node.right.clone(),
                (node.key.clone(), node.value.clone()),
            ),
            Some(left) => {
                let (new_left, removed) = Self::remove_first_from_node(left);
                (
                    F::node(
                        node.key.clone(),
                        node.value.clone(),
                        new_left,
                        node.right.clone(),
                    ),
                    removed,
                )
            }
        }
    }

    /// Removes the largest entry.
    ///
    /// Returns the remaining map together with the removed entry, or `None`
    /// if the map is empty.
    #[must_use]
    pub fn remove_last(&self) -> Option<(Self, (K, V))> {
        self.root.as_deref().map(|root| {
            let (remaining, removed) = Self::remove_last_from_node(root);
            (self.with_root(remaining), removed)
        })
    }

    fn remove_last_from_node(node: &TreeNode<K, V>) -> (Link<K, V>, (K, V)) {
        match node.right.as_deref() {
            None => (node.left.clone(), (node.key.clone(), node.value.clone())),
            Some(right) => {
                let (new_right, removed) = Self::remove_last_from_node(right);
                (
                    F::node(
                        node.key.clone(),
                        node.value.clone(),
                        node.left.clone(),
                        new_right,
                    ),
                    removed,
                )
            }
        }
    }

    /// Keeps only the entries satisfying the predicate.
    ///
    /// A kept node is rebuilt with both children filtered; a dropped node is
    /// excised and its filtered children — now adjacent in key order — are
    /// joined without an intervening entry. Relative order is preserved.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map: sylva::persistent::PersistentTreeMap<i32, i32> =
    ///     (1..=5).map(|key| (key, key * 10)).collect();
    ///
    /// let odd = map.filter(|key, _| key % 2 == 1);
    /// let keys: Vec<&i32> = odd.keys().collect();
    /// assert_eq!(keys, vec![&1, &3, &5]);
    /// ```
    #[must_use]
    pub fn filter<P>(&self, mut predicate: P) -> Self
    where
        P: FnMut(&K, &V) -> bool,
    {
        self.filter_node(self.root.as_deref(), &mut predicate)
    }

    fn filter_node<P>(&self, node: Option<&TreeNode<K, V>>, predicate: &mut P) -> Self
    where
        P: FnMut(&K, &V) -> bool,
    {
        let Some(node_ref) = node else {
            return self.empty();
        };
        if predicate(&node_ref.key, &node_ref.value) {
            let left = self.filter_node(node_ref.left.as_deref(), predicate);
            let right = self.filter_node(node_ref.right.as_deref(), predicate);
            self.with_root(F::node(
                node_ref.key.clone(),
                node_ref.value.clone(),
                left.root,
                right.root,
            ))
        } else {
            let left = self.filter_node(node_ref.left.as_deref(), predicate);
            let right = self.filter_node(node_ref.right.as_deref(), predicate);
            left.join(&right)
        }
    }

    /// Keeps only the entries whose key satisfies the predicate.
    #[must_use]
    pub fn filter_keys<P>(&self, mut predicate: P) -> Self
    where
        P: FnMut(&K) -> bool,
    {
        self.filter(|key, _| predicate(key))
    }

    /// Keeps only the entries whose value satisfies the predicate.
    #[must_use]
    pub fn filter_values<P>(&self, mut predicate: P) -> Self
    where
        P: FnMut(&V) -> bool,
    {
        self.filter(|_, value| predicate(value))
    }

    /// Concatenates two maps whose key ranges are ordered relative to each
    /// other.
    ///
    /// When every key of `self` orders before every key of `other`, the
    /// result traverses as `self`'s entries followed by `other`'s, and its
    /// size is the sum of both. Implemented by in-order insertion of `self`'s
    /// entries ahead of `other`'s: the left subtree joins onto the result of
    /// the right subtree joining onto `other`, consed with this node's entry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let low = PersistentTreeMap::new().insert(1, "one").insert(2, "two");
    /// let high = PersistentTreeMap::new().insert(5, "five").insert(6, "six");
    ///
    /// let joined = low.join(&high);
    /// let keys: Vec<&i32> = joined.keys().collect();
    /// assert_eq!(keys, vec![&1, &2, &5, &6]);
    /// ```
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        match self.root.as_deref() {
            None => other.clone(),
            Some(node_ref) => {
                let left = self.with_root(node_ref.left.clone());
                let right = self.with_root(node_ref.right.clone());
                left.join(
                    &right
                        .join(other)
                        .cons((node_ref.key.clone(), node_ref.value.clone())),
                )
            }
        }
    }

    /// Returns the tree without its root entry: the root's children joined.
    ///
    /// The counterpart of [`head`](Self::head); which entry is removed
    /// depends on the construction history. Use
    /// [`remove_first`](Self::remove_first) to drop the minimum.
    ///
    /// # Panics
    ///
    /// Panics if the map is empty.
    #[must_use]
    pub fn tail(&self) -> Self {
        let Some(node) = self.root.as_deref() else {
            panic!("tail of an empty tree")
        };
        self.with_root(node.left.clone())
            .join(&self.with_root(node.right.clone()))
    }

    /// Rotates the tree to the left around its root.
    ///
    /// A pure re-association exposed for balancing disciplines: the right
    /// child becomes the root, the old root takes the right child's left
    /// subtree as its new right side. The in-order sequence and every cached
    /// size stay correct; no entry is created or destroyed. Returns the map
    /// unchanged when the root has no right child.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new()
    ///     .insert(2, "two")
    ///     .insert(1, "one")
    ///     .insert(3, "three");
    ///
    /// let rotated = map.rotate_left();
    /// assert_eq!(rotated.head(), (&3, &"three"));
    ///
    /// // Same entries, same order
    /// let keys: Vec<&i32> = rotated.keys().collect();
    /// assert_eq!(keys, vec![&1, &2, &3]);
    /// ```
    #[must_use]
    pub fn rotate_left(&self) -> Self {
        self.with_root(TreeNode::rotate_left(&self.root))
    }

    /// Rotates the tree to the right around its root.
    ///
    /// Mirror image of [`rotate_left`](Self::rotate_left). Returns the map
    /// unchanged when the root has no left child.
    #[must_use]
    pub fn rotate_right(&self) -> Self {
        self.with_root(TreeNode::rotate_right(&self.root))
    }

    /// Applies a function to every value, keeping keys unchanged.
    ///
    /// The tree shape is preserved exactly: keys never move, so values are
    /// transformed in place at each reconstructed node without any
    /// re-insertion, and the cached sizes carry over.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert(1, 10).insert(2, 20);
    /// let doubled = map.map_values(|value| value * 2);
    ///
    /// assert_eq!(doubled.get(&1), Some(&20));
    /// assert_eq!(doubled.get(&2), Some(&40));
    /// ```
    #[must_use]
    pub fn map_values<W, G>(&self, mut transform: G) -> PersistentTreeMap<K, W, C, F>
    where
        W: Clone,
        G: FnMut(&V) -> W,
    {
        PersistentTreeMap {
            root: Self::map_node(self.root.as_deref(), &mut transform),
            comparator: self.comparator.clone(),
            kind: PhantomData,
        }
    }

    /// Recursive helper for `map_values`; rebuilds every node, sharing
    /// nothing but preserving shape and sizes.
    fn map_node<W, G>(node: Option<&TreeNode<K, V>>, transform: &mut G) -> Link<K, W>
    where
        W: Clone,
        G: FnMut(&V) -> W,
    {
        node.map(|node_ref| {
            ReferenceCounter::new(TreeNode {
                key: node_ref.key.clone(),
                value: transform(&node_ref.value),
                size: node_ref.size,
                left: Self::map_node(node_ref.left.as_deref(), transform),
                right: Self::map_node(node_ref.right.as_deref(), transform),
            })
        })
    }
}

// =============================================================================
// Iterator Implementation
// =============================================================================

impl<K, V, C, F> PersistentTreeMap<K, V, C, F> {
    /// Returns a lazy iterator over the entries in comparator order.
    ///
    /// Each call builds a fresh iterator over the current snapshot; because
    /// the snapshot is immutable, later operations on the map never affect
    /// an iterator already handed out.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new()
    ///     .insert(3, "three")
    ///     .insert(1, "one")
    ///     .insert(2, "two");
    ///
    /// for (key, value) in map.iter() {
    ///     println!("{key}: {value}");
    /// }
    /// ```
    #[must_use]
    pub fn iter(&self) -> PersistentTreeMapIterator<'_, K, V> {
        PersistentTreeMapIterator::new(&self.root, self.len())
    }

    /// Returns an iterator over the keys in comparator order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert(2, "two").insert(1, "one");
    /// let keys: Vec<&i32> = map.keys().collect();
    /// assert_eq!(keys, vec![&1, &2]);
    /// ```
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(key, _)| key)
    }

    /// Returns an iterator over the values in key order.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use sylva::persistent::PersistentTreeMap;
    ///
    /// let map = PersistentTreeMap::new().insert(1, 10).insert(2, 20);
    /// let sum: i32 = map.values().sum();
    /// assert_eq!(sum, 30);
    /// ```
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, value)| value)
    }
}

/// A lazy in-order iterator over the entries of a [`PersistentTreeMap`].
///
/// Holds the left spine of the not-yet-visited part of the tree on an
/// explicit stack, so iteration never recurses and works on trees of any
/// shape.
pub struct PersistentTreeMapIterator<'a, K, V> {
    spine: SmallVec<[&'a TreeNode<K, V>; 16]>,
    remaining: usize,
}

impl<'a, K, V> PersistentTreeMapIterator<'a, K, V> {
    fn new(root: &'a Link<K, V>, length: usize) -> Self {
        let mut iterator = Self {
            spine: SmallVec::new(),
            remaining: length,
        };
        iterator.descend_left(root);
        iterator
    }

    /// Pushes the left spine starting at `link` onto the stack.
    fn descend_left(&mut self, mut link: &'a Link<K, V>) {
        while let Some(node) = link.as_deref() {
            self.spine.push(node);
            link = &node.left;
        }
    }
}

impl<'a, K, V> Iterator for PersistentTreeMapIterator<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.spine.pop()?;
        self.remaining -= 1;
        self.descend_left(&node.right);
        Some((&node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for PersistentTreeMapIterator<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

/// An owning iterator over the entries of a [`PersistentTreeMap`].
pub struct PersistentTreeMapIntoIterator<K, V> {
    entries: std::vec::IntoIter<(K, V)>,
}

impl<K, V> Iterator for PersistentTreeMapIntoIterator<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

impl<K, V> ExactSizeIterator for PersistentTreeMapIntoIterator<K, V> {
    fn len(&self) -> usize {
        self.entries.len()
    }
}

// =============================================================================
// Standard Trait Implementations
// =============================================================================

impl<K, V, C: Default, F> Default for PersistentTreeMap<K, V, C, F> {
    #[inline]
    fn default() -> Self {
        Self::empty_with_comparator(C::default())
    }
}

impl<K, V, C, F> FromIterator<(K, V)> for PersistentTreeMap<K, V, C, F>
where
    K: Clone,
    V: Clone,
    C: Comparator<K> + Clone + Default,
    F: TreeFactory,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iterator: I) -> Self {
        let mut map = Self::empty_with_comparator(C::default());
        for (key, value) in iterator {
            map = map.insert(key, value);
        }
        map
    }
}

impl<K: Clone, V: Clone, C, F> IntoIterator for PersistentTreeMap<K, V, C, F> {
    type Item = (K, V);
    type IntoIter = PersistentTreeMapIntoIterator<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let entries: Vec<(K, V)> = self
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        PersistentTreeMapIntoIterator {
            entries: entries.into_iter(),
        }
    }
}

impl<'a, K, V, C, F> IntoIterator for &'a PersistentTreeMap<K, V, C, F> {
    type Item = (&'a K, &'a V);
    type IntoIter = PersistentTreeMapIterator<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Content-based equality: two maps are equal iff their in-order entry
/// sequences are equal, element for element.
///
/// This is a deliberate departure from shape-based structural equality
/// (comparing node-for-node), which would make two maps holding the same
/// entries compare unequal whenever their construction histories produced
/// different shapes. Content comparison runs in O(n) by zipping the two lazy
/// iterators and is consistent with the `Hash` implementation.
impl<K, V, C, F> PartialEq for PersistentTreeMap<K, V, C, F>
where
    K: PartialEq,
    V: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq, C, F> Eq for PersistentTreeMap<K, V, C, F> {}

/// Hashes the length, then each entry in comparator order.
///
/// Iteration order is the comparator order, so the hash is independent of
/// the tree's shape and consistent with the content-based equality.
impl<K: Hash, V: Hash, C, F> Hash for PersistentTreeMap<K, V, C, F> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for (key, value) in self {
            key.hash(state);
            value.hash(state);
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug, C, F> fmt::Debug for PersistentTreeMap<K, V, C, F> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_map().entries(self.iter()).finish()
    }
}

impl<K: fmt::Display, V: fmt::Display, C, F> fmt::Display for PersistentTreeMap<K, V, C, F> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{{")?;
        let mut first = true;
        for (key, value) in self {
            if first {
                first = false;
            } else {
                write!(formatter, ", ")?;
            }
            write!(formatter, "{key}: {value}")?;
        }
        write!(formatter, "}}")
    }
}

// =============================================================================
// Serde Support
// =============================================================================

#[cfg(feature = "serde")]
impl<K, V, C, F> serde::Serialize for PersistentTreeMap<K, V, C, F>
where
    K: serde::Serialize,
    V: serde::Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
struct PersistentTreeMapVisitor<K, V, C, F> {
    marker: PhantomData<(K, V, C, F)>,
}

#[cfg(feature = "serde")]
impl<K, V, C, F> PersistentTreeMapVisitor<K, V, C, F> {
    const fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V, C, F> serde::de::Visitor<'de> for PersistentTreeMapVisitor<K, V, C, F>
where
    K: serde::Deserialize<'de> + Clone,
    V: serde::Deserialize<'de> + Clone,
    C: Comparator<K> + Clone + Default,
    F: TreeFactory,
{
    type Value = PersistentTreeMap<K, V, C, F>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a map")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        // Note: Sequential insert ensures gradual memory usage even for large inputs.
        let mut map = PersistentTreeMap::empty_with_comparator(C::default());
        while let Some((key, value)) = access.next_entry()? {
            map = map.insert(key, value);
        }
        Ok(map)
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V, C, F> serde::Deserialize<'de> for PersistentTreeMap<K, V, C, F>
where
    K: serde::Deserialize<'de> + Clone,
    V: serde::Deserialize<'de> + Clone,
    C: Comparator<K> + Clone + Default,
    F: TreeFactory,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_map(PersistentTreeMapVisitor::new())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    type UnbalancedMap<K, V> = PersistentTreeMap<K, V, NaturalOrder, UnbalancedTree>;

    fn height<K, V>(link: &Link<K, V>) -> usize {
        link.as_deref()
            .map_or(0, |node| 1 + height(&node.left).max(height(&node.right)))
    }

    /// Checks the order and size invariants of the whole tree.
    fn assert_invariants<K: Ord + Clone, V>(map: &PersistentTreeMap<K, V>) {
        fn check<K: Ord, V>(link: &Link<K, V>, lower: Option<&K>, upper: Option<&K>) -> usize {
            let Some(node) = link.as_deref() else {
                return 0;
            };
            assert!(lower.is_none_or(|bound| *bound < node.key));
            assert!(upper.is_none_or(|bound| node.key < *bound));
            let counted = check(&node.left, lower, Some(&node.key))
                + check(&node.right, Some(&node.key), upper)
                + 1;
            assert_eq!(node.size, counted, "cached size disagrees with node count");
            counted
        }
        let counted = check(&map.root, None, None);
        assert_eq!(counted, map.len());
    }

    // =========================================================================
    // Construction & Size Tests
    // =========================================================================

    #[rstest]
    fn test_new_creates_empty() {
        let map: PersistentTreeMap<i32, String> = PersistentTreeMap::new();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
    }

    #[rstest]
    fn test_sizes_are_cached_per_node() {
        let map: PersistentTreeMap<i32, i32> = (0..7).map(|key| (key, key)).collect();
        assert_invariants(&map);
    }

    // =========================================================================
    // Structural Sharing Tests
    // =========================================================================

    #[rstest]
    fn test_insert_shares_untouched_subtree() {
        let map = PersistentTreeMap::new()
            .insert(2, "two")
            .insert(1, "one")
            .insert(3, "three");
        let updated = map.insert(3, "THREE");

        let original_left = map.root.as_deref().unwrap().left.as_ref().unwrap();
        let updated_left = updated.root.as_deref().unwrap().left.as_ref().unwrap();
        assert!(
            ReferenceCounter::ptr_eq(original_left, updated_left),
            "left subtree must be shared, not copied"
        );
    }

    #[rstest]
    fn test_remove_missing_key_returns_same_root() {
        let map = PersistentTreeMap::new().insert(1, "one").insert(2, "two");
        let unchanged = map.remove(&9);
        assert!(ReferenceCounter::ptr_eq(
            map.root.as_ref().unwrap(),
            unchanged.root.as_ref().unwrap()
        ));
    }

    // =========================================================================
    // Rotation Tests
    // =========================================================================

    #[rstest]
    fn test_rotate_left_promotes_right_child() {
        let map = PersistentTreeMap::new()
            .insert(2, "two")
            .insert(1, "one")
            .insert(3, "three");
        let rotated = map.rotate_left();

        assert_eq!(rotated.head(), (&3, &"three"));
        let keys: Vec<&i32> = rotated.keys().collect();
        assert_eq!(keys, vec![&1, &2, &3]);
        assert_eq!(rotated.len(), 3);
    }

    #[rstest]
    fn test_rotate_right_promotes_left_child() {
        let map = PersistentTreeMap::new()
            .insert(2, "two")
            .insert(1, "one")
            .insert(3, "three");
        let rotated = map.rotate_right();

        assert_eq!(rotated.head(), (&1, &"one"));
        let keys: Vec<&i32> = rotated.keys().collect();
        assert_eq!(keys, vec![&1, &2, &3]);
    }

    #[rstest]
    fn test_rotate_left_without_right_child_is_identity() {
        let map = PersistentTreeMap::new().insert(2, "two").insert(1, "one");
        let rotated = map.rotate_left();
        assert_eq!(rotated.head(), map.head());
        assert_eq!(rotated.len(), 2);
    }

    #[rstest]
    fn test_rotations_are_inverse_on_full_tree() {
        let map = PersistentTreeMap::new()
            .insert(2, "two")
            .insert(1, "one")
            .insert(3, "three");
        let round_trip = map.rotate_left().rotate_right();
        assert_eq!(round_trip.head(), map.head());
        assert_eq!(round_trip, map);
    }

    // =========================================================================
    // Factory Tests
    // =========================================================================

    #[rstest]
    fn test_unbalanced_factory_degenerates_to_spine() {
        let mut map: UnbalancedMap<i32, i32> = UnbalancedMap::default();
        for key in 0..32 {
            map = map.insert(key, key);
        }
        assert_eq!(height(&map.root), 32);
        let keys: Vec<&i32> = map.keys().collect();
        assert_eq!(keys.len(), 32);
    }

    #[rstest]
    fn test_balanced_factory_bounds_height_on_sorted_insert() {
        let map: PersistentTreeMap<i32, i32> = (0..1024).map(|key| (key, key)).collect();
        assert_eq!(map.len(), 1024);
        // Weight-balanced with delta 3 stays within ~2.5 * log2(n).
        assert!(
            height(&map.root) <= 25,
            "height {} exceeds the balance bound",
            height(&map.root)
        );
        assert_invariants(&map);
    }

    #[rstest]
    fn test_balanced_factory_restores_balance_after_filter() {
        let map: PersistentTreeMap<i32, i32> = (0..1024).map(|key| (key, key)).collect();
        let lower_half = map.filter(|key, _| *key < 512);
        assert_eq!(lower_half.len(), 512);
        assert!(height(&lower_half.root) <= 23);
        assert_invariants(&lower_half);
    }

    // =========================================================================
    // Order Statistics Tests
    // =========================================================================

    #[rstest]
    fn test_entry_at_every_rank() {
        let map: PersistentTreeMap<i32, i32> = (0..100).map(|key| (key, key * 2)).collect();
        for rank in 0..100 {
            let rank_i32 = i32::try_from(rank).unwrap();
            assert_eq!(map.entry_at(rank), (&rank_i32, &(rank_i32 * 2)));
        }
    }

    #[rstest]
    #[should_panic(expected = "out of bounds")]
    fn test_entry_at_out_of_range_panics() {
        let map = PersistentTreeMap::new().insert(1, "one");
        let _ = map.entry_at(1);
    }

    #[rstest]
    #[should_panic(expected = "out of bounds")]
    fn test_entry_at_on_empty_panics() {
        let map: PersistentTreeMap<i32, i32> = PersistentTreeMap::new();
        let _ = map.entry_at(0);
    }

    #[rstest]
    fn test_rank_of_is_inverse_of_entry_at() {
        let map: PersistentTreeMap<i32, i32> = (0..50).map(|key| (key * 3, key)).collect();
        for rank in 0..50 {
            let (key, _) = map.entry_at(rank);
            assert_eq!(map.rank_of(key), Some(rank));
        }
        assert_eq!(map.rank_of(&1), None);
    }

    // =========================================================================
    // Head / Tail / First / Last Tests
    // =========================================================================

    #[rstest]
    fn test_first_and_last() {
        let map = PersistentTreeMap::new()
            .insert(3, "three")
            .insert(1, "one")
            .insert(5, "five");
        assert_eq!(map.first(), (&1, &"one"));
        assert_eq!(map.last(), (&5, &"five"));
    }

    #[rstest]
    #[should_panic(expected = "first entry of an empty tree")]
    fn test_first_on_empty_panics() {
        let map: PersistentTreeMap<i32, i32> = PersistentTreeMap::new();
        let _ = map.first();
    }

    #[rstest]
    #[should_panic(expected = "head of an empty tree")]
    fn test_head_on_empty_panics() {
        let map: PersistentTreeMap<i32, i32> = PersistentTreeMap::new();
        let _ = map.head();
    }

    #[rstest]
    fn test_tail_excises_the_root() {
        let map = PersistentTreeMap::new()
            .insert(2, "two")
            .insert(1, "one")
            .insert(3, "three");
        let (head_key, _) = map.head();
        let tail = map.tail();

        assert_eq!(tail.len(), 2);
        assert!(!tail.contains_key(head_key));
        assert_invariants(&tail);
    }

    #[rstest]
    #[should_panic(expected = "tail of an empty tree")]
    fn test_tail_on_empty_panics() {
        let map: PersistentTreeMap<i32, i32> = PersistentTreeMap::new();
        let _ = map.tail();
    }

    // =========================================================================
    // Find / Exists Tests
    // =========================================================================

    #[rstest]
    fn test_find_tests_own_key_before_subtrees() {
        let map = PersistentTreeMap::new()
            .insert(2, "two")
            .insert(1, "one")
            .insert(3, "three");
        // Both 1 and 2 satisfy; the root's own key wins over the left subtree.
        assert_eq!(map.find(|key| *key <= 2), Some(&"two"));
    }

    #[rstest]
    fn test_find_absent() {
        let map = PersistentTreeMap::new().insert(1, "one");
        assert_eq!(map.find(|key| *key > 10), None);
    }

    #[rstest]
    fn test_exists() {
        let map = PersistentTreeMap::new().insert(1, "one").insert(4, "four");
        assert!(map.exists(|key| key % 2 == 0));
        assert!(!map.exists(|key| *key < 0));
    }

    // =========================================================================
    // Join Tests
    // =========================================================================

    #[rstest]
    fn test_join_concatenates_ordered_trees() {
        let low: PersistentTreeMap<i32, i32> = (0..8).map(|key| (key, key)).collect();
        let high: PersistentTreeMap<i32, i32> = (8..16).map(|key| (key, key)).collect();
        let joined = low.join(&high);

        assert_eq!(joined.len(), low.len() + high.len());
        let keys: Vec<i32> = joined.keys().copied().collect();
        assert_eq!(keys, (0..16).collect::<Vec<i32>>());
        assert_invariants(&joined);
    }

    #[rstest]
    fn test_join_with_empty_is_identity() {
        let map: PersistentTreeMap<i32, i32> = (0..4).map(|key| (key, key)).collect();
        let empty = map.empty();
        assert_eq!(map.join(&empty), map);
        assert_eq!(empty.join(&map), map);
    }

    // =========================================================================
    // Equality / Hash Tests
    // =========================================================================

    #[rstest]
    fn test_equality_ignores_shape() {
        let ascending: UnbalancedMap<i32, i32> = (0..8).map(|key| (key, key)).collect();
        let descending: UnbalancedMap<i32, i32> = (0..8).rev().map(|key| (key, key)).collect();
        // Different insertion orders build different shapes in an unbalanced
        // tree; content equality must not care.
        assert_eq!(ascending, descending);
    }

    #[rstest]
    fn test_equal_maps_hash_equal() {
        use std::collections::hash_map::DefaultHasher;

        fn hash_of<T: Hash>(value: &T) -> u64 {
            let mut hasher = DefaultHasher::new();
            value.hash(&mut hasher);
            hasher.finish()
        }

        let ascending: UnbalancedMap<i32, i32> = (0..8).map(|key| (key, key)).collect();
        let descending: UnbalancedMap<i32, i32> = (0..8).rev().map(|key| (key, key)).collect();
        assert_eq!(hash_of(&ascending), hash_of(&descending));
    }

    // =========================================================================
    // Iterator Tests
    // =========================================================================

    #[rstest]
    fn test_iterator_is_lazy_and_exact_size() {
        let map: PersistentTreeMap<i32, i32> = (0..10).map(|key| (key, key)).collect();
        let mut iterator = map.iter();
        assert_eq!(iterator.len(), 10);
        iterator.next();
        assert_eq!(iterator.len(), 9);
    }

    #[rstest]
    fn test_iterator_is_restartable() {
        let map: PersistentTreeMap<i32, i32> = (0..5).map(|key| (key, key)).collect();
        let first_pass: Vec<&i32> = map.iter().map(|(key, _)| key).collect();
        let second_pass: Vec<&i32> = map.iter().map(|(key, _)| key).collect();
        assert_eq!(first_pass, second_pass);
    }

    #[rstest]
    fn test_iterator_snapshot_unaffected_by_later_inserts() {
        let map: PersistentTreeMap<i32, i32> = (0..5).map(|key| (key, key)).collect();
        let iterator = map.iter();
        let _bigger = map.insert(99, 99);
        assert_eq!(iterator.count(), 5);
    }

    // =========================================================================
    // Display Tests
    // =========================================================================

    #[rstest]
    fn test_display_empty() {
        let map: PersistentTreeMap<i32, String> = PersistentTreeMap::new();
        assert_eq!(format!("{map}"), "{}");
    }

    #[rstest]
    fn test_display_sorted() {
        let map = PersistentTreeMap::new()
            .insert(3, "three")
            .insert(1, "one")
            .insert(2, "two");
        assert_eq!(format!("{map}"), "{1: one, 2: two, 3: three}");
    }
}
