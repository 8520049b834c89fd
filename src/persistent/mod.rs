//! Persistent (immutable) ordered collections.
//!
//! This module provides immutable data structures built on one persistent
//! binary-search-tree engine that uses structural sharing to minimize
//! copying:
//!
//! - [`PersistentTreeMap`]: persistent ordered map (the tree engine itself)
//! - [`PersistentTreeSet`]: persistent ordered set
//! - [`PersistentTrie`]: persistent trie keyed by path segments
//!
//! # Structural Sharing
//!
//! Every mutating operation returns a new collection; subtrees the operation
//! did not touch are shared by reference between the old and new versions, so
//! only the path from the modified node to the root is reconstructed.
//!
//! # Examples
//!
//! ## `PersistentTreeMap`
//!
//! ```rust
//! use sylva::persistent::PersistentTreeMap;
//!
//! let map = PersistentTreeMap::new()
//!     .insert(3, "three")
//!     .insert(1, "one")
//!     .insert(2, "two");
//!
//! // Entries are always in sorted key order
//! let keys: Vec<&i32> = map.keys().collect();
//! assert_eq!(keys, vec![&1, &2, &3]);
//!
//! // Structural sharing: the original map is preserved
//! let updated = map.insert(1, "ONE");
//! assert_eq!(map.get(&1), Some(&"one"));     // Original unchanged
//! assert_eq!(updated.get(&1), Some(&"ONE")); // New version
//! ```
//!
//! ## `PersistentTreeSet`
//!
//! ```rust
//! use sylva::persistent::PersistentTreeSet;
//!
//! let set = PersistentTreeSet::new().insert(2).insert(1).insert(3);
//! assert!(set.contains(&1));
//!
//! let smaller = set.remove(&2);
//! assert_eq!(set.len(), 3);     // Original unchanged
//! assert_eq!(smaller.len(), 2); // New version
//! ```
//!
//! ## `PersistentTrie`
//!
//! ```rust
//! use sylva::persistent::PersistentTrie;
//!
//! let trie = PersistentTrie::new().put("ab".chars(), "Foo");
//! assert_eq!(trie.get("ab".chars()), Some(&"Foo"));
//! assert!(!trie.contains("a".chars()));
//! ```

// =============================================================================
// Reference Counter Type Alias
// =============================================================================

/// Reference-counted smart pointer type.
///
/// When the `arc` feature is enabled, this is `std::sync::Arc`,
/// which is thread-safe but has slightly higher overhead.
///
/// When the `arc` feature is disabled (default), this is `std::rc::Rc`,
/// which is faster but not thread-safe.
#[cfg(feature = "arc")]
pub(crate) type ReferenceCounter<T> = std::sync::Arc<T>;

#[cfg(not(feature = "arc"))]
pub(crate) type ReferenceCounter<T> = std::rc::Rc<T>;

mod ordering;
mod tree;
mod tree_set;
mod trie;

pub use ordering::Comparator;
pub use ordering::ComparatorFn;
pub use ordering::NaturalOrder;
pub use ordering::ReverseOrder;
pub use tree::BalancedTree;
pub use tree::Link;
pub use tree::PersistentTreeMap;
pub use tree::PersistentTreeMapIntoIterator;
pub use tree::PersistentTreeMapIterator;
pub use tree::TreeFactory;
pub use tree::TreeNode;
pub use tree::UnbalancedTree;
pub use tree_set::PersistentTreeSet;
pub use tree_set::PersistentTreeSetIntoIterator;
pub use tree_set::PersistentTreeSetIterator;
pub use trie::PersistentTrie;

// =============================================================================
// Tests
// =============================================================================
