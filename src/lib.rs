//! # sylva
//!
//! Persistent ordered collections for Rust: structurally shared tree maps,
//! sets, and tries.
//!
//! ## Overview
//!
//! This library is built around a single persistent binary-search-tree
//! engine. Every mutating operation (insert, remove, filter, join) returns a
//! *new* tree that shares unmodified subtrees with the original instead of
//! mutating in place, so old versions stay valid and cheap to keep:
//!
//! - [`persistent::PersistentTreeMap`]: persistent ordered map (the engine)
//! - [`persistent::PersistentTreeSet`]: persistent ordered set
//! - [`persistent::PersistentTrie`]: persistent trie keyed by path segments
//!
//! The tree's construction strategy is pluggable: generic algorithms are
//! written once and build nodes through a [`persistent::TreeFactory`], so a
//! plain BST and a weight-balanced tree share one algorithm set.
//!
//! ## Feature Flags
//!
//! - `arc`: use `Arc` instead of `Rc` for structural sharing, making the
//!   collections `Send + Sync` when their contents are
//! - `serde`: `Serialize`/`Deserialize` for the map and set
//!
//! ## Example
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
//! assert_eq!(map.get(&1), Some(&"one"));
//! assert_eq!(updated.get(&1), Some(&"ONE"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// Note: Disabling redundant_closure_for_method_calls due to clippy 0.1.92 panic bug
#![allow(clippy::redundant_closure_for_method_calls)]

/// Prelude module for convenient imports.
///
/// Re-exports commonly used types and traits.
///
/// # Usage
///
/// ```rust
/// use sylva::prelude::*;
/// ```
pub mod prelude {
    pub use crate::persistent::*;
}

pub mod persistent;
