//! Key ordering for the persistent tree collections.
//!
//! Every tree carries the ordering function it was constructed with and
//! propagates it unchanged into every derived tree. [`NaturalOrder`] is the
//! default and delegates to `Ord`, so the common case costs nothing; custom
//! orders are supplied via [`PersistentTreeMap::with_comparator`].
//!
//! [`PersistentTreeMap::with_comparator`]: super::PersistentTreeMap::with_comparator
//!
//! # Examples
//!
//! ```rust
//! use sylva::persistent::{NaturalOrder, PersistentTreeMap, ReverseOrder};
//!
//! let map = PersistentTreeMap::with_comparator(ReverseOrder::<NaturalOrder>::default())
//!     .insert(1, "one")
//!     .insert(3, "three")
//!     .insert(2, "two");
//!
//! let keys: Vec<&i32> = map.keys().collect();
//! assert_eq!(keys, vec![&3, &2, &1]);
//! ```

use std::cmp::Ordering;

// =============================================================================
// Comparator Trait
// =============================================================================

/// A total ordering over keys of type `K`.
///
/// Implementors must be consistent: for any `a`, `b`, `c`, the order must be
/// antisymmetric and transitive, exactly as `Ord` requires. The tree's order
/// invariant is stated relative to the comparator it was built with, so an
/// inconsistent comparator produces a tree whose lookups silently miss.
pub trait Comparator<K: ?Sized> {
    /// Compares two keys, returning their relative order.
    fn compare(&self, left: &K, right: &K) -> Ordering;
}

// =============================================================================
// Natural Order
// =============================================================================

/// Orders keys by their `Ord` implementation.
///
/// This is the default comparator of every collection in this module.
///
/// # Examples
///
/// ```rust
/// use sylva::persistent::{Comparator, NaturalOrder};
///
/// assert_eq!(NaturalOrder.compare(&1, &2), std::cmp::Ordering::Less);
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct NaturalOrder;

impl<K: Ord + ?Sized> Comparator<K> for NaturalOrder {
    #[inline]
    fn compare(&self, left: &K, right: &K) -> Ordering {
        left.cmp(right)
    }
}

// =============================================================================
// Reverse Order
// =============================================================================

/// Reverses the order of another comparator.
///
/// # Examples
///
/// ```rust
/// use sylva::persistent::{Comparator, NaturalOrder, ReverseOrder};
///
/// let reversed = ReverseOrder::<NaturalOrder>::default();
/// assert_eq!(reversed.compare(&1, &2), std::cmp::Ordering::Greater);
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct ReverseOrder<C = NaturalOrder>(C);

impl<C> ReverseOrder<C> {
    /// Wraps a comparator, reversing its order.
    #[inline]
    pub const fn new(inner: C) -> Self {
        Self(inner)
    }
}

impl<K: ?Sized, C: Comparator<K>> Comparator<K> for ReverseOrder<C> {
    #[inline]
    fn compare(&self, left: &K, right: &K) -> Ordering {
        self.0.compare(left, right).reverse()
    }
}

// =============================================================================
// Closure Adapter
// =============================================================================

/// Adapts a comparison closure into a [`Comparator`].
///
/// # Examples
///
/// ```rust
/// use sylva::persistent::{Comparator, ComparatorFn};
///
/// let by_length = ComparatorFn::new(|a: &&str, b: &&str| a.len().cmp(&b.len()));
/// assert_eq!(by_length.compare(&"ab", &"c"), std::cmp::Ordering::Greater);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct ComparatorFn<F>(F);

impl<F> ComparatorFn<F> {
    /// Wraps a comparison closure.
    #[inline]
    pub const fn new(function: F) -> Self {
        Self(function)
    }
}

impl<K: ?Sized, F> Comparator<K> for ComparatorFn<F>
where
    F: Fn(&K, &K) -> Ordering,
{
    #[inline]
    fn compare(&self, left: &K, right: &K) -> Ordering {
        (self.0)(left, right)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 2, Ordering::Less)]
    #[case(2, 2, Ordering::Equal)]
    #[case(3, 2, Ordering::Greater)]
    fn test_natural_order(#[case] left: i32, #[case] right: i32, #[case] expected: Ordering) {
        assert_eq!(NaturalOrder.compare(&left, &right), expected);
    }

    #[rstest]
    #[case(1, 2, Ordering::Greater)]
    #[case(2, 2, Ordering::Equal)]
    #[case(3, 2, Ordering::Less)]
    fn test_reverse_order(#[case] left: i32, #[case] right: i32, #[case] expected: Ordering) {
        let reversed: ReverseOrder = ReverseOrder::default();
        assert_eq!(reversed.compare(&left, &right), expected);
    }

    #[rstest]
    fn test_reverse_of_reverse_is_natural() {
        let twice = ReverseOrder::new(ReverseOrder::new(NaturalOrder));
        assert_eq!(twice.compare(&1, &2), Ordering::Less);
    }

    #[rstest]
    fn test_comparator_fn() {
        let by_length = ComparatorFn::new(|a: &&str, b: &&str| a.len().cmp(&b.len()));
        assert_eq!(by_length.compare(&"ab", &"c"), Ordering::Greater);
        assert_eq!(by_length.compare(&"a", &"bc"), Ordering::Less);
        assert_eq!(by_length.compare(&"xy", &"zw"), Ordering::Equal);
    }

    #[rstest]
    fn test_natural_order_on_borrowed_str() {
        assert_eq!(NaturalOrder.compare("abc", "abd"), Ordering::Less);
    }
}
