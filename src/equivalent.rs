//! Vendored [`equivalent`](https://crates.io/crates/equivalent) trait; enable the
//! `equivalent` feature to use the crate's definition instead.

use std::borrow::Borrow;

/// Key equivalence trait used by lookup and removal methods.
///
/// It lets a borrowed form of the key, e.g. `&str` for `String` keys, address an entry.
pub trait Equivalent<K: ?Sized> {
    /// Compares `self` to `key` and returns `true` if they are equal.
    fn equivalent(&self, key: &K) -> bool;
}

impl<Q: ?Sized, K: ?Sized> Equivalent<K> for Q
where
    Q: Eq,
    K: Borrow<Q>,
{
    #[inline]
    fn equivalent(&self, key: &K) -> bool {
        PartialEq::eq(self, key.borrow())
    }
}
