//! Synchronization primitives, swapped for [`loom`] equivalents under the `loom` feature.

#[cfg(not(feature = "loom"))]
pub(crate) use parking_lot::{Mutex, MutexGuard};
#[cfg(not(feature = "loom"))]
pub(crate) use std::sync::atomic::AtomicUsize;

#[cfg(feature = "loom")]
pub(crate) use loom::sync::atomic::AtomicUsize;
#[cfg(feature = "loom")]
pub(crate) use loom_mutex::{Mutex, MutexGuard};

#[cfg(feature = "loom")]
mod loom_mutex {
    use std::sync::PoisonError;

    /// `loom` mutex exposing the non-poisoning `lock` signature of [`parking_lot::Mutex`].
    pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

    pub(crate) type MutexGuard<'m, T> = loom::sync::MutexGuard<'m, T>;

    impl<T> Mutex<T> {
        pub(crate) fn new(data: T) -> Self {
            Self(loom::sync::Mutex::new(data))
        }

        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            self.0.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}
