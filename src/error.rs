use std::error::Error;
use std::fmt;

/// [`KeyNotFound`] is returned by [`HashMap::at`](crate::HashMap::at) when the key is absent.
///
/// Every other lookup reports absence through its return value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct KeyNotFound;

impl fmt::Display for KeyNotFound {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("key not found")
    }
}

impl Error for KeyNotFound {}
