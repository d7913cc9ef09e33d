#![warn(missing_docs, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Lock-striped concurrent hash map.
//!
//! # [`HashMap`]
//!
//! A concurrent hash map that partitions its keyspace across a fixed number of
//! independently-locked shards. Point operations lock a single shard; growth freezes every
//! shard, rebuilds the bucket table, and resumes.
//!
//! ```
//! use striped_map::HashMap;
//!
//! let hashmap: HashMap<u64, u64> = HashMap::new();
//!
//! assert!(hashmap.insert(1, 10).is_ok());
//! assert_eq!(hashmap.insert(1, 11), Err((1, 11)));
//! assert_eq!(hashmap.find(&1), (true, 10));
//! assert!(hashmap.erase(&1));
//! assert_eq!(hashmap.find(&1), (false, 0));
//! assert!(hashmap.at(&1).is_err());
//! ```

#[cfg(not(feature = "equivalent"))]
mod equivalent;
#[cfg(not(feature = "equivalent"))]
pub use equivalent::Equivalent;
#[cfg(feature = "equivalent")]
pub use equivalent::Equivalent;

mod error;
pub use error::KeyNotFound;

pub mod hash_map;
pub use hash_map::{HashMap, COLLISION_THRESHOLD, DEFAULT_BUCKETS};

mod maybe_std;
mod shard;
