//! Per-shard bucket storage and the ordered lock over every shard.

use super::maybe_std::{Mutex, MutexGuard};
use super::Equivalent;
use std::mem::take;
use std::slice::Iter;

/// A collision chain: every entry whose hash maps to the same bucket of a shard.
pub(crate) type Bucket<K, V> = Vec<(K, V)>;

/// [`Shard`] owns the buckets of one stripe of the keyspace.
///
/// The bucket index of a key is always derived from the bucket table the shard currently
/// holds, so a caller holding the shard lock can never address a stale geometry.
#[derive(Clone)]
pub(crate) struct Shard<K, V> {
    buckets: Vec<Bucket<K, V>>,
}

impl<K, V> Shard<K, V> {
    /// Creates a [`Shard`] with `num_buckets` empty buckets.
    #[inline]
    pub(crate) fn new(num_buckets: usize) -> Self {
        Self {
            buckets: empty_buckets(num_buckets),
        }
    }

    /// Returns the number of buckets.
    #[inline]
    pub(crate) fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Searches the bucket associated with `hash` for the key.
    #[inline]
    pub(crate) fn search<Q>(&self, key: &Q, hash: u64) -> Option<&(K, V)>
    where
        Q: Equivalent<K> + ?Sized,
    {
        self.buckets[bucket_index(hash, self.buckets.len())]
            .iter()
            .find(|(k, _)| key.equivalent(k))
    }

    /// Appends the entry unless the key already exists.
    ///
    /// Returns the length of the chain the entry was appended to, or hands the entry back.
    #[inline]
    pub(crate) fn insert(&mut self, key: K, val: V, hash: u64) -> Result<usize, (K, V)>
    where
        K: Eq,
    {
        let index = bucket_index(hash, self.buckets.len());
        let bucket = &mut self.buckets[index];
        if bucket.iter().any(|(k, _)| *k == key) {
            return Err((key, val));
        }
        bucket.push((key, val));
        Ok(bucket.len())
    }

    /// Removes the entry by swapping it with the last one in its chain.
    #[inline]
    pub(crate) fn remove<Q>(&mut self, key: &Q, hash: u64) -> Option<(K, V)>
    where
        Q: Equivalent<K> + ?Sized,
    {
        let index = bucket_index(hash, self.buckets.len());
        let bucket = &mut self.buckets[index];
        let position = bucket.iter().position(|(k, _)| key.equivalent(k))?;
        Some(bucket.swap_remove(position))
    }

    /// Returns an iterator over every entry in the shard.
    pub(crate) fn entries(&self) -> impl Iterator<Item = &(K, V)> {
        self.buckets.iter().flatten()
    }

    /// Takes the bucket table, leaving the shard with no buckets.
    fn take_buckets(&mut self) -> Vec<Bucket<K, V>> {
        take(&mut self.buckets)
    }

    /// Installs a bucket table.
    fn set_buckets(&mut self, buckets: Vec<Bucket<K, V>>) {
        debug_assert!(!buckets.is_empty());
        self.buckets = buckets;
    }
}

/// [`ShardLocks`] holds the lock of every shard.
///
/// Locks are acquired in ascending shard index order and released in descending order when the
/// [`ShardLocks`] is dropped, including on unwinding. Every operation that needs more than one
/// shard lock must go through [`ShardLocks`]; per-key operations take a single lock.
pub(crate) struct ShardLocks<'m, K, V> {
    guards: Vec<MutexGuard<'m, Shard<K, V>>>,
}

impl<'m, K, V> ShardLocks<'m, K, V> {
    /// Locks every shard in ascending index order.
    pub(crate) fn lock_all(shards: &'m [Mutex<Shard<K, V>>]) -> Self {
        let mut guards = Vec::with_capacity(shards.len());
        for shard in shards {
            guards.push(shard.lock());
        }
        Self { guards }
    }

    /// Returns the number of buckets per shard.
    ///
    /// Every shard has the same number of buckets while all of them are locked.
    pub(crate) fn num_buckets(&self) -> usize {
        self.guards.first().map_or(0, |shard| shard.num_buckets())
    }

    /// Returns an iterator over the locked shards in index order.
    pub(crate) fn iter(&self) -> Iter<'_, MutexGuard<'m, Shard<K, V>>> {
        self.guards.iter()
    }

    /// Hashes every key in the same order [`ShardLocks::take_all`] yields the entries.
    ///
    /// No shard is modified, so a panicking `hash` leaves every bucket table intact.
    pub(crate) fn hashes<F>(&self, hash: F) -> Vec<u64>
    where
        F: Fn(&K) -> u64,
    {
        self.guards
            .iter()
            .flat_map(|shard| shard.entries())
            .map(|(k, _)| hash(k))
            .collect()
    }

    /// Moves the bucket tables of every shard out, shard by shard in index order.
    pub(crate) fn take_all(&mut self) -> Vec<Vec<Bucket<K, V>>> {
        self.guards
            .iter_mut()
            .map(|shard| shard.take_buckets())
            .collect()
    }

    /// Installs `table[i]` as the bucket table of shard `i`.
    pub(crate) fn install(&mut self, table: Vec<Vec<Bucket<K, V>>>) {
        debug_assert_eq!(table.len(), self.guards.len());
        for (shard, buckets) in self.guards.iter_mut().zip(table) {
            shard.set_buckets(buckets);
        }
    }
}

impl<K, V> Drop for ShardLocks<'_, K, V> {
    #[inline]
    fn drop(&mut self) {
        // `Vec` drops its elements front to back; release back to front instead.
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

/// Returns the shard index of a hash value.
#[allow(clippy::cast_possible_truncation)]
#[inline]
pub(crate) fn shard_index(hash: u64, num_shards: usize) -> usize {
    (hash % num_shards as u64) as usize
}

/// Returns the bucket index of a hash value.
#[allow(clippy::cast_possible_truncation)]
#[inline]
pub(crate) fn bucket_index(hash: u64, num_buckets: usize) -> usize {
    (hash % num_buckets as u64) as usize
}

/// Creates `num_buckets` empty buckets.
pub(crate) fn empty_buckets<K, V>(num_buckets: usize) -> Vec<Bucket<K, V>> {
    (0..num_buckets).map(|_| Vec::new()).collect()
}

/// Redistributes every entry of `old` into a new table of `num_shards` shards of `num_buckets`
/// buckets each.
///
/// `hashes[i]` is the hash of the `i`-th entry of `old` in shard, bucket, and chain order. The
/// entries are known to be unique, therefore no duplicate check is made.
pub(crate) fn redistribute<K, V>(
    old: Vec<Vec<Bucket<K, V>>>,
    hashes: &[u64],
    num_shards: usize,
    num_buckets: usize,
) -> Vec<Vec<Bucket<K, V>>> {
    let mut table: Vec<Vec<Bucket<K, V>>> = (0..num_shards)
        .map(|_| empty_buckets(num_buckets))
        .collect();
    for (entry, hash) in old.into_iter().flatten().flatten().zip(hashes) {
        table[shard_index(*hash, num_shards)][bucket_index(*hash, num_buckets)].push(entry);
    }
    table
}
