//! [`HashMap`] is a lock-striped concurrent hash map.

use super::maybe_std::{AtomicUsize, Mutex};
use super::shard::{empty_buckets, redistribute, shard_index, Shard, ShardLocks};
use super::{Equivalent, KeyNotFound};
use std::collections::hash_map::RandomState;
use std::fmt::{self, Debug};
use std::hash::{BuildHasher, Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::thread::available_parallelism;

/// The number of buckets per shard of a newly created or cleared [`HashMap`].
pub const DEFAULT_BUCKETS: usize = 29;

/// The collision chain length that triggers a resize.
pub const COLLISION_THRESHOLD: usize = 25;

/// Lock-striped concurrent hash map.
///
/// [`HashMap`] partitions the keyspace into a fixed number of shards, each guarded by its own
/// mutex. A shard holds an array of buckets, and each bucket is a collision chain of key-value
/// pairs. All the shards have the same number of buckets.
///
/// ## The key features of [`HashMap`]
///
/// * Sharded: a key belongs to shard `hash % shards` and bucket `hash % buckets`.
/// * Unique keys: inserting an existing key is rejected and never overwrites the stored value.
/// * Automatic growth: a chain reaching [`COLLISION_THRESHOLD`] entries triples the capacity.
/// * Value semantics: lookups return copies or closure results, never references into storage.
///
/// ## Locking behavior
///
/// ### Entry access
///
/// Every read and write access, including pure lookups, takes the exclusive lock of the shard
/// owning the key. Operations on keys in different shards never contend.
///
/// ### Resize
///
/// Resizing stops the world: the resizing thread acquires every shard lock in ascending index
/// order, rebuilds the bucket table with three times the buckets, and releases the locks in
/// descending order. Operations issued in the meantime block until the resize is complete, and
/// no operation can observe a partially relocated table. [`HashMap::clear`] follows the same
/// locking protocol.
///
/// ## Unwind safety
///
/// Every key is hashed before any entry is relocated, therefore a resize interrupted by a
/// panicking `H::Hasher` leaves the [`HashMap`] unchanged and fully usable. `K::eq`, `K::drop`,
/// and `V::drop` must not panic.
pub struct HashMap<K, V, H = RandomState>
where
    H: BuildHasher,
{
    shards: Box<[Mutex<Shard<K, V>>]>,
    num_buckets: AtomicUsize,
    len: AtomicUsize,
    build_hasher: H,
}

impl<K, V, H> HashMap<K, V, H>
where
    H: BuildHasher,
{
    /// Creates an empty [`HashMap`] with the given [`BuildHasher`].
    ///
    /// The number of shards equals the available parallelism of the host.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let hashmap: HashMap<u64, u32, RandomState> = HashMap::with_hasher(RandomState::new());
    /// assert_eq!(hashmap.bucket_count(), 29);
    /// ```
    #[inline]
    pub fn with_hasher(build_hasher: H) -> Self {
        Self::with_capacity_concurrency_and_hasher(0, usize::MAX, build_hasher)
    }

    /// Creates an empty [`HashMap`] pre-sized for `capacity` entries with the given
    /// [`BuildHasher`].
    ///
    /// # Panics
    ///
    /// Panics if memory allocation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let hashmap: HashMap<u64, u32, RandomState> =
    ///     HashMap::with_capacity_and_hasher(1 << 16, RandomState::new());
    ///
    /// assert!(hashmap.capacity() >= 1 << 16);
    /// ```
    #[inline]
    pub fn with_capacity_and_hasher(capacity: usize, build_hasher: H) -> Self {
        Self::with_capacity_concurrency_and_hasher(capacity, usize::MAX, build_hasher)
    }

    /// Creates an empty [`HashMap`] pre-sized for `capacity` entries, with at most `concurrency`
    /// shards, and with the given [`BuildHasher`].
    ///
    /// The number of shards is the available parallelism of the host clamped to `concurrency`,
    /// and never less than one. Each shard is given enough buckets for its share of `capacity`,
    /// but never fewer than [`DEFAULT_BUCKETS`].
    ///
    /// # Panics
    ///
    /// Panics if memory allocation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let hashmap: HashMap<u64, u32, RandomState> =
    ///     HashMap::with_capacity_concurrency_and_hasher(1000, 1, RandomState::new());
    ///
    /// assert_eq!(hashmap.shard_count(), 1);
    /// assert_eq!(hashmap.bucket_count(), 1000);
    /// ```
    #[inline]
    pub fn with_capacity_concurrency_and_hasher(
        capacity: usize,
        concurrency: usize,
        build_hasher: H,
    ) -> Self {
        let num_shards = num_shards(concurrency);
        let num_buckets = initial_num_buckets(capacity, num_shards);
        Self {
            shards: (0..num_shards)
                .map(|_| Mutex::new(Shard::new(num_buckets)))
                .collect(),
            num_buckets: AtomicUsize::new(num_buckets),
            len: AtomicUsize::new(0),
            build_hasher,
        }
    }

    /// Returns a reference to the [`BuildHasher`].
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    /// use std::collections::hash_map::RandomState;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    /// let _: &RandomState = hashmap.hasher();
    /// ```
    #[inline]
    pub fn hasher(&self) -> &H {
        &self.build_hasher
    }

    /// Returns the number of entries in the [`HashMap`].
    ///
    /// The counter is read without acquiring any lock, therefore the result is a snapshot that
    /// may not reflect operations in flight on other threads.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    ///
    /// assert!(hashmap.insert(1, 0).is_ok());
    /// assert_eq!(hashmap.len(), 1);
    /// ```
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Relaxed)
    }

    /// Returns `true` if the [`HashMap`] is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    ///
    /// assert!(hashmap.is_empty());
    /// assert!(hashmap.insert(1, 0).is_ok());
    /// assert!(!hashmap.is_empty());
    /// ```
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of shards, fixed at construction.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::with_capacity_and_concurrency(0, 1);
    /// assert_eq!(hashmap.shard_count(), 1);
    /// ```
    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Returns the number of buckets per shard.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    /// assert_eq!(hashmap.bucket_count(), 29);
    /// ```
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.num_buckets.load(Acquire)
    }

    /// Returns the total number of buckets across every shard.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::with_capacity_and_concurrency(0, 2);
    /// assert_eq!(hashmap.capacity(), hashmap.shard_count() * 29);
    /// ```
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shard_count() * self.bucket_count()
    }

    /// Clears the [`HashMap`] by removing all key-value pairs.
    ///
    /// Every shard is reset to [`DEFAULT_BUCKETS`] buckets. The removed entries are dropped after
    /// all the shard locks are released.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    ///
    /// assert!(hashmap.insert(1, 0).is_ok());
    /// hashmap.clear();
    ///
    /// assert!(hashmap.is_empty());
    /// assert!(!hashmap.contains(&1));
    /// ```
    #[inline]
    pub fn clear(&self) {
        let mut locks = ShardLocks::lock_all(&self.shards);
        let num_shards = self.shards.len();
        let removed = locks.take_all();
        locks.install(
            (0..num_shards)
                .map(|_| empty_buckets(DEFAULT_BUCKETS))
                .collect(),
        );
        self.num_buckets.store(DEFAULT_BUCKETS, Release);
        self.len.store(0, Relaxed);
        drop(locks);
        drop(removed);
    }
}

impl<K, V, H> HashMap<K, V, H>
where
    K: Eq + Hash,
    H: BuildHasher,
{
    /// Inserts a key-value pair into the [`HashMap`].
    ///
    /// If the insertion makes its collision chain reach [`COLLISION_THRESHOLD`] entries, the
    /// [`HashMap`] is resized before the method returns.
    ///
    /// # Errors
    ///
    /// Returns an error along with the supplied key-value pair if the key exists; the stored
    /// value is left untouched.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    ///
    /// assert!(hashmap.insert(1, 0).is_ok());
    /// assert_eq!(hashmap.insert(1, 1).unwrap_err(), (1, 1));
    /// assert_eq!(hashmap.get(&1), Some(0));
    /// ```
    #[inline]
    pub fn insert(&self, key: K, val: V) -> Result<(), (K, V)> {
        let hash = self.hash(&key);
        let mut shard = self.shard(hash).lock();
        let chain_len = shard.insert(key, val, hash)?;
        self.len.fetch_add(1, Relaxed);
        if chain_len < COLLISION_THRESHOLD {
            return Ok(());
        }
        let observed_num_buckets = shard.num_buckets();
        drop(shard);
        self.resize(observed_num_buckets);
        Ok(())
    }

    /// Removes a key-value pair if the key exists.
    ///
    /// Returns `None` if the key does not exist.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    ///
    /// assert!(hashmap.remove(&1).is_none());
    /// assert!(hashmap.insert(1, 0).is_ok());
    /// assert_eq!(hashmap.remove(&1).unwrap(), (1, 0));
    /// ```
    #[inline]
    pub fn remove<Q>(&self, key: &Q) -> Option<(K, V)>
    where
        Q: Equivalent<K> + Hash + ?Sized,
    {
        let hash = self.hash(key);
        let removed = self.shard(hash).lock().remove(key, hash);
        if removed.is_some() {
            self.len.fetch_sub(1, Relaxed);
        }
        removed
    }

    /// Erases the key-value pair associated with the key.
    ///
    /// Returns `true` if the key existed.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    ///
    /// assert!(!hashmap.erase(&1));
    /// assert!(hashmap.insert(1, 0).is_ok());
    /// assert!(hashmap.erase(&1));
    /// assert_eq!(hashmap.len(), 0);
    /// ```
    #[inline]
    pub fn erase<Q>(&self, key: &Q) -> bool
    where
        Q: Equivalent<K> + Hash + ?Sized,
    {
        self.remove(key).is_some()
    }

    /// Reads a key-value pair.
    ///
    /// The reader is invoked while the shard lock is held; it must not access the [`HashMap`].
    /// Returns `None` if the key does not exist.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    ///
    /// assert!(hashmap.read(&1, |_, v| *v).is_none());
    /// assert!(hashmap.insert(1, 10).is_ok());
    /// assert_eq!(hashmap.read(&1, |_, v| *v).unwrap(), 10);
    /// ```
    #[inline]
    pub fn read<Q, R, F: FnOnce(&K, &V) -> R>(&self, key: &Q, reader: F) -> Option<R>
    where
        Q: Equivalent<K> + Hash + ?Sized,
    {
        let hash = self.hash(key);
        let shard = self.shard(hash).lock();
        shard.search(key, hash).map(|(k, v)| reader(k, v))
    }

    /// Returns `true` if the [`HashMap`] contains a value for the specified key.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    ///
    /// assert!(!hashmap.contains(&1));
    /// assert!(hashmap.insert(1, 0).is_ok());
    /// assert!(hashmap.contains(&1));
    /// ```
    #[inline]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Equivalent<K> + Hash + ?Sized,
    {
        self.read(key, |_, _| ()).is_some()
    }

    /// Returns a copy of the value associated with the key.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, String> = HashMap::default();
    ///
    /// assert!(hashmap.get(&1).is_none());
    /// assert!(hashmap.insert(1, "one".to_owned()).is_ok());
    /// assert_eq!(hashmap.get(&1).as_deref(), Some("one"));
    /// ```
    #[inline]
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Equivalent<K> + Hash + ?Sized,
        V: Clone,
    {
        self.read(key, |_, v| v.clone())
    }

    /// Finds the value associated with the key.
    ///
    /// Returns `(true, value)` if the key exists, otherwise `(false, V::default())`.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    ///
    /// assert!(hashmap.insert(1, 7).is_ok());
    /// assert_eq!(hashmap.find(&1), (true, 7));
    /// assert_eq!(hashmap.find(&2), (false, 0));
    /// ```
    #[inline]
    pub fn find<Q>(&self, key: &Q) -> (bool, V)
    where
        Q: Equivalent<K> + Hash + ?Sized,
        V: Clone + Default,
    {
        self.get(key)
            .map_or_else(|| (false, V::default()), |v| (true, v))
    }

    /// Returns a copy of the value associated with the key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyNotFound`] if the key does not exist.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::{HashMap, KeyNotFound};
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    ///
    /// assert_eq!(hashmap.at(&1), Err(KeyNotFound));
    /// assert!(hashmap.insert(1, 7).is_ok());
    /// assert_eq!(hashmap.at(&1), Ok(7));
    /// ```
    #[inline]
    pub fn at<Q>(&self, key: &Q) -> Result<V, KeyNotFound>
    where
        Q: Equivalent<K> + Hash + ?Sized,
        V: Clone,
    {
        self.get(key).ok_or(KeyNotFound)
    }

    /// Returns the hash value of the key.
    #[inline]
    fn hash<Q>(&self, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        let mut h = self.build_hasher.build_hasher();
        key.hash(&mut h);
        h.finish()
    }

    /// Returns the shard owning the hash value.
    #[inline]
    fn shard(&self, hash: u64) -> &Mutex<Shard<K, V>> {
        &self.shards[shard_index(hash, self.shards.len())]
    }

    /// Triples the number of buckets and relocates every entry.
    ///
    /// Nothing is done if the number of buckets has changed since `observed_num_buckets` was
    /// read, as another thread has already resized or cleared the [`HashMap`].
    fn resize(&self, observed_num_buckets: usize) {
        let mut locks = ShardLocks::lock_all(&self.shards);
        let num_buckets = locks.num_buckets();
        if num_buckets != observed_num_buckets {
            return;
        }
        let num_shards = self.shards.len();
        let new_num_buckets = grown_num_buckets(num_buckets, num_shards);
        let hashes = locks.hashes(|k| self.hash(k));
        let old = locks.take_all();
        let table = redistribute(old, &hashes, num_shards, new_num_buckets);
        locks.install(table);
        self.num_buckets.store(new_num_buckets, Release);
    }
}

impl<K, V> HashMap<K, V, RandomState> {
    /// Creates an empty default [`HashMap`].
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::new();
    ///
    /// assert!(hashmap.is_empty());
    /// assert!(hashmap.shard_count() >= 1);
    /// ```
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty [`HashMap`] pre-sized for `capacity` entries.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::with_capacity(1 << 16);
    /// assert!(hashmap.capacity() >= 1 << 16);
    /// ```
    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }

    /// Creates an empty [`HashMap`] pre-sized for `capacity` entries with at most `concurrency`
    /// shards.
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::with_capacity_and_concurrency(64, 1);
    ///
    /// assert_eq!(hashmap.shard_count(), 1);
    /// assert_eq!(hashmap.bucket_count(), 64);
    /// ```
    #[inline]
    #[must_use]
    pub fn with_capacity_and_concurrency(capacity: usize, concurrency: usize) -> Self {
        Self::with_capacity_concurrency_and_hasher(capacity, concurrency, RandomState::new())
    }
}

impl<K, V, H> Clone for HashMap<K, V, H>
where
    K: Clone,
    V: Clone,
    H: BuildHasher + Clone,
{
    /// Clones the [`HashMap`] while every shard of it is locked.
    #[inline]
    fn clone(&self) -> Self {
        let locks = ShardLocks::lock_all(&self.shards);
        Self {
            shards: locks
                .iter()
                .map(|shard| Mutex::new(Shard::clone(shard)))
                .collect(),
            num_buckets: AtomicUsize::new(locks.num_buckets()),
            len: AtomicUsize::new(self.len.load(Relaxed)),
            build_hasher: self.build_hasher.clone(),
        }
    }
}

impl<K, V, H> Debug for HashMap<K, V, H>
where
    K: Debug,
    V: Debug,
    H: BuildHasher,
{
    /// Prints all the entries in the [`HashMap`].
    ///
    /// ## Locking behavior
    ///
    /// Every shard is locked while the entries are printed.
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let locks = ShardLocks::lock_all(&self.shards);
        let mut d = f.debug_map();
        for shard in locks.iter() {
            for (k, v) in shard.entries() {
                d.entry(k, v);
            }
        }
        d.finish()
    }
}

impl<K, V, H> Default for HashMap<K, V, H>
where
    H: BuildHasher + Default,
{
    /// Creates an empty default [`HashMap`].
    ///
    /// # Examples
    ///
    /// ```
    /// use striped_map::HashMap;
    ///
    /// let hashmap: HashMap<u64, u32> = HashMap::default();
    ///
    /// assert_eq!(hashmap.bucket_count(), 29);
    /// ```
    #[inline]
    fn default() -> Self {
        Self::with_hasher(H::default())
    }
}

impl<K, V, H> FromIterator<(K, V)> for HashMap<K, V, H>
where
    K: Eq + Hash,
    H: BuildHasher + Default,
{
    /// Collects key-value pairs; the first value of a duplicated key is kept.
    #[inline]
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let into_iter = iter.into_iter();
        let hashmap = Self::with_capacity_and_hasher(into_iter.size_hint().0, H::default());
        into_iter.for_each(|(k, v)| {
            let _result = hashmap.insert(k, v);
        });
        hashmap
    }
}

/// Returns the number of shards for the concurrency hint.
fn num_shards(concurrency: usize) -> usize {
    available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(concurrency)
        .max(1)
}

/// Returns the number of buckets per shard required to hold `capacity` entries.
fn initial_num_buckets(capacity: usize, num_shards: usize) -> usize {
    let per_shard = capacity / num_shards + usize::from(capacity % num_shards != 0);
    per_shard.max(DEFAULT_BUCKETS)
}

/// Returns the number of buckets per shard after a resize.
///
/// The aggregate number of buckets is tripled, then divided evenly across the shards.
fn grown_num_buckets(num_buckets: usize, num_shards: usize) -> usize {
    let total = num_buckets.saturating_mul(num_shards).saturating_mul(3);
    total / num_shards + usize::from(total % num_shards != 0)
}

#[cfg(all(test, not(feature = "loom")))]
mod test {
    use super::*;

    #[test]
    fn sizing_policy() {
        assert_eq!(initial_num_buckets(0, 8), DEFAULT_BUCKETS);
        assert_eq!(initial_num_buckets(29 * 8, 8), DEFAULT_BUCKETS);
        assert_eq!(initial_num_buckets(1000, 8), 125);
        assert_eq!(initial_num_buckets(1001, 8), 126);
        assert_eq!(initial_num_buckets(usize::MAX, 1), usize::MAX);

        assert_eq!(grown_num_buckets(29, 1), 87);
        assert_eq!(grown_num_buckets(29, 7), 87);
        assert_eq!(grown_num_buckets(87, 16), 261);

        assert_eq!(num_shards(0), 1);
        assert_eq!(num_shards(1), 1);
        assert!(num_shards(usize::MAX) >= 1);
        assert!(num_shards(4) <= 4);
    }

    #[test]
    fn resize_skipped_on_stale_bucket_count() {
        let hashmap: HashMap<u64, u64> =
            HashMap::with_capacity_concurrency_and_hasher(0, 2, RandomState::new());
        for k in 0..64 {
            assert!(hashmap.insert(k, k).is_ok());
        }
        let num_buckets = hashmap.bucket_count();

        hashmap.resize(num_buckets + 1);
        assert_eq!(hashmap.bucket_count(), num_buckets);

        hashmap.resize(num_buckets);
        let grown = grown_num_buckets(num_buckets, hashmap.shard_count());
        assert_eq!(hashmap.bucket_count(), grown);

        // A second thread that observed the old count arrives late.
        hashmap.resize(num_buckets);
        assert_eq!(hashmap.bucket_count(), grown);

        assert_eq!(hashmap.len(), 64);
        for k in 0..64 {
            assert_eq!(hashmap.find(&k), (true, k));
        }
    }
}
