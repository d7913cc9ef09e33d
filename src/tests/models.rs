use std::hash::{BuildHasherDefault, Hasher};
use std::sync::{Arc, Mutex};

use loom::model::Builder;
use loom::thread::spawn;

use crate::{HashMap, COLLISION_THRESHOLD, DEFAULT_BUCKETS};

#[derive(Default)]
struct ConstantHasher;
impl Hasher for ConstantHasher {
    fn finish(&self) -> u64 {
        0
    }
    fn write(&mut self, _bytes: &[u8]) {}
}
type ConstantState = BuildHasherDefault<ConstantHasher>;

static SERIALIZER: Mutex<()> = Mutex::new(());

// Checks that an insert racing a resize is neither lost nor duplicated.
#[test]
fn hashmap_insert_during_resize() {
    let _guard = SERIALIZER.lock().unwrap();

    let mut model_builder = Builder::new();
    model_builder.max_threads = 2;
    model_builder.preemption_bound = Some(2);
    model_builder.check(|| {
        let hashmap: Arc<HashMap<usize, usize, ConstantState>> = Arc::new(
            HashMap::with_capacity_concurrency_and_hasher(0, 2, ConstantState::default()),
        );
        for k in 0..COLLISION_THRESHOLD - 1 {
            assert!(hashmap.insert(k, k).is_ok());
        }
        let hashmap_clone = hashmap.clone();
        let thread_insert = spawn(move || {
            assert!(hashmap_clone.insert(usize::MAX, 0).is_ok());
            assert_eq!(hashmap_clone.find(&0), (true, 0));
        });
        assert!(hashmap.insert(usize::MAX - 1, 1).is_ok());
        assert!(thread_insert.join().is_ok());

        for k in 0..COLLISION_THRESHOLD - 1 {
            assert_eq!(hashmap.find(&k), (true, k));
        }
        assert_eq!(hashmap.find(&usize::MAX), (true, 0));
        assert_eq!(hashmap.find(&(usize::MAX - 1)), (true, 1));
        assert_eq!(hashmap.len(), COLLISION_THRESHOLD + 1);
        assert!(hashmap.bucket_count() > DEFAULT_BUCKETS);
    });
}

// Checks that the entry count stays consistent when a clear races an insert.
#[test]
fn hashmap_clear_during_insert() {
    let _guard = SERIALIZER.lock().unwrap();

    let mut model_builder = Builder::new();
    model_builder.max_threads = 2;
    model_builder.check(|| {
        let hashmap: Arc<HashMap<usize, usize>> =
            Arc::new(HashMap::with_capacity_and_concurrency(0, 2));
        assert!(hashmap.insert(1, 1).is_ok());
        let hashmap_clone = hashmap.clone();
        let thread_insert = spawn(move || {
            assert!(hashmap_clone.insert(2, 2).is_ok());
        });
        hashmap.clear();
        assert!(thread_insert.join().is_ok());

        assert!(!hashmap.contains(&1));
        let present = usize::from(hashmap.contains(&2));
        assert_eq!(hashmap.len(), present);
        assert_eq!(hashmap.bucket_count(), DEFAULT_BUCKETS);
    });
}
