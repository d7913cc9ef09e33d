use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use striped_map::HashMap;

fn insert_cold(c: &mut Criterion) {
    c.bench_function("HashMap: insert, cold", |b| {
        b.iter_custom(|iters| {
            let hashmap: HashMap<u64, u64> = HashMap::default();
            let start = Instant::now();
            for i in 0..iters {
                assert!(hashmap.insert(i, i).is_ok());
            }
            start.elapsed()
        })
    });
}

fn insert_warmed_up(c: &mut Criterion) {
    c.bench_function("HashMap: insert, warmed up", |b| {
        b.iter_custom(|iters| {
            let hashmap: HashMap<u64, u64> = HashMap::with_capacity(iters as usize * 2);
            let start = Instant::now();
            for i in 0..iters {
                assert!(hashmap.insert(i, i).is_ok());
            }
            start.elapsed()
        })
    });
}

fn find(c: &mut Criterion) {
    c.bench_function("HashMap: find", |b| {
        b.iter_custom(|iters| {
            let hashmap: HashMap<u64, u64> = HashMap::with_capacity(iters as usize * 2);
            for i in 0..iters {
                assert!(hashmap.insert(i, i).is_ok());
            }
            let start = Instant::now();
            for i in 0..iters {
                assert_eq!(hashmap.find(&i), (true, i));
            }
            start.elapsed()
        })
    });
}

fn insert_tail_latency(c: &mut Criterion) {
    c.bench_function("HashMap: insert_tail_latency", move |b| {
        b.iter_custom(|iters| {
            let mut duration = Duration::default();
            for _ in 0..iters {
                let hashmap: HashMap<u64, u64> = HashMap::default();
                let mut key = 0;
                let mut max_duration = Duration::default();
                (0..262_144).for_each(|_| {
                    key += 1;
                    let start = Instant::now();
                    assert!(hashmap.insert(key, key).is_ok());
                    let elapsed = start.elapsed();
                    if elapsed > max_duration {
                        max_duration = elapsed;
                    }
                });
                duration += max_duration;
            }
            duration
        })
    });
}

fn insert_erase_parallel(c: &mut Criterion) {
    let num_threads = thread::available_parallelism().map_or(1, usize::from);
    c.bench_function("HashMap: insert_erase, parallel", move |b| {
        b.iter_custom(|iters| {
            let hashmap: Arc<HashMap<u64, u64>> = Arc::new(HashMap::default());
            let barrier = Arc::new(Barrier::new(num_threads + 1));
            let threads: Vec<_> = (0..num_threads as u64)
                .map(|thread_id| {
                    let hashmap = hashmap.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        let base = thread_id * iters;
                        for i in base..base + iters {
                            assert!(hashmap.insert(i, i).is_ok());
                        }
                        for i in base..base + iters {
                            assert!(hashmap.erase(&i));
                        }
                    })
                })
                .collect();
            let start = Instant::now();
            barrier.wait();
            for thread in threads {
                assert!(thread.join().is_ok());
            }
            start.elapsed()
        })
    });
}

criterion_group!(
    hash_map,
    insert_cold,
    insert_tail_latency,
    insert_warmed_up,
    find,
    insert_erase_parallel
);
criterion_main!(hash_map);
