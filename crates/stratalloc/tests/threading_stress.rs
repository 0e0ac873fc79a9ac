//! Multi-threaded stress for the tiered allocator: heavy same-class
//! contention, cross-thread frees, data integrity under interleaving, and
//! the thread-exit drain.

use std::ptr;
use std::sync::{Arc, Barrier};
use std::thread;

use stratalloc::{allocate, deallocate};

// ---------------------------------------------------------------------------
// N threads doing rapid allocate/deallocate cycles in one size class
// ---------------------------------------------------------------------------

fn stress_alloc_free_n_threads(num_threads: usize) {
    const ITERATIONS: usize = 10_000;
    const SIZE: usize = 128;

    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                unsafe {
                    for _ in 0..ITERATIONS {
                        let p = allocate(SIZE);
                        assert!(!p.is_null(), "allocate returned null under contention");
                        ptr::write_bytes(p, 0xCC, SIZE);
                        deallocate(p, SIZE);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked during alloc/free stress");
    }
}

#[test]
fn stress_alloc_free_4_threads() {
    stress_alloc_free_n_threads(4);
}

#[test]
fn stress_alloc_free_8_threads() {
    stress_alloc_free_n_threads(8);
}

#[test]
fn stress_alloc_free_16_threads() {
    stress_alloc_free_n_threads(16);
}

// ---------------------------------------------------------------------------
// Two threads hammering the same size class concurrently
// ---------------------------------------------------------------------------

#[test]
fn two_threads_same_class_no_aliasing() {
    const PER_THREAD: usize = 10_000;
    const SIZE: usize = 16;

    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|tid| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                unsafe {
                    let pattern = (0x40 + tid) as u8;
                    let mut ptrs = Vec::with_capacity(PER_THREAD);
                    for _ in 0..PER_THREAD {
                        let p = allocate(SIZE);
                        assert!(!p.is_null());
                        ptr::write_bytes(p, pattern, SIZE);
                        ptrs.push(p);
                    }
                    // Every object still carries this thread's pattern: no
                    // two live allocations ever aliased across threads.
                    for &p in &ptrs {
                        let slice = std::slice::from_raw_parts(p, SIZE);
                        assert!(
                            slice.iter().all(|&b| b == pattern),
                            "cross-thread aliasing detected"
                        );
                    }
                    for p in ptrs {
                        deallocate(p, SIZE);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked in same-class stress");
    }
}

// ---------------------------------------------------------------------------
// Cross-thread free: thread A allocates, thread B frees
// ---------------------------------------------------------------------------

/// Wrapper to allow sending `*mut u8` across thread boundaries. The
/// allocator is thread-safe and ownership moves with the message.
#[derive(Clone, Copy)]
struct SendPtr(*mut u8);
unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}

#[test]
fn cross_thread_free() {
    const COUNT: usize = 1_000;
    const SIZE: usize = 64;

    let barrier = Arc::new(Barrier::new(2));
    let shared: Arc<std::sync::Mutex<Vec<SendPtr>>> =
        Arc::new(std::sync::Mutex::new(Vec::with_capacity(COUNT)));

    let shared_producer = Arc::clone(&shared);
    let barrier_producer = Arc::clone(&barrier);
    let producer = thread::spawn(move || {
        barrier_producer.wait();
        unsafe {
            for _ in 0..COUNT {
                let p = allocate(SIZE);
                assert!(!p.is_null());
                ptr::write_bytes(p, 0xDD, SIZE);
                shared_producer.lock().unwrap().push(SendPtr(p));
            }
        }
    });

    let shared_consumer = Arc::clone(&shared);
    let barrier_consumer = Arc::clone(&barrier);
    let consumer = thread::spawn(move || {
        barrier_consumer.wait();
        unsafe {
            let mut freed = 0;
            while freed < COUNT {
                let batch: Vec<SendPtr> = {
                    let mut guard = shared_consumer.lock().unwrap();
                    guard.drain(..).collect()
                };
                for sp in batch {
                    deallocate(sp.0, SIZE);
                    freed += 1;
                }
                if freed < COUNT {
                    thread::yield_now();
                }
            }
        }
    });

    producer.join().expect("producer thread panicked");
    consumer.join().expect("consumer thread panicked");
}

// ---------------------------------------------------------------------------
// Data corruption check: write pattern, verify under contention
// ---------------------------------------------------------------------------

#[test]
fn no_data_corruption_under_contention() {
    const NUM_THREADS: usize = 8;
    const ITERATIONS: usize = 2_000;
    const SIZE: usize = 256;

    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|tid| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                unsafe {
                    let pattern = (tid & 0xFF) as u8;
                    for _ in 0..ITERATIONS {
                        let p = allocate(SIZE);
                        assert!(!p.is_null());
                        ptr::write_bytes(p, pattern, SIZE);
                        let slice = std::slice::from_raw_parts(p, SIZE);
                        assert!(
                            slice.iter().all(|&b| b == pattern),
                            "data corruption detected in thread {}",
                            tid
                        );
                        deallocate(p, SIZE);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked during corruption check");
    }
}

// ---------------------------------------------------------------------------
// Various sizes under contention, including the large path
// ---------------------------------------------------------------------------

#[test]
fn various_sizes_under_contention() {
    const NUM_THREADS: usize = 8;
    const SIZES: [usize; 10] = [
        1,
        16,
        128,
        1024,
        4096,
        16 * 1024,
        64 * 1024,
        200 * 1024,
        256 * 1024,
        300 * 1024,
    ];

    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|tid| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                unsafe {
                    for round in 0..500 {
                        let size = SIZES[(tid + round) % SIZES.len()];
                        let p = allocate(size);
                        assert!(
                            !p.is_null(),
                            "allocate({}) returned null in thread {}",
                            size,
                            tid
                        );
                        // Touch both ends.
                        p.write(0xEE);
                        p.add(size - 1).write(0xEE);
                        assert_eq!(p.read(), 0xEE);
                        assert_eq!(p.add(size - 1).read(), 0xEE);
                        deallocate(p, size);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked during various-sizes test");
    }
}

// ---------------------------------------------------------------------------
// Hold-and-free: each thread holds many live allocations at once
// ---------------------------------------------------------------------------

#[test]
fn hold_and_free_multiple_allocations() {
    const NUM_THREADS: usize = 8;
    const LIVE_COUNT: usize = 100;
    const ROUNDS: usize = 50;
    const SIZE: usize = 128;

    let barrier = Arc::new(Barrier::new(NUM_THREADS));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|tid| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                unsafe {
                    let pattern = ((tid + 1) & 0xFF) as u8;
                    for _ in 0..ROUNDS {
                        let mut ptrs = Vec::with_capacity(LIVE_COUNT);
                        for _ in 0..LIVE_COUNT {
                            let p = allocate(SIZE);
                            assert!(!p.is_null());
                            ptr::write_bytes(p, pattern, SIZE);
                            ptrs.push(p);
                        }
                        for &p in &ptrs {
                            let slice = std::slice::from_raw_parts(p, SIZE);
                            assert!(
                                slice.iter().all(|&b| b == pattern),
                                "corruption in hold-and-free, thread {}",
                                tid
                            );
                        }
                        for p in ptrs {
                            deallocate(p, SIZE);
                        }
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().expect("thread panicked during hold-and-free test");
    }
}

// ---------------------------------------------------------------------------
// Thread exit drains the thread cache back to the shared tiers
// ---------------------------------------------------------------------------

#[test]
fn thread_exit_drains_cache() {
    const COUNT: usize = 100;
    const SIZE: usize = 64;

    // Each worker frees its objects into its own thread cache and exits;
    // the TLS destructor must hand everything back to the central cache.
    for _ in 0..50 {
        thread::spawn(|| unsafe {
            let ptrs: Vec<*mut u8> = (0..COUNT)
                .map(|_| {
                    let p = allocate(SIZE);
                    assert!(!p.is_null());
                    p
                })
                .collect();
            for p in ptrs {
                deallocate(p, SIZE);
            }
            // Exit with a warm cache; no explicit cleanup.
        })
        .join()
        .expect("worker thread panicked");
    }

    // The shared tiers are intact and still serve this thread.
    unsafe {
        let p = allocate(SIZE);
        assert!(!p.is_null());
        deallocate(p, SIZE);
    }
}
