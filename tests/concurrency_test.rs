//! Exhaustion recovery and multi-threaded soak scenarios (S5, S6) and
//! invariant 5 (no panic/abort under concurrent interleaving).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use regionalloc::{Engine, Policy};

fn region(bytes: usize) -> &'static mut [u8] {
    Box::leak(vec![0u8; bytes].into_boxed_slice())
}

/// `NonNull<u8>` opts out of `Send` by default. Each slot is behind its
/// own `Mutex`, so no two threads ever touch the same pointer at once;
/// wrapping it here just asserts that to the compiler.
#[derive(Clone, Copy)]
struct SendPtr(std::ptr::NonNull<u8>);
unsafe impl Send for SendPtr {}

/// S5: drive the region to exhaustion with fixed-size requests, release
/// one, and confirm the freed space is immediately reusable.
#[test]
fn s5_exhaustion_then_free_then_retry() {
    let engine = Engine::new(region(4096), Policy::FirstFit);

    let mut ptrs = Vec::new();
    while let Some(p) = engine.allocate(64) {
        ptrs.push(p);
    }
    assert!(!ptrs.is_empty(), "region must fill up under fixed-size requests");
    assert!(engine.allocate(64).is_none(), "exhausted region must refuse further allocation");

    let freed = ptrs.pop().unwrap();
    engine.deallocate(Some(freed));

    let retried = engine.allocate(64);
    assert!(retried.is_some(), "space freed after exhaustion must be reusable");

    for p in ptrs {
        engine.deallocate(Some(p));
    }
    engine.deallocate(retried);
    engine.validate();
    assert_eq!(engine.stats().live_blocks, 1);
}

/// A small xorshift generator — good enough for picking pseudo-random
/// slot indices and request sizes in the soak test below without
/// pulling in an extra dependency for test-only randomness.
struct XorShift(u64);

impl XorShift {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }
}

/// S6: 150 threads hammer a shared engine with a randomized mix of
/// allocate/release over a common array of slots, for several thousand
/// iterations each. After every thread joins, releasing whatever is
/// left must collapse the region back to a single free block, and
/// `validate()` must hold throughout — no panic, no abort.
#[test]
fn s6_concurrent_allocate_release_soak() {
    const THREADS: usize = 150;
    const SLOTS: usize = 1000;
    const ITERATIONS: usize = 2500;

    let engine = Arc::new(Engine::new(region(4 * 1024 * 1024), Policy::FirstFit));
    let slots: Arc<Vec<Mutex<Option<SendPtr>>>> =
        Arc::new((0..SLOTS).map(|_| Mutex::new(None)).collect());

    let successes = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::with_capacity(THREADS);
    for t in 0..THREADS {
        let engine = Arc::clone(&engine);
        let slots = Arc::clone(&slots);
        let successes = Arc::clone(&successes);
        handles.push(thread::spawn(move || {
            let mut rng = XorShift(0x9E3779B97F4A7C15u64.wrapping_add(t as u64 * 2654435761));
            for _ in 0..ITERATIONS {
                let slot = (rng.next() as usize) % SLOTS;
                let mut guard = slots[slot].lock().unwrap();
                match *guard {
                    Some(p) => {
                        engine.deallocate(Some(p.0));
                        *guard = None;
                    }
                    None => {
                        let size = 8 + (rng.next() as usize) % 256;
                        if let Some(p) = engine.allocate(size) {
                            successes.fetch_add(1, Ordering::Relaxed);
                            *guard = Some(SendPtr(p));
                        }
                    }
                }
            }
        }));
    }

    for handle in handles {
        handle.join().expect("worker thread must not panic");
    }

    assert!(successes.load(Ordering::Relaxed) > 0, "soak must have allocated something");

    for slot in slots.iter() {
        let mut guard = slot.lock().unwrap();
        if let Some(p) = guard.take() {
            engine.deallocate(Some(p.0));
        }
    }

    engine.validate();
    assert_eq!(engine.stats().live_blocks, 1);
}
