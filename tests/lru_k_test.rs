//! Integration tests for the LRU-K replacer

use std::sync::Arc;
use std::thread;

use strata::buffer::LruKReplacer;
use strata::common::FrameId;

fn frame(id: u32) -> FrameId {
    FrameId::new(id)
}

#[test]
fn test_lru_k_clock_advances_on_every_call() {
    let replacer = LruKReplacer::new(2, 8);

    // t0, t1
    replacer.record_access(frame(0));
    replacer.record_access(frame(1));
    // t2, t3
    replacer.set_evictable(frame(0), true);
    replacer.set_evictable(frame(1), true);
    // t4: frame 0 now has a full history
    replacer.record_access(frame(0));

    // t5: frame 1 still has a single access
    assert_eq!(replacer.evict(), Some(frame(1)));

    // t6, t7, t8: frame 1 comes back after the eviction tick
    replacer.record_access(frame(1));
    replacer.record_access(frame(1));
    replacer.set_evictable(frame(1), true);

    // Frame 0's second most recent access (t0) is older than frame 1's (t6)
    assert_eq!(replacer.evict(), Some(frame(0)));
    assert_eq!(replacer.evict(), Some(frame(1)));
    assert_eq!(replacer.size(), 0);
}

#[test]
fn test_lru_k_removed_frame_rejoins_as_newest() {
    let replacer = LruKReplacer::new(2, 8);

    for f in 0..3 {
        replacer.record_access(frame(f));
    }
    for f in 0..3 {
        replacer.set_evictable(frame(f), true);
    }

    replacer.remove(frame(0));
    assert_eq!(replacer.size(), 2);

    replacer.record_access(frame(0));
    replacer.set_evictable(frame(0), true);

    // All three sit at +inf; frame 0's only access is now the latest
    assert_eq!(replacer.evict(), Some(frame(1)));
    assert_eq!(replacer.evict(), Some(frame(2)));
    assert_eq!(replacer.evict(), Some(frame(0)));
}

#[test]
fn test_lru_k_evicted_frame_starts_fresh() {
    let replacer = LruKReplacer::new(2, 8);

    replacer.record_access(frame(0));
    replacer.record_access(frame(0));
    replacer.set_evictable(frame(0), true);
    assert_eq!(replacer.evict(), Some(frame(0)));

    replacer.record_access(frame(1));
    replacer.record_access(frame(1));
    replacer.record_access(frame(0));
    replacer.set_evictable(frame(0), true);
    replacer.set_evictable(frame(1), true);

    // One access since the eviction puts frame 0 back at +inf
    assert_eq!(replacer.evict(), Some(frame(0)));
    assert_eq!(replacer.evict(), Some(frame(1)));
}

#[test]
fn test_lru_k_uses_kth_most_recent_access() {
    let replacer = LruKReplacer::new(3, 8);

    for _ in 0..3 {
        replacer.record_access(frame(0));
    }
    for _ in 0..3 {
        replacer.record_access(frame(1));
    }
    // Frame 0's third most recent access moves from t0 to t6
    for _ in 0..3 {
        replacer.record_access(frame(0));
    }

    replacer.set_evictable(frame(0), true);
    replacer.set_evictable(frame(1), true);

    assert_eq!(replacer.evict(), Some(frame(1)));
    assert_eq!(replacer.evict(), Some(frame(0)));
}

#[test]
fn test_lru_k_concurrent_bookkeeping() {
    let replacer = Arc::new(LruKReplacer::new(2, 64));

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let replacer = Arc::clone(&replacer);
            thread::spawn(move || {
                for f in (t * 16)..(t * 16 + 16) {
                    replacer.record_access(frame(f));
                    replacer.record_access(frame(f));
                    // Odd frames stay pinned
                    replacer.set_evictable(frame(f), f % 2 == 0);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(replacer.size(), 32);

    let mut victims = Vec::new();
    while let Some(victim) = replacer.evict() {
        victims.push(victim.as_u32());
    }
    victims.sort_unstable();

    assert_eq!(victims, (0..64).step_by(2).collect::<Vec<_>>());
    assert_eq!(replacer.size(), 0);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_lru_k_set_evictable_out_of_range_panics() {
    let replacer = LruKReplacer::new(2, 4);
    replacer.set_evictable(frame(4), true);
}

#[test]
#[should_panic(expected = "out of range")]
fn test_lru_k_remove_out_of_range_panics() {
    let replacer = LruKReplacer::new(2, 4);
    replacer.remove(frame(9));
}

#[test]
#[should_panic(expected = "non-evictable")]
fn test_lru_k_remove_after_pinning_again_panics() {
    let replacer = LruKReplacer::new(2, 4);

    replacer.record_access(frame(1));
    replacer.set_evictable(frame(1), true);
    replacer.set_evictable(frame(1), false);

    replacer.remove(frame(1));
}
