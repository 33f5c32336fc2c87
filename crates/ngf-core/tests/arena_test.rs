//! Integration test: block and scratch arenas
//!
//! Run with: cargo test -p ngf-core --test arena_test

use std::alloc::Layout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ngf_core::arena::{BlockArena, ScratchArena};
use ngf_core::{AllocationCallbacks, HostAllocator, NgfError};

#[test]
fn test_block_arena_grows_by_blocks_and_recycles_slots() {
    let mut arena = BlockArena::new(4, HostAllocator::default());
    let idx: Vec<_> = (0..6).map(|i| arena.alloc(i).expect("alloc")).collect();
    assert_eq!(arena.block_count(), 2);
    assert_eq!(arena.len(), 6);
    assert_eq!(arena.get(idx[5]), Some(&5));

    assert_eq!(arena.free(idx[1]), Some(1));
    assert_eq!(arena.get(idx[1]), None);
    let reused = arena.alloc(100).expect("alloc");
    assert_eq!(reused, idx[1]);
    assert_eq!(arena.block_count(), 2);

    *arena.get_mut(reused).expect("slot") += 1;
    assert_eq!(arena.get(reused), Some(&101));
}

#[test]
fn test_block_arena_reset_keeps_blocks() {
    let mut arena = BlockArena::new(2, HostAllocator::default());
    for i in 0..5 {
        arena.alloc(i).expect("alloc");
    }
    assert_eq!(arena.block_count(), 3);
    arena.reset();
    assert!(arena.is_empty());
    for i in 0..6 {
        arena.alloc(i).expect("alloc");
    }
    assert_eq!(arena.block_count(), 3);
}

struct Refuse(AtomicBool);

impl AllocationCallbacks for Refuse {
    fn allocate(&self, _layout: Layout) -> bool {
        !self.0.load(Ordering::SeqCst)
    }

    fn free(&self, _layout: Layout) {}
}

#[test]
fn test_block_arena_surfaces_refused_blocks() {
    let cb = Arc::new(Refuse(AtomicBool::new(false)));
    let mut arena = BlockArena::new(2, HostAllocator::new(Some(cb.clone())));
    arena.alloc(1u32).expect("alloc");
    arena.alloc(2u32).expect("alloc");
    cb.0.store(true, Ordering::SeqCst);
    assert!(matches!(arena.alloc(3u32), Err(NgfError::OutOfMemory)));
    assert_eq!(arena.len(), 2);
}

#[test]
fn test_scratch_arena_mixed_types_and_reset() {
    let mut scratch = ScratchArena::with_capacity(16);
    let bytes = scratch.push_slice(&[1u8, 2, 3]);
    let words = scratch.push_slice(&[7u32, 8, 9, 10]);
    let longs = scratch.push_slice(&[u64::MAX, 5]);
    assert_eq!(scratch.get(bytes), &[1, 2, 3]);
    assert_eq!(scratch.get(words), &[7, 8, 9, 10]);
    assert_eq!(scratch.get(longs), &[u64::MAX, 5]);
    assert!(scratch.capacity() >= scratch.used());

    let high = scratch.high_water();
    scratch.reset();
    assert_eq!(scratch.used(), 0);
    let again = scratch.push_slice(&[42u32]);
    assert_eq!(scratch.get(again), &[42]);
    assert_eq!(scratch.high_water(), high);
    let empty = scratch.push_slice::<f32>(&[]);
    assert!(scratch.get(empty).is_empty());
}

#[test]
fn test_scratch_arena_push_iter_grows_past_capacity() {
    let mut scratch = ScratchArena::with_capacity(8);
    let head = scratch.push_slice(&[1u16]);
    let evens = scratch.push_iter((0u32..10).map(|i| i * 2));
    assert_eq!(evens.len(), 10);
    assert_eq!(scratch.get(head), &[1]);
    assert_eq!(scratch.get(evens), &[0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
    assert!(scratch.capacity() >= 44);
}
