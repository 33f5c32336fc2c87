//! Integration test: HandlePool
//!
//! Verifies pre-minting, growth, recycling and leak reporting of the
//! shared handle pool.
//!
//! Run with: cargo test -p ngf-core --test handle_pool_test

use std::collections::HashSet;

use ngf_core::handle_pool::{HandleAllocator, SequentialAllocator};
use ngf_core::{HandlePool, HostAllocator, NgfError};

fn unlimited(initial: usize) -> HandlePool {
    HandlePool::new(initial, Box::new(SequentialAllocator::new(HostAllocator::default())))
        .expect("pool creation")
}

#[test]
fn test_requests_within_capacity_do_not_grow() {
    ngf_common::try_init_logging();
    let pool = unlimited(16);
    assert_eq!(pool.alloc_count(), 16);

    let handles: Vec<_> = (0..16).map(|_| pool.alloc().expect("alloc")).collect();
    assert_eq!(pool.alloc_count(), 16);
    assert_eq!(pool.outstanding(), 16);
    assert!(handles.iter().all(|h| !h.is_null()));

    for h in handles {
        pool.free(h).expect("free");
    }
    pool.destroy().expect("destroy");
}

#[test]
fn test_growth_is_one_to_one_and_frees_do_not_shrink() {
    ngf_common::try_init_logging();
    let pool = unlimited(4);
    let handles: Vec<_> = (0..10).map(|_| pool.alloc().expect("alloc")).collect();
    assert_eq!(pool.alloc_count(), 10);

    for h in &handles[..5] {
        pool.free(*h).expect("free");
    }
    assert_eq!(pool.alloc_count(), 10);
    assert_eq!(pool.available(), 5);

    for h in &handles[5..] {
        pool.free(*h).expect("free");
    }
    pool.destroy().expect("destroy");
}

#[test]
fn test_no_handle_is_issued_twice_while_outstanding() {
    ngf_common::try_init_logging();
    let pool = unlimited(8);
    let mut seen = HashSet::new();
    let mut live = Vec::new();
    for round in 0..50 {
        let h = pool.alloc().expect("alloc");
        assert!(seen.insert(h), "handle {h} reissued while outstanding");
        live.push(h);
        if round % 3 == 0 {
            let victim = live.remove(0);
            seen.remove(&victim);
            pool.free(victim).expect("free");
        }
    }
    for h in live {
        pool.free(h).expect("free");
    }
}

#[test]
fn test_limited_allocator_refills_from_freed_handles() {
    ngf_common::try_init_logging();
    let allocator = SequentialAllocator::with_limit(HostAllocator::default(), 64);
    let pool = HandlePool::new(64, Box::new(allocator)).expect("pool creation");

    let mut issued: Vec<_> = (0..64).map(|_| pool.alloc().expect("alloc")).collect();
    assert!(matches!(pool.alloc(), Err(NgfError::OutOfMemory)));

    for h in issued.drain(..32) {
        pool.free(h).expect("free");
    }
    for i in 0..32 {
        let h = pool
            .alloc()
            .unwrap_or_else(|e| panic!("alloc {i} after free failed: {e}"));
        issued.push(h);
    }
    assert!(matches!(pool.alloc(), Err(NgfError::OutOfMemory)));
    assert_eq!(pool.alloc_count(), 64);

    for h in issued {
        pool.free(h).expect("free");
    }
    pool.destroy().expect("destroy");
}

#[test]
fn test_destroy_reports_leaks_until_all_returned() {
    ngf_common::try_init_logging();
    let pool = unlimited(4);
    let a = pool.alloc().expect("alloc");
    let b = pool.alloc().expect("alloc");

    let err = pool.destroy().expect_err("destroy with leaks must fail");
    assert!(err.to_string().contains("2 handle(s)"), "unexpected: {err}");

    pool.free(a).expect("free");
    assert!(pool.destroy().is_err());
    pool.free(b).expect("free");
    pool.destroy().expect("destroy after returning all handles");
    assert_eq!(pool.alloc_count(), 0);
    assert!(pool.alloc().is_err());
}

#[test]
fn test_freeing_unknown_handle_is_rejected() {
    ngf_common::try_init_logging();
    let pool = unlimited(2);
    let h = pool.alloc().expect("alloc");
    pool.free(h).expect("free");
    assert!(matches!(pool.free(h), Err(NgfError::InvalidHandle(_))));
}

struct Exhausted;

impl HandleAllocator for Exhausted {
    fn allocate(&mut self) -> Option<u64> {
        None
    }

    fn deallocate(&mut self, _raw: u64) {}
}

#[test]
fn test_creation_fails_when_initial_handles_cannot_be_minted() {
    ngf_common::try_init_logging();
    assert!(matches!(
        HandlePool::new(1, Box::new(Exhausted)),
        Err(NgfError::OutOfMemory)
    ));
    let empty = HandlePool::new(0, Box::new(Exhausted)).expect("empty pool");
    assert!(matches!(empty.alloc(), Err(NgfError::OutOfMemory)));
}
