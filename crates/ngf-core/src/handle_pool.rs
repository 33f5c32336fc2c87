//! Pool of recycled opaque handles.
//!
//! Handles are minted by a pluggable [`HandleAllocator`] and recycled through
//! a free stack. The pool is shared between contexts, so all state sits
//! behind a mutex.

use std::collections::HashSet;

use parking_lot::Mutex;

use crate::alloc::{HostAllocation, HostAllocator};
use crate::error::{NgfError, Result};
use crate::handle::Handle;

/// Mints and retires the raw values behind handles.
pub trait HandleAllocator: Send {
    /// Produce a fresh, non-zero handle value, or `None` when exhausted.
    fn allocate(&mut self) -> Option<u64>;

    fn deallocate(&mut self, raw: u64);
}

/// Default allocator: monotonically increasing values, each backed by a
/// host allocation so custom allocation callbacks can observe and limit
/// handle growth.
pub struct SequentialAllocator {
    next: u64,
    limit: Option<u64>,
    host: HostAllocator,
    reservations: Vec<(u64, HostAllocation)>,
}

impl SequentialAllocator {
    pub fn new(host: HostAllocator) -> Self {
        Self {
            next: 1,
            limit: None,
            host,
            reservations: Vec::new(),
        }
    }

    /// Refuse to mint more than `limit` handles in total.
    pub fn with_limit(host: HostAllocator, limit: u64) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new(host)
        }
    }
}

impl HandleAllocator for SequentialAllocator {
    fn allocate(&mut self) -> Option<u64> {
        if let Some(limit) = self.limit {
            if self.next > limit {
                return None;
            }
        }
        let reservation = self.host.reserve_array::<u64>(1).ok()?;
        let raw = self.next;
        self.next += 1;
        self.reservations.push((raw, reservation));
        Some(raw)
    }

    fn deallocate(&mut self, raw: u64) {
        self.reservations.retain(|(r, _)| *r != raw);
    }
}

struct PoolInner {
    free: Vec<u64>,
    outstanding: HashSet<u64>,
    allocator: Box<dyn HandleAllocator>,
    alloc_count: usize,
    destroyed: bool,
}

pub struct HandlePool {
    inner: Mutex<PoolInner>,
}

impl HandlePool {
    /// Create a pool and pre-mint `initial_size` handles.
    pub fn new(initial_size: usize, mut allocator: Box<dyn HandleAllocator>) -> Result<Self> {
        let mut free = Vec::with_capacity(initial_size);
        for _ in 0..initial_size {
            match allocator.allocate() {
                Some(raw) => free.push(raw),
                None => {
                    for raw in free.drain(..) {
                        allocator.deallocate(raw);
                    }
                    return Err(NgfError::OutOfMemory);
                }
            }
        }
        // Pop order hands out the lowest values first.
        free.reverse();
        Ok(Self {
            inner: Mutex::new(PoolInner {
                alloc_count: free.len(),
                free,
                outstanding: HashSet::new(),
                allocator,
                destroyed: false,
            }),
        })
    }

    pub fn alloc(&self) -> Result<Handle> {
        let mut inner = self.inner.lock();
        if inner.destroyed {
            return Err(NgfError::invalid_op("handle pool has been destroyed"));
        }
        let raw = match inner.free.pop() {
            Some(raw) => raw,
            None => {
                let raw = inner.allocator.allocate().ok_or(NgfError::OutOfMemory)?;
                inner.alloc_count += 1;
                raw
            }
        };
        debug_assert_ne!(raw, 0, "allocator produced the null handle");
        let fresh = inner.outstanding.insert(raw);
        debug_assert!(fresh, "handle {raw} handed out twice");
        Ok(Handle::from_raw(raw))
    }

    pub fn free(&self, handle: Handle) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.outstanding.remove(&handle.raw()) {
            return Err(NgfError::InvalidHandle(handle));
        }
        inner.free.push(handle.raw());
        Ok(())
    }

    /// Number of handles ever minted by the allocator and still owned by the pool.
    pub fn alloc_count(&self) -> usize {
        self.inner.lock().alloc_count
    }

    pub fn outstanding(&self) -> usize {
        self.inner.lock().outstanding.len()
    }

    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Release every handle back to the allocator. Fails, leaving the pool
    /// intact, while any handle is still outstanding; the error carries the
    /// leaked count.
    pub fn destroy(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let leaked = inner.outstanding.len();
        if leaked > 0 {
            tracing::warn!(leaked, "refusing to destroy handle pool with outstanding handles");
            return Err(NgfError::invalid_op(format!(
                "{leaked} handle(s) still outstanding"
            )));
        }
        let PoolInner {
            free, allocator, ..
        } = &mut *inner;
        for raw in free.drain(..) {
            allocator.deallocate(raw);
        }
        inner.alloc_count = 0;
        inner.destroyed = true;
        Ok(())
    }
}

impl Drop for HandlePool {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.destroyed {
            return;
        }
        if !inner.outstanding.is_empty() {
            tracing::warn!(
                leaked = inner.outstanding.len(),
                "handle pool dropped with outstanding handles"
            );
        }
        let PoolInner {
            free,
            outstanding,
            allocator,
            ..
        } = inner;
        for raw in free.drain(..).chain(outstanding.drain()) {
            allocator.deallocate(raw);
        }
    }
}
