//! Host allocation callbacks.
//!
//! Every bookkeeping allocation that the core can fail on (binding maps,
//! arena blocks, descriptor slot arrays, handle pool growth) asks the
//! instance's [`HostAllocator`] first. The returned [`HostAllocation`]
//! reports the matching `free` when it is dropped.

use std::alloc::Layout;
use std::fmt;
use std::sync::Arc;

use crate::error::{NgfError, Result};

/// User hooks consulted before internal allocations.
pub trait AllocationCallbacks: Send + Sync {
    /// Return `false` to refuse the allocation; the caller surfaces
    /// [`NgfError::OutOfMemory`].
    fn allocate(&self, layout: Layout) -> bool;

    /// Called once for every successful `allocate` when the memory is released.
    fn free(&self, layout: Layout);
}

/// Cloneable front for optional [`AllocationCallbacks`]. The default
/// accepts every request.
#[derive(Clone, Default)]
pub struct HostAllocator {
    callbacks: Option<Arc<dyn AllocationCallbacks>>,
}

impl fmt::Debug for HostAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostAllocator")
            .field("custom", &self.callbacks.is_some())
            .finish()
    }
}

impl HostAllocator {
    pub fn new(callbacks: Option<Arc<dyn AllocationCallbacks>>) -> Self {
        Self { callbacks }
    }

    pub fn is_custom(&self) -> bool {
        self.callbacks.is_some()
    }

    /// Reserve room for `count` values of `T`.
    pub fn reserve_array<T>(&self, count: usize) -> Result<HostAllocation> {
        let layout = Layout::array::<T>(count).map_err(|_| NgfError::OutOfMemory)?;
        self.reserve(layout)
    }

    pub fn reserve(&self, layout: Layout) -> Result<HostAllocation> {
        if layout.size() == 0 {
            return Ok(HostAllocation {
                layout,
                callbacks: None,
            });
        }
        match &self.callbacks {
            Some(cb) if !cb.allocate(layout) => {
                tracing::debug!(size = layout.size(), "host allocation refused");
                Err(NgfError::OutOfMemory)
            }
            Some(cb) => Ok(HostAllocation {
                layout,
                callbacks: Some(Arc::clone(cb)),
            }),
            None => Ok(HostAllocation {
                layout,
                callbacks: None,
            }),
        }
    }
}

/// Proof of a granted host allocation. Dropping it calls `free`.
pub struct HostAllocation {
    layout: Layout,
    callbacks: Option<Arc<dyn AllocationCallbacks>>,
}

impl HostAllocation {
    pub fn size(&self) -> usize {
        self.layout.size()
    }
}

impl fmt::Debug for HostAllocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostAllocation")
            .field("size", &self.layout.size())
            .finish_non_exhaustive()
    }
}

impl Drop for HostAllocation {
    fn drop(&mut self) {
        if let Some(cb) = self.callbacks.take() {
            cb.free(self.layout);
        }
    }
}
