//! Arena storage for transient data.
//!
//! [`BlockArena`] hands out index-addressed slots carved from fixed-size
//! blocks; slots are recycled through a free list and whole blocks are kept
//! across frames. [`ScratchArena`] is a bump allocator for short-lived
//! plain-data arrays that is rewound, not freed, at frame boundaries.

use std::marker::PhantomData;
use std::mem;

use bytemuck::Pod;

use crate::alloc::{HostAllocation, HostAllocator};
use crate::error::{NgfError, Result};

/// Index of a slot inside a [`BlockArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaIndex(u32);

impl ArenaIndex {
    pub fn raw(self) -> u32 {
        self.0
    }
}

struct Block<T> {
    slots: Vec<Option<T>>,
    _reservation: HostAllocation,
}

/// Fixed-block slot allocator.
pub struct BlockArena<T> {
    blocks: Vec<Block<T>>,
    block_len: usize,
    free: Vec<ArenaIndex>,
    /// Slots handed out since the last block was added and never freed.
    fresh: usize,
    live: usize,
    host: HostAllocator,
}

impl<T> BlockArena<T> {
    pub fn new(block_len: usize, host: HostAllocator) -> Self {
        Self {
            blocks: Vec::new(),
            block_len: block_len.max(1),
            free: Vec::new(),
            fresh: 0,
            live: 0,
            host,
        }
    }

    /// Store `value` and return its slot index.
    pub fn alloc(&mut self, value: T) -> Result<ArenaIndex> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => self.next_fresh()?,
        };
        let (block, slot) = self.locate(index);
        debug_assert!(self.blocks[block].slots[slot].is_none());
        self.blocks[block].slots[slot] = Some(value);
        self.live += 1;
        Ok(index)
    }

    fn next_fresh(&mut self) -> Result<ArenaIndex> {
        let capacity = self.blocks.len() * self.block_len;
        if self.fresh == capacity {
            let reservation = self.host.reserve_array::<Option<T>>(self.block_len)?;
            let mut slots = Vec::new();
            slots
                .try_reserve_exact(self.block_len)
                .map_err(|_| NgfError::OutOfMemory)?;
            slots.resize_with(self.block_len, || None);
            self.blocks.push(Block {
                slots,
                _reservation: reservation,
            });
            tracing::trace!(blocks = self.blocks.len(), "arena grew by one block");
        }
        let index = u32::try_from(self.fresh).map_err(|_| NgfError::OutOfMemory)?;
        self.fresh += 1;
        Ok(ArenaIndex(index))
    }

    fn locate(&self, index: ArenaIndex) -> (usize, usize) {
        let i = index.0 as usize;
        (i / self.block_len, i % self.block_len)
    }

    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        let (block, slot) = self.locate(index);
        self.blocks.get(block)?.slots.get(slot)?.as_ref()
    }

    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        let (block, slot) = self.locate(index);
        self.blocks.get_mut(block)?.slots.get_mut(slot)?.as_mut()
    }

    /// Return a slot to the free list, yielding its value.
    pub fn free(&mut self, index: ArenaIndex) -> Option<T> {
        let (block, slot) = self.locate(index);
        let value = self.blocks.get_mut(block)?.slots.get_mut(slot)?.take()?;
        self.free.push(index);
        self.live -= 1;
        Some(value)
    }

    /// Drop every stored value but keep the blocks.
    pub fn reset(&mut self) {
        for block in &mut self.blocks {
            block.slots.iter_mut().for_each(|s| *s = None);
        }
        self.free.clear();
        self.fresh = 0;
        self.live = 0;
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

/// Typed view into a [`ScratchArena`]; valid until the next `reset`.
#[derive(Debug)]
pub struct ScratchSlice<T> {
    offset: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T> Clone for ScratchSlice<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ScratchSlice<T> {}

impl<T> ScratchSlice<T> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Bump allocator for plain-data arrays. Backing storage is 8-byte aligned.
pub struct ScratchArena {
    words: Vec<u64>,
    used: usize,
    high_water: usize,
}

impl ScratchArena {
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            words: vec![0; bytes.div_ceil(8)],
            used: 0,
            high_water: 0,
        }
    }

    /// Copy `items` into the arena.
    pub fn push_slice<T: Pod>(&mut self, items: &[T]) -> ScratchSlice<T> {
        assert!(mem::align_of::<T>() <= mem::align_of::<u64>());
        let align = mem::align_of::<T>();
        let offset = self.used.div_ceil(align) * align;
        let size = mem::size_of_val(items);
        let end = offset + size;
        if end > self.words.len() * 8 {
            let grown = (end.div_ceil(8)).max(self.words.len() * 2);
            self.words.resize(grown, 0);
        }
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.words);
        bytes[offset..end].copy_from_slice(bytemuck::cast_slice(items));
        self.used = end;
        self.high_water = self.high_water.max(end);
        ScratchSlice {
            offset,
            len: items.len(),
            _marker: PhantomData,
        }
    }

    /// Copy the items of `iter` into the arena without an intermediate buffer.
    pub fn push_iter<T: Pod>(&mut self, iter: impl IntoIterator<Item = T>) -> ScratchSlice<T> {
        assert!(mem::align_of::<T>() <= mem::align_of::<u64>());
        let align = mem::align_of::<T>();
        let size = mem::size_of::<T>();
        let offset = self.used.div_ceil(align) * align;
        let mut end = offset;
        let mut len = 0;
        for item in iter {
            if end + size > self.words.len() * 8 {
                let grown = (end + size).div_ceil(8).max(self.words.len() * 2);
                self.words.resize(grown, 0);
            }
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut self.words);
            bytes[end..end + size].copy_from_slice(bytemuck::bytes_of(&item));
            end += size;
            len += 1;
        }
        self.used = end;
        self.high_water = self.high_water.max(end);
        ScratchSlice {
            offset,
            len,
            _marker: PhantomData,
        }
    }

    pub fn get<T: Pod>(&self, slice: ScratchSlice<T>) -> &[T] {
        if slice.len == 0 {
            return &[];
        }
        let bytes: &[u8] = bytemuck::cast_slice(&self.words);
        let end = slice.offset + slice.len * mem::size_of::<T>();
        bytemuck::cast_slice(&bytes[slice.offset..end])
    }

    /// Rewind to empty. Capacity is retained.
    pub fn reset(&mut self) {
        self.used = 0;
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn capacity(&self) -> usize {
        self.words.len() * 8
    }

    pub fn high_water(&self) -> usize {
        self.high_water
    }
}
