//! Device memory selection and dedicated allocations.

use std::ffi::c_void;

use ash::vk;
use ngf_core::types::BufferStorage;
use ngf_core::{NgfError, Result};

use crate::vk_err;

/// Index of the first memory type allowed by `type_bits` that has all of
/// `required`. When `preferred` flags are given, a type carrying them wins
/// over one that only meets `required`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
    preferred: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = (props.memory_type_count as usize).min(props.memory_types.len());
    let candidates = props.memory_types[..count]
        .iter()
        .enumerate()
        .filter(|(i, t)| type_bits & (1 << i) != 0 && t.property_flags.contains(required));
    let mut fallback = None;
    for (i, t) in candidates {
        if t.property_flags.contains(preferred) {
            return Some(i as u32);
        }
        fallback.get_or_insert(i as u32);
    }
    fallback
}

/// `(required, preferred)` memory properties for a buffer's storage mode.
pub fn storage_flags(storage: BufferStorage) -> (vk::MemoryPropertyFlags, vk::MemoryPropertyFlags) {
    use vk::MemoryPropertyFlags as F;
    match storage {
        BufferStorage::HostWriteable => (F::HOST_VISIBLE | F::HOST_COHERENT, F::DEVICE_LOCAL),
        BufferStorage::HostReadable | BufferStorage::HostReadWrite => {
            (F::HOST_VISIBLE | F::HOST_COHERENT, F::HOST_CACHED)
        }
        BufferStorage::Private => (F::DEVICE_LOCAL, F::empty()),
    }
}

/// A dedicated `VkDeviceMemory`, persistently mapped when host-visible.
pub(crate) struct Allocation {
    pub memory: vk::DeviceMemory,
    size: u64,
    mapped: *mut c_void,
}

// SAFETY: the mapping is owned by this allocation and only touched through
// `&mut` access to the registry entry holding it.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

impl Allocation {
    pub fn allocate(
        device: &ash::Device,
        props: &vk::PhysicalDeviceMemoryProperties,
        reqs: vk::MemoryRequirements,
        required: vk::MemoryPropertyFlags,
        preferred: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let type_index = find_memory_type(props, reqs.memory_type_bits, required, preferred)
            .ok_or_else(|| {
                NgfError::Unsupported(format!("no memory type with {required:?}"))
            })?;
        let info = vk::MemoryAllocateInfo::default()
            .allocation_size(reqs.size)
            .memory_type_index(type_index);
        let memory = unsafe { device.allocate_memory(&info, None) }.map_err(alloc_err)?;

        let mut mapped = std::ptr::null_mut();
        if required.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            match unsafe {
                device.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
            } {
                Ok(ptr) => mapped = ptr,
                Err(e) => {
                    unsafe { device.free_memory(memory, None) };
                    return Err(vk_err(e));
                }
            }
        }
        tracing::trace!(size = reqs.size, type_index, "device memory allocated");
        Ok(Self {
            memory,
            size: reqs.size,
            mapped,
        })
    }

    pub fn is_mapped(&self) -> bool {
        !self.mapped.is_null()
    }

    fn fits(&self, offset: u64, len: usize) -> bool {
        !self.mapped.is_null()
            && offset
                .checked_add(len as u64)
                .is_some_and(|end| end <= self.size)
    }

    /// Copy `data` into the mapping at `offset`. Out-of-range copies are
    /// dropped; callers check the range against the buffer size first.
    pub fn write(&mut self, offset: u64, data: &[u8]) {
        if !self.fits(offset, data.len()) {
            return;
        }
        unsafe {
            let dst = (self.mapped as *mut u8).add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
    }

    pub fn read(&self, offset: u64, out: &mut [u8]) {
        if !self.fits(offset, out.len()) {
            return;
        }
        unsafe {
            let src = (self.mapped as *const u8).add(offset as usize);
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len());
        }
    }

    pub fn free(self, device: &ash::Device) {
        unsafe {
            if !self.mapped.is_null() {
                device.unmap_memory(self.memory);
            }
            device.free_memory(self.memory, None);
        }
    }
}

fn alloc_err(e: vk::Result) -> NgfError {
    match e {
        vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
            NgfError::OutOfMemory
        }
        other => vk_err(other),
    }
}
