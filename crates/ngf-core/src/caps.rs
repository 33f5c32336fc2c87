//! Device capability cache.
//!
//! Capabilities are probed once, by whichever context is created first, and
//! read by everything after. Writing goes through [`CapabilityCache::lock_for_init`],
//! which only succeeds while the cache is still empty.

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::types::BackendKind;

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCapabilities {
    pub backend: BackendKind,
    pub device_name: String,
    pub is_discrete: bool,
    pub max_uniform_buffer_bindings: u32,
    pub max_storage_buffer_bindings: u32,
    pub max_texture_units: u32,
    pub max_sampler_units: u32,
    pub max_vertex_input_attributes: u32,
    pub uniform_buffer_offset_alignment: u64,
    pub max_viewport_dims: [u32; 2],
    pub max_framebuffer_extent: [u32; 2],
    pub max_line_width: f32,
    pub supports_tessellation: bool,
    pub supports_native_descriptor_sets: bool,
}

#[derive(Debug, Default)]
pub struct CapabilityCache {
    caps: RwLock<Option<DeviceCapabilities>>,
}

/// Exclusive write access to an empty cache. Dropping it without calling
/// [`publish`](Self::publish) leaves the cache empty for the next writer.
pub struct CapsInitGuard<'a> {
    guard: RwLockWriteGuard<'a, Option<DeviceCapabilities>>,
}

impl CapsInitGuard<'_> {
    pub fn publish(mut self, caps: DeviceCapabilities) {
        tracing::debug!(device = %caps.device_name, "device capabilities cached");
        *self.guard = Some(caps);
    }
}

impl CapabilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<DeviceCapabilities> {
        self.caps.read().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.caps.read().is_some()
    }

    /// Returns `None` if another writer already published capabilities.
    pub fn lock_for_init(&self) -> Option<CapsInitGuard<'_>> {
        let guard = self.caps.write();
        if guard.is_some() {
            return None;
        }
        Some(CapsInitGuard { guard })
    }
}
