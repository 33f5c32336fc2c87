use std::sync::Arc;

use ngf_core::handle_pool::{HandlePool, SequentialAllocator};
use ngf_core::types::DevicePreference;
use ngf_core::{
    AllocationCallbacks, CapabilityCache, DeviceCapabilities, HostAllocator, NgfConfig, Result,
};

use crate::context::{Context, ContextInfo};

/// Library state shared by every context created from it.
pub struct Instance {
    pub(crate) config: NgfConfig,
    pub(crate) host: HostAllocator,
    pub(crate) handles: Arc<HandlePool>,
    pub(crate) caps: Arc<CapabilityCache>,
}

/// Validate `config` and set up an instance that prefers `preference`
/// when picking a device.
pub fn initialize(preference: DevicePreference, config: NgfConfig) -> Result<Instance> {
    Instance::new(preference, config)
}

impl Instance {
    pub fn new(preference: DevicePreference, mut config: NgfConfig) -> Result<Self> {
        config.validate()?;
        config.device.preference = preference;
        let host = HostAllocator::default();
        let handles = HandlePool::new(
            config.memory.handle_pool_initial_size,
            Box::new(SequentialAllocator::new(host.clone())),
        )?;
        tracing::info!(
            ?preference,
            backend = ?config.device.backend,
            max_inflight_frames = config.frames.max_inflight_frames,
            "NGF initialized"
        );
        Ok(Self {
            config,
            host,
            handles: Arc::new(handles),
            caps: Arc::new(CapabilityCache::new()),
        })
    }

    pub fn config(&self) -> &NgfConfig {
        &self.config
    }

    /// Route internal bookkeeping allocations of contexts created from now
    /// on through `callbacks`; `None` restores the default. The handle pool
    /// keeps the allocator it was created with.
    pub fn set_allocation_callbacks(&mut self, callbacks: Option<Arc<dyn AllocationCallbacks>>) {
        self.host = HostAllocator::new(callbacks);
        tracing::debug!(custom = self.host.is_custom(), "allocation callbacks set");
    }

    /// Capabilities of the device, once the first context has probed them.
    pub fn capabilities(&self) -> Option<DeviceCapabilities> {
        self.caps.get()
    }

    pub fn handle_pool(&self) -> &HandlePool {
        &self.handles
    }

    pub fn create_context(&self, info: ContextInfo<'_>) -> Result<Context> {
        Context::new(self, info)
    }
}
