//! Public entry points.
//!
//! An [`Instance`] carries the configuration, the host allocator, the
//! handle pool and the capability cache. Contexts created from it pick a
//! backend once and reach it only through [`ngf_core::Backend`]; objects
//! come back as small typed handles, and command buffers are recorded
//! through the context that owns the calling thread.

mod cmd;
mod context;
mod instance;
mod objects;

pub use cmd::CmdBuffer;
pub use context::{BackendSelect, Context, ContextInfo, GraphicsPipelineInfo};
pub use instance::{initialize, Instance};
pub use objects::{
    Buffer, DescriptorSet, DescriptorSetLayout, GraphicsPipeline, Image, RenderTarget, Sampler,
    ShaderStage,
};

pub use ngf_core::descriptor::{DescriptorPayload, DescriptorWrite};
pub use ngf_core::{
    types, AllocationCallbacks, CmdBufferState, DeviceCapabilities, FrameStats, Handle,
    NgfConfig, NgfError, Result,
};
pub use ngf_gl::{GlBackendInfo, GlPlatform};
pub use ngf_vk::{SurfaceSource, VkBackendInfo};
