//! The seam between the public API and a native backend.
//!
//! A backend is chosen once, when a context is created, and reached only
//! through [`Backend`] afterwards. Objects live in backend-owned registries
//! keyed by [`Handle`]; the caller-facing layer mints handles and enforces
//! the command buffer lifecycle before delegating here.

use std::any::Any;
use std::sync::Arc;

use crate::caps::DeviceCapabilities;
use crate::command::RenderCommand;
use crate::descriptor::DescriptorWrite;
use crate::error::{Result, SubmitError};
use crate::handle::Handle;
use crate::types::{
    BackendKind, BufferInfo, DescriptorSetLayoutInfo, GraphicsPipelineDesc, ImageInfo,
    RenderTargetInfo, SamplerInfo, ShaderStageInfo,
};

/// Device state a backend can share with contexts created after it.
#[derive(Clone)]
pub struct SharedBackendState {
    pub kind: BackendKind,
    pub state: Arc<dyn Any + Send + Sync>,
}

impl SharedBackendState {
    /// True when both refer to the same underlying device state.
    pub fn same_device(&self, other: &SharedBackendState) -> bool {
        self.kind == other.kind
            && Arc::as_ptr(&self.state) as *const () == Arc::as_ptr(&other.state) as *const ()
    }
}

impl std::fmt::Debug for SharedBackendState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBackendState")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Counters for the most recently completed frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frame: u64,
    pub submitted_cmd_buffers: u32,
    pub replayed_commands: u32,
    pub state_calls: u32,
    pub elided_state_calls: u32,
    pub fence_waits: u32,
}

pub trait Backend: Send {
    fn kind(&self) -> BackendKind;

    fn capabilities(&self) -> DeviceCapabilities;

    fn share(&self) -> SharedBackendState;

    /// Bind the native context to the calling thread.
    fn make_current(&mut self) -> Result<()>;

    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    fn begin_frame(&mut self) -> Result<()>;

    fn end_frame(&mut self) -> Result<()>;

    fn frame_stats(&self) -> FrameStats;

    /// Register the presentable surface's render target under `handle`.
    /// Returns `false` when the context has no default render target.
    fn create_default_render_target(&mut self, handle: Handle) -> Result<bool>;

    // ── Objects ─────────────────────────────────────────────

    fn create_shader_stage(&mut self, handle: Handle, info: &ShaderStageInfo) -> Result<()>;
    fn destroy_shader_stage(&mut self, handle: Handle);

    fn create_graphics_pipeline(&mut self, handle: Handle, desc: &GraphicsPipelineDesc)
        -> Result<()>;
    fn destroy_graphics_pipeline(&mut self, handle: Handle);

    fn create_image(&mut self, handle: Handle, info: &ImageInfo) -> Result<()>;
    fn destroy_image(&mut self, handle: Handle);

    fn create_sampler(&mut self, handle: Handle, info: &SamplerInfo) -> Result<()>;
    fn destroy_sampler(&mut self, handle: Handle);

    fn create_render_target(&mut self, handle: Handle, info: &RenderTargetInfo) -> Result<()>;
    fn destroy_render_target(&mut self, handle: Handle);

    fn create_buffer(&mut self, handle: Handle, info: &BufferInfo) -> Result<()>;
    fn destroy_buffer(&mut self, handle: Handle);
    fn write_buffer(&mut self, handle: Handle, offset: u64, data: &[u8]) -> Result<()>;
    fn read_buffer(&mut self, handle: Handle, offset: u64, out: &mut [u8]) -> Result<()>;

    fn create_descriptor_set_layout(
        &mut self,
        handle: Handle,
        info: &DescriptorSetLayoutInfo,
    ) -> Result<()>;
    fn destroy_descriptor_set_layout(&mut self, handle: Handle);

    fn create_descriptor_set(&mut self, handle: Handle, layout: Handle) -> Result<()>;
    fn destroy_descriptor_set(&mut self, handle: Handle);
    fn apply_descriptor_writes(&mut self, set: Handle, writes: &[DescriptorWrite]) -> Result<()>;

    // ── Command buffers ─────────────────────────────────────

    fn cmd_buffer_create(&mut self, handle: Handle) -> Result<()>;
    /// Discard any previous contents and prepare for recording.
    fn cmd_buffer_reset(&mut self, handle: Handle) -> Result<()>;
    fn cmd_buffer_finish(&mut self, handle: Handle) -> Result<()>;
    fn cmd_buffer_destroy(&mut self, handle: Handle);
    fn record(&mut self, cmd_buffer: Handle, command: RenderCommand) -> Result<()>;
    /// Execute (or queue for the current frame) the given buffers in order.
    /// On failure, [`SubmitError::consumed`] counts the leading buffers that
    /// were already executed or queued.
    fn submit(&mut self, cmd_buffers: &[Handle]) -> std::result::Result<(), SubmitError>;
}
