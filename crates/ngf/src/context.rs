use std::sync::Arc;
use std::thread::{self, ThreadId};

use ngf_core::config::BackendChoice;
use ngf_core::descriptor::DescriptorWrite;
use ngf_core::handle_pool::HandlePool;
use ngf_core::types::{
    BackendKind, BufferInfo, CombinedImageSamplerMap, DescriptorSetLayoutInfo,
    GraphicsPipelineDesc, ImageInfo, PipelineLayoutInfo, PipelineState, RenderTargetInfo,
    SamplerInfo, ShaderStageInfo, VertexInputInfo, MAX_SHADER_STAGES,
};
use ngf_core::{
    Backend, DeviceCapabilities, FrameStats, Handle, NgfError, ResourceType, Result,
};
use ngf_gl::{GlBackend, GlBackendInfo};
use ngf_vk::{VkBackend, VkBackendInfo};

use crate::instance::Instance;
use crate::objects::{
    Buffer, DescriptorSet, DescriptorSetLayout, GraphicsPipeline, Image, RenderTarget, Sampler,
    ShaderStage,
};

/// Which native API a context drives, with its platform glue.
pub enum BackendSelect {
    Gl(GlBackendInfo),
    Vulkan(VkBackendInfo),
}

pub struct ContextInfo<'a> {
    pub backend: BackendSelect,
    /// Share device state and objects with an existing context of the same
    /// backend and instance.
    pub shared_with: Option<&'a Context>,
}

/// Pipeline description in terms of typed objects.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineInfo<'a> {
    pub shader_stages: &'a [ShaderStage],
    pub state: PipelineState,
    pub vertex_input: VertexInputInfo,
    pub layout: PipelineLayoutInfo,
    /// Layouts created up front for `layout.sets`, in order. Empty lets the
    /// backend build its own.
    pub set_layouts: &'a [DescriptorSetLayout],
    pub compatible_render_target: RenderTarget,
    pub image_to_combined_map: Option<CombinedImageSamplerMap>,
    pub sampler_to_combined_map: Option<CombinedImageSamplerMap>,
}

/// A rendering context bound to one backend.
///
/// A context is claimed by a thread with [`make_current`](Self::make_current)
/// and stays with that thread; every other call checks the caller.
pub struct Context {
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) handles: Arc<HandlePool>,
    owner: Option<ThreadId>,
    default_rt: Option<RenderTarget>,
    pub(crate) in_frame: bool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("owner", &self.owner)
            .field("in_frame", &self.in_frame)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub(crate) fn new(instance: &Instance, info: ContextInfo<'_>) -> Result<Self> {
        let ContextInfo {
            backend,
            shared_with,
        } = info;
        let shared = match shared_with {
            Some(other) => {
                if !Arc::ptr_eq(&other.handles, &instance.handles) {
                    return Err(NgfError::invalid_op(
                        "shared contexts must come from the same instance",
                    ));
                }
                Some(other.backend.share())
            }
            None => None,
        };

        let choice = instance.config.device.backend;
        let backend: Box<dyn Backend> = match backend {
            BackendSelect::Gl(mut gl_info) => {
                if choice == BackendChoice::Vulkan {
                    return Err(NgfError::Config(
                        "configuration restricts contexts to the Vulkan backend".into(),
                    ));
                }
                if shared.is_some() {
                    gl_info.shared_with = shared;
                }
                Box::new(GlBackend::new(
                    gl_info,
                    &instance.config,
                    instance.host.clone(),
                )?)
            }
            BackendSelect::Vulkan(mut vk_info) => {
                if choice == BackendChoice::Gl {
                    return Err(NgfError::Config(
                        "configuration restricts contexts to the GL backend".into(),
                    ));
                }
                if shared.is_some() {
                    vk_info.shared_with = shared;
                }
                Box::new(VkBackend::new(
                    vk_info,
                    &instance.config,
                    instance.host.clone(),
                )?)
            }
        };

        if let Some(guard) = instance.caps.lock_for_init() {
            guard.publish(backend.capabilities());
        }

        let mut ctx = Context {
            backend,
            handles: Arc::clone(&instance.handles),
            owner: None,
            default_rt: None,
            in_frame: false,
        };
        let handle = ctx.handles.alloc()?;
        match ctx.backend.create_default_render_target(handle) {
            Ok(true) => ctx.default_rt = Some(RenderTarget { handle }),
            Ok(false) => ctx.handles.free(handle)?,
            Err(e) => {
                ctx.handles.free(handle)?;
                return Err(e);
            }
        }
        tracing::info!(
            backend = ?ctx.backend.kind(),
            presentable = ctx.default_rt.is_some(),
            "context created"
        );
        Ok(ctx)
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Claim the context for the calling thread. A claimed context cannot
    /// move to another thread.
    pub fn make_current(&mut self) -> Result<()> {
        let me = thread::current().id();
        if let Some(owner) = self.owner {
            if owner != me {
                return Err(NgfError::invalid_op(
                    "context is already current on another thread",
                ));
            }
        }
        self.backend.make_current()?;
        self.owner = Some(me);
        Ok(())
    }

    pub(crate) fn check_thread(&self) -> Result<()> {
        match self.owner {
            Some(owner) if owner == thread::current().id() => Ok(()),
            Some(_) => Err(NgfError::invalid_op(
                "context is current on another thread",
            )),
            None => Err(NgfError::invalid_op("context is not current on any thread")),
        }
    }

    pub fn capabilities(&self) -> DeviceCapabilities {
        self.backend.capabilities()
    }

    /// The presentable surface's render target, if the context has one.
    pub fn default_render_target(&self) -> Option<RenderTarget> {
        self.default_rt
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.check_thread()?;
        self.backend.resize(width, height)
    }

    pub fn begin_frame(&mut self) -> Result<()> {
        self.check_thread()?;
        if self.in_frame {
            return Err(NgfError::invalid_op("frame already in progress"));
        }
        self.backend.begin_frame()?;
        self.in_frame = true;
        Ok(())
    }

    pub fn end_frame(&mut self) -> Result<()> {
        self.check_thread()?;
        if !self.in_frame {
            return Err(NgfError::invalid_op("end_frame without begin_frame"));
        }
        self.in_frame = false;
        self.backend.end_frame()
    }

    /// Counters for the last completed frame.
    pub fn frame_stats(&self) -> FrameStats {
        self.backend.frame_stats()
    }

    /// Mint a handle and let `create` register the object under it. The
    /// handle goes back to the pool if creation fails.
    fn create_with<F>(&mut self, kind: ResourceType, create: F) -> Result<Handle>
    where
        F: FnOnce(&mut dyn Backend, Handle) -> Result<()>,
    {
        self.check_thread()?;
        let handle = self.handles.alloc()?;
        if let Err(e) = create(&mut *self.backend, handle) {
            tracing::debug!(%kind, error = %e, "object creation failed");
            self.handles.free(handle)?;
            return Err(e);
        }
        Ok(handle)
    }

    fn destroy_with<F>(&mut self, handle: Handle, destroy: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Backend, Handle),
    {
        self.check_thread()?;
        self.handles.free(handle)?;
        destroy(&mut *self.backend, handle);
        Ok(())
    }

    // ── Objects ─────────────────────────────────────────────

    pub fn create_shader_stage(&mut self, info: &ShaderStageInfo) -> Result<ShaderStage> {
        let handle = self.create_with(ResourceType::ShaderStage, |b, h| {
            b.create_shader_stage(h, info)
        })?;
        Ok(ShaderStage {
            handle,
            ty: info.ty,
        })
    }

    pub fn destroy_shader_stage(&mut self, stage: ShaderStage) -> Result<()> {
        self.destroy_with(stage.handle, |b, h| b.destroy_shader_stage(h))
    }

    pub fn create_graphics_pipeline(
        &mut self,
        info: &GraphicsPipelineInfo<'_>,
    ) -> Result<GraphicsPipeline> {
        if info.shader_stages.len() > MAX_SHADER_STAGES {
            return Err(NgfError::OutOfBounds(format!(
                "{} shader stages given, at most {MAX_SHADER_STAGES} allowed",
                info.shader_stages.len()
            )));
        }
        let desc = GraphicsPipelineDesc {
            shader_stages: info.shader_stages.iter().map(|s| s.handle).collect(),
            state: info.state,
            vertex_input: info.vertex_input.clone(),
            layout: info.layout.clone(),
            set_layouts: info.set_layouts.iter().map(|l| l.handle).collect(),
            compatible_render_target: info.compatible_render_target.handle,
            image_to_combined_map: info.image_to_combined_map.clone(),
            sampler_to_combined_map: info.sampler_to_combined_map.clone(),
        };
        let handle = self.create_with(ResourceType::GraphicsPipeline, |b, h| {
            b.create_graphics_pipeline(h, &desc)
        })?;
        Ok(GraphicsPipeline { handle })
    }

    pub fn destroy_graphics_pipeline(&mut self, pipeline: GraphicsPipeline) -> Result<()> {
        self.destroy_with(pipeline.handle, |b, h| b.destroy_graphics_pipeline(h))
    }

    pub fn create_image(&mut self, info: &ImageInfo) -> Result<Image> {
        let handle = self.create_with(ResourceType::Image, |b, h| b.create_image(h, info))?;
        Ok(Image {
            handle,
            info: *info,
        })
    }

    pub fn destroy_image(&mut self, image: Image) -> Result<()> {
        self.destroy_with(image.handle, |b, h| b.destroy_image(h))
    }

    pub fn create_sampler(&mut self, info: &SamplerInfo) -> Result<Sampler> {
        let handle = self.create_with(ResourceType::Sampler, |b, h| b.create_sampler(h, info))?;
        Ok(Sampler { handle })
    }

    pub fn destroy_sampler(&mut self, sampler: Sampler) -> Result<()> {
        self.destroy_with(sampler.handle, |b, h| b.destroy_sampler(h))
    }

    pub fn create_render_target(&mut self, info: &RenderTargetInfo) -> Result<RenderTarget> {
        let handle = self.create_with(ResourceType::RenderTarget, |b, h| {
            b.create_render_target(h, info)
        })?;
        Ok(RenderTarget { handle })
    }

    pub fn destroy_render_target(&mut self, target: RenderTarget) -> Result<()> {
        if self.default_rt == Some(target) {
            return Err(NgfError::invalid_op(
                "the default render target is owned by its context",
            ));
        }
        self.destroy_with(target.handle, |b, h| b.destroy_render_target(h))
    }

    pub fn create_buffer(&mut self, info: &BufferInfo) -> Result<Buffer> {
        let handle = self.create_with(ResourceType::Buffer, |b, h| b.create_buffer(h, info))?;
        Ok(Buffer {
            handle,
            info: *info,
        })
    }

    pub fn destroy_buffer(&mut self, buffer: Buffer) -> Result<()> {
        self.destroy_with(buffer.handle, |b, h| b.destroy_buffer(h))
    }

    /// Copy `data` into a host-visible buffer.
    pub fn write_buffer(&mut self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<()> {
        self.check_thread()?;
        self.backend.write_buffer(buffer.handle, offset, data)
    }

    pub fn read_buffer(&mut self, buffer: &Buffer, offset: u64, out: &mut [u8]) -> Result<()> {
        self.check_thread()?;
        self.backend.read_buffer(buffer.handle, offset, out)
    }

    pub fn create_descriptor_set_layout(
        &mut self,
        info: &DescriptorSetLayoutInfo,
    ) -> Result<DescriptorSetLayout> {
        let handle = self.create_with(ResourceType::DescriptorSetLayout, |b, h| {
            b.create_descriptor_set_layout(h, info)
        })?;
        Ok(DescriptorSetLayout { handle })
    }

    pub fn destroy_descriptor_set_layout(&mut self, layout: DescriptorSetLayout) -> Result<()> {
        self.destroy_with(layout.handle, |b, h| b.destroy_descriptor_set_layout(h))
    }

    pub fn create_descriptor_set(&mut self, layout: &DescriptorSetLayout) -> Result<DescriptorSet> {
        let handle = self.create_with(ResourceType::DescriptorSet, |b, h| {
            b.create_descriptor_set(h, layout.handle)
        })?;
        Ok(DescriptorSet { handle })
    }

    pub fn destroy_descriptor_set(&mut self, set: DescriptorSet) -> Result<()> {
        self.destroy_with(set.handle, |b, h| b.destroy_descriptor_set(h))
    }

    /// Apply a batch of writes. The batch is checked against the layout as a
    /// whole; on error the set is unchanged.
    pub fn apply_descriptor_writes(
        &mut self,
        set: &DescriptorSet,
        writes: &[DescriptorWrite],
    ) -> Result<()> {
        self.check_thread()?;
        self.backend.apply_descriptor_writes(set.handle, writes)
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Some(rt) = self.default_rt.take() {
            self.backend.destroy_render_target(rt.handle);
            if let Err(e) = self.handles.free(rt.handle) {
                tracing::warn!(error = %e, "default render target handle already released");
            }
        }
        tracing::info!(backend = ?self.backend.kind(), "context destroyed");
    }
}
