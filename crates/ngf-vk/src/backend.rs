use std::any::Any;
use std::ffi::CString;
use std::io::Cursor;
use std::sync::Arc;

use ash::vk;
use ngf_core::descriptor::{validate_layout, DescriptorWrite, EmulatedDescriptorSet};
use ngf_core::types::{
    AttachmentType, BackendKind, BufferInfo, DescriptorSetLayoutInfo, GraphicsPipelineDesc,
    ImageInfo, ImageRef, ImageType, PrimitiveTopology, RenderTargetInfo, SamplerInfo,
    ShaderStageInfo, SwapchainInfo,
};
use ngf_core::{
    Backend, DeviceCapabilities, FrameStats, Handle, HostAllocator, NgfConfig, NgfError,
    RenderCommand, ResourceType, Result, SharedBackendState, SubmitError,
};

use crate::cmd::{self, CommandPool, RetiredCmdBuffer, SwapchainTarget};
use crate::convert;
use crate::descriptor::{create_set_layout, NativeWrites};
use crate::device::VkShared;
use crate::memory::{storage_flags, Allocation};
use crate::objects::{
    Retired, VkBuffer, VkCmdBuffer, VkDescriptorSet, VkImage, VkPipeline, VkRenderTarget,
    VkSetLayout, VkShaderStage,
};
use crate::pass::create_render_pass;
use crate::swapchain::{SurfaceSource, Swapchain};
use crate::sync::{FrameSyncRing, SyncDevice};
use crate::vk_err;

pub struct VkBackendInfo {
    /// Window-system surface to present to. Requires `swapchain`.
    pub surface: Option<Box<dyn SurfaceSource>>,
    pub swapchain: Option<SwapchainInfo>,
    pub shared_with: Option<SharedBackendState>,
}

/// Fences and deferred releases go through the shared device.
struct NativeSync {
    shared: Arc<VkShared>,
}

impl SyncDevice for NativeSync {
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;
    type CmdBuffer = RetiredCmdBuffer;
    type Object = Retired;

    fn create_fence(&self) -> Result<vk::Fence> {
        unsafe {
            self.shared
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)
        }
        .map_err(vk_err)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.shared.device.destroy_fence(fence, None) };
    }

    fn wait_fence(&self, fence: vk::Fence, timeout_ns: u64) -> Result<bool> {
        match unsafe { self.shared.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(vk_err(e)),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.shared.device.reset_fences(&[fence]) }.map_err(vk_err)
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        unsafe {
            self.shared
                .device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
        .map_err(vk_err)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.shared.device.destroy_semaphore(semaphore, None) };
    }

    fn free_cmd_buffers(&self, cmd_buffers: Vec<RetiredCmdBuffer>) {
        for cb in cmd_buffers {
            cb.pool.free(cb.raw);
        }
    }

    fn destroy_object(&self, object: Retired) {
        object.destroy(&self.shared);
    }
}

pub struct VkBackend {
    // Dropped before `sync`, which may hold the last reference to the device.
    pool: Arc<CommandPool>,
    ring: FrameSyncRing<NativeSync>,
    swapchain: Option<Swapchain>,
    default_rt: Option<Handle>,
    /// Image acquired for the frame in progress and the semaphore that
    /// signals it.
    acquired: Option<(u32, vk::Semaphore)>,
    /// Native buffers submitted this frame, in order.
    pending: Vec<vk::CommandBuffer>,
    sync: NativeSync,
    timeout_ns: u64,
    frame: u64,
    in_frame: bool,
    current: FrameStats,
    last: FrameStats,
}

fn destroy_surface(shared: &VkShared, surface: Option<vk::SurfaceKHR>) {
    if let Some(surface) = surface {
        unsafe { shared.surface_loader.destroy_surface(surface, None) };
    }
}

impl VkBackend {
    pub fn new(info: VkBackendInfo, config: &NgfConfig, host: HostAllocator) -> Result<Self> {
        let VkBackendInfo {
            surface,
            swapchain,
            shared_with,
        } = info;
        if surface.is_some() != swapchain.is_some() {
            return Err(NgfError::invalid_op(
                "a presentable context needs both a surface and swapchain info",
            ));
        }

        let (shared, raw_surface) = match shared_with {
            Some(state) => {
                if state.kind != BackendKind::Vulkan {
                    return Err(NgfError::invalid_op(
                        "cannot share a Vulkan context with a non-Vulkan context",
                    ));
                }
                let shared = state
                    .state
                    .downcast::<VkShared>()
                    .map_err(|_| NgfError::invalid_op("shared state is not Vulkan state"))?;
                let raw = match &surface {
                    Some(source) => Some(source.create_surface(&shared.entry, &shared.instance)?),
                    None => None,
                };
                (shared, raw)
            }
            None => {
                let created =
                    VkShared::create(config, config.device.preference, surface.as_deref(), host)?;
                (Arc::new(created.shared), created.surface)
            }
        };

        let sync = NativeSync {
            shared: Arc::clone(&shared),
        };
        let pool = match CommandPool::new(&shared.device, shared.queue_family) {
            Ok(pool) => pool,
            Err(e) => {
                destroy_surface(&shared, raw_surface);
                return Err(e);
            }
        };
        let timeout_ns = config.fence_timeout_ns();
        let mut ring =
            match FrameSyncRing::new(&sync, config.frames.max_inflight_frames, timeout_ns) {
                Ok(ring) => ring,
                Err(e) => {
                    destroy_surface(&shared, raw_surface);
                    return Err(e);
                }
            };
        let swapchain = match (raw_surface, swapchain) {
            (Some(raw), Some(sc_info)) => match Swapchain::new(&shared, raw, &sc_info) {
                Ok(sc) => Some(sc),
                Err(e) => {
                    if let Err(ring_err) = ring.destroy(&sync) {
                        tracing::warn!(error = %ring_err, "frame ring teardown failed");
                    }
                    return Err(e);
                }
            },
            _ => None,
        };

        tracing::info!(
            device = %shared.caps.device_name,
            shared = Arc::strong_count(&shared) > 2,
            frames_in_flight = ring.len(),
            presentable = swapchain.is_some(),
            "Vulkan context created"
        );

        Ok(Self {
            pool,
            ring,
            swapchain,
            default_rt: None,
            acquired: None,
            pending: Vec::new(),
            sync,
            timeout_ns,
            frame: 0,
            in_frame: false,
            current: FrameStats::default(),
            last: FrameStats::default(),
        })
    }

    /// Device state shared with other contexts.
    pub fn shared(&self) -> &Arc<VkShared> {
        &self.sync.shared
    }

    fn build_pipeline(&self, desc: &GraphicsPipelineDesc, out: &mut VkPipeline) -> Result<()> {
        let shared = &*self.sync.shared;
        let device = &shared.device;

        let mut stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule, CString)> =
            Vec::with_capacity(desc.shader_stages.len());
        for handle in &desc.shader_stages {
            let stage = shared
                .shader_stages
                .get(handle)
                .ok_or(NgfError::InvalidHandle(*handle))?;
            stages.push((
                convert::shader_stage(stage.ty),
                stage.module,
                stage.entry_point.clone(),
            ));
        }
        let stage_infos: Vec<vk::PipelineShaderStageCreateInfo> = stages
            .iter()
            .map(|(flags, module, entry)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(*flags)
                    .module(*module)
                    .name(entry.as_c_str())
            })
            .collect();

        let set_layouts: Vec<vk::DescriptorSetLayout> = if desc.set_layouts.is_empty() {
            for set in &desc.layout.sets {
                validate_layout(set)?;
                out.owned_set_layouts.push(create_set_layout(device, set)?);
            }
            out.owned_set_layouts.clone()
        } else {
            if desc.set_layouts.len() != desc.layout.sets.len() {
                return Err(NgfError::creation(
                    ResourceType::GraphicsPipeline,
                    format!(
                        "{} set layout handles for {} sets",
                        desc.set_layouts.len(),
                        desc.layout.sets.len()
                    ),
                ));
            }
            desc.set_layouts
                .iter()
                .map(|h| {
                    shared
                        .set_layouts
                        .get(h)
                        .map(|l| l.raw)
                        .ok_or(NgfError::InvalidHandle(*h))
                })
                .collect::<Result<_>>()?
        };
        let layout_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        out.layout =
            unsafe { device.create_pipeline_layout(&layout_info, None) }.map_err(vk_err)?;

        let (render_pass, color_count) = {
            let rt = shared
                .render_targets
                .get(&desc.compatible_render_target)
                .ok_or(NgfError::InvalidHandle(desc.compatible_render_target))?;
            let colors = rt
                .attachments
                .iter()
                .filter(|a| a.ty == AttachmentType::Color)
                .count();
            (rt.render_pass, colors)
        };

        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc
            .vertex_input
            .bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: match b.input_rate {
                    ngf_core::types::InputRate::Vertex => vk::VertexInputRate::VERTEX,
                    ngf_core::types::InputRate::Instance => vk::VertexInputRate::INSTANCE,
                },
            })
            .collect();
        let mut vertex_attribs = Vec::with_capacity(desc.vertex_input.attribs.len());
        for a in &desc.vertex_input.attribs {
            let format = convert::vertex_format(a.ty, a.size, a.normalized).ok_or_else(|| {
                NgfError::creation(
                    ResourceType::GraphicsPipeline,
                    format!("no vertex format for {:?} x{}", a.ty, a.size),
                )
            })?;
            vertex_attribs.push(vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format,
                offset: a.offset,
            });
        }
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attribs);

        let state = &desc.state;
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(convert::topology(state.topology));
        let tessellation = vk::PipelineTessellationStateCreateInfo::default()
            .patch_control_points(state.tessellation.patch_vertices);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let raster = &state.rasterization;
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .rasterizer_discard_enable(raster.discard)
            .polygon_mode(convert::polygon_mode(raster.polygon_mode))
            .cull_mode(convert::cull_mode(raster.cull_mode))
            .front_face(convert::front_face(raster.front_face))
            .line_width(raster.line_width);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(convert::sample_count(state.multisample.sample_count))
            .alpha_to_coverage_enable(state.multisample.alpha_to_coverage);
        let ds = &state.depth_stencil;
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(ds.depth_test)
            .depth_write_enable(ds.depth_write)
            .depth_compare_op(convert::compare_op(ds.depth_compare))
            .stencil_test_enable(ds.stencil_test)
            .front(convert::stencil_state(&ds.front_stencil))
            .back(convert::stencil_state(&ds.back_stencil));
        let blend = &state.blend;
        let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(blend.enable)
            .src_color_blend_factor(convert::blend_factor(blend.src_color_factor))
            .dst_color_blend_factor(convert::blend_factor(blend.dst_color_factor))
            .color_blend_op(convert::blend_op(blend.color_op))
            .src_alpha_blend_factor(convert::blend_factor(blend.src_alpha_factor))
            .dst_alpha_blend_factor(convert::blend_factor(blend.dst_alpha_factor))
            .alpha_blend_op(convert::blend_op(blend.alpha_op))
            .color_write_mask(convert::color_mask(blend.color_write_mask));
        let blend_attachments = vec![blend_attachment; color_count];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(&blend_attachments)
            .blend_constants(blend.constants);
        let dynamic_states = [
            vk::DynamicState::VIEWPORT,
            vk::DynamicState::SCISSOR,
            vk::DynamicState::LINE_WIDTH,
            vk::DynamicState::BLEND_CONSTANTS,
            vk::DynamicState::STENCIL_COMPARE_MASK,
            vk::DynamicState::STENCIL_WRITE_MASK,
            vk::DynamicState::STENCIL_REFERENCE,
        ];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stage_infos)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(out.layout)
            .render_pass(render_pass)
            .subpass(0);
        if state.topology == PrimitiveTopology::PatchList {
            create_info = create_info.tessellation_state(&tessellation);
        }

        let created = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        };
        match created {
            Ok(pipelines) => {
                out.raw = pipelines.into_iter().next().ok_or_else(|| {
                    NgfError::creation(ResourceType::GraphicsPipeline, "driver returned nothing")
                })?;
                Ok(())
            }
            Err((pipelines, e)) => {
                for p in pipelines {
                    if p != vk::Pipeline::null() {
                        unsafe { device.destroy_pipeline(p, None) };
                    }
                }
                Err(vk_err(e))
            }
        }
    }

    fn build_image(&self, info: &ImageInfo, out: &mut VkImage) -> Result<()> {
        let shared = &*self.sync.shared;
        let device = &shared.device;
        let layers = info.nlayers.max(1);
        let (image_type, view_type, array_layers, flags) = match info.ty {
            ImageType::Image2d => (
                vk::ImageType::TYPE_2D,
                if layers > 1 {
                    vk::ImageViewType::TYPE_2D_ARRAY
                } else {
                    vk::ImageViewType::TYPE_2D
                },
                layers,
                vk::ImageCreateFlags::empty(),
            ),
            ImageType::Image3d => (
                vk::ImageType::TYPE_3D,
                vk::ImageViewType::TYPE_3D,
                1,
                vk::ImageCreateFlags::empty(),
            ),
            ImageType::Cube => (
                vk::ImageType::TYPE_2D,
                if layers > 1 {
                    vk::ImageViewType::CUBE_ARRAY
                } else {
                    vk::ImageViewType::CUBE
                },
                layers * 6,
                vk::ImageCreateFlags::CUBE_COMPATIBLE,
            ),
        };
        let depth = if info.ty == ImageType::Image3d {
            info.extent.depth.max(1)
        } else {
            1
        };
        let format = convert::format(info.format);
        let create_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(image_type)
            .format(format)
            .extent(vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth,
            })
            .mip_levels(info.nmips.max(1))
            .array_layers(array_layers)
            .samples(convert::sample_count(info.sample_count))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(convert::image_usage(info.usage, info.format))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        out.raw = unsafe { device.create_image(&create_info, None) }.map_err(vk_err)?;

        let reqs = unsafe { device.get_image_memory_requirements(out.raw) };
        let memory = Allocation::allocate(
            device,
            &shared.memory_props,
            reqs,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::empty(),
        )?;
        let bound = unsafe { device.bind_image_memory(out.raw, memory.memory, 0) };
        out.memory = Some(memory);
        bound.map_err(vk_err)?;

        // Sampling reads depth only.
        let view_aspect = if info.format.is_depth() {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let view_info = vk::ImageViewCreateInfo::default()
            .image(out.raw)
            .view_type(view_type)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: view_aspect,
                base_mip_level: 0,
                level_count: info.nmips.max(1),
                base_array_layer: 0,
                layer_count: array_layers,
            });
        out.view = unsafe { device.create_image_view(&view_info, None) }.map_err(vk_err)?;
        Ok(())
    }

    fn build_render_target(&self, info: &RenderTargetInfo, out: &mut VkRenderTarget) -> Result<()> {
        let shared = &*self.sync.shared;
        let device = &shared.device;
        let mut pass_attachments = Vec::with_capacity(info.attachments.len());
        let mut extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        for (att, image_ref) in info.attachments.iter().zip(&info.images) {
            let (raw, image_info) = {
                let image = shared
                    .images
                    .get(&image_ref.image)
                    .ok_or(NgfError::InvalidHandle(image_ref.image))?;
                (image.raw, image.info)
            };
            let view = attachment_view(device, raw, &image_info, att.ty, image_ref)?;
            out.views.push(view);
            let mip_width = (image_info.extent.width >> image_ref.mip_level).max(1);
            extent.width = extent.width.min(mip_width);
            let mip_height = (image_info.extent.height >> image_ref.mip_level).max(1);
            extent.height = extent.height.min(mip_height);
            pass_attachments.push((*att, convert::format(att.format)));
        }
        if out.views.is_empty() {
            return Err(NgfError::creation(
                ResourceType::RenderTarget,
                "render target has no attachments",
            ));
        }
        out.extent = extent;
        out.render_pass = create_render_pass(device, &pass_attachments, false)?;
        let fb_info = vk::FramebufferCreateInfo::default()
            .render_pass(out.render_pass)
            .attachments(&out.views)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        out.framebuffer = unsafe { device.create_framebuffer(&fb_info, None) }.map_err(vk_err)?;
        Ok(())
    }

    fn build_buffer(&self, info: &BufferInfo) -> Result<VkBuffer> {
        let shared = &*self.sync.shared;
        let device = &shared.device;
        let create_info = vk::BufferCreateInfo::default()
            .size(info.size)
            .usage(convert::buffer_usage(info.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let raw = unsafe { device.create_buffer(&create_info, None) }.map_err(vk_err)?;
        let reqs = unsafe { device.get_buffer_memory_requirements(raw) };
        let (required, preferred) = storage_flags(info.storage);
        let memory =
            match Allocation::allocate(device, &shared.memory_props, reqs, required, preferred) {
                Ok(memory) => memory,
                Err(e) => {
                    unsafe { device.destroy_buffer(raw, None) };
                    return Err(e);
                }
            };
        if let Err(e) = unsafe { device.bind_buffer_memory(raw, memory.memory, 0) } {
            unsafe { device.destroy_buffer(raw, None) };
            memory.free(device);
            return Err(vk_err(e));
        }
        Ok(VkBuffer {
            raw,
            memory,
            info: *info,
        })
    }

    fn check_host_range(&self, handle: Handle, offset: u64, len: usize) -> Result<()> {
        let buffer = self
            .sync
            .shared
            .buffers
            .get(&handle)
            .ok_or(NgfError::InvalidHandle(handle))?;
        if !buffer.info.storage.is_host_visible() || !buffer.memory.is_mapped() {
            return Err(NgfError::invalid_op(format!(
                "buffer {handle} is not host-visible"
            )));
        }
        if offset.saturating_add(len as u64) > buffer.info.size {
            return Err(NgfError::OutOfBounds(format!(
                "range {offset}+{len} exceeds buffer size {}",
                buffer.info.size
            )));
        }
        Ok(())
    }

    fn swapchain_target(&self) -> Option<SwapchainTarget> {
        let handle = self.default_rt?;
        let sc = self.swapchain.as_ref()?;
        Some(SwapchainTarget {
            handle,
            framebuffer: self.acquired.and_then(|(index, _)| sc.framebuffer(index)),
        })
    }

    fn retire(&mut self, object: Retired) {
        self.ring.retire_object(&self.sync, object);
    }
}

/// Single-subresource view of the image an attachment renders into.
fn attachment_view(
    device: &ash::Device,
    image: vk::Image,
    info: &ImageInfo,
    ty: AttachmentType,
    image_ref: &ImageRef,
) -> Result<vk::ImageView> {
    let layer = match info.ty {
        ImageType::Image2d => image_ref.layer,
        ImageType::Cube => image_ref.layer * 6 + image_ref.cubemap_face,
        ImageType::Image3d => {
            return Err(NgfError::Unsupported(
                "3D images cannot be render target attachments".into(),
            ))
        }
    };
    let aspect = match ty {
        AttachmentType::Color => vk::ImageAspectFlags::COLOR,
        AttachmentType::Depth => vk::ImageAspectFlags::DEPTH,
        AttachmentType::DepthStencil => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
    };
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(convert::format(info.format))
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: image_ref.mip_level,
            level_count: 1,
            base_array_layer: layer,
            layer_count: 1,
        });
    unsafe { device.create_image_view(&view_info, None) }.map_err(vk_err)
}

impl Backend for VkBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.sync.shared.caps.clone()
    }

    fn share(&self) -> SharedBackendState {
        SharedBackendState {
            kind: BackendKind::Vulkan,
            state: Arc::clone(&self.sync.shared) as Arc<dyn Any + Send + Sync>,
        }
    }

    fn make_current(&mut self) -> Result<()> {
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let Some(sc) = self.swapchain.as_mut() else {
            return Ok(());
        };
        if self.in_frame {
            return Err(NgfError::invalid_op("cannot resize while a frame is in progress"));
        }
        self.ring.wait_idle(&self.sync)?;
        self.sync.shared.wait_idle();
        sc.resize(&self.sync.shared, width, height)?;
        if let Some(handle) = self.default_rt {
            if let Some(mut rt) = self.sync.shared.render_targets.get_mut(&handle) {
                rt.extent = sc.extent();
            }
        }
        tracing::debug!(width, height, "Vulkan swapchain resized");
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<()> {
        if self.in_frame {
            return Err(NgfError::invalid_op("frame already in progress"));
        }
        let waits_before = self.ring.fence_waits();
        self.ring.begin_frame(&self.sync, self.frame)?;
        self.current = FrameStats {
            frame: self.frame,
            fence_waits: (self.ring.fence_waits() - waits_before) as u32,
            ..FrameStats::default()
        };
        if let Some(sc) = self.swapchain.as_mut() {
            let (index, semaphore) = sc.acquire(&self.sync.shared, self.timeout_ns)?;
            self.ring.add_wait_semaphore(semaphore)?;
            self.acquired = Some((index, semaphore));
        }
        self.in_frame = true;
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        if !self.in_frame {
            return Err(NgfError::invalid_op("no frame in progress"));
        }
        self.in_frame = false;
        let shared = Arc::clone(&self.sync.shared);
        let device = &shared.device;

        // Presentation waits on one semaphore per submitted buffer.
        let signals = match self.acquired {
            Some(_) => self
                .ring
                .create_signal_semaphores(&self.sync, self.pending.len().max(1))?,
            None => Vec::new(),
        };
        let record = self
            .ring
            .current()
            .ok_or_else(|| NgfError::invalid_op("no frame in progress"))?;
        let waits = record.wait_semaphores().to_vec();
        let fence = record.fence();
        let wait_stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; waits.len()];
        let cmd_buffers = std::mem::take(&mut self.pending);
        // Submitted even when empty so the frame fence is signalled.
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&cmd_buffers)
            .signal_semaphores(&signals);
        {
            let queue = shared.queue.lock();
            unsafe { device.queue_submit(*queue, &[submit], fence) }.map_err(vk_err)?;
        }
        self.ring.mark_submitted()?;

        if let (Some((index, _)), Some(sc)) = (self.acquired.take(), self.swapchain.as_ref()) {
            sc.present(&shared, index, &signals)?;
        }
        self.last = self.current;
        tracing::trace!(
            frame = self.frame,
            submitted = self.last.submitted_cmd_buffers,
            fence_waits = self.last.fence_waits,
            "Vulkan frame finished"
        );
        self.frame += 1;
        Ok(())
    }

    fn frame_stats(&self) -> FrameStats {
        self.last
    }

    fn create_default_render_target(&mut self, handle: Handle) -> Result<bool> {
        let Some(sc) = &self.swapchain else {
            return Ok(false);
        };
        self.sync.shared.render_targets.insert(
            handle,
            VkRenderTarget {
                render_pass: sc.render_pass(),
                framebuffer: vk::Framebuffer::null(),
                views: Vec::new(),
                extent: sc.extent(),
                attachments: sc.attachments(),
            },
        );
        self.default_rt = Some(handle);
        Ok(true)
    }

    fn create_shader_stage(&mut self, handle: Handle, info: &ShaderStageInfo) -> Result<()> {
        let code = ash::util::read_spv(&mut Cursor::new(&info.content)).map_err(|e| {
            NgfError::creation(ResourceType::ShaderStage, format!("invalid SPIR-V: {e}"))
        })?;
        let entry_point = CString::new(info.entry_point.as_str()).map_err(|_| {
            NgfError::creation(ResourceType::ShaderStage, "entry point contains a NUL byte")
        })?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { self.sync.shared.device.create_shader_module(&create_info, None) }
            .map_err(|e| {
                tracing::error!(
                    stage = ?info.ty,
                    name = info.debug_name.as_deref().unwrap_or(""),
                    "shader module creation failed: {:?}",
                    e
                );
                vk_err(e)
            })?;
        self.sync.shared.shader_stages.insert(
            handle,
            VkShaderStage {
                module,
                ty: info.ty,
                entry_point,
            },
        );
        tracing::debug!(%handle, stage = ?info.ty, words = code.len(), "created shader stage");
        Ok(())
    }

    fn destroy_shader_stage(&mut self, handle: Handle) {
        if let Some((_, stage)) = self.sync.shared.shader_stages.remove(&handle) {
            self.retire(Retired::ShaderModule(stage.module));
        }
    }

    fn create_graphics_pipeline(
        &mut self,
        handle: Handle,
        desc: &GraphicsPipelineDesc,
    ) -> Result<()> {
        let mut pipeline = VkPipeline {
            raw: vk::Pipeline::null(),
            layout: vk::PipelineLayout::null(),
            owned_set_layouts: Vec::new(),
            state: desc.state,
        };
        if let Err(e) = self.build_pipeline(desc, &mut pipeline) {
            // Null handles are ignored by the destroy calls.
            Retired::Pipeline(pipeline).destroy(&self.sync.shared);
            return Err(e);
        }
        tracing::debug!(%handle, stages = desc.shader_stages.len(), "created graphics pipeline");
        self.sync.shared.pipelines.insert(handle, pipeline);
        Ok(())
    }

    fn destroy_graphics_pipeline(&mut self, handle: Handle) {
        if let Some((_, pipeline)) = self.sync.shared.pipelines.remove(&handle) {
            self.retire(Retired::Pipeline(pipeline));
        }
    }

    fn create_image(&mut self, handle: Handle, info: &ImageInfo) -> Result<()> {
        let mut image = VkImage {
            raw: vk::Image::null(),
            view: vk::ImageView::null(),
            memory: None,
            info: *info,
            aspect: convert::aspect(info.format),
        };
        if let Err(e) = self.build_image(info, &mut image) {
            Retired::Image(image).destroy(&self.sync.shared);
            return Err(e);
        }
        tracing::debug!(%handle, format = ?info.format, ty = ?info.ty, "created image");
        self.sync.shared.images.insert(handle, image);
        Ok(())
    }

    fn destroy_image(&mut self, handle: Handle) {
        if let Some((_, image)) = self.sync.shared.images.remove(&handle) {
            self.retire(Retired::Image(image));
        }
    }

    fn create_sampler(&mut self, handle: Handle, info: &SamplerInfo) -> Result<()> {
        let anisotropy = info.max_anisotropy > 1.0;
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(convert::filter(info.mag_filter))
            .min_filter(convert::filter(info.min_filter))
            .mipmap_mode(convert::mipmap_mode(info.mip_filter))
            .address_mode_u(convert::wrap_mode(info.wrap_u))
            .address_mode_v(convert::wrap_mode(info.wrap_v))
            .address_mode_w(convert::wrap_mode(info.wrap_w))
            .mip_lod_bias(info.lod_bias)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(info.max_anisotropy.max(1.0))
            .compare_enable(info.compare_op.is_some())
            .compare_op(info.compare_op.map_or(vk::CompareOp::ALWAYS, convert::compare_op))
            .min_lod(info.lod_min)
            .max_lod(info.lod_max);
        let sampler = unsafe { self.sync.shared.device.create_sampler(&create_info, None) }
            .map_err(vk_err)?;
        self.sync.shared.samplers.insert(handle, sampler);
        Ok(())
    }

    fn destroy_sampler(&mut self, handle: Handle) {
        if let Some((_, sampler)) = self.sync.shared.samplers.remove(&handle) {
            self.retire(Retired::Sampler(sampler));
        }
    }

    fn create_render_target(&mut self, handle: Handle, info: &RenderTargetInfo) -> Result<()> {
        if info.attachments.len() != info.images.len() {
            return Err(NgfError::creation(
                ResourceType::RenderTarget,
                format!(
                    "{} attachment descriptions but {} images",
                    info.attachments.len(),
                    info.images.len()
                ),
            ));
        }
        let mut rt = VkRenderTarget {
            render_pass: vk::RenderPass::null(),
            framebuffer: vk::Framebuffer::null(),
            views: Vec::with_capacity(info.images.len()),
            extent: vk::Extent2D::default(),
            attachments: info.attachments.clone(),
        };
        if let Err(e) = self.build_render_target(info, &mut rt) {
            unsafe { rt.destroy(&self.sync.shared.device) };
            return Err(e);
        }
        tracing::debug!(
            %handle,
            width = rt.extent.width,
            height = rt.extent.height,
            "created render target"
        );
        self.sync.shared.render_targets.insert(handle, rt);
        Ok(())
    }

    fn destroy_render_target(&mut self, handle: Handle) {
        let Some((_, rt)) = self.sync.shared.render_targets.remove(&handle) else {
            return;
        };
        if self.default_rt == Some(handle) {
            // The swapchain owns the default target's render pass.
            self.default_rt = None;
            return;
        }
        self.retire(Retired::RenderTarget(rt));
    }

    fn create_buffer(&mut self, handle: Handle, info: &BufferInfo) -> Result<()> {
        if info.size == 0 {
            return Err(NgfError::creation(ResourceType::Buffer, "buffer size is zero"));
        }
        let buffer = self.build_buffer(info)?;
        self.sync.shared.buffers.insert(handle, buffer);
        tracing::debug!(%handle, size = info.size, storage = ?info.storage, "created buffer");
        Ok(())
    }

    fn destroy_buffer(&mut self, handle: Handle) {
        if let Some((_, buffer)) = self.sync.shared.buffers.remove(&handle) {
            self.retire(Retired::Buffer(buffer));
        }
    }

    fn write_buffer(&mut self, handle: Handle, offset: u64, data: &[u8]) -> Result<()> {
        self.check_host_range(handle, offset, data.len())?;
        if let Some(mut buffer) = self.sync.shared.buffers.get_mut(&handle) {
            buffer.memory.write(offset, data);
        }
        Ok(())
    }

    fn read_buffer(&mut self, handle: Handle, offset: u64, out: &mut [u8]) -> Result<()> {
        self.check_host_range(handle, offset, out.len())?;
        if let Some(buffer) = self.sync.shared.buffers.get(&handle) {
            buffer.memory.read(offset, out);
        }
        Ok(())
    }

    fn create_descriptor_set_layout(
        &mut self,
        handle: Handle,
        info: &DescriptorSetLayoutInfo,
    ) -> Result<()> {
        validate_layout(info)?;
        let raw = create_set_layout(&self.sync.shared.device, info)?;
        self.sync.shared.set_layouts.insert(
            handle,
            VkSetLayout {
                raw,
                info: info.clone(),
            },
        );
        Ok(())
    }

    fn destroy_descriptor_set_layout(&mut self, handle: Handle) {
        if let Some((_, layout)) = self.sync.shared.set_layouts.remove(&handle) {
            self.retire(Retired::SetLayout(layout.raw));
        }
    }

    fn create_descriptor_set(&mut self, handle: Handle, layout: Handle) -> Result<()> {
        let shared = &*self.sync.shared;
        let (raw_layout, emulated) = {
            let layout_entry = shared
                .set_layouts
                .get(&layout)
                .ok_or(NgfError::InvalidHandle(layout))?;
            (
                layout_entry.raw,
                EmulatedDescriptorSet::new(&layout_entry.info, &shared.host)?,
            )
        };
        let (pool, raw) = shared
            .descriptor_pools
            .lock()
            .allocate(&shared.device, raw_layout)?;
        shared.descriptor_sets.insert(
            handle,
            VkDescriptorSet {
                raw,
                pool,
                emulated,
            },
        );
        Ok(())
    }

    fn destroy_descriptor_set(&mut self, handle: Handle) {
        if let Some((_, set)) = self.sync.shared.descriptor_sets.remove(&handle) {
            self.retire(Retired::DescriptorSet(set));
        }
    }

    fn apply_descriptor_writes(&mut self, set: Handle, writes: &[DescriptorWrite]) -> Result<()> {
        let shared = &*self.sync.shared;
        let native = NativeWrites::resolve(shared, writes)?;
        let mut entry = shared
            .descriptor_sets
            .get_mut(&set)
            .ok_or(NgfError::InvalidHandle(set))?;
        entry.emulated.apply_writes(writes)?;
        native.apply(&shared.device, entry.raw);
        Ok(())
    }

    fn cmd_buffer_create(&mut self, handle: Handle) -> Result<()> {
        self.sync.shared.cmd_buffers.insert(
            handle,
            VkCmdBuffer {
                pool: Arc::clone(&self.pool),
                native: None,
                in_pass: false,
                pipeline: None,
                index_bound: false,
            },
        );
        Ok(())
    }

    fn cmd_buffer_reset(&mut self, handle: Handle) -> Result<()> {
        let shared = &*self.sync.shared;
        let mut cb = shared
            .cmd_buffers
            .get_mut(&handle)
            .ok_or(NgfError::InvalidHandle(handle))?;
        cmd::begin(shared, &mut cb)
    }

    fn cmd_buffer_finish(&mut self, handle: Handle) -> Result<()> {
        let shared = &*self.sync.shared;
        let mut cb = shared
            .cmd_buffers
            .get_mut(&handle)
            .ok_or(NgfError::InvalidHandle(handle))?;
        // The native buffer stays open so recording can resume; it is
        // ended at submit.
        if cb.in_pass {
            return Err(NgfError::invalid_op("render pass still in progress"));
        }
        Ok(())
    }

    fn cmd_buffer_destroy(&mut self, handle: Handle) {
        // Submitted buffers were handed to their frame already; anything
        // left was never executed.
        if let Some((_, cb)) = self.sync.shared.cmd_buffers.remove(&handle) {
            if let Some(raw) = cb.native {
                cb.pool.free(raw);
            }
        }
    }

    fn record(&mut self, cmd_buffer: Handle, command: RenderCommand) -> Result<()> {
        let swapchain = self.swapchain_target();
        let shared = &*self.sync.shared;
        let mut cb = shared
            .cmd_buffers
            .get_mut(&cmd_buffer)
            .ok_or(NgfError::InvalidHandle(cmd_buffer))?;
        cmd::record(shared, &mut cb, swapchain, command)
    }

    fn submit(&mut self, cmd_buffers: &[Handle]) -> std::result::Result<(), SubmitError> {
        if !self.in_frame {
            return Err(NgfError::invalid_op("submit outside of a frame").into());
        }
        let shared = Arc::clone(&self.sync.shared);
        for &handle in cmd_buffers {
            let cb = shared
                .cmd_buffers
                .get(&handle)
                .ok_or(NgfError::InvalidHandle(handle))?;
            cmd::check_finishable(&cb)?;
        }
        // Buffers ended before a native failure can no longer record, so
        // they are queued with the frame either way.
        let mut failure = None;
        let mut consumed = 0;
        for &handle in cmd_buffers {
            let Some(mut cb) = shared.cmd_buffers.get_mut(&handle) else {
                failure = Some(NgfError::InvalidHandle(handle));
                break;
            };
            let raw = match cmd::finish(&shared, &cb) {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::error!(%handle, "failed to end command buffer: {}", e);
                    failure = Some(e);
                    break;
                }
            };
            cb.native = None;
            self.pending.push(raw);
            consumed += 1;
            let retired = RetiredCmdBuffer {
                pool: Arc::clone(&cb.pool),
                raw,
            };
            if let Err(e) = self.ring.retire_cmd_buffer(retired) {
                failure = Some(e);
                break;
            }
        }
        self.current.submitted_cmd_buffers += consumed as u32;
        match failure {
            Some(error) => Err(SubmitError { consumed, error }),
            None => Ok(()),
        }
    }
}

impl Drop for VkBackend {
    fn drop(&mut self) {
        let shared = Arc::clone(&self.sync.shared);
        if let Err(e) = self.ring.destroy(&self.sync) {
            tracing::warn!(error = %e, "frames still in flight at context teardown");
        }
        shared.wait_idle();
        if let Some(handle) = self.default_rt.take() {
            shared.render_targets.remove(&handle);
        }
        if let Some(mut sc) = self.swapchain.take() {
            sc.destroy(&shared);
        }
        tracing::debug!(frames = self.frame, "Vulkan context destroyed");
    }
}
