//! Command pools and translation of portable commands into native ones.

use std::sync::Arc;

use ash::vk;
use ngf_core::types::{
    AttachmentType, ClearValue, Extent3d, ImageRef, ImageType, Irect2d, LoadOp, Offset3d,
    SampleCount,
};
use ngf_core::{Handle, NgfError, RenderCommand, Result};
use parking_lot::{Mutex, MutexGuard};

use crate::convert;
use crate::device::VkShared;
use crate::objects::{BoundPipeline, VkCmdBuffer};
use crate::vk_err;

/// A `VkCommandPool` created by one context. Its buffers may be recorded,
/// submitted and freed from any context sharing the device, so every use of
/// the pool or its buffers holds the lock.
pub(crate) struct CommandPool {
    device: ash::Device,
    raw: vk::CommandPool,
    lock: Mutex<()>,
}

impl CommandPool {
    pub fn new(device: &ash::Device, queue_family: u32) -> Result<Arc<Self>> {
        let info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family);
        let raw = unsafe { device.create_command_pool(&info, None) }.map_err(vk_err)?;
        Ok(Arc::new(Self {
            device: device.clone(),
            raw,
            lock: Mutex::new(()),
        }))
    }

    pub fn allocate(&self) -> Result<vk::CommandBuffer> {
        let _guard = self.lock.lock();
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.raw)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info) }.map_err(vk_err)?;
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| NgfError::creation(ngf_core::ResourceType::CmdBuffer, "no buffer"))
    }

    /// Held while recording into, resetting or ending one of the pool's
    /// buffers.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    pub fn free(&self, cmd_buffer: vk::CommandBuffer) {
        let _guard = self.lock.lock();
        unsafe { self.device.free_command_buffers(self.raw, &[cmd_buffer]) };
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_command_pool(self.raw, None) };
    }
}

/// A native command buffer whose release waits for its frame's fence.
pub(crate) struct RetiredCmdBuffer {
    pub pool: Arc<CommandPool>,
    pub raw: vk::CommandBuffer,
}

/// Where the swapchain render target draws this frame.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SwapchainTarget {
    pub handle: Handle,
    pub framebuffer: Option<vk::Framebuffer>,
}

pub(crate) fn begin(shared: &VkShared, cb: &mut VkCmdBuffer) -> Result<()> {
    let (raw, fresh) = match cb.native {
        Some(raw) => (raw, false),
        None => {
            let raw = cb.pool.allocate()?;
            cb.native = Some(raw);
            (raw, true)
        }
    };
    let pool = Arc::clone(&cb.pool);
    let _guard = pool.lock();
    if !fresh {
        // Started again before submission; drop what was recorded.
        unsafe {
            shared
                .device
                .reset_command_buffer(raw, vk::CommandBufferResetFlags::empty())
        }
        .map_err(vk_err)?;
    }
    let info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
    unsafe { shared.device.begin_command_buffer(raw, &info) }.map_err(vk_err)?;
    cb.in_pass = false;
    cb.pipeline = None;
    cb.index_bound = false;
    Ok(())
}

/// Check that `cb` can be ended: something is recorded and no render pass
/// is open.
pub(crate) fn check_finishable(cb: &VkCmdBuffer) -> Result<vk::CommandBuffer> {
    let raw = cb
        .native
        .ok_or_else(|| NgfError::invalid_op("command buffer has nothing recorded"))?;
    if cb.in_pass {
        return Err(NgfError::invalid_op("render pass still in progress"));
    }
    Ok(raw)
}

pub(crate) fn finish(shared: &VkShared, cb: &VkCmdBuffer) -> Result<vk::CommandBuffer> {
    let raw = check_finishable(cb)?;
    let _guard = cb.pool.lock();
    unsafe { shared.device.end_command_buffer(raw) }.map_err(vk_err)?;
    Ok(raw)
}

/// Record one command into `cb`'s native buffer.
pub(crate) fn record(
    shared: &VkShared,
    cb: &mut VkCmdBuffer,
    swapchain: Option<SwapchainTarget>,
    cmd: RenderCommand,
) -> Result<()> {
    let raw = cb
        .native
        .ok_or_else(|| NgfError::invalid_op("command buffer is not recording"))?;
    let pool = Arc::clone(&cb.pool);
    let _guard = pool.lock();
    let device = &shared.device;
    match cmd {
        RenderCommand::BindPipeline(handle) => {
            let p = shared
                .pipelines
                .get(&handle)
                .ok_or(NgfError::InvalidHandle(handle))?;
            let state = &p.state;
            let ds = &state.depth_stencil;
            unsafe {
                device.cmd_bind_pipeline(raw, vk::PipelineBindPoint::GRAPHICS, p.raw);
                // Dynamic state starts from the pipeline's own values.
                device.cmd_set_line_width(raw, state.rasterization.line_width);
                device.cmd_set_blend_constants(raw, &state.blend.constants);
                for (face, info) in [
                    (vk::StencilFaceFlags::FRONT, &ds.front_stencil),
                    (vk::StencilFaceFlags::BACK, &ds.back_stencil),
                ] {
                    device.cmd_set_stencil_reference(raw, face, info.reference);
                    device.cmd_set_stencil_compare_mask(raw, face, info.compare_mask);
                    device.cmd_set_stencil_write_mask(raw, face, info.write_mask);
                }
            }
            cb.pipeline = Some(BoundPipeline { layout: p.layout });
        }
        RenderCommand::BeginPass { target, clears } => {
            if cb.in_pass {
                return Err(NgfError::invalid_op("render pass already in progress"));
            }
            let rt = shared
                .render_targets
                .get(&target)
                .ok_or(NgfError::InvalidHandle(target))?;
            let framebuffer = match swapchain {
                Some(sc) if sc.handle == target => sc.framebuffer.ok_or_else(|| {
                    NgfError::invalid_op("default render target used outside a frame")
                })?,
                _ => rt.framebuffer,
            };
            let clear_values = clear_values(&rt.attachments, &clears)?;
            let area = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: rt.extent,
            };
            let info = vk::RenderPassBeginInfo::default()
                .render_pass(rt.render_pass)
                .framebuffer(framebuffer)
                .render_area(area)
                .clear_values(&clear_values);
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: rt.extent.width as f32,
                height: rt.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            unsafe {
                device.cmd_begin_render_pass(raw, &info, vk::SubpassContents::INLINE);
                device.cmd_set_viewport(raw, 0, &[viewport]);
                device.cmd_set_scissor(raw, 0, &[area]);
            }
            cb.in_pass = true;
        }
        RenderCommand::EndPass => {
            if !std::mem::take(&mut cb.in_pass) {
                return Err(NgfError::invalid_op("no render pass in progress"));
            }
            unsafe { device.cmd_end_render_pass(raw) };
        }
        RenderCommand::Viewport(r) => {
            let viewport = vk::Viewport {
                x: r.x as f32,
                y: r.y as f32,
                width: r.width as f32,
                height: r.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            unsafe { device.cmd_set_viewport(raw, 0, &[viewport]) };
        }
        RenderCommand::Scissor(r) => {
            unsafe { device.cmd_set_scissor(raw, 0, &[convert::rect(clamp_origin(r))]) };
        }
        RenderCommand::LineWidth(width) => unsafe { device.cmd_set_line_width(raw, width) },
        RenderCommand::BlendConstants(c) => unsafe { device.cmd_set_blend_constants(raw, &c) },
        RenderCommand::StencilReference { face, reference } => unsafe {
            device.cmd_set_stencil_reference(raw, convert::stencil_face(face), reference)
        },
        RenderCommand::StencilWriteMask { face, mask } => unsafe {
            device.cmd_set_stencil_write_mask(raw, convert::stencil_face(face), mask)
        },
        RenderCommand::StencilCompareMask { face, mask } => unsafe {
            device.cmd_set_stencil_compare_mask(raw, convert::stencil_face(face), mask)
        },
        RenderCommand::BindDescriptorSet { set, slot } => {
            let pipeline = cb.pipeline.ok_or_else(|| {
                NgfError::invalid_op("binding a descriptor set requires a bound pipeline")
            })?;
            let native = shared
                .descriptor_sets
                .get(&set)
                .map(|s| s.raw)
                .ok_or(NgfError::InvalidHandle(set))?;
            unsafe {
                device.cmd_bind_descriptor_sets(
                    raw,
                    vk::PipelineBindPoint::GRAPHICS,
                    pipeline.layout,
                    slot,
                    &[native],
                    &[],
                )
            };
        }
        RenderCommand::BindVertexBuffer {
            buffer,
            binding,
            offset,
        } => {
            let native = buffer_raw(shared, buffer)?;
            unsafe { device.cmd_bind_vertex_buffers(raw, binding, &[native], &[offset]) };
        }
        RenderCommand::BindIndexBuffer { buffer, offset, ty } => {
            let native = buffer_raw(shared, buffer)?;
            unsafe { device.cmd_bind_index_buffer(raw, native, offset, convert::index_type(ty)) };
            cb.index_bound = true;
        }
        RenderCommand::Draw {
            indexed,
            first_element,
            nelements,
            ninstances,
        } => {
            if cb.pipeline.is_none() {
                return Err(NgfError::invalid_op("draw requires a bound pipeline"));
            }
            if indexed && !cb.index_bound {
                return Err(NgfError::invalid_op("indexed draw without an index buffer"));
            }
            unsafe {
                if indexed {
                    device.cmd_draw_indexed(raw, nelements, ninstances, first_element, 0, 0);
                } else {
                    device.cmd_draw(raw, nelements, ninstances, first_element, 0);
                }
            }
        }
        RenderCommand::CopyBuffer {
            src,
            dst,
            size,
            src_offset,
            dst_offset,
        } => {
            let src = buffer_raw(shared, src)?;
            let dst = buffer_raw(shared, dst)?;
            let region = vk::BufferCopy {
                src_offset,
                dst_offset,
                size,
            };
            unsafe {
                device.cmd_copy_buffer(raw, src, dst, &[region]);
                buffer_barrier(device, raw, dst);
            }
        }
        RenderCommand::WriteImage {
            src,
            src_offset,
            dst,
            offset,
            extent,
        } => write_image(shared, raw, src, src_offset, &dst, offset, extent)?,
    }
    Ok(())
}

fn clamp_origin(r: Irect2d) -> Irect2d {
    Irect2d {
        x: r.x.max(0),
        y: r.y.max(0),
        ..r
    }
}

fn buffer_raw(shared: &VkShared, handle: Handle) -> Result<vk::Buffer> {
    shared
        .buffers
        .get(&handle)
        .map(|b| b.raw)
        .ok_or(NgfError::InvalidHandle(handle))
}

/// One clear value per attachment; attachments that do not clear get zero.
fn clear_values(
    attachments: &[ngf_core::types::AttachmentDescription],
    clears: &[ClearValue],
) -> Result<Vec<vk::ClearValue>> {
    attachments
        .iter()
        .enumerate()
        .map(|(i, att)| {
            let clear = if att.load_op == LoadOp::Clear {
                clears.get(i)
            } else {
                None
            };
            match (att.ty, clear) {
                (AttachmentType::Color, Some(ClearValue::Color(rgba))) => Ok(vk::ClearValue {
                    color: vk::ClearColorValue { float32: *rgba },
                }),
                (
                    AttachmentType::Depth | AttachmentType::DepthStencil,
                    Some(ClearValue::DepthStencil { depth, stencil }),
                ) => Ok(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: *depth,
                        stencil: *stencil,
                    },
                }),
                _ if att.load_op == LoadOp::Clear => Err(NgfError::invalid_op(format!(
                    "attachment {i} loads with clear but has no matching clear value"
                ))),
                _ => Ok(vk::ClearValue::default()),
            }
        })
        .collect()
}

unsafe fn buffer_barrier(device: &ash::Device, cb: vk::CommandBuffer, buffer: vk::Buffer) {
    let barrier = vk::BufferMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(
            vk::AccessFlags::VERTEX_ATTRIBUTE_READ
                | vk::AccessFlags::INDEX_READ
                | vk::AccessFlags::UNIFORM_READ
                | vk::AccessFlags::SHADER_READ
                | vk::AccessFlags::TRANSFER_READ,
        )
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE);
    device.cmd_pipeline_barrier(
        cb,
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::VERTEX_INPUT
            | vk::PipelineStageFlags::VERTEX_SHADER
            | vk::PipelineStageFlags::FRAGMENT_SHADER
            | vk::PipelineStageFlags::TRANSFER,
        vk::DependencyFlags::empty(),
        &[],
        &[barrier],
        &[],
    );
}

#[allow(clippy::too_many_arguments)]
fn write_image(
    shared: &VkShared,
    raw: vk::CommandBuffer,
    src: Handle,
    src_offset: u64,
    dst: &ImageRef,
    offset: Offset3d,
    extent: Extent3d,
) -> Result<()> {
    let src = buffer_raw(shared, src)?;
    let image = shared
        .images
        .get(&dst.image)
        .ok_or(NgfError::InvalidHandle(dst.image))?;
    if image.info.sample_count != SampleCount::S1 {
        return Err(NgfError::Unsupported(
            "uploads into multisampled images".into(),
        ));
    }
    let layer = match image.info.ty {
        ImageType::Cube => dst.layer * 6 + dst.cubemap_face,
        _ => dst.layer,
    };
    let range = vk::ImageSubresourceRange {
        aspect_mask: image.aspect,
        base_mip_level: dst.mip_level,
        level_count: 1,
        base_array_layer: layer,
        layer_count: 1,
    };
    let to_transfer = vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::SHADER_READ)
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image.raw)
        .subresource_range(range);
    let to_shader = vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image.raw)
        .subresource_range(range);
    let region = vk::BufferImageCopy {
        buffer_offset: src_offset,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: image.aspect,
            mip_level: dst.mip_level,
            base_array_layer: layer,
            layer_count: 1,
        },
        image_offset: vk::Offset3D {
            x: offset.x,
            y: offset.y,
            z: offset.z,
        },
        image_extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: extent.depth.max(1),
        },
    };
    let device = &shared.device;
    unsafe {
        device.cmd_pipeline_barrier(
            raw,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer],
        );
        device.cmd_copy_buffer_to_image(
            raw,
            src,
            image.raw,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        device.cmd_pipeline_barrier(
            raw,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_shader],
        );
    }
    Ok(())
}
