//! Replay of emulated command lists against a live GL context.

use std::sync::Arc;

use ngf_core::arena::ScratchArena;
use ngf_core::descriptor::DescriptorPayload;
use ngf_core::types::{
    AttachmentType, ClearValue, DescriptorType, Extent3d, ImageRef, IndexType, LoadOp, Offset3d,
    StoreOp,
};
use ngf_core::{FrameStats, Handle, NgfError, RenderCommand, Result};

use crate::api::GlApi;
use crate::convert;
use crate::objects::{GlPipeline, GlRenderTarget, GlShared, ImageStorage};
use crate::state_cache::StateCache;

struct IndexBinding {
    buffer: u32,
    offset: u64,
    ty: IndexType,
}

/// Per-submission replay state. Bindings do not carry over between
/// command buffers; the native state cache does.
pub(crate) struct Replayer<'a> {
    gl: &'a mut dyn GlApi,
    cache: &'a mut StateCache,
    scratch: &'a mut ScratchArena,
    shared: &'a GlShared,
    stats: &'a mut FrameStats,
    pipeline: Option<Arc<GlPipeline>>,
    index: Option<IndexBinding>,
    pass: Option<Arc<GlRenderTarget>>,
}

impl<'a> Replayer<'a> {
    pub fn new(
        gl: &'a mut dyn GlApi,
        cache: &'a mut StateCache,
        scratch: &'a mut ScratchArena,
        shared: &'a GlShared,
        stats: &'a mut FrameStats,
    ) -> Self {
        Self {
            gl,
            cache,
            scratch,
            shared,
            stats,
            pipeline: None,
            index: None,
            pass: None,
        }
    }

    /// Drop per-buffer bindings before the next buffer replays.
    pub fn end_buffer(&mut self) {
        if self.pass.take().is_some() {
            tracing::warn!("command buffer ended inside a render pass");
        }
        self.pipeline = None;
        self.index = None;
    }

    pub fn execute(&mut self, cmd: &RenderCommand) -> Result<()> {
        self.stats.replayed_commands += 1;
        match cmd {
            RenderCommand::BindPipeline(handle) => self.bind_pipeline(*handle),
            RenderCommand::BeginPass { target, clears } => self.begin_pass(*target, clears),
            RenderCommand::EndPass => self.end_pass(),
            RenderCommand::Viewport(r) => {
                self.gl.viewport(r.x, r.y, r.width as i32, r.height as i32);
                Ok(())
            }
            RenderCommand::Scissor(r) => {
                self.gl.scissor(r.x, r.y, r.width as i32, r.height as i32);
                Ok(())
            }
            RenderCommand::LineWidth(width) => {
                self.cache.set_line_width(self.gl, *width);
                Ok(())
            }
            RenderCommand::BlendConstants(rgba) => {
                self.cache.set_blend_constants(self.gl, *rgba);
                Ok(())
            }
            RenderCommand::StencilReference { face, reference } => {
                self.cache.set_stencil_reference(self.gl, *face, *reference);
                Ok(())
            }
            RenderCommand::StencilCompareMask { face, mask } => {
                self.cache.set_stencil_compare_mask(self.gl, *face, *mask);
                Ok(())
            }
            RenderCommand::StencilWriteMask { face, mask } => {
                self.cache.set_stencil_write_mask(self.gl, *face, *mask);
                Ok(())
            }
            RenderCommand::BindDescriptorSet { set, slot } => self.bind_descriptor_set(*set, *slot),
            RenderCommand::BindVertexBuffer {
                buffer,
                binding,
                offset,
            } => self.bind_vertex_buffer(*buffer, *binding, *offset),
            RenderCommand::BindIndexBuffer { buffer, offset, ty } => {
                let name = self.buffer_name(*buffer)?;
                self.gl.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, name);
                self.index = Some(IndexBinding {
                    buffer: name,
                    offset: *offset,
                    ty: *ty,
                });
                Ok(())
            }
            RenderCommand::Draw {
                indexed,
                first_element,
                nelements,
                ninstances,
            } => self.draw(*indexed, *first_element, *nelements, *ninstances),
            RenderCommand::CopyBuffer {
                src,
                dst,
                size,
                src_offset,
                dst_offset,
            } => {
                let src = self.buffer_name(*src)?;
                let dst = self.buffer_name(*dst)?;
                self.gl
                    .copy_buffer_sub_data(src, dst, *src_offset, *dst_offset, *size);
                Ok(())
            }
            RenderCommand::WriteImage {
                src,
                src_offset,
                dst,
                offset,
                extent,
            } => self.write_image(*src, *src_offset, dst, *offset, *extent),
        }
    }

    fn buffer_name(&self, handle: Handle) -> Result<u32> {
        self.shared
            .buffers
            .get(&handle)
            .map(|b| b.name)
            .ok_or(NgfError::InvalidHandle(handle))
    }

    fn bound_pipeline(&self, what: &str) -> Result<Arc<GlPipeline>> {
        self.pipeline
            .clone()
            .ok_or_else(|| NgfError::invalid_op(format!("{what} requires a bound pipeline")))
    }

    fn bind_pipeline(&mut self, handle: Handle) -> Result<()> {
        let pipeline = self
            .shared
            .pipelines
            .get(&handle)
            .map(|p| Arc::clone(&p))
            .ok_or(NgfError::InvalidHandle(handle))?;

        self.cache.use_program(self.gl, pipeline.program);
        let vao_changed = self.cache.bind_vertex_array(self.gl, pipeline.vao);
        if vao_changed {
            // The element array binding belongs to the vertex array object.
            if let Some(index) = &self.index {
                self.gl.bind_buffer(gl::ELEMENT_ARRAY_BUFFER, index.buffer);
            }
        }
        let diff = self.cache.apply(self.gl, &pipeline.state);
        self.stats.state_calls += diff.issued;
        self.stats.elided_state_calls += diff.elided;
        tracing::trace!(
            pipeline = %handle,
            issued = diff.issued,
            elided = diff.elided,
            "bound pipeline"
        );
        self.pipeline = Some(pipeline);
        Ok(())
    }

    fn begin_pass(&mut self, target: Handle, clears: &[ClearValue]) -> Result<()> {
        if self.pass.is_some() {
            return Err(NgfError::invalid_op("render pass already in progress"));
        }
        let rt = self
            .shared
            .render_targets
            .get(&target)
            .map(|rt| Arc::clone(&rt))
            .ok_or(NgfError::InvalidHandle(target))?;

        // Validate clear values before touching any state.
        for (i, att) in rt.attachments.iter().enumerate() {
            if att.load_op != LoadOp::Clear {
                continue;
            }
            let ok = match (att.ty, clears.get(i)) {
                (AttachmentType::Color, Some(ClearValue::Color(_))) => true,
                (
                    AttachmentType::Depth | AttachmentType::DepthStencil,
                    Some(ClearValue::DepthStencil { .. }),
                ) => true,
                _ => false,
            };
            if !ok {
                return Err(NgfError::invalid_op(format!(
                    "attachment {i} loads with clear but has no matching clear value"
                )));
            }
        }

        self.gl.bind_framebuffer(gl::FRAMEBUFFER, rt.framebuffer);
        if !rt.is_default() {
            let colors = rt
                .attachments
                .iter()
                .filter(|a| a.ty == AttachmentType::Color)
                .count() as u32;
            let buffers = self
                .scratch
                .push_iter((0..colors).map(|i| gl::COLOR_ATTACHMENT0 + i));
            self.gl.draw_buffers(self.scratch.get(buffers));
        }

        let needs_clear = rt.attachments.iter().any(|a| a.load_op == LoadOp::Clear);
        if needs_clear {
            self.gl.disable(gl::SCISSOR_TEST);
            let masks = self.cache.unmask_for_clear(self.gl);
            let mut color_index = 0;
            for (i, att) in rt.attachments.iter().enumerate() {
                let clear = if att.load_op == LoadOp::Clear {
                    clears.get(i)
                } else {
                    None
                };
                match (att.ty, clear) {
                    (AttachmentType::Color, Some(ClearValue::Color(rgba))) => {
                        self.gl.clear_buffer_fv(gl::COLOR, color_index, *rgba);
                    }
                    (AttachmentType::Depth, Some(ClearValue::DepthStencil { depth, .. })) => {
                        self.gl.clear_buffer_fv(gl::DEPTH, 0, [*depth, 0.0, 0.0, 0.0]);
                    }
                    (
                        AttachmentType::DepthStencil,
                        Some(ClearValue::DepthStencil { depth, stencil }),
                    ) => {
                        self.gl.clear_buffer_fi(*depth, *stencil as i32);
                    }
                    _ => {}
                }
                if att.ty == AttachmentType::Color {
                    color_index += 1;
                }
            }
            self.cache.restore_after_clear(self.gl, masks);
            self.gl.enable(gl::SCISSOR_TEST);
        }
        self.pass = Some(rt);
        Ok(())
    }

    fn end_pass(&mut self) -> Result<()> {
        let rt = self
            .pass
            .take()
            .ok_or_else(|| NgfError::invalid_op("no render pass in progress"))?;
        let slice = if rt.is_default() {
            self.scratch.push_iter(
                rt.attachments
                    .iter()
                    .filter(|a| a.store_op == StoreOp::DontCare)
                    .flat_map(|a| convert::default_attachments(a.ty).iter().copied()),
            )
        } else {
            let mut color_index = 0;
            self.scratch.push_iter(rt.attachments.iter().filter_map(|a| {
                let point = convert::attachment_point(a.ty, color_index);
                if a.ty == AttachmentType::Color {
                    color_index += 1;
                }
                (a.store_op == StoreOp::DontCare).then_some(point)
            }))
        };
        if !slice.is_empty() {
            self.gl
                .invalidate_framebuffer(gl::FRAMEBUFFER, self.scratch.get(slice));
        }
        Ok(())
    }

    fn bind_descriptor_set(&mut self, set: Handle, slot: u32) -> Result<()> {
        let pipeline = self.bound_pipeline("binding a descriptor set")?;
        let desc_set = self
            .shared
            .descriptor_sets
            .get(&set)
            .ok_or(NgfError::InvalidHandle(set))?;

        for op in desc_set.bind_ops() {
            if op.payload == DescriptorPayload::Empty {
                continue;
            }
            let native = pipeline.binding_map.lookup(slot, op.binding).ok_or_else(|| {
                NgfError::InvalidBinding(format!(
                    "set {slot} binding {} is not part of the bound pipeline's layout",
                    op.binding
                ))
            })?;
            let unit = native.native_id;
            match (op.ty, op.payload) {
                (
                    DescriptorType::UniformBuffer | DescriptorType::StorageBuffer,
                    DescriptorPayload::Buffer {
                        buffer,
                        offset,
                        range,
                    },
                ) => {
                    let Some(name) = self.shared.buffers.get(&buffer).map(|b| b.name) else {
                        tracing::warn!(%buffer, "descriptor references a destroyed buffer");
                        continue;
                    };
                    let target = if op.ty == DescriptorType::UniformBuffer {
                        gl::UNIFORM_BUFFER
                    } else {
                        gl::SHADER_STORAGE_BUFFER
                    };
                    self.gl.bind_buffer_range(target, unit, name, offset, range);
                }
                (DescriptorType::LoadStoreImage, DescriptorPayload::Image { image }) => {
                    let Some(img) = self.shared.images.get(&image) else {
                        tracing::warn!(%image, "descriptor references a destroyed image");
                        continue;
                    };
                    if let ImageStorage::Texture { name, .. } = img.storage {
                        self.gl
                            .bind_image_texture(unit, name, gl::READ_WRITE, img.internal_format);
                    }
                }
                (DescriptorType::Image, DescriptorPayload::Image { image }) => {
                    let Some((target, name)) = self.texture(image) else {
                        continue;
                    };
                    for &combined in &native.combined_ids {
                        self.gl.bind_texture_unit(combined, target, name);
                    }
                }
                (DescriptorType::Sampler, DescriptorPayload::Sampler { sampler }) => {
                    let Some(name) = self.shared.samplers.get(&sampler).map(|s| *s) else {
                        tracing::warn!(%sampler, "descriptor references a destroyed sampler");
                        continue;
                    };
                    for &combined in &native.combined_ids {
                        self.gl.bind_sampler(combined, name);
                    }
                }
                (
                    DescriptorType::CombinedImageSampler,
                    DescriptorPayload::CombinedImageSampler { image, sampler },
                ) => {
                    if let Some((target, name)) = self.texture(image) {
                        self.gl.bind_texture_unit(unit, target, name);
                    }
                    if let Some(s) = self.shared.samplers.get(&sampler).map(|s| *s) {
                        self.gl.bind_sampler(unit, s);
                    }
                }
                (ty, payload) => {
                    tracing::warn!(?ty, ?payload, "descriptor payload does not match its slot");
                }
            }
        }
        Ok(())
    }

    fn texture(&self, image: Handle) -> Option<(u32, u32)> {
        match self.shared.images.get(&image).map(|i| match i.storage {
            ImageStorage::Texture { name, target } => Some((target, name)),
            ImageStorage::Renderbuffer { .. } => None,
        }) {
            Some(Some(t)) => Some(t),
            Some(None) => {
                tracing::warn!(%image, "renderbuffer-backed image cannot be sampled");
                None
            }
            None => {
                tracing::warn!(%image, "descriptor references a destroyed image");
                None
            }
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: Handle, binding: u32, offset: u64) -> Result<()> {
        let pipeline = self.bound_pipeline("binding a vertex buffer")?;
        let name = self.buffer_name(buffer)?;
        self.gl
            .bind_vertex_buffer(binding, name, offset, pipeline.stride(binding));
        Ok(())
    }

    fn draw(&mut self, indexed: bool, first: u32, count: u32, instances: u32) -> Result<()> {
        let pipeline = self.bound_pipeline("drawing")?;
        let mode = pipeline.mode;
        let count = count as i32;
        let index = if indexed {
            let index = self
                .index
                .as_ref()
                .ok_or_else(|| NgfError::invalid_op("indexed draw without an index buffer"))?;
            Some(index)
        } else {
            None
        };
        match (index, instances) {
            // Zero instances draw nothing, as on Vulkan.
            (_, 0) => {}
            (Some(index), n) => {
                let ty = convert::index_type(index.ty);
                let offset = index.offset + u64::from(first) * index.ty.size();
                if n > 1 {
                    self.gl
                        .draw_elements_instanced(mode, count, ty, offset, n as i32);
                } else {
                    self.gl.draw_elements(mode, count, ty, offset);
                }
            }
            (None, 1) => self.gl.draw_arrays(mode, first as i32, count),
            (None, n) => self
                .gl
                .draw_arrays_instanced(mode, first as i32, count, n as i32),
        }
        Ok(())
    }

    fn write_image(
        &mut self,
        src: Handle,
        src_offset: u64,
        dst: &ImageRef,
        offset: Offset3d,
        extent: Extent3d,
    ) -> Result<()> {
        let src = self.buffer_name(src)?;
        let img = self
            .shared
            .images
            .get(&dst.image)
            .ok_or(NgfError::InvalidHandle(dst.image))?;
        let ImageStorage::Texture { name, target } = img.storage else {
            return Err(NgfError::Unsupported(
                "cannot write to a renderbuffer-backed image".into(),
            ));
        };
        let (upload_target, z) = match target {
            gl::TEXTURE_CUBE_MAP => (gl::TEXTURE_CUBE_MAP_POSITIVE_X + dst.cubemap_face, 0),
            gl::TEXTURE_CUBE_MAP_ARRAY => {
                (target, (dst.layer * 6 + dst.cubemap_face) as i32 + offset.z)
            }
            gl::TEXTURE_2D_ARRAY => (target, dst.layer as i32 + offset.z),
            _ => (target, offset.z),
        };
        self.gl.tex_sub_image_from_buffer(
            upload_target,
            name,
            dst.mip_level as i32,
            [offset.x, offset.y, z],
            [
                extent.width as i32,
                extent.height as i32,
                extent.depth.max(1) as i32,
            ],
            img.format,
            img.ty,
            src,
            src_offset,
        );
        Ok(())
    }
}
