use std::any::Any;
use std::sync::Arc;

use gl::types::{GLenum, GLuint};
use ngf_core::arena::ScratchArena;
use ngf_core::binding_map::NativeBindingMap;
use ngf_core::descriptor::{self, DescriptorWrite, EmulatedDescriptorSet};
use ngf_core::types::{
    AttachmentDescription, AttachmentType, BackendKind, BufferInfo, DescriptorSetLayoutInfo,
    GraphicsPipelineDesc, ImageInfo, ImageRef, ImageType, ImageUsage, InputRate, LoadOp,
    RenderTargetInfo, SampleCount, SamplerInfo, ShaderStageInfo, StoreOp, SwapchainInfo,
};
use ngf_core::{
    Backend, DeviceCapabilities, FrameStats, Handle, HostAllocator, NgfConfig, NgfError,
    RenderCommand, ResourceType, Result, SharedBackendState, SubmitError,
};

use crate::api::GlApi;
use crate::convert;
use crate::native::NativeGl;
use crate::objects::{
    GlBuffer, GlImage, GlPipeline, GlRenderTarget, GlShaderStage, GlShared, ImageStorage,
};
use crate::platform::GlPlatform;
use crate::replay::Replayer;
use crate::state_cache::StateCache;

/// `GL_TEXTURE_MAX_ANISOTROPY`, core in 4.6.
const TEXTURE_MAX_ANISOTROPY: GLenum = 0x84FE;

pub struct GlBackendInfo {
    pub platform: Box<dyn GlPlatform>,
    /// Overrides the driver entry points, e.g. with [`crate::RecordingGl`].
    pub api: Option<Box<dyn GlApi>>,
    pub swapchain: Option<SwapchainInfo>,
    pub shared_with: Option<SharedBackendState>,
}

pub struct GlBackend {
    platform: Box<dyn GlPlatform>,
    gl: Box<dyn GlApi>,
    shared: Arc<GlShared>,
    cache: StateCache,
    scratch: ScratchArena,
    swapchain: Option<SwapchainInfo>,
    frame: u64,
    current: FrameStats,
    last: FrameStats,
}

fn check_error(gl: &mut dyn GlApi, kind: ResourceType) -> Result<()> {
    match gl.get_error() {
        gl::NO_ERROR => Ok(()),
        gl::OUT_OF_MEMORY => Err(NgfError::OutOfMemory),
        err => Err(NgfError::creation(kind, format!("GL error 0x{err:04x}"))),
    }
}

fn probe_capabilities(gl: &mut dyn GlApi) -> DeviceCapabilities {
    let mut viewport = [0i32; 2];
    gl.get_integer_v(gl::MAX_VIEWPORT_DIMS, &mut viewport);
    let mut line_width = [1.0f32; 2];
    gl.get_float_v(gl::ALIASED_LINE_WIDTH_RANGE, &mut line_width);
    let texture_units = gl.get_integer(gl::MAX_COMBINED_TEXTURE_IMAGE_UNITS).max(0) as u32;
    DeviceCapabilities {
        backend: BackendKind::Gl,
        device_name: gl.get_string(gl::RENDERER),
        is_discrete: false,
        max_uniform_buffer_bindings: gl.get_integer(gl::MAX_UNIFORM_BUFFER_BINDINGS).max(0) as u32,
        max_storage_buffer_bindings: gl
            .get_integer(gl::MAX_SHADER_STORAGE_BUFFER_BINDINGS)
            .max(0) as u32,
        max_texture_units: texture_units,
        max_sampler_units: texture_units,
        max_vertex_input_attributes: gl.get_integer(gl::MAX_VERTEX_ATTRIBS).max(0) as u32,
        uniform_buffer_offset_alignment: gl
            .get_integer(gl::UNIFORM_BUFFER_OFFSET_ALIGNMENT)
            .max(1) as u64,
        max_viewport_dims: [viewport[0].max(0) as u32, viewport[1].max(0) as u32],
        max_framebuffer_extent: [
            gl.get_integer(gl::MAX_FRAMEBUFFER_WIDTH).max(0) as u32,
            gl.get_integer(gl::MAX_FRAMEBUFFER_HEIGHT).max(0) as u32,
        ],
        max_line_width: line_width[1],
        supports_tessellation: gl.get_integer(gl::MAX_PATCH_VERTICES) > 0,
        supports_native_descriptor_sets: false,
    }
}

impl GlBackend {
    pub fn new(info: GlBackendInfo, config: &NgfConfig, host: HostAllocator) -> Result<Self> {
        let GlBackendInfo {
            mut platform,
            api,
            swapchain,
            shared_with,
        } = info;
        platform.make_current()?;
        let mut gl = match api {
            Some(api) => api,
            None => Box::new(NativeGl::load(&*platform)),
        };

        let shared = match shared_with {
            Some(state) => {
                if state.kind != BackendKind::Gl {
                    return Err(NgfError::invalid_op(
                        "cannot share a GL context with a non-GL context",
                    ));
                }
                state
                    .state
                    .downcast::<GlShared>()
                    .map_err(|_| NgfError::invalid_op("shared state is not GL state"))?
            }
            None => {
                let caps = probe_capabilities(&mut *gl);
                Arc::new(GlShared::new(
                    caps,
                    config.memory.command_arena_block_len,
                    host,
                ))
            }
        };

        gl.enable(gl::SCISSOR_TEST);
        gl.enable(gl::TEXTURE_CUBE_MAP_SEAMLESS);
        tracing::info!(
            renderer = %shared.caps.device_name,
            shared = Arc::strong_count(&shared) > 1,
            "GL context created"
        );

        Ok(Self {
            platform,
            gl,
            shared,
            cache: StateCache::new(),
            scratch: ScratchArena::with_capacity(config.memory.scratch_arena_bytes),
            swapchain,
            frame: 0,
            current: FrameStats::default(),
            last: FrameStats::default(),
        })
    }

    /// Objects and command storage shared with other contexts.
    pub fn shared(&self) -> &Arc<GlShared> {
        &self.shared
    }

    pub fn state_cache(&self) -> &StateCache {
        &self.cache
    }

    fn build_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> Result<GlPipeline> {
        let gl = &mut *self.gl;
        let mut shaders: Vec<GLuint> = Vec::with_capacity(desc.shader_stages.len());
        for stage in &desc.shader_stages {
            let entry = self
                .shared
                .shader_stages
                .get(stage)
                .ok_or(NgfError::InvalidHandle(*stage))?;
            tracing::trace!(stage = ?entry.ty, "attaching shader stage");
            shaders.push(entry.name);
        }

        let binding_map = NativeBindingMap::build(
            &desc.layout,
            desc.image_to_combined_map.as_ref(),
            desc.sampler_to_combined_map.as_ref(),
            &self.shared.host,
        )?;

        let program = gl.create_program();
        for &shader in &shaders {
            gl.attach_shader(program, shader);
        }
        let linked = gl.link_program(program);
        for &shader in &shaders {
            gl.detach_shader(program, shader);
        }
        if let Err(log) = linked {
            gl.delete_program(program);
            return Err(NgfError::creation(ResourceType::GraphicsPipeline, log));
        }

        let vao = gl.gen_vertex_array();
        for attrib in &desc.vertex_input.attribs {
            let (ty, integer) = convert::vertex_attrib_type(attrib.ty, attrib.normalized);
            gl.vertex_attrib_format(
                vao,
                attrib.location,
                attrib.size as i32,
                ty,
                attrib.normalized,
                attrib.offset,
                integer,
            );
            gl.vertex_attrib_binding(vao, attrib.location, attrib.binding);
            gl.enable_vertex_attrib(vao, attrib.location);
        }
        for binding in &desc.vertex_input.bindings {
            let divisor = match binding.input_rate {
                InputRate::Vertex => 0,
                InputRate::Instance => 1,
            };
            gl.vertex_binding_divisor(vao, binding.binding, divisor);
        }
        if let Err(e) = check_error(gl, ResourceType::GraphicsPipeline) {
            gl.delete_vertex_array(vao);
            gl.delete_program(program);
            return Err(e);
        }

        Ok(GlPipeline {
            program,
            vao,
            state: desc.state,
            mode: convert::primitive_mode(desc.state.topology),
            binding_map,
            vertex_strides: desc
                .vertex_input
                .bindings
                .iter()
                .map(|b| (b.binding, b.stride as i32))
                .collect(),
        })
    }

    fn attach(
        &mut self,
        framebuffer: GLuint,
        point: GLenum,
        image_ref: &ImageRef,
    ) -> Result<()> {
        let image = self
            .shared
            .images
            .get(&image_ref.image)
            .ok_or(NgfError::InvalidHandle(image_ref.image))?;
        match image.storage {
            ImageStorage::Renderbuffer { name } => {
                self.gl.framebuffer_renderbuffer(framebuffer, point, name)
            }
            ImageStorage::Texture { name, target } => {
                let layer = match target {
                    gl::TEXTURE_CUBE_MAP => Some(image_ref.cubemap_face as i32),
                    gl::TEXTURE_CUBE_MAP_ARRAY => {
                        Some((image_ref.layer * 6 + image_ref.cubemap_face) as i32)
                    }
                    gl::TEXTURE_2D_ARRAY | gl::TEXTURE_3D => Some(image_ref.layer as i32),
                    _ => None,
                };
                self.gl.framebuffer_texture(
                    framebuffer,
                    point,
                    target,
                    name,
                    image_ref.mip_level as i32,
                    layer,
                );
            }
        }
        Ok(())
    }

    fn host_buffer(&self, handle: Handle, offset: u64, len: usize) -> Result<GLuint> {
        let buffer = self
            .shared
            .buffers
            .get(&handle)
            .ok_or(NgfError::InvalidHandle(handle))?;
        if !buffer.info.storage.is_host_visible() {
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
        Ok(buffer.name)
    }
}

impl Backend for GlBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gl
    }

    fn capabilities(&self) -> DeviceCapabilities {
        self.shared.caps.clone()
    }

    fn share(&self) -> SharedBackendState {
        SharedBackendState {
            kind: BackendKind::Gl,
            state: Arc::clone(&self.shared) as Arc<dyn Any + Send + Sync>,
        }
    }

    fn make_current(&mut self) -> Result<()> {
        self.platform.make_current()
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.platform.resize(width, height)?;
        if let Some(swapchain) = &mut self.swapchain {
            swapchain.width = width;
            swapchain.height = height;
        }
        tracing::debug!(width, height, "GL drawable resized");
        Ok(())
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.current = FrameStats {
            frame: self.frame,
            ..FrameStats::default()
        };
        Ok(())
    }

    fn end_frame(&mut self) -> Result<()> {
        if self.swapchain.is_some() {
            self.platform.swap_buffers()?;
        }
        self.scratch.reset();
        self.last = self.current;
        tracing::trace!(
            frame = self.frame,
            replayed = self.last.replayed_commands,
            state_calls = self.last.state_calls,
            elided = self.last.elided_state_calls,
            "GL frame finished"
        );
        self.frame += 1;
        Ok(())
    }

    fn frame_stats(&self) -> FrameStats {
        self.last
    }

    fn create_default_render_target(&mut self, handle: Handle) -> Result<bool> {
        let Some(swapchain) = &self.swapchain else {
            return Ok(false);
        };
        let mut attachments = vec![AttachmentDescription {
            ty: AttachmentType::Color,
            format: swapchain.color_format,
            sample_count: swapchain.sample_count,
            is_sampled: false,
            load_op: LoadOp::Clear,
            store_op: StoreOp::Store,
        }];
        if let Some(depth) = swapchain.depth_format {
            attachments.push(AttachmentDescription {
                ty: if depth.has_stencil() {
                    AttachmentType::DepthStencil
                } else {
                    AttachmentType::Depth
                },
                format: depth,
                sample_count: swapchain.sample_count,
                is_sampled: false,
                load_op: LoadOp::Clear,
                store_op: StoreOp::DontCare,
            });
        }
        self.shared.render_targets.insert(
            handle,
            Arc::new(GlRenderTarget {
                framebuffer: 0,
                attachments,
            }),
        );
        Ok(true)
    }

    fn create_shader_stage(&mut self, handle: Handle, info: &ShaderStageInfo) -> Result<()> {
        let source = std::str::from_utf8(&info.content).map_err(|_| {
            NgfError::creation(ResourceType::ShaderStage, "GLSL source is not valid UTF-8")
        })?;
        let shader = self.gl.create_shader(convert::shader_type(info.ty));
        if let Err(log) = self.gl.compile_shader(shader, source) {
            self.gl.delete_shader(shader);
            tracing::error!(
                stage = ?info.ty,
                name = info.debug_name.as_deref().unwrap_or(""),
                "shader compilation failed: {}",
                log
            );
            return Err(NgfError::creation(ResourceType::ShaderStage, log));
        }
        self.shared.shader_stages.insert(
            handle,
            GlShaderStage {
                name: shader,
                ty: info.ty,
            },
        );
        tracing::debug!(%handle, stage = ?info.ty, "created shader stage");
        Ok(())
    }

    fn destroy_shader_stage(&mut self, handle: Handle) {
        if let Some((_, stage)) = self.shared.shader_stages.remove(&handle) {
            self.gl.delete_shader(stage.name);
        }
    }

    fn create_graphics_pipeline(
        &mut self,
        handle: Handle,
        desc: &GraphicsPipelineDesc,
    ) -> Result<()> {
        let result = self.build_pipeline(desc);
        // Vertex array setup disturbs the cached bindings.
        self.cache.forget_bindings();
        let pipeline = result?;
        tracing::debug!(%handle, program = pipeline.program, "created graphics pipeline");
        self.shared.pipelines.insert(handle, Arc::new(pipeline));
        Ok(())
    }

    fn destroy_graphics_pipeline(&mut self, handle: Handle) {
        if let Some((_, pipeline)) = self.shared.pipelines.remove(&handle) {
            self.gl.delete_vertex_array(pipeline.vao);
            self.gl.delete_program(pipeline.program);
            self.cache.forget_bindings();
        }
    }

    fn create_image(&mut self, handle: Handle, info: &ImageInfo) -> Result<()> {
        let (internal_format, format, ty) = convert::image_format(info.format);
        let render_only = !info
            .usage
            .intersects(ImageUsage::SAMPLE_FROM | ImageUsage::TRANSFER_DST | ImageUsage::STORAGE);
        let samples = info.sample_count.count() as i32;
        let storage = if render_only && info.ty == ImageType::Image2d && info.nlayers <= 1 {
            let name = self.gl.gen_renderbuffer();
            self.gl.renderbuffer_storage(
                name,
                if samples > 1 { samples } else { 0 },
                internal_format,
                info.extent.width as i32,
                info.extent.height as i32,
            );
            if let Err(e) = check_error(&mut *self.gl, ResourceType::Image) {
                self.gl.delete_renderbuffer(name);
                return Err(e);
            }
            ImageStorage::Renderbuffer { name }
        } else {
            let target = convert::texture_target(info);
            let depth = match target {
                gl::TEXTURE_3D => info.extent.depth,
                gl::TEXTURE_2D_ARRAY => info.nlayers,
                gl::TEXTURE_CUBE_MAP_ARRAY => info.nlayers * 6,
                _ => 1,
            };
            let name = self.gl.gen_texture();
            self.gl.tex_storage(
                target,
                name,
                info.nmips.max(1) as i32,
                internal_format,
                [
                    info.extent.width as i32,
                    info.extent.height as i32,
                    depth as i32,
                ],
                samples,
            );
            if let Err(e) = check_error(&mut *self.gl, ResourceType::Image) {
                self.gl.delete_texture(name);
                return Err(e);
            }
            ImageStorage::Texture { name, target }
        };
        tracing::debug!(%handle, format = ?info.format, render_only, "created image");
        self.shared.images.insert(
            handle,
            GlImage {
                storage,
                info: *info,
                internal_format,
                format,
                ty,
            },
        );
        Ok(())
    }

    fn destroy_image(&mut self, handle: Handle) {
        if let Some((_, image)) = self.shared.images.remove(&handle) {
            match image.storage {
                ImageStorage::Texture { name, .. } => self.gl.delete_texture(name),
                ImageStorage::Renderbuffer { name } => self.gl.delete_renderbuffer(name),
            }
        }
    }

    fn create_sampler(&mut self, handle: Handle, info: &SamplerInfo) -> Result<()> {
        let gl = &mut *self.gl;
        let sampler = gl.gen_sampler();
        let min = convert::min_filter(info.min_filter, info.mip_filter) as i32;
        gl.sampler_parameter_i(sampler, gl::TEXTURE_MIN_FILTER, min);
        gl.sampler_parameter_i(
            sampler,
            gl::TEXTURE_MAG_FILTER,
            convert::mag_filter(info.mag_filter) as i32,
        );
        gl.sampler_parameter_i(sampler, gl::TEXTURE_WRAP_S, convert::wrap_mode(info.wrap_u) as i32);
        gl.sampler_parameter_i(sampler, gl::TEXTURE_WRAP_T, convert::wrap_mode(info.wrap_v) as i32);
        gl.sampler_parameter_i(sampler, gl::TEXTURE_WRAP_R, convert::wrap_mode(info.wrap_w) as i32);
        gl.sampler_parameter_f(sampler, gl::TEXTURE_MIN_LOD, info.lod_min);
        gl.sampler_parameter_f(sampler, gl::TEXTURE_MAX_LOD, info.lod_max);
        gl.sampler_parameter_f(sampler, gl::TEXTURE_LOD_BIAS, info.lod_bias);
        if info.max_anisotropy > 1.0 {
            gl.sampler_parameter_f(sampler, TEXTURE_MAX_ANISOTROPY, info.max_anisotropy);
        }
        if let Some(op) = info.compare_op {
            gl.sampler_parameter_i(
                sampler,
                gl::TEXTURE_COMPARE_MODE,
                gl::COMPARE_REF_TO_TEXTURE as i32,
            );
            let func = convert::compare_op(op) as i32;
            gl.sampler_parameter_i(sampler, gl::TEXTURE_COMPARE_FUNC, func);
        }
        if let Err(e) = check_error(gl, ResourceType::Sampler) {
            gl.delete_sampler(sampler);
            return Err(e);
        }
        self.shared.samplers.insert(handle, sampler);
        Ok(())
    }

    fn destroy_sampler(&mut self, handle: Handle) {
        if let Some((_, sampler)) = self.shared.samplers.remove(&handle) {
            self.gl.delete_sampler(sampler);
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
        let framebuffer = self.gl.gen_framebuffer();
        let mut color_index = 0;
        for (att, image_ref) in info.attachments.iter().zip(&info.images) {
            let point = convert::attachment_point(att.ty, color_index);
            if att.ty == AttachmentType::Color {
                color_index += 1;
            }
            if let Err(e) = self.attach(framebuffer, point, image_ref) {
                self.gl.delete_framebuffer(framebuffer);
                return Err(e);
            }
        }
        let status = self.gl.check_framebuffer_status(framebuffer);
        self.gl.bind_framebuffer(gl::FRAMEBUFFER, 0);
        if status != gl::FRAMEBUFFER_COMPLETE {
            self.gl.delete_framebuffer(framebuffer);
            return Err(NgfError::creation(
                ResourceType::RenderTarget,
                format!("framebuffer incomplete (status 0x{status:04x})"),
            ));
        }
        self.shared.render_targets.insert(
            handle,
            Arc::new(GlRenderTarget {
                framebuffer,
                attachments: info.attachments.clone(),
            }),
        );
        tracing::debug!(%handle, framebuffer, "created render target");
        Ok(())
    }

    fn destroy_render_target(&mut self, handle: Handle) {
        if let Some((_, rt)) = self.shared.render_targets.remove(&handle) {
            if !rt.is_default() {
                self.gl.delete_framebuffer(rt.framebuffer);
            }
        }
    }

    fn create_buffer(&mut self, handle: Handle, info: &BufferInfo) -> Result<()> {
        let name = self.gl.gen_buffer();
        self.gl
            .buffer_data(name, info.size, None, convert::buffer_usage(info.storage));
        if let Err(e) = check_error(&mut *self.gl, ResourceType::Buffer) {
            self.gl.delete_buffer(name);
            return Err(e);
        }
        self.shared
            .buffers
            .insert(handle, GlBuffer { name, info: *info });
        tracing::debug!(%handle, size = info.size, "created buffer");
        Ok(())
    }

    fn destroy_buffer(&mut self, handle: Handle) {
        if let Some((_, buffer)) = self.shared.buffers.remove(&handle) {
            self.gl.delete_buffer(buffer.name);
        }
    }

    fn write_buffer(&mut self, handle: Handle, offset: u64, data: &[u8]) -> Result<()> {
        let name = self.host_buffer(handle, offset, data.len())?;
        self.gl.buffer_sub_data(name, offset, data);
        Ok(())
    }

    fn read_buffer(&mut self, handle: Handle, offset: u64, out: &mut [u8]) -> Result<()> {
        let name = self.host_buffer(handle, offset, out.len())?;
        self.gl.get_buffer_sub_data(name, offset, out);
        Ok(())
    }

    fn create_descriptor_set_layout(
        &mut self,
        handle: Handle,
        info: &DescriptorSetLayoutInfo,
    ) -> Result<()> {
        descriptor::validate_layout(info)?;
        self.shared.set_layouts.insert(handle, info.clone());
        Ok(())
    }

    fn destroy_descriptor_set_layout(&mut self, handle: Handle) {
        self.shared.set_layouts.remove(&handle);
    }

    fn create_descriptor_set(&mut self, handle: Handle, layout: Handle) -> Result<()> {
        let set = {
            let layout_info = self
                .shared
                .set_layouts
                .get(&layout)
                .ok_or(NgfError::InvalidHandle(layout))?;
            EmulatedDescriptorSet::new(&layout_info, &self.shared.host)?
        };
        self.shared.descriptor_sets.insert(handle, set);
        Ok(())
    }

    fn destroy_descriptor_set(&mut self, handle: Handle) {
        self.shared.descriptor_sets.remove(&handle);
    }

    fn apply_descriptor_writes(&mut self, set: Handle, writes: &[DescriptorWrite]) -> Result<()> {
        self.shared
            .descriptor_sets
            .get_mut(&set)
            .ok_or(NgfError::InvalidHandle(set))?
            .apply_writes(writes)
    }

    fn cmd_buffer_create(&mut self, handle: Handle) -> Result<()> {
        self.shared.commands.lock().create_list(handle);
        Ok(())
    }

    fn cmd_buffer_reset(&mut self, handle: Handle) -> Result<()> {
        self.shared.commands.lock().clear_list(handle);
        Ok(())
    }

    fn cmd_buffer_finish(&mut self, handle: Handle) -> Result<()> {
        tracing::trace!(
            cmd_buffer = %handle,
            commands = self.shared.commands.lock().len(handle),
            "finished recording"
        );
        Ok(())
    }

    fn cmd_buffer_destroy(&mut self, handle: Handle) {
        self.shared.commands.lock().remove_list(handle);
    }

    fn record(&mut self, cmd_buffer: Handle, command: RenderCommand) -> Result<()> {
        if let RenderCommand::WriteImage { dst, .. } = &command {
            let image = self
                .shared
                .images
                .get(&dst.image)
                .ok_or(NgfError::InvalidHandle(dst.image))?;
            if matches!(image.storage, ImageStorage::Renderbuffer { .. }) {
                return Err(NgfError::Unsupported(
                    "cannot populate a renderbuffer-backed image directly".into(),
                ));
            }
            if image.info.sample_count != SampleCount::S1 {
                return Err(NgfError::Unsupported(
                    "cannot populate a multisampled image directly".into(),
                ));
            }
        }
        self.shared.commands.lock().append(cmd_buffer, command)
    }

    fn submit(&mut self, cmd_buffers: &[Handle]) -> std::result::Result<(), SubmitError> {
        let shared = Arc::clone(&self.shared);
        let mut failure = None;
        let mut consumed = 0;
        {
            let store = shared.commands.lock();
            let mut replayer = Replayer::new(
                &mut *self.gl,
                &mut self.cache,
                &mut self.scratch,
                &shared,
                &mut self.current,
            );
            'batch: for &cmd_buffer in cmd_buffers {
                let cmds = match store.iter(cmd_buffer) {
                    Ok(cmds) => cmds,
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                };
                // A buffer that started executing is spent even if it aborts.
                consumed += 1;
                for cmd in cmds {
                    if let Err(e) = replayer.execute(cmd) {
                        tracing::error!(%cmd_buffer, ?cmd, "replay aborted: {}", e);
                        failure = Some(e);
                        break 'batch;
                    }
                }
                replayer.end_buffer();
            }
        }
        let mut store = shared.commands.lock();
        for &cmd_buffer in &cmd_buffers[..consumed] {
            store.clear_list(cmd_buffer);
        }
        self.current.submitted_cmd_buffers += consumed as u32;
        match failure {
            Some(error) => Err(SubmitError { consumed, error }),
            None => Ok(()),
        }
    }
}

impl Drop for GlBackend {
    fn drop(&mut self) {
        tracing::debug!(frames = self.frame, "GL context destroyed");
    }
}
