//! GL-side object records and the registry shared between contexts.

use std::sync::Arc;

use dashmap::DashMap;
use gl::types::{GLenum, GLuint};
use ngf_core::binding_map::NativeBindingMap;
use ngf_core::descriptor::EmulatedDescriptorSet;
use ngf_core::types::{
    AttachmentDescription, BufferInfo, DescriptorSetLayoutInfo, ImageInfo, PipelineState,
    ShaderStageType,
};
use ngf_core::{DeviceCapabilities, Handle, HostAllocator};
use parking_lot::Mutex;

use crate::cmd_list::CommandStore;

pub(crate) struct GlBuffer {
    pub name: GLuint,
    pub info: BufferInfo,
}

pub(crate) enum ImageStorage {
    Texture { name: GLuint, target: GLenum },
    Renderbuffer { name: GLuint },
}

pub(crate) struct GlImage {
    pub storage: ImageStorage,
    pub info: ImageInfo,
    pub internal_format: GLenum,
    pub format: GLenum,
    pub ty: GLenum,
}

pub(crate) struct GlShaderStage {
    pub name: GLuint,
    pub ty: ShaderStageType,
}

pub(crate) struct GlPipeline {
    pub program: GLuint,
    pub vao: GLuint,
    pub state: PipelineState,
    pub mode: GLenum,
    pub binding_map: NativeBindingMap,
    /// `(binding, stride)` for each vertex buffer binding.
    pub vertex_strides: Vec<(u32, i32)>,
}

impl GlPipeline {
    pub fn stride(&self, binding: u32) -> i32 {
        self.vertex_strides
            .iter()
            .find(|(b, _)| *b == binding)
            .map_or(0, |(_, s)| *s)
    }
}

pub(crate) struct GlRenderTarget {
    /// Zero for the default framebuffer.
    pub framebuffer: GLuint,
    pub attachments: Vec<AttachmentDescription>,
}

impl GlRenderTarget {
    pub fn is_default(&self) -> bool {
        self.framebuffer == 0
    }
}

/// Objects visible to every context created with `shared_with`.
pub struct GlShared {
    pub(crate) buffers: DashMap<Handle, GlBuffer>,
    pub(crate) images: DashMap<Handle, GlImage>,
    pub(crate) samplers: DashMap<Handle, GLuint>,
    pub(crate) shader_stages: DashMap<Handle, GlShaderStage>,
    pub(crate) pipelines: DashMap<Handle, Arc<GlPipeline>>,
    pub(crate) render_targets: DashMap<Handle, Arc<GlRenderTarget>>,
    pub(crate) set_layouts: DashMap<Handle, DescriptorSetLayoutInfo>,
    pub(crate) descriptor_sets: DashMap<Handle, EmulatedDescriptorSet>,
    pub(crate) commands: Mutex<CommandStore>,
    pub(crate) caps: DeviceCapabilities,
    pub(crate) host: HostAllocator,
}

impl GlShared {
    pub(crate) fn new(caps: DeviceCapabilities, block_len: usize, host: HostAllocator) -> Self {
        Self {
            buffers: DashMap::new(),
            images: DashMap::new(),
            samplers: DashMap::new(),
            shader_stages: DashMap::new(),
            pipelines: DashMap::new(),
            render_targets: DashMap::new(),
            set_layouts: DashMap::new(),
            descriptor_sets: DashMap::new(),
            commands: Mutex::new(CommandStore::new(block_len, host.clone())),
            caps,
            host,
        }
    }

    /// Recorded commands not yet released by a submit, reset or destroy.
    pub fn pending_commands(&self) -> usize {
        self.commands.lock().live_commands()
    }

    pub fn command_arena_blocks(&self) -> usize {
        self.commands.lock().arena_blocks()
    }
}
