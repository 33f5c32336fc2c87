//! Vulkan object records and the deferred-destruction queue.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use ngf_core::descriptor::EmulatedDescriptorSet;
use ngf_core::types::{
    AttachmentDescription, BufferInfo, DescriptorSetLayoutInfo, ImageInfo, PipelineState,
    ShaderStageType,
};

use crate::cmd::CommandPool;
use crate::device::VkShared;
use crate::memory::Allocation;

pub(crate) struct VkBuffer {
    pub raw: vk::Buffer,
    pub memory: Allocation,
    pub info: BufferInfo,
}

pub(crate) struct VkImage {
    pub raw: vk::Image,
    pub view: vk::ImageView,
    /// Unset only while the image is being built.
    pub memory: Option<Allocation>,
    pub info: ImageInfo,
    pub aspect: vk::ImageAspectFlags,
}

pub(crate) struct VkShaderStage {
    pub module: vk::ShaderModule,
    pub ty: ShaderStageType,
    pub entry_point: CString,
}

pub(crate) struct VkPipeline {
    pub raw: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    /// Set layouts built from the pipeline's own layout description.
    pub owned_set_layouts: Vec<vk::DescriptorSetLayout>,
    pub state: PipelineState,
}

pub(crate) struct VkRenderTarget {
    pub render_pass: vk::RenderPass,
    /// Null for the swapchain target, whose framebuffer follows the
    /// acquired image.
    pub framebuffer: vk::Framebuffer,
    /// Per-attachment views of the referenced image subresources.
    pub views: Vec<vk::ImageView>,
    pub extent: vk::Extent2D,
    pub attachments: Vec<AttachmentDescription>,
}

pub(crate) struct VkSetLayout {
    pub raw: vk::DescriptorSetLayout,
    pub info: DescriptorSetLayoutInfo,
}

pub(crate) struct VkDescriptorSet {
    pub raw: vk::DescriptorSet,
    pub pool: vk::DescriptorPool,
    /// Mirrors the native set so writes are validated against the layout.
    pub emulated: EmulatedDescriptorSet,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct BoundPipeline {
    pub layout: vk::PipelineLayout,
}

pub(crate) struct VkCmdBuffer {
    pub pool: Arc<CommandPool>,
    /// Taken by `submit`; a fresh one is allocated on the next reset.
    pub native: Option<vk::CommandBuffer>,
    pub in_pass: bool,
    pub pipeline: Option<BoundPipeline>,
    pub index_bound: bool,
}

impl VkRenderTarget {
    /// Not for the swapchain target, whose render pass the swapchain owns.
    pub unsafe fn destroy(self, device: &ash::Device) {
        if self.framebuffer != vk::Framebuffer::null() {
            device.destroy_framebuffer(self.framebuffer, None);
        }
        for view in self.views {
            device.destroy_image_view(view, None);
        }
        device.destroy_render_pass(self.render_pass, None);
    }
}

/// Objects whose native destruction waits for the frames using them.
pub(crate) enum Retired {
    Buffer(VkBuffer),
    Image(VkImage),
    Sampler(vk::Sampler),
    ShaderModule(vk::ShaderModule),
    Pipeline(VkPipeline),
    RenderTarget(VkRenderTarget),
    SetLayout(vk::DescriptorSetLayout),
    DescriptorSet(VkDescriptorSet),
}

impl Retired {
    pub fn destroy(self, shared: &VkShared) {
        let device = &shared.device;
        unsafe {
            match self {
                Retired::Buffer(b) => {
                    device.destroy_buffer(b.raw, None);
                    b.memory.free(device);
                }
                Retired::Image(i) => {
                    device.destroy_image_view(i.view, None);
                    device.destroy_image(i.raw, None);
                    if let Some(memory) = i.memory {
                        memory.free(device);
                    }
                }
                Retired::Sampler(s) => device.destroy_sampler(s, None),
                Retired::ShaderModule(m) => device.destroy_shader_module(m, None),
                Retired::Pipeline(p) => {
                    device.destroy_pipeline(p.raw, None);
                    device.destroy_pipeline_layout(p.layout, None);
                    for layout in p.owned_set_layouts {
                        device.destroy_descriptor_set_layout(layout, None);
                    }
                }
                Retired::RenderTarget(rt) => rt.destroy(device),
                Retired::SetLayout(l) => device.destroy_descriptor_set_layout(l, None),
                Retired::DescriptorSet(set) => {
                    shared.descriptor_pools.lock().free(device, set.pool, set.raw)
                }
            }
        }
    }
}
