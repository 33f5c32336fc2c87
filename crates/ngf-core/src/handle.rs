use std::fmt;

/// An opaque 64-bit handle that identifies an object owned by a backend.
/// Zero is reserved as the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(u64);

impl Handle {
    pub const NULL: Handle = Handle(0);

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:x}", self.0)
    }
}

/// Type tag for the objects a context hands out. Used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Context,
    CmdBuffer,
    ShaderStage,
    GraphicsPipeline,
    Image,
    Sampler,
    RenderTarget,
    Buffer,
    DescriptorSetLayout,
    DescriptorSet,
    Swapchain,
    Surface,
    Device,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceType::Context => "context",
            ResourceType::CmdBuffer => "command buffer",
            ResourceType::ShaderStage => "shader stage",
            ResourceType::GraphicsPipeline => "graphics pipeline",
            ResourceType::Image => "image",
            ResourceType::Sampler => "sampler",
            ResourceType::RenderTarget => "render target",
            ResourceType::Buffer => "buffer",
            ResourceType::DescriptorSetLayout => "descriptor set layout",
            ResourceType::DescriptorSet => "descriptor set",
            ResourceType::Swapchain => "swapchain",
            ResourceType::Surface => "surface",
            ResourceType::Device => "device",
        };
        f.write_str(name)
    }
}
