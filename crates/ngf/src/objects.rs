//! Typed handles for context-owned objects.
//!
//! These are plain values: destroying the object through its context
//! invalidates every copy, and later use fails with `InvalidHandle`.

use ngf_core::types::{BufferInfo, ImageInfo, ShaderStageType};
use ngf_core::Handle;

macro_rules! typed_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name {
            pub(crate) handle: Handle,
        }

        impl $name {
            pub fn handle(&self) -> Handle {
                self.handle
            }
        }
    };
}

typed_handle!(GraphicsPipeline);
typed_handle!(Sampler);
typed_handle!(
    /// A set of attachments rendered together; also the context's default
    /// target when it presents.
    RenderTarget
);
typed_handle!(DescriptorSetLayout);
typed_handle!(DescriptorSet);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderStage {
    pub(crate) handle: Handle,
    pub(crate) ty: ShaderStageType,
}

impl ShaderStage {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn ty(&self) -> ShaderStageType {
        self.ty
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Image {
    pub(crate) handle: Handle,
    pub(crate) info: ImageInfo,
}

impl Image {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn info(&self) -> &ImageInfo {
        &self.info
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Buffer {
    pub(crate) handle: Handle,
    pub(crate) info: BufferInfo,
}

impl Buffer {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn size(&self) -> u64 {
        self.info.size
    }

    pub fn info(&self) -> &BufferInfo {
        &self.info
    }
}
