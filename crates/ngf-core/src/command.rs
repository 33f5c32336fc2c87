use crate::handle::Handle;
use crate::types::{ClearValue, Extent3d, ImageRef, IndexType, Irect2d, Offset3d, StencilFace};

/// One portable recording operation.
///
/// Objects are referenced by handle only; a command never keeps the object
/// alive. The immediate-mode backend stores these verbatim and replays them,
/// the explicit backend translates them on the spot.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    BindPipeline(Handle),
    BeginPass {
        target: Handle,
        clears: Vec<ClearValue>,
    },
    EndPass,
    Viewport(Irect2d),
    Scissor(Irect2d),
    LineWidth(f32),
    BlendConstants([f32; 4]),
    StencilReference {
        face: StencilFace,
        reference: u32,
    },
    StencilWriteMask {
        face: StencilFace,
        mask: u32,
    },
    StencilCompareMask {
        face: StencilFace,
        mask: u32,
    },
    BindDescriptorSet {
        set: Handle,
        slot: u32,
    },
    BindVertexBuffer {
        buffer: Handle,
        binding: u32,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: Handle,
        offset: u64,
        ty: IndexType,
    },
    Draw {
        indexed: bool,
        first_element: u32,
        nelements: u32,
        ninstances: u32,
    },
    CopyBuffer {
        src: Handle,
        dst: Handle,
        size: u64,
        src_offset: u64,
        dst_offset: u64,
    },
    WriteImage {
        src: Handle,
        src_offset: u64,
        dst: ImageRef,
        offset: Offset3d,
        extent: Extent3d,
    },
}

impl RenderCommand {
    /// Commands that may only appear inside a render pass.
    pub fn requires_pass(&self) -> bool {
        matches!(self, RenderCommand::Draw { .. } | RenderCommand::EndPass)
    }

    /// Transfer commands, which may only appear outside a render pass.
    pub fn is_transfer(&self) -> bool {
        matches!(
            self,
            RenderCommand::CopyBuffer { .. } | RenderCommand::WriteImage { .. }
        )
    }
}
