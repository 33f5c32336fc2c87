use std::thread::{self, ThreadId};

use ngf_core::cmd_state::transition;
use ngf_core::types::{
    ClearValue, Extent3d, ImageRef, IndexType, Irect2d, Offset3d, StencilFace,
};
use ngf_core::{CmdBufferState, Handle, NgfError, RenderCommand, Result, SharedBackendState};

use crate::context::Context;
use crate::objects::{Buffer, DescriptorSet, GraphicsPipeline, RenderTarget};

/// A command buffer and its lifecycle state.
///
/// Recording reopens implicitly from `Ready` or `AwaitingSubmit`, so commands
/// may be appended after [`Context::end_cmd_buffer`] until the buffer is
/// submitted.
///
/// Recording stays on the creating thread. Submission may happen from any
/// context that shares the creator's device.
#[derive(Debug)]
pub struct CmdBuffer {
    handle: Handle,
    state: CmdBufferState,
    in_pass: bool,
    owner: ThreadId,
    device: SharedBackendState,
}

impl CmdBuffer {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn state(&self) -> CmdBufferState {
        self.state
    }

    pub fn in_render_pass(&self) -> bool {
        self.in_pass
    }

    fn check_owner(&self) -> Result<()> {
        if self.owner != thread::current().id() {
            return Err(NgfError::invalid_op(
                "command buffer used from a thread other than its creator",
            ));
        }
        Ok(())
    }
}

impl Context {
    pub fn create_cmd_buffer(&mut self) -> Result<CmdBuffer> {
        self.check_thread()?;
        let handle = self.handles.alloc()?;
        if let Err(e) = self.backend.cmd_buffer_create(handle) {
            self.handles.free(handle)?;
            return Err(e);
        }
        Ok(CmdBuffer {
            handle,
            state: CmdBufferState::New,
            in_pass: false,
            owner: thread::current().id(),
            device: self.backend.share(),
        })
    }

    /// Make `cb` ready for a fresh recording, discarding anything recorded
    /// but not submitted.
    pub fn start_cmd_buffer(&mut self, cb: &mut CmdBuffer) -> Result<()> {
        self.check_thread()?;
        cb.check_owner()?;
        let mut next = cb.state;
        transition(&mut next, cb.in_pass, CmdBufferState::Ready)?;
        self.backend.cmd_buffer_reset(cb.handle)?;
        cb.state = next;
        cb.in_pass = false;
        Ok(())
    }

    /// Close the current recording. Fails while a render pass is open.
    pub fn end_cmd_buffer(&mut self, cb: &mut CmdBuffer) -> Result<()> {
        self.check_thread()?;
        cb.check_owner()?;
        let mut next = cb.state;
        transition(&mut next, cb.in_pass, CmdBufferState::AwaitingSubmit)?;
        self.backend.cmd_buffer_finish(cb.handle)?;
        cb.state = next;
        Ok(())
    }

    /// Submit finished command buffers for execution in the current frame.
    ///
    /// If the backend fails partway, the buffers it already executed or
    /// queued still become `Submitted` and the rest stay `AwaitingSubmit`.
    pub fn submit(&mut self, cbs: &mut [&mut CmdBuffer]) -> Result<()> {
        self.check_thread()?;
        if !self.in_frame {
            return Err(NgfError::invalid_op("submit outside of a frame"));
        }
        let device = self.backend.share();
        for cb in cbs.iter() {
            if !cb.device.same_device(&device) {
                return Err(NgfError::invalid_op(format!(
                    "command buffer {} belongs to a context that does not share this device",
                    cb.handle
                )));
            }
            if cb.state != CmdBufferState::AwaitingSubmit {
                return Err(NgfError::invalid_op(format!(
                    "command buffer {} is {:?}, not awaiting submission",
                    cb.handle, cb.state
                )));
            }
        }
        let handles: Vec<Handle> = cbs.iter().map(|cb| cb.handle).collect();
        let (consumed, result) = match self.backend.submit(&handles) {
            Ok(()) => (handles.len(), Ok(())),
            Err(e) => (e.consumed.min(handles.len()), Err(e.error)),
        };
        for cb in cbs[..consumed].iter_mut() {
            transition(&mut cb.state, cb.in_pass, CmdBufferState::Submitted)?;
        }
        tracing::trace!(count = consumed, requested = handles.len(), "submitted command buffers");
        result
    }

    pub fn destroy_cmd_buffer(&mut self, cb: CmdBuffer) -> Result<()> {
        self.check_thread()?;
        cb.check_owner()?;
        self.handles.free(cb.handle)?;
        self.backend.cmd_buffer_destroy(cb.handle);
        Ok(())
    }

    fn record(&mut self, cb: &mut CmdBuffer, command: RenderCommand) -> Result<()> {
        self.check_thread()?;
        cb.check_owner()?;
        let mut next = cb.state;
        if next != CmdBufferState::Recording {
            transition(&mut next, cb.in_pass, CmdBufferState::Recording)?;
        }
        let in_pass = match &command {
            RenderCommand::BeginPass { .. } if cb.in_pass => {
                return Err(NgfError::invalid_op("render pass already in progress"));
            }
            RenderCommand::BeginPass { .. } => true,
            RenderCommand::EndPass if cb.in_pass => false,
            c if c.requires_pass() && !cb.in_pass => {
                return Err(NgfError::invalid_op(format!(
                    "{c:?} requires an active render pass"
                )));
            }
            c if c.is_transfer() && cb.in_pass => {
                return Err(NgfError::invalid_op(
                    "transfer commands are not allowed inside a render pass",
                ));
            }
            _ => cb.in_pass,
        };
        self.backend.record(cb.handle, command)?;
        cb.state = next;
        cb.in_pass = in_pass;
        Ok(())
    }

    // ── Recording ───────────────────────────────────────────

    pub fn cmd_bind_pipeline(
        &mut self,
        cb: &mut CmdBuffer,
        pipeline: &GraphicsPipeline,
    ) -> Result<()> {
        self.record(cb, RenderCommand::BindPipeline(pipeline.handle))
    }

    pub fn cmd_begin_pass(
        &mut self,
        cb: &mut CmdBuffer,
        target: &RenderTarget,
        clears: &[ClearValue],
    ) -> Result<()> {
        self.record(
            cb,
            RenderCommand::BeginPass {
                target: target.handle,
                clears: clears.to_vec(),
            },
        )
    }

    pub fn cmd_end_pass(&mut self, cb: &mut CmdBuffer) -> Result<()> {
        self.record(cb, RenderCommand::EndPass)
    }

    pub fn cmd_viewport(&mut self, cb: &mut CmdBuffer, rect: Irect2d) -> Result<()> {
        self.record(cb, RenderCommand::Viewport(rect))
    }

    pub fn cmd_scissor(&mut self, cb: &mut CmdBuffer, rect: Irect2d) -> Result<()> {
        self.record(cb, RenderCommand::Scissor(rect))
    }

    pub fn cmd_line_width(&mut self, cb: &mut CmdBuffer, width: f32) -> Result<()> {
        self.record(cb, RenderCommand::LineWidth(width))
    }

    pub fn cmd_blend_constants(&mut self, cb: &mut CmdBuffer, constants: [f32; 4]) -> Result<()> {
        self.record(cb, RenderCommand::BlendConstants(constants))
    }

    pub fn cmd_stencil_reference(
        &mut self,
        cb: &mut CmdBuffer,
        face: StencilFace,
        reference: u32,
    ) -> Result<()> {
        self.record(cb, RenderCommand::StencilReference { face, reference })
    }

    pub fn cmd_stencil_write_mask(
        &mut self,
        cb: &mut CmdBuffer,
        face: StencilFace,
        mask: u32,
    ) -> Result<()> {
        self.record(cb, RenderCommand::StencilWriteMask { face, mask })
    }

    pub fn cmd_stencil_compare_mask(
        &mut self,
        cb: &mut CmdBuffer,
        face: StencilFace,
        mask: u32,
    ) -> Result<()> {
        self.record(cb, RenderCommand::StencilCompareMask { face, mask })
    }

    /// Bind `set` at set index `slot` of the bound pipeline's layout.
    pub fn cmd_bind_descriptor_set(
        &mut self,
        cb: &mut CmdBuffer,
        set: &DescriptorSet,
        slot: u32,
    ) -> Result<()> {
        self.record(
            cb,
            RenderCommand::BindDescriptorSet {
                set: set.handle,
                slot,
            },
        )
    }

    pub fn cmd_bind_vertex_buffer(
        &mut self,
        cb: &mut CmdBuffer,
        buffer: &Buffer,
        binding: u32,
        offset: u64,
    ) -> Result<()> {
        self.record(
            cb,
            RenderCommand::BindVertexBuffer {
                buffer: buffer.handle,
                binding,
                offset,
            },
        )
    }

    pub fn cmd_bind_index_buffer(
        &mut self,
        cb: &mut CmdBuffer,
        buffer: &Buffer,
        offset: u64,
        ty: IndexType,
    ) -> Result<()> {
        self.record(
            cb,
            RenderCommand::BindIndexBuffer {
                buffer: buffer.handle,
                offset,
                ty,
            },
        )
    }

    pub fn cmd_draw(
        &mut self,
        cb: &mut CmdBuffer,
        indexed: bool,
        first_element: u32,
        nelements: u32,
        ninstances: u32,
    ) -> Result<()> {
        self.record(
            cb,
            RenderCommand::Draw {
                indexed,
                first_element,
                nelements,
                ninstances,
            },
        )
    }

    pub fn cmd_copy_buffer(
        &mut self,
        cb: &mut CmdBuffer,
        src: &Buffer,
        dst: &Buffer,
        size: u64,
        src_offset: u64,
        dst_offset: u64,
    ) -> Result<()> {
        if !fits(src, src_offset, size) || !fits(dst, dst_offset, size) {
            return Err(NgfError::OutOfBounds(format!(
                "copy of {size} bytes exceeds source or destination buffer"
            )));
        }
        self.record(
            cb,
            RenderCommand::CopyBuffer {
                src: src.handle,
                dst: dst.handle,
                size,
                src_offset,
                dst_offset,
            },
        )
    }

    /// Upload image data staged in `src` to a region of `dst`.
    pub fn cmd_write_image(
        &mut self,
        cb: &mut CmdBuffer,
        src: &Buffer,
        src_offset: u64,
        dst: ImageRef,
        offset: Offset3d,
        extent: Extent3d,
    ) -> Result<()> {
        self.record(
            cb,
            RenderCommand::WriteImage {
                src: src.handle,
                src_offset,
                dst,
                offset,
                extent,
            },
        )
    }
}

fn fits(buffer: &Buffer, offset: u64, len: u64) -> bool {
    matches!(offset.checked_add(len), Some(end) if end <= buffer.size())
}
