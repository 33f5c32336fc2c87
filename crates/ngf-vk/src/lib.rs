//! Vulkan backend.
//!
//! Commands are recorded straight into native command buffers. Submitted
//! buffers are queued on the current frame and handed to the device at
//! `end_frame`, gated on the swapchain image acquire; a ring of per-frame
//! fences bounds how far the CPU runs ahead.

use ash::vk;
use ngf_core::NgfError;

mod backend;
mod cmd;
mod convert;
mod descriptor;
mod device;
pub mod memory;
mod objects;
mod pass;
mod swapchain;
pub mod sync;

pub use backend::{VkBackend, VkBackendInfo};
pub use device::VkShared;
pub use swapchain::SurfaceSource;
pub use sync::{FrameRecord, FrameSyncRing, SyncDevice};

pub(crate) fn vk_err(result: vk::Result) -> NgfError {
    NgfError::Native {
        code: result.as_raw(),
        message: format!("{result:?}"),
    }
}
