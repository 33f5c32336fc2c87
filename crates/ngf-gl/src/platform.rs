use std::ffi::c_void;

use ngf_core::Result;

/// Window-system glue for one GL context (EGL, WGL, GLX or a toolkit).
///
/// The backend never creates native contexts itself; the caller hands it an
/// implementation that owns one.
pub trait GlPlatform: Send {
    /// Bind the native context to the calling thread.
    fn make_current(&mut self) -> Result<()>;

    /// Present the default framebuffer.
    fn swap_buffers(&mut self) -> Result<()>;

    /// Notify the window system of a new drawable size.
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;

    fn get_proc_address(&self, symbol: &str) -> *const c_void;
}
