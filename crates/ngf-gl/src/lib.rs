//! OpenGL 4.5 backend.
//!
//! GL has no command buffers, so recorded commands are kept in arena-backed
//! lists and replayed against the context at submit time. Replay goes
//! through [`GlApi`], with the pipeline state diffed against what the
//! context already holds. Descriptor sets are emulated and resolved to flat
//! binding points through each pipeline's native binding map.

mod api;
mod backend;
mod cmd_list;
mod convert;
mod native;
mod objects;
mod platform;
mod recording;
mod replay;
mod state_cache;

pub use api::GlApi;
pub use backend::{GlBackend, GlBackendInfo};
pub use native::NativeGl;
pub use objects::GlShared;
pub use platform::GlPlatform;
pub use recording::{GlCall, RecordingGl};
pub use state_cache::{DiffStats, StateCache};
