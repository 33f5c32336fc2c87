//! Backend-agnostic core of the NGF command execution layer.
//!
//! Holds everything both native backends agree on: the error taxonomy,
//! configuration, opaque handles and the handle pool, scratch and block
//! arenas, the command buffer state machine, the native binding map, and
//! descriptor set emulation. Backends plug in through [`backend::Backend`].

pub mod alloc;
pub mod arena;
pub mod backend;
pub mod binding_map;
pub mod caps;
pub mod cmd_state;
pub mod command;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod handle;
pub mod handle_pool;
pub mod types;

pub use alloc::{AllocationCallbacks, HostAllocation, HostAllocator};
pub use backend::{Backend, FrameStats, SharedBackendState};
pub use caps::{CapabilityCache, DeviceCapabilities};
pub use cmd_state::CmdBufferState;
pub use command::RenderCommand;
pub use config::NgfConfig;
pub use error::{ErrorCode, NgfError, Result, SubmitError};
pub use handle::{Handle, ResourceType};
pub use handle_pool::HandlePool;
