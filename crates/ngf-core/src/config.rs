use serde::{Deserialize, Serialize};

use crate::error::{NgfError, Result};
use crate::types::DevicePreference;

/// Top-level NGF configuration, loaded from ngf.toml.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NgfConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub frames: FrameConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub vulkan: VulkanConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Which kind of adapter to prefer when several are present
    #[serde(default)]
    pub preference: DevicePreference,
    /// Backend selection: "auto", "gl" or "vulkan"
    #[serde(default)]
    pub backend: BackendChoice,
}

/// Backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendChoice {
    /// Whatever the context info asks for
    #[default]
    #[serde(rename = "auto")]
    Auto,
    #[serde(rename = "gl")]
    Gl,
    #[serde(rename = "vulkan")]
    Vulkan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Frames the CPU may run ahead of the GPU
    #[serde(default = "default_max_inflight_frames")]
    pub max_inflight_frames: u32,
    /// Upper bound on a single frame-retirement fence wait
    #[serde(default = "default_fence_timeout_ms")]
    pub fence_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Handles pre-minted by the handle pool
    #[serde(default = "default_handle_pool_size")]
    pub handle_pool_initial_size: usize,
    /// Command records per arena block
    #[serde(default = "default_command_arena_block_len")]
    pub command_arena_block_len: usize,
    /// Initial size of the per-context scratch arena
    #[serde(default = "default_scratch_arena_bytes")]
    pub scratch_arena_bytes: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulkanConfig {
    /// Enable VK_LAYER_KHRONOS_validation when present
    #[serde(default)]
    pub validation: bool,
    /// Application name reported to the driver
    #[serde(default = "default_application_name")]
    pub application_name: String,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_inflight_frames: default_max_inflight_frames(),
            fence_timeout_ms: default_fence_timeout_ms(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            handle_pool_initial_size: default_handle_pool_size(),
            command_arena_block_len: default_command_arena_block_len(),
            scratch_arena_bytes: default_scratch_arena_bytes(),
        }
    }
}

impl Default for VulkanConfig {
    fn default() -> Self {
        Self {
            validation: false,
            application_name: default_application_name(),
        }
    }
}

impl NgfConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: NgfConfig =
            toml::from_str(content).map_err(|e| NgfError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file if it exists, otherwise return defaults.
    pub fn load_or_default(path: &str) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(NgfError::Io(_)) => Self::default(),
            Err(e) => {
                tracing::warn!("ignoring {}: {}", path, e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.frames.max_inflight_frames == 0 {
            return Err(NgfError::Config(
                "frames.max_inflight_frames must be at least 1".to_string(),
            ));
        }
        if self.memory.command_arena_block_len == 0 {
            return Err(NgfError::Config(
                "memory.command_arena_block_len must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fence_timeout_ns(&self) -> u64 {
        self.frames.fence_timeout_ms.saturating_mul(1_000_000)
    }
}

/// Returns the default config file path.
/// Search order:
/// 1. `NGF_CONFIG` environment variable
/// 2. System-wide config: `%PROGRAMDATA%\NGF\ngf.toml` (Windows) or `/etc/ngf/ngf.toml`
/// 3. Local fallback: `./ngf.toml`
pub fn default_config_path() -> String {
    if let Ok(path) = std::env::var("NGF_CONFIG") {
        return path;
    }
    #[cfg(windows)]
    {
        let programdata =
            std::env::var("PROGRAMDATA").unwrap_or_else(|_| r"C:\ProgramData".to_string());
        let system_path = format!(r"{}\NGF\ngf.toml", programdata);
        if std::path::Path::new(&system_path).exists() {
            return system_path;
        }
    }
    #[cfg(not(windows))]
    {
        let system_path = "/etc/ngf/ngf.toml";
        if std::path::Path::new(system_path).exists() {
            return system_path.to_string();
        }
    }
    "ngf.toml".to_string()
}

fn default_max_inflight_frames() -> u32 {
    3
}

fn default_fence_timeout_ms() -> u64 {
    1000
}

fn default_handle_pool_size() -> usize {
    64
}

fn default_command_arena_block_len() -> usize {
    1024
}

fn default_scratch_arena_bytes() -> usize {
    64 * 1024
}

fn default_application_name() -> String {
    "ngf".to_string()
}
