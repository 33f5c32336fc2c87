use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use ngf::types::DevicePreference;
use ngf::{BackendSelect, ContextInfo, NgfConfig, VkBackendInfo};

#[derive(Parser)]
#[command(name = "ngfctl")]
#[command(about = "NGF - backend-agnostic GPU command layer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Preference {
    Discrete,
    Integrated,
    Any,
}

impl From<Preference> for DevicePreference {
    fn from(p: Preference) -> Self {
        match p {
            Preference::Discrete => DevicePreference::Discrete,
            Preference::Integrated => DevicePreference::Integrated,
            Preference::Any => DevicePreference::DontCare,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the effective configuration as TOML
    Config {
        /// Configuration file path (defaults to NGF_CONFIG or ngf.toml)
        #[arg(short, long)]
        config: Option<String>,

        /// Fail instead of falling back to defaults when the file is invalid
        #[arg(long)]
        check: bool,
    },

    /// Open a headless Vulkan context and report device capabilities
    Probe {
        /// Which kind of physical device to prefer
        #[arg(short, long, value_enum, default_value_t = Preference::Discrete)]
        preference: Preference,

        /// Configuration file path (defaults to NGF_CONFIG or ngf.toml)
        #[arg(short, long)]
        config: Option<String>,

        /// Number of empty frames to run through the frame ring
        #[arg(short, long, default_value_t = 0)]
        frames: u32,
    },
}

fn load_config(path: Option<String>, strict: bool) -> anyhow::Result<NgfConfig> {
    let path = path.unwrap_or_else(ngf_core::config::default_config_path);
    if strict {
        NgfConfig::load(&path).with_context(|| format!("loading {path}"))
    } else {
        Ok(NgfConfig::load_or_default(&path))
    }
}

fn main() -> anyhow::Result<()> {
    ngf_common::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { config, check } => {
            let config = load_config(config, check)?;
            print!("{}", toml::to_string_pretty(&config)?);
        }

        Commands::Probe {
            preference,
            config,
            frames,
        } => {
            let config = load_config(config, false)?;
            let instance = ngf::initialize(preference.into(), config)?;
            let mut ctx = instance.create_context(ContextInfo {
                backend: BackendSelect::Vulkan(VkBackendInfo {
                    surface: None,
                    swapchain: None,
                    shared_with: None,
                }),
                shared_with: None,
            })?;

            let caps = ctx.capabilities();
            println!("Device:   {}", caps.device_name);
            println!("Backend:  {:?}", caps.backend);
            println!("Discrete: {}", caps.is_discrete);
            println!();
            println!("  Uniform buffer bindings:  {}", caps.max_uniform_buffer_bindings);
            println!("  Storage buffer bindings:  {}", caps.max_storage_buffer_bindings);
            println!("  Texture units:            {}", caps.max_texture_units);
            println!("  Sampler units:            {}", caps.max_sampler_units);
            println!("  Vertex attributes:        {}", caps.max_vertex_input_attributes);
            println!("  UBO offset alignment:     {}", caps.uniform_buffer_offset_alignment);
            println!(
                "  Max viewport:             {}x{}",
                caps.max_viewport_dims[0], caps.max_viewport_dims[1]
            );
            println!(
                "  Max framebuffer:          {}x{}",
                caps.max_framebuffer_extent[0], caps.max_framebuffer_extent[1]
            );
            println!("  Max line width:           {}", caps.max_line_width);
            println!("  Tessellation:             {}", caps.supports_tessellation);

            if frames > 0 {
                ctx.make_current()?;
                let mut fence_waits = 0;
                for _ in 0..frames {
                    ctx.begin_frame()?;
                    ctx.end_frame()?;
                    fence_waits += ctx.frame_stats().fence_waits;
                }
                info!(frames, fence_waits, "frame ring exercised");
                println!();
                println!("Ran {frames} empty frame(s), {fence_waits} fence wait(s)");
            }
        }
    }

    Ok(())
}
