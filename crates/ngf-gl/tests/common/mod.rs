#![allow(dead_code)]

use std::ffi::c_void;

use ngf_core::types::{
    DescriptorInfo, DescriptorSetLayoutInfo, DescriptorType, GraphicsPipelineDesc, ImageFormat,
    InputRate, PipelineLayoutInfo, PipelineState, PresentMode, SampleCount, ShaderStageInfo,
    ShaderStageType, StageFlags, SwapchainInfo, VertexAttribDesc, VertexAttribType,
    VertexBufBindingDesc, VertexInputInfo,
};
use ngf_core::{Backend, Handle, HostAllocator, NgfConfig};
use ngf_gl::{GlBackend, GlBackendInfo, GlPlatform, RecordingGl};

pub const DEFAULT_RT: Handle = Handle::from_raw(100);
pub const VS: Handle = Handle::from_raw(1);
pub const FS: Handle = Handle::from_raw(2);
pub const PIPELINE: Handle = Handle::from_raw(10);
pub const CMD: Handle = Handle::from_raw(20);

/// Platform glue with nothing behind it.
pub struct Headless;

impl GlPlatform for Headless {
    fn make_current(&mut self) -> ngf_core::Result<()> {
        Ok(())
    }

    fn swap_buffers(&mut self) -> ngf_core::Result<()> {
        Ok(())
    }

    fn resize(&mut self, _width: u32, _height: u32) -> ngf_core::Result<()> {
        Ok(())
    }

    fn get_proc_address(&self, _symbol: &str) -> *const c_void {
        std::ptr::null()
    }
}

pub fn swapchain() -> SwapchainInfo {
    SwapchainInfo {
        width: 640,
        height: 480,
        color_format: ImageFormat::Rgba8,
        depth_format: Some(ImageFormat::Depth24Stencil8),
        sample_count: SampleCount::S1,
        capacity_hint: 3,
        present_mode: PresentMode::Fifo,
    }
}

pub fn backend_with(gl: &RecordingGl, config: &NgfConfig) -> GlBackend {
    ngf_common::try_init_logging();
    GlBackend::new(
        GlBackendInfo {
            platform: Box::new(Headless),
            api: Some(Box::new(gl.clone())),
            swapchain: Some(swapchain()),
            shared_with: None,
        },
        config,
        HostAllocator::default(),
    )
    .unwrap()
}

pub fn backend(gl: &RecordingGl) -> GlBackend {
    backend_with(gl, &NgfConfig::default())
}

pub fn shader(ty: ShaderStageType, source: &str) -> ShaderStageInfo {
    ShaderStageInfo {
        ty,
        content: source.as_bytes().to_vec(),
        entry_point: "main".into(),
        debug_name: None,
    }
}

pub fn binding(ty: DescriptorType, id: u32) -> DescriptorInfo {
    DescriptorInfo {
        ty,
        id,
        stage_flags: StageFlags::VERTEX | StageFlags::FRAGMENT,
    }
}

/// Set 0: uniform buffer at 0, combined image sampler at 1.
/// Set 1: uniform buffer at 0.
pub fn layout() -> PipelineLayoutInfo {
    PipelineLayoutInfo {
        sets: vec![
            DescriptorSetLayoutInfo {
                descriptors: vec![
                    binding(DescriptorType::UniformBuffer, 0),
                    binding(DescriptorType::CombinedImageSampler, 1),
                ],
            },
            DescriptorSetLayoutInfo {
                descriptors: vec![binding(DescriptorType::UniformBuffer, 0)],
            },
        ],
    }
}

pub fn pipeline_desc(state: PipelineState) -> GraphicsPipelineDesc {
    GraphicsPipelineDesc {
        shader_stages: vec![VS, FS],
        state,
        vertex_input: VertexInputInfo {
            attribs: vec![VertexAttribDesc {
                location: 0,
                binding: 0,
                offset: 0,
                ty: VertexAttribType::Float32,
                size: 3,
                normalized: false,
            }],
            bindings: vec![VertexBufBindingDesc {
                binding: 0,
                stride: 12,
                input_rate: InputRate::Vertex,
            }],
        },
        layout: layout(),
        set_layouts: Vec::new(),
        compatible_render_target: DEFAULT_RT,
        image_to_combined_map: None,
        sampler_to_combined_map: None,
    }
}

/// Shaders, the default render target, one pipeline with default state and
/// an empty command buffer.
pub fn scene(gl: &RecordingGl) -> GlBackend {
    let mut b = backend(gl);
    b.create_shader_stage(VS, &shader(ShaderStageType::Vertex, "#version 450\nvoid main() {}"))
        .unwrap();
    b.create_shader_stage(FS, &shader(ShaderStageType::Fragment, "#version 450\nvoid main() {}"))
        .unwrap();
    assert!(b.create_default_render_target(DEFAULT_RT).unwrap());
    b.create_graphics_pipeline(PIPELINE, &pipeline_desc(PipelineState::default()))
        .unwrap();
    b.cmd_buffer_create(CMD).unwrap();
    b
}

/// Record `cmds` into `cb` and submit it inside one frame.
pub fn run_frame(
    b: &mut GlBackend,
    cb: Handle,
    cmds: Vec<ngf_core::RenderCommand>,
) -> ngf_core::Result<()> {
    b.begin_frame()?;
    b.cmd_buffer_reset(cb)?;
    for cmd in cmds {
        b.record(cb, cmd)?;
    }
    b.cmd_buffer_finish(cb)?;
    let result = b.submit(&[cb]).map_err(Into::into);
    b.end_frame()?;
    result
}
