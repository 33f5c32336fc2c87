//! Integration test: context lifecycle, command buffer rules and object handles
//!
//! Run with: cargo test -p ngf --test api_test

use std::ffi::c_void;

use ngf::types::{
    BufferInfo, BufferStorage, BufferUsage, ClearValue, DescriptorInfo, DescriptorSetLayoutInfo,
    DescriptorType, DevicePreference, ImageFormat, Irect2d, PipelineLayoutInfo, PipelineState,
    PresentMode, SampleCount, ShaderStageInfo, ShaderStageType, StageFlags, SwapchainInfo,
    VertexInputInfo,
};
use ngf::{
    BackendSelect, CmdBufferState, Context, ContextInfo, DescriptorPayload, DescriptorWrite,
    GlBackendInfo, GlPlatform, GraphicsPipelineInfo, Instance, NgfConfig,
};
use ngf_core::config::BackendChoice;
use ngf_core::ErrorCode;
use ngf_gl::RecordingGl;

struct Headless;

impl GlPlatform for Headless {
    fn make_current(&mut self) -> ngf::Result<()> {
        Ok(())
    }

    fn swap_buffers(&mut self) -> ngf::Result<()> {
        Ok(())
    }

    fn resize(&mut self, _width: u32, _height: u32) -> ngf::Result<()> {
        Ok(())
    }

    fn get_proc_address(&self, _symbol: &str) -> *const c_void {
        std::ptr::null()
    }
}

fn instance() -> Instance {
    ngf_common::try_init_logging();
    ngf::initialize(DevicePreference::DontCare, NgfConfig::default()).unwrap()
}

fn gl_info(gl: &RecordingGl, presentable: bool) -> ContextInfo<'static> {
    let swapchain = presentable.then_some(SwapchainInfo {
        width: 320,
        height: 240,
        color_format: ImageFormat::Rgba8,
        depth_format: None,
        sample_count: SampleCount::S1,
        capacity_hint: 2,
        present_mode: PresentMode::Fifo,
    });
    ContextInfo {
        backend: BackendSelect::Gl(GlBackendInfo {
            platform: Box::new(Headless),
            api: Some(Box::new(gl.clone())),
            swapchain,
            shared_with: None,
        }),
        shared_with: None,
    }
}

fn current_context(instance: &Instance, gl: &RecordingGl) -> Context {
    let mut ctx = instance.create_context(gl_info(gl, true)).unwrap();
    ctx.make_current().unwrap();
    ctx
}

fn shader(ty: ShaderStageType, source: &str) -> ShaderStageInfo {
    ShaderStageInfo {
        ty,
        content: source.as_bytes().to_vec(),
        entry_point: "main".into(),
        debug_name: None,
    }
}

fn uniform_layout() -> DescriptorSetLayoutInfo {
    DescriptorSetLayoutInfo {
        descriptors: vec![DescriptorInfo {
            ty: DescriptorType::UniformBuffer,
            id: 0,
            stage_flags: StageFlags::VERTEX,
        }],
    }
}

fn host_buffer(ctx: &mut Context, size: u64) -> ngf::Buffer {
    ctx.create_buffer(&BufferInfo {
        size,
        storage: BufferStorage::HostReadWrite,
        usage: BufferUsage::UNIFORM | BufferUsage::XFER_SRC | BufferUsage::XFER_DST,
    })
    .unwrap()
}

#[test]
fn test_calls_require_a_current_context() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = instance.create_context(gl_info(&gl, true)).unwrap();

    let err = ctx.create_cmd_buffer().unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    assert_eq!(ctx.begin_frame().unwrap_err().code(), ErrorCode::InvalidOperation);

    ctx.make_current().unwrap();
    // Claiming again from the owning thread is fine.
    ctx.make_current().unwrap();
    ctx.create_cmd_buffer().unwrap();
}

#[test]
fn test_frames_must_pair() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = current_context(&instance, &gl);

    assert_eq!(ctx.end_frame().unwrap_err().code(), ErrorCode::InvalidOperation);
    ctx.begin_frame().unwrap();
    assert_eq!(ctx.begin_frame().unwrap_err().code(), ErrorCode::InvalidOperation);
    ctx.end_frame().unwrap();
    assert_eq!(ctx.end_frame().unwrap_err().code(), ErrorCode::InvalidOperation);
}

#[test]
fn test_command_buffer_lifecycle() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = current_context(&instance, &gl);
    let rt = ctx.default_render_target().unwrap();
    let mut cb = ctx.create_cmd_buffer().unwrap();
    assert_eq!(cb.state(), CmdBufferState::New);

    // Nothing may be recorded before the buffer is started.
    let err = ctx.cmd_line_width(&mut cb, 1.0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    assert_eq!(cb.state(), CmdBufferState::New);

    ctx.start_cmd_buffer(&mut cb).unwrap();
    assert_eq!(cb.state(), CmdBufferState::Ready);
    ctx.cmd_begin_pass(&mut cb, &rt, &[ClearValue::Color([0.0, 0.0, 0.0, 1.0])])
        .unwrap();
    assert_eq!(cb.state(), CmdBufferState::Recording);
    assert!(cb.in_render_pass());

    let err = ctx.end_cmd_buffer(&mut cb).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    assert_eq!(cb.state(), CmdBufferState::Recording);

    ctx.cmd_end_pass(&mut cb).unwrap();
    ctx.end_cmd_buffer(&mut cb).unwrap();
    assert_eq!(cb.state(), CmdBufferState::AwaitingSubmit);

    // Recording reopens after end until the buffer is submitted.
    ctx.cmd_viewport(
        &mut cb,
        Irect2d {
            x: 0,
            y: 0,
            width: 320,
            height: 240,
        },
    )
    .unwrap();
    assert_eq!(cb.state(), CmdBufferState::Recording);
    ctx.end_cmd_buffer(&mut cb).unwrap();

    ctx.begin_frame().unwrap();
    ctx.submit(&mut [&mut cb]).unwrap();
    ctx.end_frame().unwrap();
    assert_eq!(cb.state(), CmdBufferState::Submitted);
    assert_eq!(ctx.frame_stats().submitted_cmd_buffers, 1);

    let err = ctx.cmd_end_pass(&mut cb).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    ctx.start_cmd_buffer(&mut cb).unwrap();
    assert_eq!(cb.state(), CmdBufferState::Ready);
    ctx.destroy_cmd_buffer(cb).unwrap();
}

#[test]
fn test_submit_checks_frame_and_state() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = current_context(&instance, &gl);
    let mut cb = ctx.create_cmd_buffer().unwrap();
    ctx.start_cmd_buffer(&mut cb).unwrap();
    ctx.end_cmd_buffer(&mut cb).unwrap_err();

    ctx.cmd_line_width(&mut cb, 2.0).unwrap();
    ctx.end_cmd_buffer(&mut cb).unwrap();
    let err = ctx.submit(&mut [&mut cb]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    assert_eq!(cb.state(), CmdBufferState::AwaitingSubmit);

    ctx.begin_frame().unwrap();
    let mut fresh = ctx.create_cmd_buffer().unwrap();
    let err = ctx.submit(&mut [&mut cb, &mut fresh]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    // A rejected batch leaves every buffer untouched.
    assert_eq!(cb.state(), CmdBufferState::AwaitingSubmit);
    ctx.end_frame().unwrap();
}

#[test]
fn test_shared_context_submits_from_another_thread() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = current_context(&instance, &gl);
    let mut cb = ctx.create_cmd_buffer().unwrap();
    ctx.start_cmd_buffer(&mut cb).unwrap();
    ctx.cmd_line_width(&mut cb, 3.0).unwrap();
    ctx.end_cmd_buffer(&mut cb).unwrap();

    // A context on another device cannot take the buffer.
    let mut stranger = instance.create_context(gl_info(&gl, false)).unwrap();
    stranger.make_current().unwrap();
    stranger.begin_frame().unwrap();
    let err = stranger.submit(&mut [&mut cb]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    assert_eq!(cb.state(), CmdBufferState::AwaitingSubmit);
    stranger.end_frame().unwrap();

    let mut info = gl_info(&gl, false);
    info.shared_with = Some(&ctx);
    let worker = instance.create_context(info).unwrap();
    gl.clear();

    let (worker, cb) = std::thread::spawn(move || {
        let mut worker = worker;
        let mut cb = cb;
        worker.make_current().unwrap();
        worker.begin_frame().unwrap();
        worker.submit(&mut [&mut cb]).unwrap();
        worker.end_frame().unwrap();
        (worker, cb)
    })
    .join()
    .unwrap();

    assert_eq!(cb.state(), CmdBufferState::Submitted);
    assert_eq!(worker.frame_stats().submitted_cmd_buffers, 1);
    assert_eq!(gl.count("line_width"), 1);

    // Recording stays with the creating thread.
    let mut cb = cb;
    ctx.start_cmd_buffer(&mut cb).unwrap();
    assert_eq!(cb.state(), CmdBufferState::Ready);
}

#[test]
fn test_partially_executed_batch_is_not_replayed() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = current_context(&instance, &gl);
    let src = host_buffer(&mut ctx, 64);
    let dst = host_buffer(&mut ctx, 64);
    let doomed = host_buffer(&mut ctx, 64);

    let mut copy = ctx.create_cmd_buffer().unwrap();
    ctx.start_cmd_buffer(&mut copy).unwrap();
    ctx.cmd_copy_buffer(&mut copy, &src, &dst, 16, 0, 0).unwrap();
    ctx.end_cmd_buffer(&mut copy).unwrap();

    let mut broken = ctx.create_cmd_buffer().unwrap();
    ctx.start_cmd_buffer(&mut broken).unwrap();
    ctx.cmd_copy_buffer(&mut broken, &src, &doomed, 16, 0, 0).unwrap();
    ctx.end_cmd_buffer(&mut broken).unwrap();
    ctx.destroy_buffer(doomed).unwrap();

    let mut idle = ctx.create_cmd_buffer().unwrap();
    ctx.start_cmd_buffer(&mut idle).unwrap();
    ctx.cmd_line_width(&mut idle, 2.0).unwrap();
    ctx.end_cmd_buffer(&mut idle).unwrap();

    gl.clear();
    ctx.begin_frame().unwrap();
    let err = ctx
        .submit(&mut [&mut copy, &mut broken, &mut idle])
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidHandle);
    assert_eq!(copy.state(), CmdBufferState::Submitted);
    assert_eq!(broken.state(), CmdBufferState::Submitted);
    assert_eq!(idle.state(), CmdBufferState::AwaitingSubmit);

    // Only the buffer that never ran may go again.
    let err = ctx.submit(&mut [&mut copy]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    ctx.submit(&mut [&mut idle]).unwrap();
    ctx.end_frame().unwrap();

    assert_eq!(gl.count("copy_buffer_sub_data"), 1);
    assert_eq!(gl.count("line_width"), 1);
    assert_eq!(ctx.frame_stats().submitted_cmd_buffers, 3);
}

#[test]
fn test_render_pass_rules() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = current_context(&instance, &gl);
    let rt = ctx.default_render_target().unwrap();
    let src = host_buffer(&mut ctx, 64);
    let dst = host_buffer(&mut ctx, 64);
    let mut cb = ctx.create_cmd_buffer().unwrap();
    ctx.start_cmd_buffer(&mut cb).unwrap();

    let err = ctx.cmd_draw(&mut cb, false, 0, 3, 1).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);

    let err = ctx.cmd_copy_buffer(&mut cb, &src, &dst, 65, 0, 0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::OutOfBounds);
    ctx.cmd_copy_buffer(&mut cb, &src, &dst, 32, 32, 0).unwrap();

    ctx.cmd_begin_pass(&mut cb, &rt, &[]).unwrap();
    let err = ctx.cmd_begin_pass(&mut cb, &rt, &[]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    let err = ctx.cmd_copy_buffer(&mut cb, &src, &dst, 16, 0, 0).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    assert!(cb.in_render_pass());
}

#[test]
fn test_pipelines_are_limited_to_five_stages() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = current_context(&instance, &gl);
    let vs = ctx
        .create_shader_stage(&shader(ShaderStageType::Vertex, "#version 450\nvoid main() {}"))
        .unwrap();
    let stages = [vs; 6];
    let outstanding = instance.handle_pool().outstanding();

    let info = GraphicsPipelineInfo {
        shader_stages: &stages,
        state: PipelineState::default(),
        vertex_input: VertexInputInfo::default(),
        layout: PipelineLayoutInfo::default(),
        set_layouts: &[],
        compatible_render_target: ctx.default_render_target().unwrap(),
        image_to_combined_map: None,
        sampler_to_combined_map: None,
    };
    let err = ctx.create_graphics_pipeline(&info).unwrap_err();
    assert_eq!(err.code(), ErrorCode::OutOfBounds);
    assert_eq!(instance.handle_pool().outstanding(), outstanding);
}

#[test]
fn test_failed_creation_returns_the_handle() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = current_context(&instance, &gl);
    let outstanding = instance.handle_pool().outstanding();

    let err = ctx
        .create_shader_stage(&shader(ShaderStageType::Fragment, "#version 450\n#error nope\n"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ObjectCreationFailed);
    assert_eq!(instance.handle_pool().outstanding(), outstanding);

    let buffer = host_buffer(&mut ctx, 16);
    assert_eq!(instance.handle_pool().outstanding(), outstanding + 1);
    ctx.destroy_buffer(buffer).unwrap();
    assert_eq!(instance.handle_pool().outstanding(), outstanding);

    // The handle is gone, so destroying again fails.
    let err = ctx.destroy_buffer(buffer).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidHandle);
}

#[test]
fn test_default_render_target_belongs_to_the_context() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = current_context(&instance, &gl);
    let rt = ctx.default_render_target().unwrap();
    let err = ctx.destroy_render_target(rt).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);

    let outstanding = instance.handle_pool().outstanding();
    drop(ctx);
    assert_eq!(instance.handle_pool().outstanding(), outstanding - 1);

    let offscreen = instance.create_context(gl_info(&gl, false)).unwrap();
    assert!(offscreen.default_render_target().is_none());
}

#[test]
fn test_descriptor_writes_are_checked_as_a_batch() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = current_context(&instance, &gl);
    let layout = ctx.create_descriptor_set_layout(&uniform_layout()).unwrap();
    let set = ctx.create_descriptor_set(&layout).unwrap();
    let ubo = host_buffer(&mut ctx, 256);

    let good = DescriptorWrite {
        binding: 0,
        ty: DescriptorType::UniformBuffer,
        payload: DescriptorPayload::Buffer {
            buffer: ubo.handle(),
            offset: 0,
            range: 256,
        },
    };
    let bad = DescriptorWrite { binding: 7, ..good };
    let err = ctx.apply_descriptor_writes(&set, &[good, bad]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidBinding);
    ctx.apply_descriptor_writes(&set, &[good]).unwrap();

    ctx.destroy_descriptor_set(set).unwrap();
    ctx.destroy_descriptor_set_layout(layout).unwrap();
}

#[test]
fn test_duplicate_layout_ids_are_rejected() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = current_context(&instance, &gl);
    let mut info = uniform_layout();
    info.descriptors.push(info.descriptors[0]);
    let err = ctx.create_descriptor_set_layout(&info).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidBinding);
}

#[test]
fn test_buffer_contents_round_trip_through_host_access() {
    let instance = instance();
    let gl = RecordingGl::new();
    let mut ctx = current_context(&instance, &gl);
    let buffer = host_buffer(&mut ctx, 8);
    ctx.write_buffer(&buffer, 4, &[1, 2, 3, 4]).unwrap();
    let mut out = [0u8; 4];
    ctx.read_buffer(&buffer, 4, &mut out).unwrap();
    assert_eq!(out, [1, 2, 3, 4]);
}

#[test]
fn test_configured_backend_restricts_contexts() {
    ngf_common::try_init_logging();
    let mut config = NgfConfig::default();
    config.device.backend = BackendChoice::Vulkan;
    let instance = ngf::initialize(DevicePreference::Discrete, config).unwrap();
    let gl = RecordingGl::new();
    let err = instance.create_context(gl_info(&gl, true)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Config);
}

#[test]
fn test_sharing_requires_the_same_instance() {
    let first = instance();
    let second = instance();
    let gl = RecordingGl::new();
    let ctx = first.create_context(gl_info(&gl, true)).unwrap();

    let mut info = gl_info(&gl, false);
    info.shared_with = Some(&ctx);
    let err = second.create_context(info).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
}

#[test]
fn test_first_context_publishes_capabilities() {
    let instance = instance();
    assert!(instance.capabilities().is_none());
    let gl = RecordingGl::new();
    let ctx = instance.create_context(gl_info(&gl, false)).unwrap();
    assert_eq!(instance.capabilities(), Some(ctx.capabilities()));
    assert_eq!(ctx.kind(), ngf::types::BackendKind::Gl);
}
