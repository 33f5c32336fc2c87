//! Integration test: GL object creation, host buffer access and command storage
//!
//! Run with: cargo test -p ngf-gl --test objects_test

mod common;

use common::*;
use ngf_core::types::{
    AttachmentDescription, AttachmentType, BufferInfo, BufferStorage, BufferUsage, Extent3d,
    ImageFormat, ImageInfo, ImageRef, ImageType, ImageUsage, LoadOp, Offset3d, PipelineState,
    RenderTargetInfo, SampleCount, ShaderStageType, StoreOp,
};
use ngf_core::{Backend, ErrorCode, Handle, HostAllocator, NgfConfig, RenderCommand};
use ngf_gl::{GlBackend, GlBackendInfo, RecordingGl};

fn image_info(usage: ImageUsage) -> ImageInfo {
    ImageInfo {
        ty: ImageType::Image2d,
        extent: Extent3d {
            width: 128,
            height: 128,
            depth: 1,
        },
        nmips: 1,
        nlayers: 1,
        format: ImageFormat::Rgba8,
        sample_count: SampleCount::S1,
        usage,
    }
}

fn host_buffer(b: &mut GlBackend, handle: Handle, storage: BufferStorage) {
    b.create_buffer(
        handle,
        &BufferInfo {
            size: 32,
            storage,
            usage: BufferUsage::UNIFORM,
        },
    )
    .unwrap();
}

#[test]
fn test_failed_compile_deletes_shader() {
    let gl = RecordingGl::new();
    let mut b = backend(&gl);

    let err = b
        .create_shader_stage(
            VS,
            &shader(ShaderStageType::Vertex, "#version 450\n#error broken\n"),
        )
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ObjectCreationFailed);
    assert!(err.to_string().contains("broken"));
    assert_eq!(gl.count("delete_shader"), 1);
}

#[test]
fn test_non_utf8_source_is_rejected_before_gl() {
    let gl = RecordingGl::new();
    let mut b = backend(&gl);
    gl.clear();

    let mut info = shader(ShaderStageType::Fragment, "");
    info.content = vec![0xff, 0xfe, 0x00];
    let err = b.create_shader_stage(FS, &info).unwrap_err();

    assert_eq!(err.code(), ErrorCode::ObjectCreationFailed);
    assert!(gl.calls().is_empty());
}

#[test]
fn test_failed_link_deletes_program() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    gl.set_link_failure(Some("varying mismatch".into()));

    let err = b
        .create_graphics_pipeline(Handle::from_raw(11), &pipeline_desc(PipelineState::default()))
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ObjectCreationFailed);
    assert!(err.to_string().contains("varying mismatch"));
    assert_eq!(gl.count("delete_program"), 1);
    assert_eq!(gl.count("gen_vertex_array"), 1);
}

#[test]
fn test_pipeline_with_unknown_stage_fails() {
    let gl = RecordingGl::new();
    let mut b = backend(&gl);

    let err = b
        .create_graphics_pipeline(PIPELINE, &pipeline_desc(PipelineState::default()))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidHandle);
    assert_eq!(gl.count("create_program"), 0);
}

#[test]
fn test_attachment_only_images_use_renderbuffers() {
    let gl = RecordingGl::new();
    let mut b = backend(&gl);

    b.create_image(Handle::from_raw(50), &image_info(ImageUsage::ATTACHMENT))
        .unwrap();
    b.create_image(
        Handle::from_raw(51),
        &image_info(ImageUsage::ATTACHMENT | ImageUsage::SAMPLE_FROM),
    )
    .unwrap();

    assert_eq!(gl.count("renderbuffer_storage"), 1);
    assert_eq!(gl.count("tex_storage"), 1);
}

#[test]
fn test_gl_error_during_image_creation_is_reported() {
    let gl = RecordingGl::new();
    let mut b = backend(&gl);
    gl.inject_error(gl::OUT_OF_MEMORY);

    let err = b
        .create_image(Handle::from_raw(50), &image_info(ImageUsage::SAMPLE_FROM))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::OutOfMemory);
    assert_eq!(gl.count("delete_texture"), 1);
}

#[test]
fn test_write_image_into_renderbuffer_is_unsupported() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    let image = Handle::from_raw(50);
    b.create_image(image, &image_info(ImageUsage::ATTACHMENT)).unwrap();
    let staging = Handle::from_raw(60);
    host_buffer(&mut b, staging, BufferStorage::HostWriteable);

    let err = b
        .record(
            CMD,
            RenderCommand::WriteImage {
                src: staging,
                src_offset: 0,
                dst: ImageRef {
                    image,
                    ..ImageRef::default()
                },
                offset: Offset3d::default(),
                extent: Extent3d {
                    width: 4,
                    height: 4,
                    depth: 1,
                },
            },
        )
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Unsupported);
    assert_eq!(b.shared().pending_commands(), 0);
}

#[test]
fn test_write_image_uploads_cube_face() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    let image = Handle::from_raw(50);
    let mut info = image_info(ImageUsage::SAMPLE_FROM | ImageUsage::TRANSFER_DST);
    info.ty = ImageType::Cube;
    b.create_image(image, &info).unwrap();
    let staging = Handle::from_raw(60);
    host_buffer(&mut b, staging, BufferStorage::HostWriteable);

    gl.clear();
    run_frame(
        &mut b,
        CMD,
        vec![RenderCommand::WriteImage {
            src: staging,
            src_offset: 16,
            dst: ImageRef {
                image,
                mip_level: 0,
                layer: 0,
                cubemap_face: 3,
            },
            offset: Offset3d::default(),
            extent: Extent3d {
                width: 2,
                height: 2,
                depth: 1,
            },
        }],
    )
    .unwrap();

    let call = gl
        .calls()
        .into_iter()
        .find(|c| c.name == "tex_sub_image_from_buffer")
        .unwrap();
    let face = gl::TEXTURE_CUBE_MAP_POSITIVE_X + 3;
    assert!(call.args.starts_with(&format!("{face}, ")));
    assert!(call.args.ends_with(", 16"));
}

#[test]
fn test_incomplete_framebuffer_is_deleted() {
    let gl = RecordingGl::new();
    let mut b = backend(&gl);
    let image = Handle::from_raw(50);
    b.create_image(image, &image_info(ImageUsage::ATTACHMENT)).unwrap();
    gl.set_incomplete_framebuffers(true);

    let err = b
        .create_render_target(
            Handle::from_raw(70),
            &RenderTargetInfo {
                attachments: vec![AttachmentDescription {
                    ty: AttachmentType::Color,
                    format: ImageFormat::Rgba8,
                    sample_count: SampleCount::S1,
                    is_sampled: false,
                    load_op: LoadOp::Clear,
                    store_op: StoreOp::Store,
                }],
                images: vec![ImageRef {
                    image,
                    ..ImageRef::default()
                }],
            },
        )
        .unwrap_err();

    assert_eq!(err.code(), ErrorCode::ObjectCreationFailed);
    assert_eq!(gl.count("framebuffer_renderbuffer"), 1);
    assert_eq!(gl.count("delete_framebuffer"), 1);
}

#[test]
fn test_host_buffer_access_rules() {
    let gl = RecordingGl::new();
    let mut b = backend(&gl);
    let (host, private) = (Handle::from_raw(60), Handle::from_raw(61));
    host_buffer(&mut b, host, BufferStorage::HostReadWrite);
    host_buffer(&mut b, private, BufferStorage::Private);

    b.write_buffer(host, 4, &[9, 8, 7]).unwrap();
    let mut out = [0u8; 8];
    b.read_buffer(host, 0, &mut out).unwrap();
    assert_eq!(out, [0, 0, 0, 0, 9, 8, 7, 0]);

    let err = b.write_buffer(private, 0, &[1]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    let err = b.write_buffer(host, 30, &[1, 2, 3]).unwrap_err();
    assert_eq!(err.code(), ErrorCode::OutOfBounds);
    let err = b.read_buffer(Handle::from_raw(99), 0, &mut out).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidHandle);
}

#[test]
fn test_submitted_commands_recycle_arena_slots() {
    let gl = RecordingGl::new();
    let mut config = NgfConfig::default();
    config.memory.command_arena_block_len = 4;
    let mut b = backend_with(&gl, &config);
    b.cmd_buffer_create(CMD).unwrap();
    let viewports = || {
        (0..10)
            .map(|i| RenderCommand::Viewport(ngf_core::types::Irect2d::new(0, 0, i, i)))
            .collect::<Vec<_>>()
    };

    run_frame(&mut b, CMD, viewports()).unwrap();
    assert_eq!(b.shared().pending_commands(), 0);
    assert_eq!(b.shared().command_arena_blocks(), 3);

    run_frame(&mut b, CMD, viewports()).unwrap();
    assert_eq!(b.shared().command_arena_blocks(), 3);
    assert_eq!(gl.count("viewport"), 20);
}

#[test]
fn test_destroying_command_buffer_releases_its_commands() {
    let gl = RecordingGl::new();
    let mut b = backend(&gl);
    b.cmd_buffer_create(CMD).unwrap();
    b.record(CMD, RenderCommand::LineWidth(2.0)).unwrap();
    b.record(CMD, RenderCommand::LineWidth(3.0)).unwrap();
    assert_eq!(b.shared().pending_commands(), 2);

    b.cmd_buffer_destroy(CMD);
    assert_eq!(b.shared().pending_commands(), 0);
    let err = b.record(CMD, RenderCommand::EndPass).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidHandle);
}

#[test]
fn test_shared_contexts_see_the_same_objects() {
    let gl = RecordingGl::new();
    let mut first = backend(&gl);
    let buffer = Handle::from_raw(60);
    host_buffer(&mut first, buffer, BufferStorage::HostReadWrite);

    let mut second = GlBackend::new(
        GlBackendInfo {
            platform: Box::new(Headless),
            api: Some(Box::new(gl.clone())),
            swapchain: None,
            shared_with: Some(first.share()),
        },
        &NgfConfig::default(),
        HostAllocator::default(),
    )
    .unwrap();

    second.write_buffer(buffer, 0, &[42]).unwrap();
    let mut out = [0u8; 1];
    first.read_buffer(buffer, 0, &mut out).unwrap();
    assert_eq!(out, [42]);
    assert!(!second.create_default_render_target(DEFAULT_RT).unwrap());
}
