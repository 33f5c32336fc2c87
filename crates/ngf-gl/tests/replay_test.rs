//! Integration test: GL command replay and pipeline state diffing
//!
//! Run with: cargo test -p ngf-gl --test replay_test

mod common;

use common::*;
use ngf_core::descriptor::{DescriptorPayload, DescriptorWrite};
use ngf_core::types::{
    BufferInfo, BufferStorage, BufferUsage, ClearValue, DescriptorSetLayoutInfo, DescriptorType,
    Extent3d, ImageFormat, ImageInfo, ImageType, ImageUsage, IndexType, PipelineState,
    SampleCount, SamplerInfo,
};
use ngf_core::{Backend, ErrorCode, Handle, RenderCommand};
use ngf_gl::RecordingGl;

const TRIANGLES: &str = "4";

fn draw(first_element: u32, nelements: u32, ninstances: u32, indexed: bool) -> RenderCommand {
    RenderCommand::Draw {
        indexed,
        first_element,
        nelements,
        ninstances,
    }
}

fn buffer(b: &mut impl Backend, handle: Handle, size: u64, storage: BufferStorage) {
    b.create_buffer(
        handle,
        &BufferInfo {
            size,
            storage,
            usage: BufferUsage::all(),
        },
    )
    .unwrap();
}

fn args_of(gl: &RecordingGl, name: &str) -> Vec<String> {
    gl.calls()
        .into_iter()
        .filter(|c| c.name == name)
        .map(|c| c.args)
        .collect()
}

#[test]
fn test_first_bind_issues_every_state_group() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);

    run_frame(&mut b, CMD, vec![RenderCommand::BindPipeline(PIPELINE), draw(0, 3, 1, false)])
        .unwrap();

    let stats = b.frame_stats();
    assert_eq!(stats.state_calls, 24);
    assert_eq!(stats.elided_state_calls, 0);
    assert_eq!(stats.replayed_commands, 2);
    assert_eq!(stats.submitted_cmd_buffers, 1);
    assert!(!b.state_cache().needs_full_update());
}

#[test]
fn test_rebinding_same_pipeline_only_draws() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    run_frame(&mut b, CMD, vec![RenderCommand::BindPipeline(PIPELINE), draw(0, 3, 1, false)])
        .unwrap();

    gl.clear();
    run_frame(&mut b, CMD, vec![RenderCommand::BindPipeline(PIPELINE), draw(0, 3, 1, false)])
        .unwrap();

    assert_eq!(gl.names(), vec!["draw_arrays"]);
    let stats = b.frame_stats();
    assert_eq!(stats.state_calls, 0);
    assert_eq!(stats.elided_state_calls, 24);
}

#[test]
fn test_switching_pipelines_touches_only_changed_groups() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    let mut depth_tested = PipelineState::default();
    depth_tested.depth_stencil.depth_test = true;
    let second = Handle::from_raw(11);
    b.create_graphics_pipeline(second, &pipeline_desc(depth_tested))
        .unwrap();

    run_frame(&mut b, CMD, vec![RenderCommand::BindPipeline(PIPELINE)]).unwrap();
    gl.clear();
    run_frame(&mut b, CMD, vec![RenderCommand::BindPipeline(second), draw(0, 3, 1, false)])
        .unwrap();

    assert_eq!(
        gl.names(),
        vec!["use_program", "bind_vertex_array", "enable", "draw_arrays"]
    );
    assert_eq!(args_of(&gl, "enable"), vec![gl::DEPTH_TEST.to_string()]);
    assert_eq!(b.frame_stats().state_calls, 1);
}

#[test]
fn test_dynamic_line_width_is_restored_by_next_bind() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    run_frame(&mut b, CMD, vec![RenderCommand::BindPipeline(PIPELINE)]).unwrap();

    gl.clear();
    run_frame(
        &mut b,
        CMD,
        vec![
            RenderCommand::LineWidth(4.0),
            RenderCommand::BindPipeline(PIPELINE),
        ],
    )
    .unwrap();

    assert_eq!(args_of(&gl, "line_width"), vec!["4.0", "1.0"]);
}

#[test]
fn test_draw_variants() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    let index = Handle::from_raw(30);
    buffer(&mut b, index, 64, BufferStorage::Private);

    gl.clear();
    run_frame(
        &mut b,
        CMD,
        vec![
            RenderCommand::BindPipeline(PIPELINE),
            RenderCommand::BindIndexBuffer {
                buffer: index,
                offset: 8,
                ty: IndexType::Uint16,
            },
            draw(0, 3, 1, false),
            draw(3, 6, 2, false),
            draw(2, 6, 1, true),
            draw(0, 3, 4, true),
        ],
    )
    .unwrap();

    let short = gl::UNSIGNED_SHORT.to_string();
    assert_eq!(args_of(&gl, "draw_arrays"), vec![format!("{TRIANGLES}, 0, 3")]);
    assert_eq!(
        args_of(&gl, "draw_arrays_instanced"),
        vec![format!("{TRIANGLES}, 3, 6, 2")]
    );
    assert_eq!(
        args_of(&gl, "draw_elements"),
        vec![format!("{TRIANGLES}, 6, {short}, 12")]
    );
    assert_eq!(
        args_of(&gl, "draw_elements_instanced"),
        vec![format!("{TRIANGLES}, 3, {short}, 8, 4")]
    );
}

#[test]
fn test_zero_instance_draws_are_skipped() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    let index = Handle::from_raw(30);
    buffer(&mut b, index, 64, BufferStorage::Private);

    gl.clear();
    run_frame(
        &mut b,
        CMD,
        vec![
            RenderCommand::BindPipeline(PIPELINE),
            RenderCommand::BindIndexBuffer {
                buffer: index,
                offset: 0,
                ty: IndexType::Uint16,
            },
            draw(0, 3, 0, false),
            draw(0, 6, 0, true),
        ],
    )
    .unwrap();

    for name in [
        "draw_arrays",
        "draw_arrays_instanced",
        "draw_elements",
        "draw_elements_instanced",
    ] {
        assert_eq!(gl.count(name), 0, "{name}");
    }
    assert_eq!(b.frame_stats().replayed_commands, 4);
}

#[test]
fn test_indexed_draw_without_index_buffer_fails() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);

    let err = run_frame(
        &mut b,
        CMD,
        vec![RenderCommand::BindPipeline(PIPELINE), draw(0, 3, 1, true)],
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
}

#[test]
fn test_vertex_buffer_uses_pipeline_stride() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    let vbo = Handle::from_raw(31);
    buffer(&mut b, vbo, 1024, BufferStorage::Private);

    run_frame(
        &mut b,
        CMD,
        vec![
            RenderCommand::BindPipeline(PIPELINE),
            RenderCommand::BindVertexBuffer {
                buffer: vbo,
                binding: 0,
                offset: 48,
            },
        ],
    )
    .unwrap();

    let args = args_of(&gl, "bind_vertex_buffer");
    assert_eq!(args.len(), 1);
    assert!(args[0].starts_with("0, "));
    assert!(args[0].ends_with(", 48, 12"));
}

#[test]
fn test_begin_pass_clears_default_target() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);

    gl.clear();
    run_frame(
        &mut b,
        CMD,
        vec![
            RenderCommand::BeginPass {
                target: DEFAULT_RT,
                clears: vec![
                    ClearValue::Color([0.25, 0.5, 0.75, 1.0]),
                    ClearValue::DepthStencil {
                        depth: 1.0,
                        stencil: 0,
                    },
                ],
            },
            RenderCommand::EndPass,
        ],
    )
    .unwrap();

    assert_eq!(
        args_of(&gl, "bind_framebuffer"),
        vec![format!("{}, 0", gl::FRAMEBUFFER)]
    );
    assert_eq!(gl.count("draw_buffers"), 0);
    assert_eq!(
        args_of(&gl, "clear_buffer_fv"),
        vec![format!("{}, 0, [0.25, 0.5, 0.75, 1.0]", gl::COLOR)]
    );
    assert_eq!(args_of(&gl, "clear_buffer_fi"), vec!["1.0, 0"]);
    // Depth writes are off in the cached state, so the clear opens and
    // restores the mask around itself.
    assert_eq!(args_of(&gl, "depth_mask"), vec!["true", "false"]);
    assert_eq!(args_of(&gl, "disable"), vec![gl::SCISSOR_TEST.to_string()]);
    assert_eq!(args_of(&gl, "enable"), vec![gl::SCISSOR_TEST.to_string()]);
    assert_eq!(
        args_of(&gl, "invalidate_framebuffer"),
        vec![format!("{}, [{}, {}]", gl::FRAMEBUFFER, gl::DEPTH, gl::STENCIL)]
    );
}

#[test]
fn test_begin_pass_without_clear_value_touches_nothing() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);

    gl.clear();
    let err = run_frame(
        &mut b,
        CMD,
        vec![RenderCommand::BeginPass {
            target: DEFAULT_RT,
            clears: vec![ClearValue::Color([0.0; 4])],
        }],
    )
    .unwrap_err();

    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    assert!(gl.calls().is_empty());
}

#[test]
fn test_descriptor_sets_bind_through_native_map() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    let ubo = Handle::from_raw(32);
    buffer(&mut b, ubo, 1024, BufferStorage::Private);
    let image = Handle::from_raw(50);
    b.create_image(
        image,
        &ImageInfo {
            ty: ImageType::Image2d,
            extent: Extent3d {
                width: 64,
                height: 64,
                depth: 1,
            },
            nmips: 1,
            nlayers: 1,
            format: ImageFormat::Rgba8,
            sample_count: SampleCount::S1,
            usage: ImageUsage::SAMPLE_FROM,
        },
    )
    .unwrap();
    let sampler = Handle::from_raw(51);
    b.create_sampler(sampler, &SamplerInfo::default()).unwrap();

    let (set0_layout, set1_layout) = (Handle::from_raw(40), Handle::from_raw(41));
    let sets = layout().sets;
    b.create_descriptor_set_layout(set0_layout, &sets[0]).unwrap();
    b.create_descriptor_set_layout(set1_layout, &sets[1]).unwrap();
    let (set0, set1) = (Handle::from_raw(42), Handle::from_raw(43));
    b.create_descriptor_set(set0, set0_layout).unwrap();
    b.create_descriptor_set(set1, set1_layout).unwrap();
    b.apply_descriptor_writes(
        set0,
        &[DescriptorWrite {
            binding: 1,
            ty: DescriptorType::CombinedImageSampler,
            payload: DescriptorPayload::CombinedImageSampler { image, sampler },
        }],
    )
    .unwrap();
    b.apply_descriptor_writes(
        set1,
        &[DescriptorWrite {
            binding: 0,
            ty: DescriptorType::UniformBuffer,
            payload: DescriptorPayload::Buffer {
                buffer: ubo,
                offset: 256,
                range: 64,
            },
        }],
    )
    .unwrap();

    gl.clear();
    run_frame(
        &mut b,
        CMD,
        vec![
            RenderCommand::BindPipeline(PIPELINE),
            RenderCommand::BindDescriptorSet { set: set0, slot: 0 },
            RenderCommand::BindDescriptorSet { set: set1, slot: 1 },
        ],
    )
    .unwrap();

    // Set 1's uniform buffer comes after set 0's in the flat range.
    let ranges = args_of(&gl, "bind_buffer_range");
    assert_eq!(ranges.len(), 1);
    assert!(ranges[0].starts_with(&format!("{}, 1, ", gl::UNIFORM_BUFFER)));
    assert!(ranges[0].ends_with(", 256, 64"));

    let textures = args_of(&gl, "bind_texture_unit");
    assert_eq!(textures.len(), 1);
    assert!(textures[0].starts_with(&format!("0, {}, ", gl::TEXTURE_2D)));
    assert_eq!(gl.count("bind_sampler"), 1);
    assert!(args_of(&gl, "bind_sampler")[0].starts_with("0, "));
}

#[test]
fn test_binding_outside_pipeline_layout_aborts_submit() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    let ubo = Handle::from_raw(32);
    buffer(&mut b, ubo, 256, BufferStorage::Private);
    let layout = Handle::from_raw(44);
    b.create_descriptor_set_layout(
        layout,
        &DescriptorSetLayoutInfo {
            descriptors: vec![binding(DescriptorType::UniformBuffer, 5)],
        },
    )
    .unwrap();
    let set = Handle::from_raw(45);
    b.create_descriptor_set(set, layout).unwrap();
    b.apply_descriptor_writes(
        set,
        &[DescriptorWrite {
            binding: 5,
            ty: DescriptorType::UniformBuffer,
            payload: DescriptorPayload::Buffer {
                buffer: ubo,
                offset: 0,
                range: 256,
            },
        }],
    )
    .unwrap();

    let err = run_frame(
        &mut b,
        CMD,
        vec![
            RenderCommand::BindPipeline(PIPELINE),
            RenderCommand::BindDescriptorSet { set, slot: 0 },
            draw(0, 3, 1, false),
        ],
    )
    .unwrap_err();

    assert_eq!(err.code(), ErrorCode::InvalidBinding);
    assert_eq!(gl.count("draw_arrays"), 0);
    // The aborted buffer ran partway, so it is spent.
    assert_eq!(b.shared().pending_commands(), 0);
}

#[test]
fn test_descriptor_set_needs_bound_pipeline() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    let layout = Handle::from_raw(44);
    b.create_descriptor_set_layout(layout, &layout_sets0()).unwrap();
    let set = Handle::from_raw(45);
    b.create_descriptor_set(set, layout).unwrap();

    let err = run_frame(&mut b, CMD, vec![RenderCommand::BindDescriptorSet { set, slot: 0 }])
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
}

fn layout_sets0() -> DescriptorSetLayoutInfo {
    layout().sets.remove(0)
}

#[test]
fn test_copy_buffer_moves_bytes_between_buffers() {
    let gl = RecordingGl::new();
    let mut b = scene(&gl);
    let (staging, readback) = (Handle::from_raw(60), Handle::from_raw(61));
    buffer(&mut b, staging, 16, BufferStorage::HostWriteable);
    buffer(&mut b, readback, 16, BufferStorage::HostReadable);
    b.write_buffer(staging, 0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

    run_frame(
        &mut b,
        CMD,
        vec![RenderCommand::CopyBuffer {
            src: staging,
            dst: readback,
            size: 4,
            src_offset: 2,
            dst_offset: 8,
        }],
    )
    .unwrap();

    let mut out = [0u8; 16];
    b.read_buffer(readback, 0, &mut out).unwrap();
    assert_eq!(&out[8..12], &[3, 4, 5, 6]);
    assert_eq!(&out[..8], &[0; 8]);
}
