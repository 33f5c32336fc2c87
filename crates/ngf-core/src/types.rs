//! Portable object descriptions and pipeline state.
//!
//! These types are what callers fill in; each backend translates them to its
//! native enums. Pipeline state derives `PartialEq` field by field so the
//! immediate-mode backend can diff it.

use serde::{Deserialize, Serialize};

use crate::handle::Handle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    #[serde(rename = "gl")]
    Gl,
    #[serde(rename = "vulkan")]
    Vulkan,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DevicePreference {
    #[serde(rename = "discrete")]
    Discrete,
    #[serde(rename = "integrated")]
    Integrated,
    #[default]
    #[serde(rename = "any")]
    DontCare,
}

// ── Geometry ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Irect2d {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Irect2d {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Extent3d {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Offset3d {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

// ── Fixed-function state ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StencilOp {
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilInfo {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilInfo {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
            compare_mask: !0,
            write_mask: !0,
            reference: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilInfo {
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: CompareOp,
    pub stencil_test: bool,
    pub front_stencil: StencilInfo,
    pub back_stencil: StencilInfo,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for DepthStencilInfo {
    fn default() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            depth_compare: CompareOp::Less,
            stencil_test: false,
            front_stencil: StencilInfo::default(),
            back_stencil: StencilInfo::default(),
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    #[default]
    Back,
    Front,
    FrontAndBack,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizationInfo {
    pub discard: bool,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub line_width: f32,
}

impl Default for RasterizationInfo {
    fn default() -> Self {
        Self {
            discard: false,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            line_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorMask: u8 {
        const R = 0b0001;
        const G = 0b0010;
        const B = 0b0100;
        const A = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendInfo {
    pub enable: bool,
    pub src_color_factor: BlendFactor,
    pub dst_color_factor: BlendFactor,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub color_op: BlendOp,
    pub alpha_op: BlendOp,
    pub color_write_mask: ColorMask,
    pub constants: [f32; 4],
}

impl Default for BlendInfo {
    fn default() -> Self {
        Self {
            enable: false,
            src_color_factor: BlendFactor::One,
            dst_color_factor: BlendFactor::Zero,
            src_alpha_factor: BlendFactor::One,
            dst_alpha_factor: BlendFactor::Zero,
            color_op: BlendOp::Add,
            alpha_op: BlendOp::Add,
            color_write_mask: ColorMask::all(),
            constants: [0.0; 4],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SampleCount {
    #[default]
    S1,
    S2,
    S4,
    S8,
    S16,
}

impl SampleCount {
    pub fn count(self) -> u32 {
        match self {
            SampleCount::S1 => 1,
            SampleCount::S2 => 2,
            SampleCount::S4 => 4,
            SampleCount::S8 => 8,
            SampleCount::S16 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MultisampleInfo {
    pub sample_count: SampleCount,
    pub alpha_to_coverage: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TessellationInfo {
    pub patch_vertices: u32,
}

impl Default for TessellationInfo {
    fn default() -> Self {
        Self { patch_vertices: 1 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
    PointList,
    PatchList,
}

/// All fixed-function state carried by a graphics pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineState {
    pub rasterization: RasterizationInfo,
    pub depth_stencil: DepthStencilInfo,
    pub blend: BlendInfo,
    pub multisample: MultisampleInfo,
    pub tessellation: TessellationInfo,
    pub topology: PrimitiveTopology,
}

// ── Vertex input ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribType {
    Int8,
    Uint8,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribDesc {
    pub location: u32,
    pub binding: u32,
    pub offset: u32,
    pub ty: VertexAttribType,
    pub size: u32,
    pub normalized: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum InputRate {
    #[default]
    Vertex,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufBindingDesc {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: InputRate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VertexInputInfo {
    pub attribs: Vec<VertexAttribDesc>,
    pub bindings: Vec<VertexBufBindingDesc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    Uint16,
    Uint32,
}

impl IndexType {
    pub fn size(self) -> u64 {
        match self {
            IndexType::Uint16 => 2,
            IndexType::Uint32 => 4,
        }
    }
}

// ── Shaders ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStageType {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
}

/// Most stages a graphics pipeline can carry.
pub const MAX_SHADER_STAGES: usize = 5;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StageFlags: u32 {
        const VERTEX = 1 << 0;
        const TESS_CONTROL = 1 << 1;
        const TESS_EVALUATION = 1 << 2;
        const GEOMETRY = 1 << 3;
        const FRAGMENT = 1 << 4;
    }
}

/// An opaque shader blob: GLSL source for the GL backend, SPIR-V for Vulkan.
#[derive(Debug, Clone)]
pub struct ShaderStageInfo {
    pub ty: ShaderStageType,
    pub content: Vec<u8>,
    pub entry_point: String,
    pub debug_name: Option<String>,
}

// ── Descriptors ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    UniformBuffer,
    StorageBuffer,
    LoadStoreImage,
    Image,
    Sampler,
    CombinedImageSampler,
}

impl DescriptorType {
    pub const COUNT: usize = 6;

    pub fn index(self) -> usize {
        match self {
            DescriptorType::UniformBuffer => 0,
            DescriptorType::StorageBuffer => 1,
            DescriptorType::LoadStoreImage => 2,
            DescriptorType::Image => 3,
            DescriptorType::Sampler => 4,
            DescriptorType::CombinedImageSampler => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorInfo {
    pub ty: DescriptorType,
    pub id: u32,
    pub stage_flags: StageFlags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorSetLayoutInfo {
    pub descriptors: Vec<DescriptorInfo>,
}

/// Ordered set layouts; set index is the position in `sets`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineLayoutInfo {
    pub sets: Vec<DescriptorSetLayoutInfo>,
}

/// One entry of a combined image/sampler map: the separate image (or
/// sampler) at `(set, binding)` feeds the listed combined native slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedImageSamplerEntry {
    pub set: u32,
    pub binding: u32,
    pub combined_ids: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinedImageSamplerMap {
    pub entries: Vec<CombinedImageSamplerEntry>,
}

impl CombinedImageSamplerMap {
    pub fn find(&self, set: u32, binding: u32) -> Option<&CombinedImageSamplerEntry> {
        self.entries
            .iter()
            .find(|e| e.set == set && e.binding == binding)
    }
}

// ── Images, samplers, buffers ───────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ImageType {
    #[default]
    Image2d,
    Image3d,
    Cube,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    R8,
    Rg8,
    Rgba8,
    Rgba8Srgb,
    Bgra8,
    Bgra8Srgb,
    R32f,
    Rgba16f,
    Rgba32f,
    Depth16,
    Depth32,
    Depth24Stencil8,
}

impl ImageFormat {
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            ImageFormat::Depth16 | ImageFormat::Depth32 | ImageFormat::Depth24Stencil8
        )
    }

    pub fn has_stencil(self) -> bool {
        self == ImageFormat::Depth24Stencil8
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            ImageFormat::R8 => 1,
            ImageFormat::Rg8 | ImageFormat::Depth16 => 2,
            ImageFormat::Rgba8
            | ImageFormat::Rgba8Srgb
            | ImageFormat::Bgra8
            | ImageFormat::Bgra8Srgb
            | ImageFormat::R32f
            | ImageFormat::Depth32
            | ImageFormat::Depth24Stencil8 => 4,
            ImageFormat::Rgba16f => 8,
            ImageFormat::Rgba32f => 16,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ImageUsage: u32 {
        const SAMPLE_FROM = 1 << 0;
        const ATTACHMENT = 1 << 1;
        const TRANSFER_DST = 1 << 2;
        const STORAGE = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageInfo {
    pub ty: ImageType,
    pub extent: Extent3d,
    pub nmips: u32,
    pub nlayers: u32,
    pub format: ImageFormat,
    pub sample_count: SampleCount,
    pub usage: ImageUsage,
}

/// A subresource of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ImageRef {
    pub image: Handle,
    pub mip_level: u32,
    pub layer: u32,
    pub cubemap_face: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WrapMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirroredRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerInfo {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: Filter,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub wrap_w: WrapMode,
    pub lod_min: f32,
    pub lod_max: f32,
    pub lod_bias: f32,
    pub max_anisotropy: f32,
    pub compare_op: Option<CompareOp>,
}

impl Default for SamplerInfo {
    fn default() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mip_filter: Filter::Nearest,
            wrap_u: WrapMode::ClampToEdge,
            wrap_v: WrapMode::ClampToEdge,
            wrap_w: WrapMode::ClampToEdge,
            lod_min: 0.0,
            lod_max: 1000.0,
            lod_bias: 0.0,
            max_anisotropy: 1.0,
            compare_op: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BufferStorage {
    HostReadable,
    HostWriteable,
    HostReadWrite,
    #[default]
    Private,
}

impl BufferStorage {
    pub fn is_host_visible(self) -> bool {
        self != BufferStorage::Private
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const XFER_SRC = 1 << 0;
        const XFER_DST = 1 << 1;
        const UNIFORM = 1 << 2;
        const INDEX = 1 << 3;
        const VERTEX = 1 << 4;
        const STORAGE = 1 << 5;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferInfo {
    pub size: u64,
    pub storage: BufferStorage,
    pub usage: BufferUsage,
}

// ── Render targets ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentType {
    Color,
    Depth,
    DepthStencil,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum LoadOp {
    DontCare,
    Keep,
    #[default]
    Clear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StoreOp {
    DontCare,
    #[default]
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentDescription {
    pub ty: AttachmentType,
    pub format: ImageFormat,
    pub sample_count: SampleCount,
    pub is_sampled: bool,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargetInfo {
    pub attachments: Vec<AttachmentDescription>,
    /// One image per attachment, in the same order.
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StencilFace {
    Front,
    Back,
    #[default]
    FrontAndBack,
}

impl StencilFace {
    pub fn includes_front(self) -> bool {
        matches!(self, StencilFace::Front | StencilFace::FrontAndBack)
    }

    pub fn includes_back(self) -> bool {
        matches!(self, StencilFace::Back | StencilFace::FrontAndBack)
    }
}

// ── Pipelines and contexts ──────────────────────────────────

/// Backend-facing pipeline description; stages and the compatible render
/// target are referenced by handle.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    pub shader_stages: Vec<Handle>,
    pub state: PipelineState,
    pub vertex_input: VertexInputInfo,
    pub layout: PipelineLayoutInfo,
    /// Set-layout handles matching `layout.sets`, when the caller created them.
    pub set_layouts: Vec<Handle>,
    pub compatible_render_target: Handle,
    pub image_to_combined_map: Option<CombinedImageSamplerMap>,
    pub sampler_to_combined_map: Option<CombinedImageSamplerMap>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PresentMode {
    #[default]
    Fifo,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SwapchainInfo {
    pub width: u32,
    pub height: u32,
    pub color_format: ImageFormat,
    pub depth_format: Option<ImageFormat>,
    pub sample_count: SampleCount,
    pub capacity_hint: u32,
    pub present_mode: PresentMode,
}
