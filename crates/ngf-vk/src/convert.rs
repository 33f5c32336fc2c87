//! Portable enums to Vulkan enums.

use ash::vk;
use ngf_core::types::{
    AttachmentType, BlendFactor, BlendOp, BufferUsage, ColorMask, CompareOp, CullMode,
    DescriptorType, Filter, FrontFace, ImageFormat, ImageUsage, IndexType, Irect2d, LoadOp,
    PolygonMode, PresentMode, PrimitiveTopology, SampleCount, ShaderStageType, StageFlags,
    StencilFace, StencilInfo, StencilOp, StoreOp, VertexAttribType, WrapMode,
};

pub fn compare_op(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub fn stencil_op(op: StencilOp) -> vk::StencilOp {
    match op {
        StencilOp::Keep => vk::StencilOp::KEEP,
        StencilOp::Zero => vk::StencilOp::ZERO,
        StencilOp::Replace => vk::StencilOp::REPLACE,
        StencilOp::IncrementClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
        StencilOp::DecrementClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
        StencilOp::Invert => vk::StencilOp::INVERT,
        StencilOp::IncrementWrap => vk::StencilOp::INCREMENT_AND_WRAP,
        StencilOp::DecrementWrap => vk::StencilOp::DECREMENT_AND_WRAP,
    }
}

pub fn stencil_state(info: &StencilInfo) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: stencil_op(info.fail_op),
        pass_op: stencil_op(info.pass_op),
        depth_fail_op: stencil_op(info.depth_fail_op),
        compare_op: compare_op(info.compare_op),
        compare_mask: info.compare_mask,
        write_mask: info.write_mask,
        reference: info.reference,
    }
}

pub fn stencil_face(face: StencilFace) -> vk::StencilFaceFlags {
    match face {
        StencilFace::Front => vk::StencilFaceFlags::FRONT,
        StencilFace::Back => vk::StencilFaceFlags::BACK,
        StencilFace::FrontAndBack => vk::StencilFaceFlags::FRONT_AND_BACK,
    }
}

pub fn polygon_mode(mode: PolygonMode) -> vk::PolygonMode {
    match mode {
        PolygonMode::Fill => vk::PolygonMode::FILL,
        PolygonMode::Line => vk::PolygonMode::LINE,
        PolygonMode::Point => vk::PolygonMode::POINT,
    }
}

pub fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::Back => vk::CullModeFlags::BACK,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
        CullMode::None => vk::CullModeFlags::NONE,
    }
}

pub fn front_face(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub fn blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
        BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => vk::BlendFactor::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::ConstantAlpha => vk::BlendFactor::CONSTANT_ALPHA,
        BlendFactor::OneMinusConstantAlpha => vk::BlendFactor::ONE_MINUS_CONSTANT_ALPHA,
    }
}

pub fn blend_op(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
        BlendOp::Subtract => vk::BlendOp::SUBTRACT,
        BlendOp::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
        BlendOp::Min => vk::BlendOp::MIN,
        BlendOp::Max => vk::BlendOp::MAX,
    }
}

pub fn color_mask(mask: ColorMask) -> vk::ColorComponentFlags {
    let mut flags = vk::ColorComponentFlags::empty();
    if mask.contains(ColorMask::R) {
        flags |= vk::ColorComponentFlags::R;
    }
    if mask.contains(ColorMask::G) {
        flags |= vk::ColorComponentFlags::G;
    }
    if mask.contains(ColorMask::B) {
        flags |= vk::ColorComponentFlags::B;
    }
    if mask.contains(ColorMask::A) {
        flags |= vk::ColorComponentFlags::A;
    }
    flags
}

pub fn topology(t: PrimitiveTopology) -> vk::PrimitiveTopology {
    match t {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
        PrimitiveTopology::PatchList => vk::PrimitiveTopology::PATCH_LIST,
    }
}

pub fn sample_count(count: SampleCount) -> vk::SampleCountFlags {
    match count {
        SampleCount::S1 => vk::SampleCountFlags::TYPE_1,
        SampleCount::S2 => vk::SampleCountFlags::TYPE_2,
        SampleCount::S4 => vk::SampleCountFlags::TYPE_4,
        SampleCount::S8 => vk::SampleCountFlags::TYPE_8,
        SampleCount::S16 => vk::SampleCountFlags::TYPE_16,
    }
}

pub fn shader_stage(ty: ShaderStageType) -> vk::ShaderStageFlags {
    match ty {
        ShaderStageType::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStageType::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
        ShaderStageType::TessEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        ShaderStageType::Geometry => vk::ShaderStageFlags::GEOMETRY,
        ShaderStageType::Fragment => vk::ShaderStageFlags::FRAGMENT,
    }
}

pub fn stage_flags(flags: StageFlags) -> vk::ShaderStageFlags {
    let mut out = vk::ShaderStageFlags::empty();
    let pairs = [
        (StageFlags::VERTEX, vk::ShaderStageFlags::VERTEX),
        (StageFlags::TESS_CONTROL, vk::ShaderStageFlags::TESSELLATION_CONTROL),
        (StageFlags::TESS_EVALUATION, vk::ShaderStageFlags::TESSELLATION_EVALUATION),
        (StageFlags::GEOMETRY, vk::ShaderStageFlags::GEOMETRY),
        (StageFlags::FRAGMENT, vk::ShaderStageFlags::FRAGMENT),
    ];
    for (ours, theirs) in pairs {
        if flags.contains(ours) {
            out |= theirs;
        }
    }
    out
}

pub fn descriptor_type(ty: DescriptorType) -> vk::DescriptorType {
    match ty {
        DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorType::LoadStoreImage => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorType::Image => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
        DescriptorType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    }
}

pub fn format(f: ImageFormat) -> vk::Format {
    match f {
        ImageFormat::R8 => vk::Format::R8_UNORM,
        ImageFormat::Rg8 => vk::Format::R8G8_UNORM,
        ImageFormat::Rgba8 => vk::Format::R8G8B8A8_UNORM,
        ImageFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        ImageFormat::Bgra8 => vk::Format::B8G8R8A8_UNORM,
        ImageFormat::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        ImageFormat::R32f => vk::Format::R32_SFLOAT,
        ImageFormat::Rgba16f => vk::Format::R16G16B16A16_SFLOAT,
        ImageFormat::Rgba32f => vk::Format::R32G32B32A32_SFLOAT,
        ImageFormat::Depth16 => vk::Format::D16_UNORM,
        ImageFormat::Depth32 => vk::Format::D32_SFLOAT,
        ImageFormat::Depth24Stencil8 => vk::Format::D24_UNORM_S8_UINT,
    }
}

pub fn aspect(f: ImageFormat) -> vk::ImageAspectFlags {
    if f.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if f.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub fn image_usage(usage: ImageUsage, format: ImageFormat) -> vk::ImageUsageFlags {
    let mut flags = vk::ImageUsageFlags::empty();
    if usage.contains(ImageUsage::SAMPLE_FROM) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(ImageUsage::ATTACHMENT) {
        flags |= if format.is_depth() {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        };
    }
    if usage.contains(ImageUsage::TRANSFER_DST) {
        flags |= vk::ImageUsageFlags::TRANSFER_DST;
    }
    if usage.contains(ImageUsage::STORAGE) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    flags
}

pub fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut out = vk::BufferUsageFlags::empty();
    let pairs = [
        (BufferUsage::XFER_SRC, vk::BufferUsageFlags::TRANSFER_SRC),
        (BufferUsage::XFER_DST, vk::BufferUsageFlags::TRANSFER_DST),
        (BufferUsage::UNIFORM, vk::BufferUsageFlags::UNIFORM_BUFFER),
        (BufferUsage::INDEX, vk::BufferUsageFlags::INDEX_BUFFER),
        (BufferUsage::VERTEX, vk::BufferUsageFlags::VERTEX_BUFFER),
        (BufferUsage::STORAGE, vk::BufferUsageFlags::STORAGE_BUFFER),
    ];
    for (ours, theirs) in pairs {
        if usage.contains(ours) {
            out |= theirs;
        }
    }
    out
}

pub fn filter(f: Filter) -> vk::Filter {
    match f {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub fn mipmap_mode(f: Filter) -> vk::SamplerMipmapMode {
    match f {
        Filter::Nearest => vk::SamplerMipmapMode::NEAREST,
        Filter::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub fn wrap_mode(mode: WrapMode) -> vk::SamplerAddressMode {
    match mode {
        WrapMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        WrapMode::Repeat => vk::SamplerAddressMode::REPEAT,
        WrapMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
    }
}

pub fn index_type(ty: IndexType) -> vk::IndexType {
    match ty {
        IndexType::Uint16 => vk::IndexType::UINT16,
        IndexType::Uint32 => vk::IndexType::UINT32,
    }
}

/// Attribute format for `size` components of `ty`.
pub fn vertex_format(ty: VertexAttribType, size: u32, normalized: bool) -> Option<vk::Format> {
    use vk::Format as F;
    let table: [F; 4] = match (ty, normalized) {
        (VertexAttribType::Float32, _) => [
            F::R32_SFLOAT,
            F::R32G32_SFLOAT,
            F::R32G32B32_SFLOAT,
            F::R32G32B32A32_SFLOAT,
        ],
        (VertexAttribType::Float16, _) => [
            F::R16_SFLOAT,
            F::R16G16_SFLOAT,
            F::R16G16B16_SFLOAT,
            F::R16G16B16A16_SFLOAT,
        ],
        (VertexAttribType::Int8, false) => {
            [F::R8_SINT, F::R8G8_SINT, F::R8G8B8_SINT, F::R8G8B8A8_SINT]
        }
        (VertexAttribType::Int8, true) => {
            [F::R8_SNORM, F::R8G8_SNORM, F::R8G8B8_SNORM, F::R8G8B8A8_SNORM]
        }
        (VertexAttribType::Uint8, false) => {
            [F::R8_UINT, F::R8G8_UINT, F::R8G8B8_UINT, F::R8G8B8A8_UINT]
        }
        (VertexAttribType::Uint8, true) => {
            [F::R8_UNORM, F::R8G8_UNORM, F::R8G8B8_UNORM, F::R8G8B8A8_UNORM]
        }
        (VertexAttribType::Int16, false) => [
            F::R16_SINT,
            F::R16G16_SINT,
            F::R16G16B16_SINT,
            F::R16G16B16A16_SINT,
        ],
        (VertexAttribType::Int16, true) => [
            F::R16_SNORM,
            F::R16G16_SNORM,
            F::R16G16B16_SNORM,
            F::R16G16B16A16_SNORM,
        ],
        (VertexAttribType::Uint16, false) => [
            F::R16_UINT,
            F::R16G16_UINT,
            F::R16G16B16_UINT,
            F::R16G16B16A16_UINT,
        ],
        (VertexAttribType::Uint16, true) => [
            F::R16_UNORM,
            F::R16G16_UNORM,
            F::R16G16B16_UNORM,
            F::R16G16B16A16_UNORM,
        ],
        (VertexAttribType::Int32, _) => [
            F::R32_SINT,
            F::R32G32_SINT,
            F::R32G32B32_SINT,
            F::R32G32B32A32_SINT,
        ],
        (VertexAttribType::Uint32, _) => [
            F::R32_UINT,
            F::R32G32_UINT,
            F::R32G32B32_UINT,
            F::R32G32B32A32_UINT,
        ],
    };
    let index = size.checked_sub(1)? as usize;
    table.get(index).copied()
}

pub fn attachment_load_op(op: LoadOp) -> vk::AttachmentLoadOp {
    match op {
        LoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        LoadOp::Keep => vk::AttachmentLoadOp::LOAD,
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
    }
}

pub fn attachment_store_op(op: StoreOp) -> vk::AttachmentStoreOp {
    match op {
        StoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        StoreOp::Store => vk::AttachmentStoreOp::STORE,
    }
}

/// Layout an attachment rests in between passes.
pub fn attachment_layout(ty: AttachmentType, is_sampled: bool) -> vk::ImageLayout {
    match (ty, is_sampled) {
        (_, true) => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        (AttachmentType::Color, false) => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        (AttachmentType::Depth | AttachmentType::DepthStencil, false) => {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        }
    }
}

pub fn present_mode(mode: PresentMode) -> vk::PresentModeKHR {
    match mode {
        PresentMode::Fifo => vk::PresentModeKHR::FIFO,
        PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

pub fn rect(r: Irect2d) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: r.x, y: r.y },
        extent: vk::Extent2D {
            width: r.width,
            height: r.height,
        },
    }
}
