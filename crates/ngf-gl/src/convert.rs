//! Portable enums to GL enums.

use gl::types::GLenum;
use ngf_core::types::{
    AttachmentType, BlendFactor, BlendOp, BufferStorage, CompareOp, Filter, FrontFace,
    ImageFormat, ImageInfo, ImageType, IndexType, PolygonMode, PrimitiveTopology, SampleCount,
    ShaderStageType, StencilOp, VertexAttribType, WrapMode,
};

pub fn compare_op(op: CompareOp) -> GLenum {
    match op {
        CompareOp::Never => gl::NEVER,
        CompareOp::Less => gl::LESS,
        CompareOp::Equal => gl::EQUAL,
        CompareOp::LessEqual => gl::LEQUAL,
        CompareOp::Greater => gl::GREATER,
        CompareOp::NotEqual => gl::NOTEQUAL,
        CompareOp::GreaterEqual => gl::GEQUAL,
        CompareOp::Always => gl::ALWAYS,
    }
}

pub fn stencil_op(op: StencilOp) -> GLenum {
    match op {
        StencilOp::Keep => gl::KEEP,
        StencilOp::Zero => gl::ZERO,
        StencilOp::Replace => gl::REPLACE,
        StencilOp::IncrementClamp => gl::INCR,
        StencilOp::DecrementClamp => gl::DECR,
        StencilOp::Invert => gl::INVERT,
        StencilOp::IncrementWrap => gl::INCR_WRAP,
        StencilOp::DecrementWrap => gl::DECR_WRAP,
    }
}

pub fn polygon_mode(mode: PolygonMode) -> GLenum {
    match mode {
        PolygonMode::Fill => gl::FILL,
        PolygonMode::Line => gl::LINE,
        PolygonMode::Point => gl::POINT,
    }
}

pub fn front_face(face: FrontFace) -> GLenum {
    match face {
        FrontFace::CounterClockwise => gl::CCW,
        FrontFace::Clockwise => gl::CW,
    }
}

pub fn blend_factor(factor: BlendFactor) -> GLenum {
    match factor {
        BlendFactor::Zero => gl::ZERO,
        BlendFactor::One => gl::ONE,
        BlendFactor::SrcColor => gl::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => gl::ONE_MINUS_SRC_COLOR,
        BlendFactor::DstColor => gl::DST_COLOR,
        BlendFactor::OneMinusDstColor => gl::ONE_MINUS_DST_COLOR,
        BlendFactor::SrcAlpha => gl::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => gl::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => gl::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => gl::ONE_MINUS_DST_ALPHA,
        BlendFactor::ConstantColor => gl::CONSTANT_COLOR,
        BlendFactor::OneMinusConstantColor => gl::ONE_MINUS_CONSTANT_COLOR,
        BlendFactor::ConstantAlpha => gl::CONSTANT_ALPHA,
        BlendFactor::OneMinusConstantAlpha => gl::ONE_MINUS_CONSTANT_ALPHA,
    }
}

pub fn blend_op(op: BlendOp) -> GLenum {
    match op {
        BlendOp::Add => gl::FUNC_ADD,
        BlendOp::Subtract => gl::FUNC_SUBTRACT,
        BlendOp::ReverseSubtract => gl::FUNC_REVERSE_SUBTRACT,
        BlendOp::Min => gl::MIN,
        BlendOp::Max => gl::MAX,
    }
}

pub fn primitive_mode(topology: PrimitiveTopology) -> GLenum {
    match topology {
        PrimitiveTopology::TriangleList => gl::TRIANGLES,
        PrimitiveTopology::TriangleStrip => gl::TRIANGLE_STRIP,
        PrimitiveTopology::LineList => gl::LINES,
        PrimitiveTopology::LineStrip => gl::LINE_STRIP,
        PrimitiveTopology::PointList => gl::POINTS,
        PrimitiveTopology::PatchList => gl::PATCHES,
    }
}

pub fn index_type(ty: IndexType) -> GLenum {
    match ty {
        IndexType::Uint16 => gl::UNSIGNED_SHORT,
        IndexType::Uint32 => gl::UNSIGNED_INT,
    }
}

/// GL type and whether the attribute goes through the integer path.
pub fn vertex_attrib_type(ty: VertexAttribType, normalized: bool) -> (GLenum, bool) {
    let gl_ty = match ty {
        VertexAttribType::Int8 => gl::BYTE,
        VertexAttribType::Uint8 => gl::UNSIGNED_BYTE,
        VertexAttribType::Int16 => gl::SHORT,
        VertexAttribType::Uint16 => gl::UNSIGNED_SHORT,
        VertexAttribType::Int32 => gl::INT,
        VertexAttribType::Uint32 => gl::UNSIGNED_INT,
        VertexAttribType::Float32 => gl::FLOAT,
        VertexAttribType::Float16 => gl::HALF_FLOAT,
    };
    let is_float = matches!(ty, VertexAttribType::Float32 | VertexAttribType::Float16);
    (gl_ty, !is_float && !normalized)
}

pub fn shader_type(ty: ShaderStageType) -> GLenum {
    match ty {
        ShaderStageType::Vertex => gl::VERTEX_SHADER,
        ShaderStageType::TessControl => gl::TESS_CONTROL_SHADER,
        ShaderStageType::TessEvaluation => gl::TESS_EVALUATION_SHADER,
        ShaderStageType::Geometry => gl::GEOMETRY_SHADER,
        ShaderStageType::Fragment => gl::FRAGMENT_SHADER,
    }
}

pub fn buffer_usage(storage: BufferStorage) -> GLenum {
    match storage {
        BufferStorage::HostReadable => gl::STREAM_READ,
        BufferStorage::HostWriteable => gl::DYNAMIC_DRAW,
        BufferStorage::HostReadWrite => gl::DYNAMIC_COPY,
        BufferStorage::Private => gl::STATIC_DRAW,
    }
}

/// Sized internal format, pixel format and pixel type.
pub fn image_format(format: ImageFormat) -> (GLenum, GLenum, GLenum) {
    match format {
        ImageFormat::R8 => (gl::R8, gl::RED, gl::UNSIGNED_BYTE),
        ImageFormat::Rg8 => (gl::RG8, gl::RG, gl::UNSIGNED_BYTE),
        ImageFormat::Rgba8 => (gl::RGBA8, gl::RGBA, gl::UNSIGNED_BYTE),
        ImageFormat::Rgba8Srgb => (gl::SRGB8_ALPHA8, gl::RGBA, gl::UNSIGNED_BYTE),
        ImageFormat::Bgra8 => (gl::RGBA8, gl::BGRA, gl::UNSIGNED_BYTE),
        ImageFormat::Bgra8Srgb => (gl::SRGB8_ALPHA8, gl::BGRA, gl::UNSIGNED_BYTE),
        ImageFormat::R32f => (gl::R32F, gl::RED, gl::FLOAT),
        ImageFormat::Rgba16f => (gl::RGBA16F, gl::RGBA, gl::HALF_FLOAT),
        ImageFormat::Rgba32f => (gl::RGBA32F, gl::RGBA, gl::FLOAT),
        ImageFormat::Depth16 => (gl::DEPTH_COMPONENT16, gl::DEPTH_COMPONENT, gl::UNSIGNED_SHORT),
        ImageFormat::Depth32 => (gl::DEPTH_COMPONENT32F, gl::DEPTH_COMPONENT, gl::FLOAT),
        ImageFormat::Depth24Stencil8 => {
            (gl::DEPTH24_STENCIL8, gl::DEPTH_STENCIL, gl::UNSIGNED_INT_24_8)
        }
    }
}

/// Texture target for an image of this shape.
pub fn texture_target(info: &ImageInfo) -> GLenum {
    match info.ty {
        ImageType::Image2d if info.sample_count != SampleCount::S1 => gl::TEXTURE_2D_MULTISAMPLE,
        ImageType::Image2d if info.nlayers > 1 => gl::TEXTURE_2D_ARRAY,
        ImageType::Image2d => gl::TEXTURE_2D,
        ImageType::Image3d => gl::TEXTURE_3D,
        ImageType::Cube if info.nlayers > 1 => gl::TEXTURE_CUBE_MAP_ARRAY,
        ImageType::Cube => gl::TEXTURE_CUBE_MAP,
    }
}

pub fn attachment_point(ty: AttachmentType, color_index: u32) -> GLenum {
    match ty {
        AttachmentType::Color => gl::COLOR_ATTACHMENT0 + color_index,
        AttachmentType::Depth => gl::DEPTH_ATTACHMENT,
        AttachmentType::DepthStencil => gl::DEPTH_STENCIL_ATTACHMENT,
    }
}

/// Attachment names used to invalidate the default framebuffer.
pub fn default_attachments(ty: AttachmentType) -> &'static [GLenum] {
    match ty {
        AttachmentType::Color => &[gl::COLOR],
        AttachmentType::Depth => &[gl::DEPTH],
        AttachmentType::DepthStencil => &[gl::DEPTH, gl::STENCIL],
    }
}

pub fn min_filter(min: Filter, mip: Filter) -> GLenum {
    match (min, mip) {
        (Filter::Nearest, Filter::Nearest) => gl::NEAREST_MIPMAP_NEAREST,
        (Filter::Nearest, Filter::Linear) => gl::NEAREST_MIPMAP_LINEAR,
        (Filter::Linear, Filter::Nearest) => gl::LINEAR_MIPMAP_NEAREST,
        (Filter::Linear, Filter::Linear) => gl::LINEAR_MIPMAP_LINEAR,
    }
}

pub fn mag_filter(filter: Filter) -> GLenum {
    match filter {
        Filter::Nearest => gl::NEAREST,
        Filter::Linear => gl::LINEAR,
    }
}

pub fn wrap_mode(mode: WrapMode) -> GLenum {
    match mode {
        WrapMode::ClampToEdge => gl::CLAMP_TO_EDGE,
        WrapMode::Repeat => gl::REPEAT,
        WrapMode::MirroredRepeat => gl::MIRRORED_REPEAT,
    }
}
