//! The native call seam of the GL backend.
//!
//! Everything the backend asks of OpenGL goes through [`GlApi`]. Methods
//! mirror single GL entry points (or a bind-then-call pair where GL needs a
//! binding point to address an object) and take raw GL enums and names.
//! [`crate::NativeGl`] forwards to the driver; [`crate::RecordingGl`] logs.

use gl::types::{GLenum, GLint, GLuint};

pub trait GlApi: Send {
    // ── Buffers ─────────────────────────────────────────────
    fn gen_buffer(&mut self) -> GLuint;
    fn delete_buffer(&mut self, buffer: GLuint);
    /// Allocate storage for `buffer`, optionally initialized from `data`.
    fn buffer_data(&mut self, buffer: GLuint, size: u64, data: Option<&[u8]>, usage: GLenum);
    fn buffer_sub_data(&mut self, buffer: GLuint, offset: u64, data: &[u8]);
    fn get_buffer_sub_data(&mut self, buffer: GLuint, offset: u64, out: &mut [u8]);
    fn copy_buffer_sub_data(
        &mut self,
        src: GLuint,
        dst: GLuint,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    );

    // ── Textures and renderbuffers ──────────────────────────
    fn gen_texture(&mut self) -> GLuint;
    fn delete_texture(&mut self, texture: GLuint);
    /// Immutable storage; `extent[2]` is depth or layer count where the
    /// target has one. `samples > 1` selects multisample storage.
    fn tex_storage(
        &mut self,
        target: GLenum,
        texture: GLuint,
        levels: i32,
        internal_format: GLenum,
        extent: [i32; 3],
        samples: i32,
    );
    /// Upload from `unpack_buffer` at `buffer_offset` into a texture region.
    #[allow(clippy::too_many_arguments)]
    fn tex_sub_image_from_buffer(
        &mut self,
        target: GLenum,
        texture: GLuint,
        level: i32,
        offset: [i32; 3],
        extent: [i32; 3],
        format: GLenum,
        ty: GLenum,
        unpack_buffer: GLuint,
        buffer_offset: u64,
    );
    fn gen_renderbuffer(&mut self) -> GLuint;
    fn delete_renderbuffer(&mut self, renderbuffer: GLuint);
    fn renderbuffer_storage(
        &mut self,
        renderbuffer: GLuint,
        samples: i32,
        internal_format: GLenum,
        width: i32,
        height: i32,
    );

    // ── Samplers ────────────────────────────────────────────
    fn gen_sampler(&mut self) -> GLuint;
    fn delete_sampler(&mut self, sampler: GLuint);
    fn sampler_parameter_i(&mut self, sampler: GLuint, pname: GLenum, value: GLint);
    fn sampler_parameter_f(&mut self, sampler: GLuint, pname: GLenum, value: f32);

    // ── Shaders and programs ────────────────────────────────
    fn create_shader(&mut self, ty: GLenum) -> GLuint;
    /// Set the source and compile. On failure returns the info log.
    fn compile_shader(&mut self, shader: GLuint, source: &str) -> Result<(), String>;
    fn delete_shader(&mut self, shader: GLuint);
    fn create_program(&mut self) -> GLuint;
    fn attach_shader(&mut self, program: GLuint, shader: GLuint);
    fn detach_shader(&mut self, program: GLuint, shader: GLuint);
    /// Link. On failure returns the info log.
    fn link_program(&mut self, program: GLuint) -> Result<(), String>;
    fn delete_program(&mut self, program: GLuint);

    // ── Vertex arrays ───────────────────────────────────────
    fn gen_vertex_array(&mut self) -> GLuint;
    fn delete_vertex_array(&mut self, vao: GLuint);
    #[allow(clippy::too_many_arguments)]
    fn vertex_attrib_format(
        &mut self,
        vao: GLuint,
        location: GLuint,
        size: i32,
        ty: GLenum,
        normalized: bool,
        relative_offset: u32,
        integer: bool,
    );
    fn vertex_attrib_binding(&mut self, vao: GLuint, location: GLuint, binding: GLuint);
    fn vertex_binding_divisor(&mut self, vao: GLuint, binding: GLuint, divisor: GLuint);
    fn enable_vertex_attrib(&mut self, vao: GLuint, location: GLuint);

    // ── Framebuffers ────────────────────────────────────────
    fn gen_framebuffer(&mut self) -> GLuint;
    fn delete_framebuffer(&mut self, framebuffer: GLuint);
    /// Attach a texture level; `layer` selects a single layer or cube face.
    fn framebuffer_texture(
        &mut self,
        framebuffer: GLuint,
        attachment: GLenum,
        target: GLenum,
        texture: GLuint,
        level: i32,
        layer: Option<i32>,
    );
    fn framebuffer_renderbuffer(
        &mut self,
        framebuffer: GLuint,
        attachment: GLenum,
        renderbuffer: GLuint,
    );
    fn check_framebuffer_status(&mut self, framebuffer: GLuint) -> GLenum;

    // ── Fixed-function state ────────────────────────────────
    fn enable(&mut self, cap: GLenum);
    fn disable(&mut self, cap: GLenum);
    fn polygon_mode(&mut self, mode: GLenum);
    fn cull_face(&mut self, mode: GLenum);
    fn front_face(&mut self, mode: GLenum);
    fn line_width(&mut self, width: f32);
    fn depth_func(&mut self, func: GLenum);
    fn depth_mask(&mut self, write: bool);
    fn depth_range(&mut self, near: f32, far: f32);
    fn stencil_func_separate(&mut self, face: GLenum, func: GLenum, reference: i32, mask: u32);
    fn stencil_op_separate(&mut self, face: GLenum, sfail: GLenum, dpfail: GLenum, dppass: GLenum);
    fn stencil_mask_separate(&mut self, face: GLenum, mask: u32);
    fn blend_func_separate(
        &mut self,
        src_rgb: GLenum,
        dst_rgb: GLenum,
        src_alpha: GLenum,
        dst_alpha: GLenum,
    );
    fn blend_equation_separate(&mut self, rgb: GLenum, alpha: GLenum);
    fn blend_color(&mut self, rgba: [f32; 4]);
    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool);
    fn patch_vertices(&mut self, count: i32);
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);
    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32);

    // ── Binding ─────────────────────────────────────────────
    fn use_program(&mut self, program: GLuint);
    fn bind_vertex_array(&mut self, vao: GLuint);
    fn bind_vertex_buffer(&mut self, binding: GLuint, buffer: GLuint, offset: u64, stride: i32);
    fn bind_buffer(&mut self, target: GLenum, buffer: GLuint);
    fn bind_buffer_range(
        &mut self,
        target: GLenum,
        index: GLuint,
        buffer: GLuint,
        offset: u64,
        size: u64,
    );
    /// `glActiveTexture(GL_TEXTURE0 + unit)` followed by `glBindTexture`.
    fn bind_texture_unit(&mut self, unit: GLuint, target: GLenum, texture: GLuint);
    fn bind_sampler(&mut self, unit: GLuint, sampler: GLuint);
    fn bind_image_texture(&mut self, unit: GLuint, texture: GLuint, access: GLenum, format: GLenum);
    fn bind_framebuffer(&mut self, target: GLenum, framebuffer: GLuint);
    fn draw_buffers(&mut self, buffers: &[GLenum]);
    fn clear_buffer_fv(&mut self, buffer: GLenum, draw_buffer: i32, value: [f32; 4]);
    fn clear_buffer_fi(&mut self, depth: f32, stencil: i32);
    fn invalidate_framebuffer(&mut self, target: GLenum, attachments: &[GLenum]);

    // ── Draws ───────────────────────────────────────────────
    fn draw_arrays(&mut self, mode: GLenum, first: i32, count: i32);
    fn draw_arrays_instanced(&mut self, mode: GLenum, first: i32, count: i32, instances: i32);
    fn draw_elements(&mut self, mode: GLenum, count: i32, ty: GLenum, offset: u64);
    fn draw_elements_instanced(
        &mut self,
        mode: GLenum,
        count: i32,
        ty: GLenum,
        offset: u64,
        instances: i32,
    );

    // ── Queries ─────────────────────────────────────────────
    fn get_integer(&mut self, pname: GLenum) -> i32;
    fn get_integer_v(&mut self, pname: GLenum, out: &mut [i32]);
    fn get_float_v(&mut self, pname: GLenum, out: &mut [f32]);
    fn get_string(&mut self, name: GLenum) -> String;
    fn get_error(&mut self) -> GLenum;
    fn flush(&mut self);
}
