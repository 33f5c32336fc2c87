//! [`GlApi`] over the `gl` crate's global function pointers.

use std::ffi::{c_void, CStr, CString};
use std::ptr;

use gl::types::{GLboolean, GLenum, GLint, GLsizei, GLsizeiptr, GLintptr, GLuint};

use crate::api::GlApi;
use crate::platform::GlPlatform;

fn gl_bool(value: bool) -> GLboolean {
    if value {
        gl::TRUE
    } else {
        gl::FALSE
    }
}

/// Forwards every call to the driver. All methods assume the owning
/// context is current on the calling thread.
pub struct NativeGl {
    _private: (),
}

impl NativeGl {
    /// Resolve entry points through `platform`. The context must be current.
    pub fn load(platform: &dyn GlPlatform) -> Self {
        gl::load_with(|symbol| platform.get_proc_address(symbol));
        tracing::debug!("loaded OpenGL entry points");
        Self { _private: () }
    }

    fn info_log(
        object: GLuint,
        get_iv: unsafe fn(GLuint, GLenum, *mut GLint),
        get_log: unsafe fn(GLuint, GLsizei, *mut GLsizei, *mut gl::types::GLchar),
    ) -> String {
        let mut len: GLint = 0;
        // SAFETY: the caller passes a live object name and matching getters.
        unsafe { get_iv(object, gl::INFO_LOG_LENGTH, &mut len) };
        if len <= 0 {
            return String::new();
        }
        let mut buf = vec![0u8; len as usize];
        let mut written: GLsizei = 0;
        // SAFETY: `buf` holds `len` bytes.
        unsafe { get_log(object, len, &mut written, buf.as_mut_ptr().cast()) };
        buf.truncate(written.max(0) as usize);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

unsafe fn get_shader_iv(shader: GLuint, pname: GLenum, out: *mut GLint) {
    unsafe { gl::GetShaderiv(shader, pname, out) }
}

unsafe fn get_shader_log(
    shader: GLuint,
    len: GLsizei,
    written: *mut GLsizei,
    out: *mut gl::types::GLchar,
) {
    unsafe { gl::GetShaderInfoLog(shader, len, written, out) }
}

unsafe fn get_program_iv(program: GLuint, pname: GLenum, out: *mut GLint) {
    unsafe { gl::GetProgramiv(program, pname, out) }
}

unsafe fn get_program_log(
    program: GLuint,
    len: GLsizei,
    written: *mut GLsizei,
    out: *mut gl::types::GLchar,
) {
    unsafe { gl::GetProgramInfoLog(program, len, written, out) }
}

// SAFETY (module-wide): every call below goes to a loaded GL entry point
// with names created through this same API and pointers into live slices.
impl GlApi for NativeGl {
    fn gen_buffer(&mut self) -> GLuint {
        let mut name = 0;
        unsafe { gl::GenBuffers(1, &mut name) };
        name
    }

    fn delete_buffer(&mut self, buffer: GLuint) {
        unsafe { gl::DeleteBuffers(1, &buffer) };
    }

    fn buffer_data(&mut self, buffer: GLuint, size: u64, data: Option<&[u8]>, usage: GLenum) {
        let ptr = data.map_or(ptr::null(), |d| d.as_ptr().cast::<c_void>());
        unsafe {
            gl::BindBuffer(gl::COPY_WRITE_BUFFER, buffer);
            gl::BufferData(gl::COPY_WRITE_BUFFER, size as GLsizeiptr, ptr, usage);
        }
    }

    fn buffer_sub_data(&mut self, buffer: GLuint, offset: u64, data: &[u8]) {
        unsafe {
            gl::BindBuffer(gl::COPY_WRITE_BUFFER, buffer);
            gl::BufferSubData(
                gl::COPY_WRITE_BUFFER,
                offset as GLintptr,
                data.len() as GLsizeiptr,
                data.as_ptr().cast(),
            );
        }
    }

    fn get_buffer_sub_data(&mut self, buffer: GLuint, offset: u64, out: &mut [u8]) {
        unsafe {
            gl::BindBuffer(gl::COPY_READ_BUFFER, buffer);
            gl::GetBufferSubData(
                gl::COPY_READ_BUFFER,
                offset as GLintptr,
                out.len() as GLsizeiptr,
                out.as_mut_ptr().cast(),
            );
        }
    }

    fn copy_buffer_sub_data(
        &mut self,
        src: GLuint,
        dst: GLuint,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        unsafe {
            gl::BindBuffer(gl::COPY_READ_BUFFER, src);
            gl::BindBuffer(gl::COPY_WRITE_BUFFER, dst);
            gl::CopyBufferSubData(
                gl::COPY_READ_BUFFER,
                gl::COPY_WRITE_BUFFER,
                src_offset as GLintptr,
                dst_offset as GLintptr,
                size as GLsizeiptr,
            );
        }
    }

    fn gen_texture(&mut self) -> GLuint {
        let mut name = 0;
        unsafe { gl::GenTextures(1, &mut name) };
        name
    }

    fn delete_texture(&mut self, texture: GLuint) {
        unsafe { gl::DeleteTextures(1, &texture) };
    }

    fn tex_storage(
        &mut self,
        target: GLenum,
        texture: GLuint,
        levels: i32,
        internal_format: GLenum,
        extent: [i32; 3],
        samples: i32,
    ) {
        unsafe {
            gl::BindTexture(target, texture);
            match target {
                gl::TEXTURE_2D_MULTISAMPLE => gl::TexStorage2DMultisample(
                    target,
                    samples,
                    internal_format,
                    extent[0],
                    extent[1],
                    gl::TRUE,
                ),
                gl::TEXTURE_2D_ARRAY | gl::TEXTURE_3D | gl::TEXTURE_CUBE_MAP_ARRAY => {
                    gl::TexStorage3D(
                        target,
                        levels,
                        internal_format,
                        extent[0],
                        extent[1],
                        extent[2],
                    )
                }
                _ => gl::TexStorage2D(target, levels, internal_format, extent[0], extent[1]),
            }
            gl::BindTexture(target, 0);
        }
    }

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
    ) {
        let is_face = (gl::TEXTURE_CUBE_MAP_POSITIVE_X..=gl::TEXTURE_CUBE_MAP_NEGATIVE_Z)
            .contains(&target);
        let bind_target = if is_face { gl::TEXTURE_CUBE_MAP } else { target };
        let pixels = buffer_offset as usize as *const c_void;
        unsafe {
            gl::BindBuffer(gl::PIXEL_UNPACK_BUFFER, unpack_buffer);
            gl::BindTexture(bind_target, texture);
            match target {
                gl::TEXTURE_2D_ARRAY | gl::TEXTURE_3D | gl::TEXTURE_CUBE_MAP_ARRAY => {
                    gl::TexSubImage3D(
                        target, level, offset[0], offset[1], offset[2], extent[0], extent[1],
                        extent[2], format, ty, pixels,
                    )
                }
                _ => gl::TexSubImage2D(
                    target, level, offset[0], offset[1], extent[0], extent[1], format, ty, pixels,
                ),
            }
            gl::BindTexture(bind_target, 0);
            gl::BindBuffer(gl::PIXEL_UNPACK_BUFFER, 0);
        }
    }

    fn gen_renderbuffer(&mut self) -> GLuint {
        let mut name = 0;
        unsafe { gl::GenRenderbuffers(1, &mut name) };
        name
    }

    fn delete_renderbuffer(&mut self, renderbuffer: GLuint) {
        unsafe { gl::DeleteRenderbuffers(1, &renderbuffer) };
    }

    fn renderbuffer_storage(
        &mut self,
        renderbuffer: GLuint,
        samples: i32,
        internal_format: GLenum,
        width: i32,
        height: i32,
    ) {
        unsafe {
            gl::BindRenderbuffer(gl::RENDERBUFFER, renderbuffer);
            gl::RenderbufferStorageMultisample(
                gl::RENDERBUFFER,
                samples,
                internal_format,
                width,
                height,
            );
            gl::BindRenderbuffer(gl::RENDERBUFFER, 0);
        }
    }

    fn gen_sampler(&mut self) -> GLuint {
        let mut name = 0;
        unsafe { gl::GenSamplers(1, &mut name) };
        name
    }

    fn delete_sampler(&mut self, sampler: GLuint) {
        unsafe { gl::DeleteSamplers(1, &sampler) };
    }

    fn sampler_parameter_i(&mut self, sampler: GLuint, pname: GLenum, value: GLint) {
        unsafe { gl::SamplerParameteri(sampler, pname, value) };
    }

    fn sampler_parameter_f(&mut self, sampler: GLuint, pname: GLenum, value: f32) {
        unsafe { gl::SamplerParameterf(sampler, pname, value) };
    }

    fn create_shader(&mut self, ty: GLenum) -> GLuint {
        unsafe { gl::CreateShader(ty) }
    }

    fn compile_shader(&mut self, shader: GLuint, source: &str) -> Result<(), String> {
        let source =
            CString::new(source).map_err(|_| "shader source contains a NUL byte".to_string())?;
        let mut status: GLint = 0;
        unsafe {
            gl::ShaderSource(shader, 1, &source.as_ptr(), ptr::null());
            gl::CompileShader(shader);
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status);
        }
        if status == GLint::from(gl::TRUE) {
            Ok(())
        } else {
            Err(Self::info_log(shader, get_shader_iv, get_shader_log))
        }
    }

    fn delete_shader(&mut self, shader: GLuint) {
        unsafe { gl::DeleteShader(shader) };
    }

    fn create_program(&mut self) -> GLuint {
        unsafe { gl::CreateProgram() }
    }

    fn attach_shader(&mut self, program: GLuint, shader: GLuint) {
        unsafe { gl::AttachShader(program, shader) };
    }

    fn detach_shader(&mut self, program: GLuint, shader: GLuint) {
        unsafe { gl::DetachShader(program, shader) };
    }

    fn link_program(&mut self, program: GLuint) -> Result<(), String> {
        let mut status: GLint = 0;
        unsafe {
            gl::LinkProgram(program);
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut status);
        }
        if status == GLint::from(gl::TRUE) {
            Ok(())
        } else {
            Err(Self::info_log(program, get_program_iv, get_program_log))
        }
    }

    fn delete_program(&mut self, program: GLuint) {
        unsafe { gl::DeleteProgram(program) };
    }

    fn gen_vertex_array(&mut self) -> GLuint {
        let mut name = 0;
        unsafe { gl::GenVertexArrays(1, &mut name) };
        name
    }

    fn delete_vertex_array(&mut self, vao: GLuint) {
        unsafe { gl::DeleteVertexArrays(1, &vao) };
    }

    fn vertex_attrib_format(
        &mut self,
        vao: GLuint,
        location: GLuint,
        size: i32,
        ty: GLenum,
        normalized: bool,
        relative_offset: u32,
        integer: bool,
    ) {
        unsafe {
            gl::BindVertexArray(vao);
            if integer {
                gl::VertexAttribIFormat(location, size, ty, relative_offset);
            } else {
                gl::VertexAttribFormat(location, size, ty, gl_bool(normalized), relative_offset);
            }
        }
    }

    fn vertex_attrib_binding(&mut self, vao: GLuint, location: GLuint, binding: GLuint) {
        unsafe {
            gl::BindVertexArray(vao);
            gl::VertexAttribBinding(location, binding);
        }
    }

    fn vertex_binding_divisor(&mut self, vao: GLuint, binding: GLuint, divisor: GLuint) {
        unsafe {
            gl::BindVertexArray(vao);
            gl::VertexBindingDivisor(binding, divisor);
        }
    }

    fn enable_vertex_attrib(&mut self, vao: GLuint, location: GLuint) {
        unsafe {
            gl::BindVertexArray(vao);
            gl::EnableVertexAttribArray(location);
        }
    }

    fn gen_framebuffer(&mut self) -> GLuint {
        let mut name = 0;
        unsafe { gl::GenFramebuffers(1, &mut name) };
        name
    }

    fn delete_framebuffer(&mut self, framebuffer: GLuint) {
        unsafe { gl::DeleteFramebuffers(1, &framebuffer) };
    }

    fn framebuffer_texture(
        &mut self,
        framebuffer: GLuint,
        attachment: GLenum,
        target: GLenum,
        texture: GLuint,
        level: i32,
        layer: Option<i32>,
    ) {
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, framebuffer);
            match (target, layer) {
                (gl::TEXTURE_CUBE_MAP, Some(face)) => gl::FramebufferTexture2D(
                    gl::FRAMEBUFFER,
                    attachment,
                    gl::TEXTURE_CUBE_MAP_POSITIVE_X + face as GLenum,
                    texture,
                    level,
                ),
                (_, Some(layer)) => {
                    gl::FramebufferTextureLayer(gl::FRAMEBUFFER, attachment, texture, level, layer)
                }
                (_, None) => {
                    gl::FramebufferTexture2D(gl::FRAMEBUFFER, attachment, target, texture, level)
                }
            }
        }
    }

    fn framebuffer_renderbuffer(
        &mut self,
        framebuffer: GLuint,
        attachment: GLenum,
        renderbuffer: GLuint,
    ) {
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, framebuffer);
            gl::FramebufferRenderbuffer(
                gl::FRAMEBUFFER,
                attachment,
                gl::RENDERBUFFER,
                renderbuffer,
            );
        }
    }

    fn check_framebuffer_status(&mut self, framebuffer: GLuint) -> GLenum {
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, framebuffer);
            gl::CheckFramebufferStatus(gl::FRAMEBUFFER)
        }
    }

    fn enable(&mut self, cap: GLenum) {
        unsafe { gl::Enable(cap) };
    }

    fn disable(&mut self, cap: GLenum) {
        unsafe { gl::Disable(cap) };
    }

    fn polygon_mode(&mut self, mode: GLenum) {
        unsafe { gl::PolygonMode(gl::FRONT_AND_BACK, mode) };
    }

    fn cull_face(&mut self, mode: GLenum) {
        unsafe { gl::CullFace(mode) };
    }

    fn front_face(&mut self, mode: GLenum) {
        unsafe { gl::FrontFace(mode) };
    }

    fn line_width(&mut self, width: f32) {
        unsafe { gl::LineWidth(width) };
    }

    fn depth_func(&mut self, func: GLenum) {
        unsafe { gl::DepthFunc(func) };
    }

    fn depth_mask(&mut self, write: bool) {
        unsafe { gl::DepthMask(gl_bool(write)) };
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        unsafe { gl::DepthRangef(near, far) };
    }

    fn stencil_func_separate(&mut self, face: GLenum, func: GLenum, reference: i32, mask: u32) {
        unsafe { gl::StencilFuncSeparate(face, func, reference, mask) };
    }

    fn stencil_op_separate(&mut self, face: GLenum, sfail: GLenum, dpfail: GLenum, dppass: GLenum) {
        unsafe { gl::StencilOpSeparate(face, sfail, dpfail, dppass) };
    }

    fn stencil_mask_separate(&mut self, face: GLenum, mask: u32) {
        unsafe { gl::StencilMaskSeparate(face, mask) };
    }

    fn blend_func_separate(
        &mut self,
        src_rgb: GLenum,
        dst_rgb: GLenum,
        src_alpha: GLenum,
        dst_alpha: GLenum,
    ) {
        unsafe { gl::BlendFuncSeparate(src_rgb, dst_rgb, src_alpha, dst_alpha) };
    }

    fn blend_equation_separate(&mut self, rgb: GLenum, alpha: GLenum) {
        unsafe { gl::BlendEquationSeparate(rgb, alpha) };
    }

    fn blend_color(&mut self, rgba: [f32; 4]) {
        unsafe { gl::BlendColor(rgba[0], rgba[1], rgba[2], rgba[3]) };
    }

    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        unsafe { gl::ColorMask(gl_bool(r), gl_bool(g), gl_bool(b), gl_bool(a)) };
    }

    fn patch_vertices(&mut self, count: i32) {
        unsafe { gl::PatchParameteri(gl::PATCH_VERTICES, count) };
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { gl::Viewport(x, y, width, height) };
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { gl::Scissor(x, y, width, height) };
    }

    fn use_program(&mut self, program: GLuint) {
        unsafe { gl::UseProgram(program) };
    }

    fn bind_vertex_array(&mut self, vao: GLuint) {
        unsafe { gl::BindVertexArray(vao) };
    }

    fn bind_vertex_buffer(&mut self, binding: GLuint, buffer: GLuint, offset: u64, stride: i32) {
        unsafe { gl::BindVertexBuffer(binding, buffer, offset as GLintptr, stride) };
    }

    fn bind_buffer(&mut self, target: GLenum, buffer: GLuint) {
        unsafe { gl::BindBuffer(target, buffer) };
    }

    fn bind_buffer_range(
        &mut self,
        target: GLenum,
        index: GLuint,
        buffer: GLuint,
        offset: u64,
        size: u64,
    ) {
        unsafe {
            gl::BindBufferRange(target, index, buffer, offset as GLintptr, size as GLsizeiptr)
        };
    }

    fn bind_texture_unit(&mut self, unit: GLuint, target: GLenum, texture: GLuint) {
        unsafe {
            gl::ActiveTexture(gl::TEXTURE0 + unit);
            gl::BindTexture(target, texture);
        }
    }

    fn bind_sampler(&mut self, unit: GLuint, sampler: GLuint) {
        unsafe { gl::BindSampler(unit, sampler) };
    }

    fn bind_image_texture(
        &mut self,
        unit: GLuint,
        texture: GLuint,
        access: GLenum,
        format: GLenum,
    ) {
        unsafe { gl::BindImageTexture(unit, texture, 0, gl::TRUE, 0, access, format) };
    }

    fn bind_framebuffer(&mut self, target: GLenum, framebuffer: GLuint) {
        unsafe { gl::BindFramebuffer(target, framebuffer) };
    }

    fn draw_buffers(&mut self, buffers: &[GLenum]) {
        unsafe { gl::DrawBuffers(buffers.len() as GLsizei, buffers.as_ptr()) };
    }

    fn clear_buffer_fv(&mut self, buffer: GLenum, draw_buffer: i32, value: [f32; 4]) {
        unsafe { gl::ClearBufferfv(buffer, draw_buffer, value.as_ptr()) };
    }

    fn clear_buffer_fi(&mut self, depth: f32, stencil: i32) {
        unsafe { gl::ClearBufferfi(gl::DEPTH_STENCIL, 0, depth, stencil) };
    }

    fn invalidate_framebuffer(&mut self, target: GLenum, attachments: &[GLenum]) {
        unsafe {
            gl::InvalidateFramebuffer(target, attachments.len() as GLsizei, attachments.as_ptr())
        };
    }

    fn draw_arrays(&mut self, mode: GLenum, first: i32, count: i32) {
        unsafe { gl::DrawArrays(mode, first, count) };
    }

    fn draw_arrays_instanced(&mut self, mode: GLenum, first: i32, count: i32, instances: i32) {
        unsafe { gl::DrawArraysInstanced(mode, first, count, instances) };
    }

    fn draw_elements(&mut self, mode: GLenum, count: i32, ty: GLenum, offset: u64) {
        unsafe { gl::DrawElements(mode, count, ty, offset as usize as *const c_void) };
    }

    fn draw_elements_instanced(
        &mut self,
        mode: GLenum,
        count: i32,
        ty: GLenum,
        offset: u64,
        instances: i32,
    ) {
        unsafe {
            gl::DrawElementsInstanced(mode, count, ty, offset as usize as *const c_void, instances)
        };
    }

    fn get_integer(&mut self, pname: GLenum) -> i32 {
        let mut value = 0;
        unsafe { gl::GetIntegerv(pname, &mut value) };
        value
    }

    fn get_integer_v(&mut self, pname: GLenum, out: &mut [i32]) {
        unsafe { gl::GetIntegerv(pname, out.as_mut_ptr()) };
    }

    fn get_float_v(&mut self, pname: GLenum, out: &mut [f32]) {
        unsafe { gl::GetFloatv(pname, out.as_mut_ptr()) };
    }

    fn get_string(&mut self, name: GLenum) -> String {
        let raw = unsafe { gl::GetString(name) };
        if raw.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(raw.cast()) }
            .to_string_lossy()
            .into_owned()
    }

    fn get_error(&mut self) -> GLenum {
        unsafe { gl::GetError() }
    }

    fn flush(&mut self) {
        unsafe { gl::Flush() };
    }
}
