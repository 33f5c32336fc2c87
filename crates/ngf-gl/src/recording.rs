//! A [`GlApi`] that records calls instead of executing them.
//!
//! Used to trace what the backend would send to a driver and to test the
//! replay engine without a GPU. Clones share one call log, so a test can keep
//! a clone after handing the original to a backend.

use std::collections::HashMap;
use std::sync::Arc;

use gl::types::{GLenum, GLint, GLuint};
use parking_lot::Mutex;

use crate::api::GlApi;

#[derive(Debug, Clone, PartialEq)]
pub struct GlCall {
    pub name: &'static str,
    pub args: String,
}

#[derive(Default)]
struct Log {
    calls: Vec<GlCall>,
    next_name: GLuint,
    pending_error: Option<GLenum>,
    link_failure: Option<String>,
    incomplete_framebuffers: bool,
    buffers: HashMap<GLuint, Vec<u8>>,
}

#[derive(Clone, Default)]
pub struct RecordingGl {
    log: Arc<Mutex<Log>>,
}

macro_rules! record {
    ($self:ident, $name:literal $(, $arg:expr)* $(,)?) => {{
        let args: Vec<String> = vec![$(format!("{:?}", $arg)),*];
        $self.push($name, args.join(", "));
    }};
}

impl RecordingGl {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, name: &'static str, args: String) {
        self.log.lock().calls.push(GlCall { name, args });
    }

    fn mint(&self) -> GLuint {
        let mut log = self.log.lock();
        log.next_name += 1;
        log.next_name
    }

    pub fn calls(&self) -> Vec<GlCall> {
        self.log.lock().calls.clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.log.lock().calls.iter().map(|c| c.name).collect()
    }

    /// Number of recorded calls to `name`.
    pub fn count(&self, name: &str) -> usize {
        self.log
            .lock()
            .calls
            .iter()
            .filter(|c| c.name == name)
            .count()
    }

    pub fn clear(&self) {
        self.log.lock().calls.clear();
    }

    /// Make the next `get_error` report `error`.
    pub fn inject_error(&self, error: GLenum) {
        self.log.lock().pending_error = Some(error);
    }

    /// Make every subsequent link fail with `log`, or succeed again on `None`.
    pub fn set_link_failure(&self, log: Option<String>) {
        self.log.lock().link_failure = log;
    }

    /// Report subsequently checked framebuffers as incomplete.
    pub fn set_incomplete_framebuffers(&self, incomplete: bool) {
        self.log.lock().incomplete_framebuffers = incomplete;
    }

    /// Current contents of a buffer, as written through `buffer_data`,
    /// `buffer_sub_data` and `copy_buffer_sub_data`.
    pub fn buffer_contents(&self, buffer: GLuint) -> Option<Vec<u8>> {
        self.log.lock().buffers.get(&buffer).cloned()
    }
}

impl GlApi for RecordingGl {
    fn gen_buffer(&mut self) -> GLuint {
        let name = self.mint();
        record!(self, "gen_buffer", name);
        name
    }

    fn delete_buffer(&mut self, buffer: GLuint) {
        self.log.lock().buffers.remove(&buffer);
        record!(self, "delete_buffer", buffer);
    }

    fn buffer_data(&mut self, buffer: GLuint, size: u64, data: Option<&[u8]>, usage: GLenum) {
        let mut contents = vec![0u8; size as usize];
        if let Some(data) = data {
            let n = data.len().min(contents.len());
            contents[..n].copy_from_slice(&data[..n]);
        }
        self.log.lock().buffers.insert(buffer, contents);
        record!(self, "buffer_data", buffer, size, data.is_some(), usage);
    }

    fn buffer_sub_data(&mut self, buffer: GLuint, offset: u64, data: &[u8]) {
        if let Some(contents) = self.log.lock().buffers.get_mut(&buffer) {
            let start = offset as usize;
            let end = (start + data.len()).min(contents.len());
            if start < end {
                contents[start..end].copy_from_slice(&data[..end - start]);
            }
        }
        record!(self, "buffer_sub_data", buffer, offset, data.len());
    }

    fn get_buffer_sub_data(&mut self, buffer: GLuint, offset: u64, out: &mut [u8]) {
        if let Some(contents) = self.log.lock().buffers.get(&buffer) {
            let start = (offset as usize).min(contents.len());
            let end = (start + out.len()).min(contents.len());
            out[..end - start].copy_from_slice(&contents[start..end]);
        }
        record!(self, "get_buffer_sub_data", buffer, offset, out.len());
    }

    fn copy_buffer_sub_data(
        &mut self,
        src: GLuint,
        dst: GLuint,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        {
            let mut log = self.log.lock();
            let chunk = log.buffers.get(&src).and_then(|c| {
                c.get(src_offset as usize..(src_offset + size) as usize)
                    .map(<[u8]>::to_vec)
            });
            if let (Some(chunk), Some(dst_contents)) = (chunk, log.buffers.get_mut(&dst)) {
                let start = dst_offset as usize;
                if let Some(target) = dst_contents.get_mut(start..start + chunk.len()) {
                    target.copy_from_slice(&chunk);
                }
            }
        }
        record!(self, "copy_buffer_sub_data", src, dst, src_offset, dst_offset, size);
    }

    fn gen_texture(&mut self) -> GLuint {
        let name = self.mint();
        record!(self, "gen_texture", name);
        name
    }

    fn delete_texture(&mut self, texture: GLuint) {
        record!(self, "delete_texture", texture);
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
        record!(self, "tex_storage", target, texture, levels, internal_format, extent, samples);
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
        record!(
            self,
            "tex_sub_image_from_buffer",
            target,
            texture,
            level,
            offset,
            extent,
            format,
            ty,
            unpack_buffer,
            buffer_offset
        );
    }

    fn gen_renderbuffer(&mut self) -> GLuint {
        let name = self.mint();
        record!(self, "gen_renderbuffer", name);
        name
    }

    fn delete_renderbuffer(&mut self, renderbuffer: GLuint) {
        record!(self, "delete_renderbuffer", renderbuffer);
    }

    fn renderbuffer_storage(
        &mut self,
        renderbuffer: GLuint,
        samples: i32,
        internal_format: GLenum,
        width: i32,
        height: i32,
    ) {
        record!(
            self,
            "renderbuffer_storage",
            renderbuffer,
            samples,
            internal_format,
            width,
            height
        );
    }

    fn gen_sampler(&mut self) -> GLuint {
        let name = self.mint();
        record!(self, "gen_sampler", name);
        name
    }

    fn delete_sampler(&mut self, sampler: GLuint) {
        record!(self, "delete_sampler", sampler);
    }

    fn sampler_parameter_i(&mut self, sampler: GLuint, pname: GLenum, value: GLint) {
        record!(self, "sampler_parameter_i", sampler, pname, value);
    }

    fn sampler_parameter_f(&mut self, sampler: GLuint, pname: GLenum, value: f32) {
        record!(self, "sampler_parameter_f", sampler, pname, value);
    }

    fn create_shader(&mut self, ty: GLenum) -> GLuint {
        let name = self.mint();
        record!(self, "create_shader", ty, name);
        name
    }

    /// Fails when the source contains an `#error` directive.
    fn compile_shader(&mut self, shader: GLuint, source: &str) -> Result<(), String> {
        record!(self, "compile_shader", shader, source.len());
        match source.lines().find(|l| l.trim_start().starts_with("#error")) {
            Some(line) => Err(format!("0:1: error: {}", line.trim())),
            None => Ok(()),
        }
    }

    fn delete_shader(&mut self, shader: GLuint) {
        record!(self, "delete_shader", shader);
    }

    fn create_program(&mut self) -> GLuint {
        let name = self.mint();
        record!(self, "create_program", name);
        name
    }

    fn attach_shader(&mut self, program: GLuint, shader: GLuint) {
        record!(self, "attach_shader", program, shader);
    }

    fn detach_shader(&mut self, program: GLuint, shader: GLuint) {
        record!(self, "detach_shader", program, shader);
    }

    fn link_program(&mut self, program: GLuint) -> Result<(), String> {
        record!(self, "link_program", program);
        match self.log.lock().link_failure.clone() {
            Some(log) => Err(log),
            None => Ok(()),
        }
    }

    fn delete_program(&mut self, program: GLuint) {
        record!(self, "delete_program", program);
    }

    fn gen_vertex_array(&mut self) -> GLuint {
        let name = self.mint();
        record!(self, "gen_vertex_array", name);
        name
    }

    fn delete_vertex_array(&mut self, vao: GLuint) {
        record!(self, "delete_vertex_array", vao);
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
        record!(
            self,
            "vertex_attrib_format",
            vao,
            location,
            size,
            ty,
            normalized,
            relative_offset,
            integer
        );
    }

    fn vertex_attrib_binding(&mut self, vao: GLuint, location: GLuint, binding: GLuint) {
        record!(self, "vertex_attrib_binding", vao, location, binding);
    }

    fn vertex_binding_divisor(&mut self, vao: GLuint, binding: GLuint, divisor: GLuint) {
        record!(self, "vertex_binding_divisor", vao, binding, divisor);
    }

    fn enable_vertex_attrib(&mut self, vao: GLuint, location: GLuint) {
        record!(self, "enable_vertex_attrib", vao, location);
    }

    fn gen_framebuffer(&mut self) -> GLuint {
        let name = self.mint();
        record!(self, "gen_framebuffer", name);
        name
    }

    fn delete_framebuffer(&mut self, framebuffer: GLuint) {
        record!(self, "delete_framebuffer", framebuffer);
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
        record!(
            self,
            "framebuffer_texture",
            framebuffer,
            attachment,
            target,
            texture,
            level,
            layer
        );
    }

    fn framebuffer_renderbuffer(
        &mut self,
        framebuffer: GLuint,
        attachment: GLenum,
        renderbuffer: GLuint,
    ) {
        record!(self, "framebuffer_renderbuffer", framebuffer, attachment, renderbuffer);
    }

    fn check_framebuffer_status(&mut self, framebuffer: GLuint) -> GLenum {
        record!(self, "check_framebuffer_status", framebuffer);
        if self.log.lock().incomplete_framebuffers {
            gl::FRAMEBUFFER_INCOMPLETE_ATTACHMENT
        } else {
            gl::FRAMEBUFFER_COMPLETE
        }
    }

    fn enable(&mut self, cap: GLenum) {
        record!(self, "enable", cap);
    }

    fn disable(&mut self, cap: GLenum) {
        record!(self, "disable", cap);
    }

    fn polygon_mode(&mut self, mode: GLenum) {
        record!(self, "polygon_mode", mode);
    }

    fn cull_face(&mut self, mode: GLenum) {
        record!(self, "cull_face", mode);
    }

    fn front_face(&mut self, mode: GLenum) {
        record!(self, "front_face", mode);
    }

    fn line_width(&mut self, width: f32) {
        record!(self, "line_width", width);
    }

    fn depth_func(&mut self, func: GLenum) {
        record!(self, "depth_func", func);
    }

    fn depth_mask(&mut self, write: bool) {
        record!(self, "depth_mask", write);
    }

    fn depth_range(&mut self, near: f32, far: f32) {
        record!(self, "depth_range", near, far);
    }

    fn stencil_func_separate(&mut self, face: GLenum, func: GLenum, reference: i32, mask: u32) {
        record!(self, "stencil_func_separate", face, func, reference, mask);
    }

    fn stencil_op_separate(&mut self, face: GLenum, sfail: GLenum, dpfail: GLenum, dppass: GLenum) {
        record!(self, "stencil_op_separate", face, sfail, dpfail, dppass);
    }

    fn stencil_mask_separate(&mut self, face: GLenum, mask: u32) {
        record!(self, "stencil_mask_separate", face, mask);
    }

    fn blend_func_separate(
        &mut self,
        src_rgb: GLenum,
        dst_rgb: GLenum,
        src_alpha: GLenum,
        dst_alpha: GLenum,
    ) {
        record!(self, "blend_func_separate", src_rgb, dst_rgb, src_alpha, dst_alpha);
    }

    fn blend_equation_separate(&mut self, rgb: GLenum, alpha: GLenum) {
        record!(self, "blend_equation_separate", rgb, alpha);
    }

    fn blend_color(&mut self, rgba: [f32; 4]) {
        record!(self, "blend_color", rgba);
    }

    fn color_mask(&mut self, r: bool, g: bool, b: bool, a: bool) {
        record!(self, "color_mask", r, g, b, a);
    }

    fn patch_vertices(&mut self, count: i32) {
        record!(self, "patch_vertices", count);
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        record!(self, "viewport", x, y, width, height);
    }

    fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) {
        record!(self, "scissor", x, y, width, height);
    }

    fn use_program(&mut self, program: GLuint) {
        record!(self, "use_program", program);
    }

    fn bind_vertex_array(&mut self, vao: GLuint) {
        record!(self, "bind_vertex_array", vao);
    }

    fn bind_vertex_buffer(&mut self, binding: GLuint, buffer: GLuint, offset: u64, stride: i32) {
        record!(self, "bind_vertex_buffer", binding, buffer, offset, stride);
    }

    fn bind_buffer(&mut self, target: GLenum, buffer: GLuint) {
        record!(self, "bind_buffer", target, buffer);
    }

    fn bind_buffer_range(
        &mut self,
        target: GLenum,
        index: GLuint,
        buffer: GLuint,
        offset: u64,
        size: u64,
    ) {
        record!(self, "bind_buffer_range", target, index, buffer, offset, size);
    }

    fn bind_texture_unit(&mut self, unit: GLuint, target: GLenum, texture: GLuint) {
        record!(self, "bind_texture_unit", unit, target, texture);
    }

    fn bind_sampler(&mut self, unit: GLuint, sampler: GLuint) {
        record!(self, "bind_sampler", unit, sampler);
    }

    fn bind_image_texture(
        &mut self,
        unit: GLuint,
        texture: GLuint,
        access: GLenum,
        format: GLenum,
    ) {
        record!(self, "bind_image_texture", unit, texture, access, format);
    }

    fn bind_framebuffer(&mut self, target: GLenum, framebuffer: GLuint) {
        record!(self, "bind_framebuffer", target, framebuffer);
    }

    fn draw_buffers(&mut self, buffers: &[GLenum]) {
        record!(self, "draw_buffers", buffers);
    }

    fn clear_buffer_fv(&mut self, buffer: GLenum, draw_buffer: i32, value: [f32; 4]) {
        record!(self, "clear_buffer_fv", buffer, draw_buffer, value);
    }

    fn clear_buffer_fi(&mut self, depth: f32, stencil: i32) {
        record!(self, "clear_buffer_fi", depth, stencil);
    }

    fn invalidate_framebuffer(&mut self, target: GLenum, attachments: &[GLenum]) {
        record!(self, "invalidate_framebuffer", target, attachments);
    }

    fn draw_arrays(&mut self, mode: GLenum, first: i32, count: i32) {
        record!(self, "draw_arrays", mode, first, count);
    }

    fn draw_arrays_instanced(&mut self, mode: GLenum, first: i32, count: i32, instances: i32) {
        record!(self, "draw_arrays_instanced", mode, first, count, instances);
    }

    fn draw_elements(&mut self, mode: GLenum, count: i32, ty: GLenum, offset: u64) {
        record!(self, "draw_elements", mode, count, ty, offset);
    }

    fn draw_elements_instanced(
        &mut self,
        mode: GLenum,
        count: i32,
        ty: GLenum,
        offset: u64,
        instances: i32,
    ) {
        record!(self, "draw_elements_instanced", mode, count, ty, offset, instances);
    }

    fn get_integer(&mut self, pname: GLenum) -> i32 {
        record!(self, "get_integer", pname);
        match pname {
            gl::MAX_UNIFORM_BUFFER_BINDINGS => 36,
            gl::MAX_SHADER_STORAGE_BUFFER_BINDINGS => 16,
            gl::MAX_COMBINED_TEXTURE_IMAGE_UNITS => 32,
            gl::MAX_VERTEX_ATTRIBS => 16,
            gl::UNIFORM_BUFFER_OFFSET_ALIGNMENT => 256,
            gl::MAX_FRAMEBUFFER_WIDTH | gl::MAX_FRAMEBUFFER_HEIGHT => 16384,
            gl::MAX_PATCH_VERTICES => 32,
            _ => 0,
        }
    }

    fn get_integer_v(&mut self, pname: GLenum, out: &mut [i32]) {
        record!(self, "get_integer_v", pname);
        let value = match pname {
            gl::MAX_VIEWPORT_DIMS => 16384,
            _ => 0,
        };
        out.iter_mut().for_each(|v| *v = value);
    }

    fn get_float_v(&mut self, pname: GLenum, out: &mut [f32]) {
        record!(self, "get_float_v", pname);
        if pname == gl::ALIASED_LINE_WIDTH_RANGE && out.len() >= 2 {
            out[0] = 1.0;
            out[1] = 8.0;
        }
    }

    fn get_string(&mut self, name: GLenum) -> String {
        record!(self, "get_string", name);
        match name {
            gl::RENDERER => "ngf recording renderer".to_string(),
            gl::VENDOR => "ngf".to_string(),
            gl::VERSION => "4.5 (recording)".to_string(),
            _ => String::new(),
        }
    }

    fn get_error(&mut self) -> GLenum {
        self.log.lock().pending_error.take().unwrap_or(gl::NO_ERROR)
    }

    fn flush(&mut self) {
        record!(self, "flush");
    }
}
