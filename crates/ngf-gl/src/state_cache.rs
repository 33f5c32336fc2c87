//! Cached fixed-function state and pipeline-state diffing.
//!
//! GL executes state changes immediately and they are not free, so binding a
//! pipeline only touches the state groups that differ from what the context
//! last set. The cache starts with `force_update` set, which makes the first
//! bind after context creation issue every group once.

use gl::types::{GLenum, GLuint};
use ngf_core::types::{
    ColorMask, CullMode, PipelineState, SampleCount, StencilFace, StencilInfo,
};

use crate::api::GlApi;
use crate::convert;

/// Outcome of one diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    /// State groups that needed native calls.
    pub issued: u32,
    /// State groups skipped because the cache already matched.
    pub elided: u32,
}

struct Differ {
    force: bool,
    stats: DiffStats,
}

impl Differ {
    fn changed<T: PartialEq>(&mut self, old: &T, new: &T) -> bool {
        if self.force || old != new {
            self.stats.issued += 1;
            true
        } else {
            self.stats.elided += 1;
            false
        }
    }
}

fn toggle(gl: &mut dyn GlApi, cap: GLenum, on: bool) {
    if on {
        gl.enable(cap);
    } else {
        gl.disable(cap);
    }
}

fn stencil_func(gl: &mut dyn GlApi, face: GLenum, s: &StencilInfo) {
    gl.stencil_func_separate(
        face,
        convert::compare_op(s.compare_op),
        s.reference as i32,
        s.compare_mask,
    );
}

pub struct StateCache {
    state: PipelineState,
    force_update: bool,
    program: Option<GLuint>,
    vao: Option<GLuint>,
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StateCache {
    pub fn new() -> Self {
        Self {
            state: PipelineState::default(),
            force_update: true,
            program: None,
            vao: None,
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn needs_full_update(&self) -> bool {
        self.force_update
    }

    /// Forget which program and vertex array are bound, e.g. after object
    /// creation disturbed the bindings.
    pub fn forget_bindings(&mut self) {
        self.program = None;
        self.vao = None;
    }

    /// Returns whether a native call was made.
    pub fn use_program(&mut self, gl: &mut dyn GlApi, program: GLuint) -> bool {
        if self.program == Some(program) {
            return false;
        }
        gl.use_program(program);
        self.program = Some(program);
        true
    }

    pub fn bind_vertex_array(&mut self, gl: &mut dyn GlApi, vao: GLuint) -> bool {
        if self.vao == Some(vao) {
            return false;
        }
        gl.bind_vertex_array(vao);
        self.vao = Some(vao);
        true
    }

    /// Bring native state in line with `new`, touching only what differs.
    pub fn apply(&mut self, gl: &mut dyn GlApi, new: &PipelineState) -> DiffStats {
        let old = self.state;
        let mut d = Differ {
            force: self.force_update,
            stats: DiffStats::default(),
        };

        let (or, nr) = (&old.rasterization, &new.rasterization);
        if d.changed(&or.discard, &nr.discard) {
            toggle(gl, gl::RASTERIZER_DISCARD, nr.discard);
        }
        if d.changed(&or.polygon_mode, &nr.polygon_mode) {
            gl.polygon_mode(convert::polygon_mode(nr.polygon_mode));
        }
        if d.changed(&or.cull_mode, &nr.cull_mode) {
            match nr.cull_mode {
                CullMode::None => gl.disable(gl::CULL_FACE),
                mode => {
                    gl.enable(gl::CULL_FACE);
                    gl.cull_face(match mode {
                        CullMode::Front => gl::FRONT,
                        CullMode::FrontAndBack => gl::FRONT_AND_BACK,
                        _ => gl::BACK,
                    });
                }
            }
        }
        if d.changed(&or.front_face, &nr.front_face) {
            gl.front_face(convert::front_face(nr.front_face));
        }
        if d.changed(&or.line_width, &nr.line_width) {
            gl.line_width(nr.line_width);
        }

        let (od, nd) = (&old.depth_stencil, &new.depth_stencil);
        if d.changed(&od.depth_test, &nd.depth_test) {
            toggle(gl, gl::DEPTH_TEST, nd.depth_test);
        }
        if d.changed(&od.depth_write, &nd.depth_write) {
            gl.depth_mask(nd.depth_write);
        }
        if d.changed(&od.depth_compare, &nd.depth_compare) {
            gl.depth_func(convert::compare_op(nd.depth_compare));
        }
        if d.changed(&(od.min_depth, od.max_depth), &(nd.min_depth, nd.max_depth)) {
            gl.depth_range(nd.min_depth, nd.max_depth);
        }
        if d.changed(&od.stencil_test, &nd.stencil_test) {
            toggle(gl, gl::STENCIL_TEST, nd.stencil_test);
        }
        for (face, os, ns) in [
            (gl::FRONT, &od.front_stencil, &nd.front_stencil),
            (gl::BACK, &od.back_stencil, &nd.back_stencil),
        ] {
            if d.changed(
                &(os.compare_op, os.reference, os.compare_mask),
                &(ns.compare_op, ns.reference, ns.compare_mask),
            ) {
                stencil_func(gl, face, ns);
            }
            if d.changed(
                &(os.fail_op, os.depth_fail_op, os.pass_op),
                &(ns.fail_op, ns.depth_fail_op, ns.pass_op),
            ) {
                gl.stencil_op_separate(
                    face,
                    convert::stencil_op(ns.fail_op),
                    convert::stencil_op(ns.depth_fail_op),
                    convert::stencil_op(ns.pass_op),
                );
            }
            if d.changed(&os.write_mask, &ns.write_mask) {
                gl.stencil_mask_separate(face, ns.write_mask);
            }
        }

        let (ob, nb) = (&old.blend, &new.blend);
        if d.changed(&ob.enable, &nb.enable) {
            toggle(gl, gl::BLEND, nb.enable);
        }
        if d.changed(
            &(ob.src_color_factor, ob.dst_color_factor, ob.src_alpha_factor, ob.dst_alpha_factor),
            &(nb.src_color_factor, nb.dst_color_factor, nb.src_alpha_factor, nb.dst_alpha_factor),
        ) {
            gl.blend_func_separate(
                convert::blend_factor(nb.src_color_factor),
                convert::blend_factor(nb.dst_color_factor),
                convert::blend_factor(nb.src_alpha_factor),
                convert::blend_factor(nb.dst_alpha_factor),
            );
        }
        if d.changed(&(ob.color_op, ob.alpha_op), &(nb.color_op, nb.alpha_op)) {
            gl.blend_equation_separate(
                convert::blend_op(nb.color_op),
                convert::blend_op(nb.alpha_op),
            );
        }
        if d.changed(&ob.color_write_mask, &nb.color_write_mask) {
            set_color_mask(gl, nb.color_write_mask);
        }
        if d.changed(&ob.constants, &nb.constants) {
            gl.blend_color(nb.constants);
        }

        let (om, nm) = (&old.multisample, &new.multisample);
        if d.changed(&om.sample_count, &nm.sample_count) {
            toggle(gl, gl::MULTISAMPLE, nm.sample_count != SampleCount::S1);
        }
        if d.changed(&om.alpha_to_coverage, &nm.alpha_to_coverage) {
            toggle(gl, gl::SAMPLE_ALPHA_TO_COVERAGE, nm.alpha_to_coverage);
        }

        if d.changed(&old.tessellation.patch_vertices, &new.tessellation.patch_vertices) {
            gl.patch_vertices(new.tessellation.patch_vertices as i32);
        }

        self.state = *new;
        self.force_update = false;
        d.stats
    }

    // ── Dynamic state ───────────────────────────────────────
    //
    // Dynamic commands write through to the cache so the next pipeline bind
    // restores the pipeline's own values.

    pub fn set_line_width(&mut self, gl: &mut dyn GlApi, width: f32) {
        gl.line_width(width);
        self.state.rasterization.line_width = width;
    }

    pub fn set_blend_constants(&mut self, gl: &mut dyn GlApi, rgba: [f32; 4]) {
        gl.blend_color(rgba);
        self.state.blend.constants = rgba;
    }

    pub fn set_stencil_reference(&mut self, gl: &mut dyn GlApi, face: StencilFace, reference: u32) {
        self.update_stencil(face, |s| s.reference = reference);
        self.reissue_stencil_func(gl, face);
    }

    pub fn set_stencil_compare_mask(&mut self, gl: &mut dyn GlApi, face: StencilFace, mask: u32) {
        self.update_stencil(face, |s| s.compare_mask = mask);
        self.reissue_stencil_func(gl, face);
    }

    pub fn set_stencil_write_mask(&mut self, gl: &mut dyn GlApi, face: StencilFace, mask: u32) {
        self.update_stencil(face, |s| s.write_mask = mask);
        if face.includes_front() {
            gl.stencil_mask_separate(gl::FRONT, mask);
        }
        if face.includes_back() {
            gl.stencil_mask_separate(gl::BACK, mask);
        }
    }

    fn update_stencil(&mut self, face: StencilFace, f: impl Fn(&mut StencilInfo)) {
        if face.includes_front() {
            f(&mut self.state.depth_stencil.front_stencil);
        }
        if face.includes_back() {
            f(&mut self.state.depth_stencil.back_stencil);
        }
    }

    fn reissue_stencil_func(&self, gl: &mut dyn GlApi, face: StencilFace) {
        let ds = &self.state.depth_stencil;
        if face.includes_front() {
            stencil_func(gl, gl::FRONT, &ds.front_stencil);
        }
        if face.includes_back() {
            stencil_func(gl, gl::BACK, &ds.back_stencil);
        }
    }

    // ── Clear helpers ───────────────────────────────────────

    /// Open every write mask a clear depends on. Returns what to restore.
    pub fn unmask_for_clear(&self, gl: &mut dyn GlApi) -> ClearMasks {
        let masks = ClearMasks {
            color: self.state.blend.color_write_mask,
            depth_write: self.state.depth_stencil.depth_write,
            front_stencil: self.state.depth_stencil.front_stencil.write_mask,
            back_stencil: self.state.depth_stencil.back_stencil.write_mask,
        };
        if masks.color != ColorMask::all() {
            set_color_mask(gl, ColorMask::all());
        }
        if !masks.depth_write {
            gl.depth_mask(true);
        }
        if masks.front_stencil != !0 || masks.back_stencil != !0 {
            gl.stencil_mask_separate(gl::FRONT_AND_BACK, !0);
        }
        masks
    }

    pub fn restore_after_clear(&self, gl: &mut dyn GlApi, masks: ClearMasks) {
        if masks.color != ColorMask::all() {
            set_color_mask(gl, masks.color);
        }
        if !masks.depth_write {
            gl.depth_mask(false);
        }
        if masks.front_stencil != !0 || masks.back_stencil != !0 {
            gl.stencil_mask_separate(gl::FRONT, masks.front_stencil);
            gl.stencil_mask_separate(gl::BACK, masks.back_stencil);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClearMasks {
    color: ColorMask,
    depth_write: bool,
    front_stencil: u32,
    back_stencil: u32,
}

fn set_color_mask(gl: &mut dyn GlApi, mask: ColorMask) {
    gl.color_mask(
        mask.contains(ColorMask::R),
        mask.contains(ColorMask::G),
        mask.contains(ColorMask::B),
        mask.contains(ColorMask::A),
    );
}
