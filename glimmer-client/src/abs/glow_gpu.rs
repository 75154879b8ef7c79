//! The OpenGL backend of the renderer.
//!
//! [`GlowGpu`] implements [`Gpu`] on top of a `glow` context. One vertex array object is bound
//! for the lifetime of the context, since the core profile refuses to draw without one.
//!
//! A context that reports `CONTEXT_LOST` stays lost: the host creates a new one and hands it
//! over with [`GlowGpu::replace_context`].

use std::cell::{Cell, Ref, RefCell};
use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};
use glimmer_core::gpu::{BufferTarget, Gpu, ShaderStage, Topology};
use glow::HasContext;

pub struct GlowGpu {
    gl: RefCell<Arc<glow::Context>>,
    vao: Cell<Option<glow::VertexArray>>,
    lost: Cell<bool>,
}

impl GlowGpu {
    pub fn new(gl: &Arc<glow::Context>) -> Self {
        check_reset_strategy(gl);
        Self {
            gl: RefCell::new(Arc::clone(gl)),
            vao: Cell::new(None),
            lost: Cell::new(false),
        }
    }

    fn gl(&self) -> Ref<'_, Arc<glow::Context>> {
        self.gl.borrow()
    }

    /// Switches to a freshly created context after a loss. Objects of the old context are
    /// abandoned with it; the next [`Gpu::init_state`] sets the new one up.
    pub fn replace_context(&self, gl: &Arc<glow::Context>) {
        check_reset_strategy(gl);
        *self.gl.borrow_mut() = Arc::clone(gl);
        self.vao.set(None);
        self.lost.set(false);
        log::info!("Switched to a new graphics context");
    }

    fn stage(stage: ShaderStage) -> u32 {
        match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        }
    }

    fn topology(topology: Topology) -> u32 {
        match topology {
            Topology::Triangles => glow::TRIANGLES,
            Topology::TriangleStrip => glow::TRIANGLE_STRIP,
        }
    }

    fn target(target: BufferTarget) -> u32 {
        match target {
            BufferTarget::Vertex => glow::ARRAY_BUFFER,
            BufferTarget::Index => glow::ELEMENT_ARRAY_BUFFER,
        }
    }
}

/// Warns when the driver will not report resets, since a reset then goes unnoticed.
fn check_reset_strategy(gl: &glow::Context) {
    let strategy = unsafe { gl.get_parameter_i32(glow::RESET_NOTIFICATION_STRATEGY) } as u32;
    if strategy != glow::LOSE_CONTEXT_ON_RESET {
        log::warn!("Graphics context does not report resets (strategy {strategy:#x})");
    }
}

impl Drop for GlowGpu {
    fn drop(&mut self) {
        if let Some(vao) = self.vao.take() {
            unsafe {
                self.gl().delete_vertex_array(vao);
            }
        }
    }
}

impl Gpu for GlowGpu {
    type Shader = glow::Shader;
    type Program = glow::Program;
    type Buffer = glow::Buffer;
    type Texture = glow::Texture;
    type Renderbuffer = glow::Renderbuffer;
    type Framebuffer = glow::Framebuffer;
    type UniformLocation = glow::UniformLocation;

    fn init_state(&self) {
        unsafe {
            let gl = self.gl();
            if let Some(vao) = self.vao.take() {
                gl.delete_vertex_array(vao);
            }
            match gl.create_vertex_array() {
                Ok(vao) => {
                    gl.bind_vertex_array(Some(vao));
                    self.vao.set(Some(vao));
                }
                Err(err) => log::error!("Failed to create vertex array: {err}"),
            }
            gl.enable(glow::DEPTH_TEST);
            gl.depth_func(glow::LEQUAL);
            gl.enable(glow::BLEND);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            gl.clear_color(0.0, 0.0, 0.0, 1.0);
            gl.clear_depth_f32(1.0);
        }
    }

    fn is_context_lost(&self) -> bool {
        if !self.lost.get() && unsafe { self.gl().get_error() } == glow::CONTEXT_LOST {
            log::warn!("Graphics context reset by the driver");
            self.lost.set(true);
        }
        self.lost.get()
    }

    fn create_shader(&self, stage: ShaderStage, source: &str) -> Result<glow::Shader, String> {
        unsafe {
            let shader = self.gl().create_shader(Self::stage(stage))?;
            self.gl().shader_source(shader, source);
            self.gl().compile_shader(shader);

            if !self.gl().get_shader_compile_status(shader) {
                let log = self.gl().get_shader_info_log(shader);
                self.gl().delete_shader(shader);
                return Err(log);
            }
            Ok(shader)
        }
    }

    fn delete_shader(&self, shader: glow::Shader) {
        unsafe {
            self.gl().delete_shader(shader);
        }
    }

    fn link_program(
        &self,
        vertex: glow::Shader,
        fragment: glow::Shader,
    ) -> Result<glow::Program, String> {
        unsafe {
            let program = self.gl().create_program()?;
            self.gl().attach_shader(program, vertex);
            self.gl().attach_shader(program, fragment);
            self.gl().link_program(program);

            if !self.gl().get_program_link_status(program) {
                let log = self.gl().get_program_info_log(program);
                self.gl().delete_program(program);
                return Err(log);
            }

            self.gl().detach_shader(program, vertex);
            self.gl().detach_shader(program, fragment);
            Ok(program)
        }
    }

    fn delete_program(&self, program: glow::Program) {
        unsafe {
            self.gl().delete_program(program);
        }
    }

    fn use_program(&self, program: Option<glow::Program>) {
        unsafe {
            self.gl().use_program(program);
        }
    }

    fn uniform_location(&self, program: glow::Program, name: &str) -> Option<glow::UniformLocation> {
        unsafe { self.gl().get_uniform_location(program, name) }
    }

    fn attribute_location(&self, program: glow::Program, name: &str) -> Option<u32> {
        unsafe { self.gl().get_attrib_location(program, name) }
    }

    fn uniform_f32(&self, location: &glow::UniformLocation, value: f32) {
        unsafe {
            self.gl().uniform_1_f32(Some(location), value);
        }
    }

    fn uniform_i32(&self, location: &glow::UniformLocation, value: i32) {
        unsafe {
            self.gl().uniform_1_i32(Some(location), value);
        }
    }

    fn uniform_vec2(&self, location: &glow::UniformLocation, value: Vec2) {
        unsafe {
            self.gl().uniform_2_f32(Some(location), value.x, value.y);
        }
    }

    fn uniform_vec3(&self, location: &glow::UniformLocation, value: Vec3) {
        unsafe {
            self.gl().uniform_3_f32(Some(location), value.x, value.y, value.z);
        }
    }

    fn uniform_mat4(&self, location: &glow::UniformLocation, value: &Mat4) {
        unsafe {
            self.gl()
                .uniform_matrix_4_f32_slice(Some(location), false, value.as_ref());
        }
    }

    fn create_buffer(&self, target: BufferTarget, data: &[u8]) -> Result<glow::Buffer, String> {
        let target = Self::target(target);
        unsafe {
            let buffer = self.gl().create_buffer()?;
            self.gl().bind_buffer(target, Some(buffer));
            self.gl().buffer_data_u8_slice(target, data, glow::STATIC_DRAW);
            if target == glow::ARRAY_BUFFER {
                self.gl().bind_buffer(target, None);
            }
            Ok(buffer)
        }
    }

    fn delete_buffer(&self, buffer: glow::Buffer) {
        unsafe {
            self.gl().delete_buffer(buffer);
        }
    }

    fn bind_attribute(&self, index: u32, buffer: glow::Buffer, components: i32) {
        unsafe {
            self.gl().bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            self.gl().enable_vertex_attrib_array(index);
            self.gl()
                .vertex_attrib_pointer_f32(index, components, glow::FLOAT, false, 0, 0);
        }
    }

    fn unbind_attribute(&self, index: u32) {
        unsafe {
            self.gl().disable_vertex_attrib_array(index);
        }
    }

    fn bind_index_buffer(&self, buffer: Option<glow::Buffer>) {
        unsafe {
            self.gl().bind_buffer(glow::ELEMENT_ARRAY_BUFFER, buffer);
        }
    }

    fn create_texture(
        &self,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) -> Result<glow::Texture, String> {
        unsafe {
            let gl = self.gl();
            let texture = gl.create_texture()?;
            gl.bind_texture(glow::TEXTURE_2D, Some(texture));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA8 as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(pixels),
            );
            let (wrap, min_filter) = if pixels.is_some() {
                gl.generate_mipmap(glow::TEXTURE_2D);
                (glow::REPEAT, glow::LINEAR_MIPMAP_LINEAR)
            } else {
                // Render targets are sampled one texel per pixel.
                (glow::CLAMP_TO_EDGE, glow::LINEAR)
            };
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, wrap as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, wrap as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, min_filter as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::LINEAR as i32);
            gl.bind_texture(glow::TEXTURE_2D, None);
            Ok(texture)
        }
    }

    fn delete_texture(&self, texture: glow::Texture) {
        unsafe {
            self.gl().delete_texture(texture);
        }
    }

    fn bind_texture(&self, unit: u32, texture: Option<glow::Texture>) {
        unsafe {
            self.gl().active_texture(glow::TEXTURE0 + unit);
            self.gl().bind_texture(glow::TEXTURE_2D, texture);
        }
    }

    fn create_renderbuffer(&self, width: u32, height: u32) -> Result<glow::Renderbuffer, String> {
        unsafe {
            let renderbuffer = self.gl().create_renderbuffer()?;
            self.gl().bind_renderbuffer(glow::RENDERBUFFER, Some(renderbuffer));
            self.gl().renderbuffer_storage(
                glow::RENDERBUFFER,
                glow::DEPTH_COMPONENT24,
                width as i32,
                height as i32,
            );
            self.gl().bind_renderbuffer(glow::RENDERBUFFER, None);
            Ok(renderbuffer)
        }
    }

    fn delete_renderbuffer(&self, renderbuffer: glow::Renderbuffer) {
        unsafe {
            self.gl().delete_renderbuffer(renderbuffer);
        }
    }

    fn create_framebuffer(
        &self,
        color: glow::Texture,
        depth: glow::Renderbuffer,
    ) -> Result<glow::Framebuffer, String> {
        unsafe {
            let gl = self.gl();
            let fbo = gl.create_framebuffer()?;
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                glow::COLOR_ATTACHMENT0,
                glow::TEXTURE_2D,
                Some(color),
                0,
            );
            gl.framebuffer_renderbuffer(
                glow::FRAMEBUFFER,
                glow::DEPTH_ATTACHMENT,
                glow::RENDERBUFFER,
                Some(depth),
            );
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                gl.delete_framebuffer(fbo);
                return Err(format!("framebuffer incomplete (status 0x{status:x})"));
            }
            Ok(fbo)
        }
    }

    fn delete_framebuffer(&self, framebuffer: glow::Framebuffer) {
        unsafe {
            self.gl().delete_framebuffer(framebuffer);
        }
    }

    fn bind_framebuffer(&self, framebuffer: Option<glow::Framebuffer>) {
        unsafe {
            self.gl().bind_framebuffer(glow::FRAMEBUFFER, framebuffer);
        }
    }

    fn viewport(&self, width: u32, height: u32) {
        unsafe {
            self.gl().viewport(0, 0, width as i32, height as i32);
        }
    }

    fn clear(&self) {
        unsafe {
            self.gl().clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }
    }

    fn draw_arrays(&self, topology: Topology, first: i32, count: i32) {
        unsafe {
            self.gl().draw_arrays(Self::topology(topology), first, count);
        }
    }

    fn draw_elements(&self, topology: Topology, count: i32) {
        unsafe {
            self.gl()
                .draw_elements(Self::topology(topology), count, glow::UNSIGNED_INT, 0);
        }
    }
}
