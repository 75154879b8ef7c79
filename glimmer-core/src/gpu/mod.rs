//! The graphics API seam.
//!
//! The engine never calls OpenGL directly. Everything it needs from the graphics context is
//! expressed by the [`Gpu`] trait, which the client implements on top of `glow` and the tests
//! implement with a call recorder. Handles are associated types so each backend keeps its
//! native object names.

use std::fmt;

use glam::{Mat4, Vec2, Vec3};

#[cfg(test)]
pub(crate) mod recording;

/// A programmable pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderStage::Vertex => f.write_str("vertex"),
            ShaderStage::Fragment => f.write_str("fragment"),
        }
    }
}

/// Primitive assembly mode for a draw call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Topology {
    Triangles,
    TriangleStrip,
}

/// What a buffer holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferTarget {
    /// Per-vertex attribute data (`f32` components).
    Vertex,
    /// `u32` element indices.
    Index,
}

/// The subset of a graphics context the engine uses.
///
/// All objects are owned by the thread that owns the context. Creation functions return the
/// driver's message on failure.
pub trait Gpu {
    type Shader: Copy + fmt::Debug;
    type Program: Copy + fmt::Debug + PartialEq;
    type Buffer: Copy + fmt::Debug;
    type Texture: Copy + fmt::Debug + PartialEq;
    type Renderbuffer: Copy + fmt::Debug;
    type Framebuffer: Copy + fmt::Debug + PartialEq;
    type UniformLocation: Clone + fmt::Debug;

    /// Sets the fixed-function state every scene relies on (depth test, clear values).
    fn init_state(&self);

    /// Returns `true` once the context has been lost. Every object created before is invalid.
    fn is_context_lost(&self) -> bool;

    /// Compiles one stage. The error is the compiler log.
    fn create_shader(&self, stage: ShaderStage, source: &str) -> Result<Self::Shader, String>;
    fn delete_shader(&self, shader: Self::Shader);

    /// Links two compiled stages. The error is the linker log.
    fn link_program(
        &self,
        vertex: Self::Shader,
        fragment: Self::Shader,
    ) -> Result<Self::Program, String>;
    fn delete_program(&self, program: Self::Program);
    fn use_program(&self, program: Option<Self::Program>);

    fn uniform_location(&self, program: Self::Program, name: &str)
    -> Option<Self::UniformLocation>;
    fn attribute_location(&self, program: Self::Program, name: &str) -> Option<u32>;

    fn uniform_f32(&self, location: &Self::UniformLocation, value: f32);
    fn uniform_i32(&self, location: &Self::UniformLocation, value: i32);
    fn uniform_vec2(&self, location: &Self::UniformLocation, value: Vec2);
    fn uniform_vec3(&self, location: &Self::UniformLocation, value: Vec3);
    fn uniform_mat4(&self, location: &Self::UniformLocation, value: &Mat4);

    fn create_buffer(&self, target: BufferTarget, data: &[u8]) -> Result<Self::Buffer, String>;
    fn delete_buffer(&self, buffer: Self::Buffer);

    /// Feeds attribute `index` from `buffer`, `components` floats per vertex, tightly packed.
    fn bind_attribute(&self, index: u32, buffer: Self::Buffer, components: i32);
    fn unbind_attribute(&self, index: u32);
    fn bind_index_buffer(&self, buffer: Option<Self::Buffer>);

    /// Creates an RGBA8 texture. `None` pixels allocate uninitialized storage for render targets.
    fn create_texture(
        &self,
        width: u32,
        height: u32,
        pixels: Option<&[u8]>,
    ) -> Result<Self::Texture, String>;
    fn delete_texture(&self, texture: Self::Texture);
    fn bind_texture(&self, unit: u32, texture: Option<Self::Texture>);

    /// Creates a depth renderbuffer.
    fn create_renderbuffer(&self, width: u32, height: u32) -> Result<Self::Renderbuffer, String>;
    fn delete_renderbuffer(&self, renderbuffer: Self::Renderbuffer);

    /// Creates a complete framebuffer with `color` as its only color attachment.
    fn create_framebuffer(
        &self,
        color: Self::Texture,
        depth: Self::Renderbuffer,
    ) -> Result<Self::Framebuffer, String>;
    fn delete_framebuffer(&self, framebuffer: Self::Framebuffer);
    /// Binds `framebuffer`, or the default (screen) framebuffer for `None`.
    fn bind_framebuffer(&self, framebuffer: Option<Self::Framebuffer>);

    fn viewport(&self, width: u32, height: u32);
    /// Clears color and depth of the bound framebuffer.
    fn clear(&self);

    fn draw_arrays(&self, topology: Topology, first: i32, count: i32);
    /// Draws `count` `u32` indices from the bound index buffer.
    fn draw_elements(&self, topology: Topology, count: i32);
}
