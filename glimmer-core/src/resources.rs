//! GPU-side objects.
//!
//! Each type here owns one or more objects created through a [`Gpu`] and deletes them when
//! dropped. They keep an `Rc` to the backend, so they stay on the thread that owns the context.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use fxhash::FxHashMap;
use glam::UVec2;
use image::RgbaImage;

use crate::error::{RenderError, Result};
use crate::gpu::{BufferTarget, Gpu, ShaderStage, Topology};
use crate::obj::MeshData;
use crate::uniform::Uniform;

/// Vertex positions, 3 floats.
pub const POSITION_ATTRIBUTE: &str = "aVertexPosition";
/// Vertex normals, 3 floats.
pub const NORMAL_ATTRIBUTE: &str = "aVertexNormal";
/// Texture coordinates, 2 floats.
pub const TEXCOORD_ATTRIBUTE: &str = "aTextureCoord";
/// Barycentric coordinates for wireframe shading, 3 floats.
pub const BARYCENTRIC_ATTRIBUTE: &str = "aBarycentric";
/// Material slot, 1 float.
pub const MATERIAL_SLOT_ATTRIBUTE: &str = "aMaterialSlot";
/// Corner of the full-screen quad, 2 floats.
pub const QUAD_ATTRIBUTE: &str = "aBaseVertexPosition";

/// Every attribute a mesh program may read.
pub const MESH_ATTRIBUTES: [&str; 5] = [
    POSITION_ATTRIBUTE,
    NORMAL_ATTRIBUTE,
    TEXCOORD_ATTRIBUTE,
    BARYCENTRIC_ATTRIBUTE,
    MATERIAL_SLOT_ATTRIBUTE,
];

static NEXT_PROGRAM_KEY: AtomicU64 = AtomicU64::new(1);

/// Identifies one successful link. Never reused, even after the program is deleted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramKey(u64);

/// A compiled shader stage.
pub struct Shader<G: Gpu> {
    gpu: Rc<G>,
    id: G::Shader,
}

impl<G: Gpu> Shader<G> {
    /// Compiles `source` for `stage`.
    pub fn new(gpu: &Rc<G>, stage: ShaderStage, source: &str) -> Result<Self> {
        match gpu.create_shader(stage, source) {
            Ok(id) => Ok(Self {
                gpu: Rc::clone(gpu),
                id,
            }),
            Err(log) => {
                log::error!("Failed to compile {stage} shader:\n{log}\n--- source ---\n{source}");
                Err(RenderError::ShaderCompile {
                    stage,
                    shader_source: source.to_string(),
                    log,
                })
            }
        }
    }
}

impl<G: Gpu> Drop for Shader<G> {
    fn drop(&mut self) {
        self.gpu.delete_shader(self.id);
    }
}

/// A linked vertex + fragment program.
pub struct CompiledProgram<G: Gpu> {
    gpu: Rc<G>,
    id: G::Program,
    key: ProgramKey,
    uniforms: FxHashMap<String, G::UniformLocation>,
    attributes: FxHashMap<String, u32>,
}

impl<G: Gpu> CompiledProgram<G> {
    /// Compiles and links a program, then looks up the given uniform and attribute names.
    ///
    /// Names the program does not use are simply absent from the lookup tables.
    pub fn compile(
        gpu: &Rc<G>,
        vertex_source: &str,
        fragment_source: &str,
        uniforms: &[&str],
        attributes: &[&str],
    ) -> Result<Self> {
        let vertex = Shader::new(gpu, ShaderStage::Vertex, vertex_source)?;
        let fragment = Shader::new(gpu, ShaderStage::Fragment, fragment_source)?;

        let id = gpu.link_program(vertex.id, fragment.id).map_err(|log| {
            log::error!(
                "Failed to link program:\n{log}\n--- vertex ---\n{vertex_source}\n--- fragment ---\n{fragment_source}"
            );
            RenderError::ShaderLink { log }
        })?;

        let uniforms = uniforms
            .iter()
            .filter_map(|&name| {
                gpu.uniform_location(id, name)
                    .map(|location| (name.to_string(), location))
            })
            .collect();
        let attributes = attributes
            .iter()
            .filter_map(|&name| {
                gpu.attribute_location(id, name)
                    .map(|index| (name.to_string(), index))
            })
            .collect();

        let key = ProgramKey(NEXT_PROGRAM_KEY.fetch_add(1, Ordering::Relaxed));
        log::debug!("Linked program {key:?}");
        Ok(Self {
            gpu: Rc::clone(gpu),
            id,
            key,
            uniforms,
            attributes,
        })
    }

    pub fn key(&self) -> ProgramKey {
        self.key
    }

    /// Binds the program for drawing.
    pub fn use_program(&self) {
        self.gpu.use_program(Some(self.id));
    }

    /// Location of `name`, from the lookup table or by asking the program.
    pub fn lookup(&self, name: &str) -> Option<G::UniformLocation> {
        match self.uniforms.get(name) {
            Some(location) => Some(location.clone()),
            None => self.gpu.uniform_location(self.id, name),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    /// Sets a uniform looked up at compile time. Unused names are ignored.
    pub fn set_uniform<T: Uniform>(&self, name: &str, value: T) {
        if let Some(location) = self.uniforms.get(name) {
            value.set_uniform(self.gpu.as_ref(), location);
        }
    }
}

impl<G: Gpu> Drop for CompiledProgram<G> {
    fn drop(&mut self) {
        self.gpu.delete_program(self.id);
    }
}

/// A vertex buffer and the attribute it feeds.
struct AttributeBuffer<G: Gpu> {
    name: &'static str,
    buffer: G::Buffer,
    components: i32,
}

fn upload<G: Gpu>(gpu: &G, target: BufferTarget, data: &[u8]) -> Result<G::Buffer> {
    gpu.create_buffer(target, data).map_err(RenderError::Resource)
}

fn bind_attributes<G: Gpu>(gpu: &G, program: &CompiledProgram<G>, buffers: &[AttributeBuffer<G>]) {
    for attribute in buffers {
        if let Some(index) = program.attribute(attribute.name) {
            gpu.bind_attribute(index, attribute.buffer, attribute.components);
        }
    }
}

fn unbind_attributes<G: Gpu>(gpu: &G, program: &CompiledProgram<G>, buffers: &[AttributeBuffer<G>]) {
    for attribute in buffers {
        if let Some(index) = program.attribute(attribute.name) {
            gpu.unbind_attribute(index);
        }
    }
}

/// The vertex and index buffers of one mesh. Immutable once created.
pub struct GeometryBuffers<G: Gpu> {
    gpu: Rc<G>,
    attributes: Vec<AttributeBuffer<G>>,
    indices: G::Buffer,
    index_count: usize,
    vertex_count: usize,
}

impl<G: Gpu> GeometryBuffers<G> {
    /// Validates `mesh` and uploads its corners: every attribute array and the index buffer.
    pub fn new(gpu: &Rc<G>, mesh: &MeshData) -> Result<Self> {
        mesh.validate()?;
        let corners = mesh.corners();

        let arrays: [(&'static str, &[f32], i32); 5] = [
            (POSITION_ATTRIBUTE, &corners.positions, 3),
            (NORMAL_ATTRIBUTE, &corners.normals, 3),
            (TEXCOORD_ATTRIBUTE, &corners.texcoords, 2),
            (BARYCENTRIC_ATTRIBUTE, &corners.barycentrics, 3),
            (MATERIAL_SLOT_ATTRIBUTE, &corners.material_slots, 1),
        ];

        let mut geometry = Self {
            gpu: Rc::clone(gpu),
            attributes: Vec::with_capacity(arrays.len()),
            indices: upload(gpu.as_ref(), BufferTarget::Index, bytemuck::cast_slice(&corners.indices))?,
            index_count: corners.indices.len(),
            vertex_count: corners.vertex_count(),
        };
        // Pushed one at a time so a failure part way still frees what was created.
        for (name, data, components) in arrays {
            let buffer = upload(gpu.as_ref(), BufferTarget::Vertex, bytemuck::cast_slice(data))?;
            geometry.attributes.push(AttributeBuffer {
                name,
                buffer,
                components,
            });
        }
        Ok(geometry)
    }

    pub fn index_count(&self) -> usize {
        self.index_count
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Draws every triangle with `program`, which must be in use.
    pub fn draw(&self, program: &CompiledProgram<G>) {
        let gpu = self.gpu.as_ref();
        bind_attributes(gpu, program, &self.attributes);
        gpu.bind_index_buffer(Some(self.indices));
        gpu.draw_elements(Topology::Triangles, self.index_count as i32);
        gpu.bind_index_buffer(None);
        unbind_attributes(gpu, program, &self.attributes);
    }
}

impl<G: Gpu> Drop for GeometryBuffers<G> {
    fn drop(&mut self) {
        for attribute in &self.attributes {
            self.gpu.delete_buffer(attribute.buffer);
        }
        self.gpu.delete_buffer(self.indices);
    }
}

/// Corners of a quad covering clip space, in triangle-strip order.
pub const QUAD_VERTICES: [f32; 8] = [-1.0, 1.0, 1.0, 1.0, -1.0, -1.0, 1.0, -1.0];

/// A full-screen quad drawn as a 4-vertex triangle strip.
pub struct ScreenQuad<G: Gpu> {
    gpu: Rc<G>,
    corners: G::Buffer,
}

impl<G: Gpu> ScreenQuad<G> {
    pub fn new(gpu: &Rc<G>) -> Result<Self> {
        let buffer = upload(gpu.as_ref(), BufferTarget::Vertex, bytemuck::cast_slice(&QUAD_VERTICES))?;
        Ok(Self {
            gpu: Rc::clone(gpu),
            corners: buffer,
        })
    }

    /// Draws the quad with `program`, which must be in use.
    ///
    /// Programs that name their corner attribute `aVertexPosition` are fed too.
    pub fn draw(&self, program: &CompiledProgram<G>) {
        let gpu = self.gpu.as_ref();
        let index = program
            .attribute(QUAD_ATTRIBUTE)
            .or_else(|| program.attribute(POSITION_ATTRIBUTE));
        if let Some(index) = index {
            gpu.bind_attribute(index, self.corners, 2);
        }
        gpu.draw_arrays(Topology::TriangleStrip, 0, 4);
        if let Some(index) = index {
            gpu.unbind_attribute(index);
        }
    }
}

impl<G: Gpu> Drop for ScreenQuad<G> {
    fn drop(&mut self) {
        self.gpu.delete_buffer(self.corners);
    }
}

/// A texture that has been uploaded, with its size in pixels.
pub struct BoundTexture<G: Gpu> {
    gpu: Rc<G>,
    texture: G::Texture,
    size: UVec2,
}

impl<G: Gpu> BoundTexture<G> {
    /// Uploads a decoded RGBA image.
    pub fn new(gpu: &Rc<G>, image: &RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        let texture = gpu
            .create_texture(width, height, Some(image.as_raw()))
            .map_err(RenderError::Resource)?;
        Ok(Self {
            gpu: Rc::clone(gpu),
            texture,
            size: UVec2::new(width, height),
        })
    }

    /// Allocates an uninitialized texture to render into.
    fn render_target(gpu: &Rc<G>, size: UVec2) -> Result<Self> {
        let texture = gpu
            .create_texture(size.x, size.y, None)
            .map_err(RenderError::Resource)?;
        Ok(Self {
            gpu: Rc::clone(gpu),
            texture,
            size,
        })
    }

    pub fn size(&self) -> UVec2 {
        self.size
    }

    pub fn bind(&self, unit: u32) {
        self.gpu.bind_texture(unit, Some(self.texture));
    }
}

impl<G: Gpu> Drop for BoundTexture<G> {
    fn drop(&mut self) {
        self.gpu.delete_texture(self.texture);
    }
}

/// An off-screen render target: a color texture plus a depth renderbuffer.
pub struct FramebufferTarget<G: Gpu> {
    gpu: Rc<G>,
    framebuffer: G::Framebuffer,
    depth: G::Renderbuffer,
    color: BoundTexture<G>,
}

impl<G: Gpu> FramebufferTarget<G> {
    pub fn new(gpu: &Rc<G>, size: UVec2) -> Result<Self> {
        if size.x == 0 || size.y == 0 {
            return Err(RenderError::Resource(format!(
                "framebuffer size {}x{} is empty",
                size.x, size.y
            )));
        }
        let color = BoundTexture::render_target(gpu, size)?;
        let depth = gpu
            .create_renderbuffer(size.x, size.y)
            .map_err(RenderError::Resource)?;
        let framebuffer = match gpu.create_framebuffer(color.texture, depth) {
            Ok(framebuffer) => framebuffer,
            Err(err) => {
                gpu.delete_renderbuffer(depth);
                return Err(RenderError::Resource(err));
            }
        };
        Ok(Self {
            gpu: Rc::clone(gpu),
            framebuffer,
            depth,
            color,
        })
    }

    pub fn size(&self) -> UVec2 {
        self.color.size
    }

    /// Binds the target and sets a matching viewport.
    pub fn bind(&self) {
        self.gpu.bind_framebuffer(Some(self.framebuffer));
        self.gpu.viewport(self.color.size.x, self.color.size.y);
    }

    pub fn texture(&self) -> &BoundTexture<G> {
        &self.color
    }
}

impl<G: Gpu> Drop for FramebufferTarget<G> {
    fn drop(&mut self) {
        self.gpu.delete_framebuffer(self.framebuffer);
        self.gpu.delete_renderbuffer(self.depth);
    }
}

/// The two same-sized targets of the outline technique.
pub struct OutlineTargets<G: Gpu> {
    /// Pass A: the silhouette, drawn with `uOutlinePass = 1`.
    pub silhouette: FramebufferTarget<G>,
    /// Pass B: the shaded scene, drawn with `uOutlinePass = 0`.
    pub color: FramebufferTarget<G>,
}

impl<G: Gpu> OutlineTargets<G> {
    pub fn new(gpu: &Rc<G>, size: UVec2) -> Result<Self> {
        Ok(Self {
            silhouette: FramebufferTarget::new(gpu, size)?,
            color: FramebufferTarget::new(gpu, size)?,
        })
    }

    pub fn size(&self) -> UVec2 {
        self.silhouette.size()
    }

    /// Replaces both targets when `size` differs from the current one. If either new target
    /// fails, both old ones are kept.
    pub fn resize(&mut self, gpu: &Rc<G>, size: UVec2) -> Result<()> {
        if size == self.size() {
            return Ok(());
        }
        let silhouette = FramebufferTarget::new(gpu, size)?;
        let color = FramebufferTarget::new(gpu, size)?;
        self.silhouette = silhouette;
        self.color = color;
        log::debug!("Outline targets resized to {}x{}", size.x, size.y);
        Ok(())
    }
}
