//! A [`Gpu`] that records calls instead of drawing, for tests.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};

use glam::{Mat4, Vec2, Vec3};

use super::{BufferTarget, Gpu, ShaderStage, Topology};

/// Shader sources containing this marker fail to compile.
pub(crate) const COMPILE_FAILURE: &str = "#error";
/// Fragment sources containing this marker fail to link.
pub(crate) const LINK_FAILURE: &str = "// link-fail";

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Value {
    F32(f32),
    I32(i32),
    Vec2(Vec2),
    Vec3(Vec3),
    Mat4(Mat4),
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Location {
    pub program: u32,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    InitState,
    UseProgram(Option<u32>),
    Uniform { name: String, value: Value },
    BindAttribute { index: u32, buffer: u32, components: i32 },
    UnbindAttribute(u32),
    BindIndexBuffer(Option<u32>),
    BindTexture { unit: u32, texture: Option<u32> },
    BindFramebuffer(Option<u32>),
    Viewport(u32, u32),
    Clear,
    DrawArrays { topology: Topology, first: i32, count: i32 },
    DrawElements { topology: Topology, count: i32 },
}

impl Call {
    pub fn is_draw(&self) -> bool {
        matches!(self, Call::DrawArrays { .. } | Call::DrawElements { .. })
    }
}

#[derive(Default)]
pub(crate) struct RecordingGpu {
    calls: RefCell<Vec<Call>>,
    next_id: Cell<u32>,
    lost: Cell<bool>,
    programs: RefCell<HashSet<u32>>,
    shaders: RefCell<HashMap<u32, String>>,
    buffers: RefCell<HashMap<u32, usize>>,
    textures: RefCell<HashMap<u32, (u32, u32)>>,
    renderbuffers: RefCell<HashSet<u32>>,
    framebuffers: RefCell<BTreeMap<u32, (u32, u32)>>,
    attributes: RefCell<HashMap<(u32, String), u32>>,
    missing_uniforms: RefCell<HashSet<String>>,
    framebuffer_budget: Cell<Option<usize>>,
    invalid_deletes: Cell<usize>,
}

impl RecordingGpu {
    pub fn new() -> Self {
        Self::default()
    }

    fn next(&self) -> u32 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn forget<T>(&self, removed: Option<T>) {
        if removed.is_none() {
            self.invalid_deletes.set(self.invalid_deletes.get() + 1);
        }
    }

    pub fn set_context_lost(&self, lost: bool) {
        self.lost.set(lost);
    }

    /// Lets `budget` more framebuffers be created before every further one fails. `None`
    /// lifts the limit.
    pub fn set_framebuffer_budget(&self, budget: Option<usize>) {
        self.framebuffer_budget.set(budget);
    }

    /// Makes `uniform_location` report `name` as optimized out.
    pub fn hide_uniform(&self, name: &str) {
        self.missing_uniforms.borrow_mut().insert(name.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    pub fn draw_calls(&self) -> Vec<Call> {
        self.calls.borrow().iter().filter(|c| c.is_draw()).cloned().collect()
    }

    /// Every uniform write recorded so far for `name`, oldest first.
    pub fn uniform_writes(&self, name: &str) -> Vec<Value> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Uniform { name: n, value } if n == name => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    /// Live framebuffers with the size of their color attachment.
    pub fn live_framebuffers(&self) -> Vec<(u32, (u32, u32))> {
        self.framebuffers
            .borrow()
            .iter()
            .map(|(id, size)| (*id, *size))
            .collect()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.borrow().len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.borrow().len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.borrow().len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.borrow().len()
    }

    pub fn live_renderbuffers(&self) -> usize {
        self.renderbuffers.borrow().len()
    }

    pub fn texture_size(&self, texture: u32) -> Option<(u32, u32)> {
        self.textures.borrow().get(&texture).copied()
    }

    pub fn invalid_deletes(&self) -> usize {
        self.invalid_deletes.get()
    }
}

impl Gpu for RecordingGpu {
    type Shader = u32;
    type Program = u32;
    type Buffer = u32;
    type Texture = u32;
    type Renderbuffer = u32;
    type Framebuffer = u32;
    type UniformLocation = Location;

    fn init_state(&self) {
        self.record(Call::InitState);
    }

    fn is_context_lost(&self) -> bool {
        self.lost.get()
    }

    fn create_shader(&self, stage: ShaderStage, source: &str) -> Result<u32, String> {
        if source.contains(COMPILE_FAILURE) {
            return Err(format!("0:1: {stage} syntax error"));
        }
        let id = self.next();
        self.shaders.borrow_mut().insert(id, source.to_string());
        Ok(id)
    }

    fn delete_shader(&self, shader: u32) {
        let removed = self.shaders.borrow_mut().remove(&shader);
        self.forget(removed);
    }

    fn link_program(&self, vertex: u32, fragment: u32) -> Result<u32, String> {
        let shaders = self.shaders.borrow();
        let (Some(_), Some(fragment_source)) = (shaders.get(&vertex), shaders.get(&fragment))
        else {
            return Err("attached shader does not exist".to_string());
        };
        if fragment_source.contains(LINK_FAILURE) {
            return Err("fragment output does not match".to_string());
        }
        drop(shaders);
        let id = self.next();
        self.programs.borrow_mut().insert(id);
        Ok(id)
    }

    fn delete_program(&self, program: u32) {
        let removed = self.programs.borrow_mut().remove(&program).then_some(());
        self.forget(removed);
    }

    fn use_program(&self, program: Option<u32>) {
        self.record(Call::UseProgram(program));
    }

    fn uniform_location(&self, program: u32, name: &str) -> Option<Location> {
        if self.missing_uniforms.borrow().contains(name) {
            return None;
        }
        Some(Location {
            program,
            name: name.to_string(),
        })
    }

    fn attribute_location(&self, program: u32, name: &str) -> Option<u32> {
        let mut attributes = self.attributes.borrow_mut();
        let next = attributes.keys().filter(|(p, _)| *p == program).count() as u32;
        Some(*attributes.entry((program, name.to_string())).or_insert(next))
    }

    fn uniform_f32(&self, location: &Location, value: f32) {
        self.record(Call::Uniform {
            name: location.name.clone(),
            value: Value::F32(value),
        });
    }

    fn uniform_i32(&self, location: &Location, value: i32) {
        self.record(Call::Uniform {
            name: location.name.clone(),
            value: Value::I32(value),
        });
    }

    fn uniform_vec2(&self, location: &Location, value: Vec2) {
        self.record(Call::Uniform {
            name: location.name.clone(),
            value: Value::Vec2(value),
        });
    }

    fn uniform_vec3(&self, location: &Location, value: Vec3) {
        self.record(Call::Uniform {
            name: location.name.clone(),
            value: Value::Vec3(value),
        });
    }

    fn uniform_mat4(&self, location: &Location, value: &Mat4) {
        self.record(Call::Uniform {
            name: location.name.clone(),
            value: Value::Mat4(*value),
        });
    }

    fn create_buffer(&self, _target: BufferTarget, data: &[u8]) -> Result<u32, String> {
        let id = self.next();
        self.buffers.borrow_mut().insert(id, data.len());
        Ok(id)
    }

    fn delete_buffer(&self, buffer: u32) {
        let removed = self.buffers.borrow_mut().remove(&buffer);
        self.forget(removed);
    }

    fn bind_attribute(&self, index: u32, buffer: u32, components: i32) {
        self.record(Call::BindAttribute {
            index,
            buffer,
            components,
        });
    }

    fn unbind_attribute(&self, index: u32) {
        self.record(Call::UnbindAttribute(index));
    }

    fn bind_index_buffer(&self, buffer: Option<u32>) {
        self.record(Call::BindIndexBuffer(buffer));
    }

    fn create_texture(&self, width: u32, height: u32, pixels: Option<&[u8]>) -> Result<u32, String> {
        if let Some(pixels) = pixels
            && pixels.len() != (width * height * 4) as usize
        {
            return Err("pixel data does not match texture size".to_string());
        }
        let id = self.next();
        self.textures.borrow_mut().insert(id, (width, height));
        Ok(id)
    }

    fn delete_texture(&self, texture: u32) {
        let removed = self.textures.borrow_mut().remove(&texture);
        self.forget(removed);
    }

    fn bind_texture(&self, unit: u32, texture: Option<u32>) {
        self.record(Call::BindTexture { unit, texture });
    }

    fn create_renderbuffer(&self, _width: u32, _height: u32) -> Result<u32, String> {
        let id = self.next();
        self.renderbuffers.borrow_mut().insert(id);
        Ok(id)
    }

    fn delete_renderbuffer(&self, renderbuffer: u32) {
        let removed = self.renderbuffers.borrow_mut().remove(&renderbuffer).then_some(());
        self.forget(removed);
    }

    fn create_framebuffer(&self, color: u32, depth: u32) -> Result<u32, String> {
        let size = self
            .texture_size(color)
            .ok_or_else(|| "color attachment does not exist".to_string())?;
        if !self.renderbuffers.borrow().contains(&depth) {
            return Err("depth attachment does not exist".to_string());
        }
        match self.framebuffer_budget.get() {
            Some(0) => return Err("framebuffer incomplete".to_string()),
            Some(left) => self.framebuffer_budget.set(Some(left - 1)),
            None => {}
        }
        let id = self.next();
        self.framebuffers.borrow_mut().insert(id, size);
        Ok(id)
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        let removed = self.framebuffers.borrow_mut().remove(&framebuffer);
        self.forget(removed);
    }

    fn bind_framebuffer(&self, framebuffer: Option<u32>) {
        self.record(Call::BindFramebuffer(framebuffer));
    }

    fn viewport(&self, width: u32, height: u32) {
        self.record(Call::Viewport(width, height));
    }

    fn clear(&self) {
        self.record(Call::Clear);
    }

    fn draw_arrays(&self, topology: Topology, first: i32, count: i32) {
        self.record(Call::DrawArrays {
            topology,
            first,
            count,
        });
    }

    fn draw_elements(&self, topology: Topology, count: i32) {
        self.record(Call::DrawElements { topology, count });
    }
}
