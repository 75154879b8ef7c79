//! Typed uniform descriptors and their upload to a linked program.
//!
//! A scene declares its tweakable shader inputs as [`UniformDescriptor`]s collected in a
//! [`UniformSet`]. Once a program is linked, [`UniformBindings`] resolves every descriptor name
//! to a location in that program, and [`UniformBindings::upload`] writes all current values each
//! frame. The engine-managed names in [`RESERVED_UNIFORMS`] are rewritten before every upload.
//!
//! The [`Uniform`] trait covers values the engine sets directly (matrices, flags, samplers).

use fxhash::FxHashMap;
use glam::{Mat4, Vec2, Vec3};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{RenderError, Result};
use crate::gpu::Gpu;
use crate::resources::{CompiledProgram, ProgramKey};

/// Elapsed seconds since the scene started.
pub const TIME: &str = "uTime";
/// Canvas size in device pixels.
pub const RESOLUTION: &str = "uResolution";
/// Cursor position normalized to `[0, 1]`, origin at the bottom left.
pub const MOUSE: &str = "uMouse";

/// Names the engine overwrites every frame, whatever their current value.
pub const RESERVED_UNIFORMS: [&str; 3] = [TIME, RESOLUTION, MOUSE];

/// The shape of a uniform value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UniformKind {
    Scalar,
    Int,
    Vec2,
    Vec3,
}

/// A uniform value, tagged with its shape.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Scalar(f32),
    Int(i32),
    Vec2(Vec2),
    Vec3(Vec3),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            UniformValue::Scalar(_) => UniformKind::Scalar,
            UniformValue::Int(_) => UniformKind::Int,
            UniformValue::Vec2(_) => UniformKind::Vec2,
            UniformValue::Vec3(_) => UniformKind::Vec3,
        }
    }

    /// Reads a value of `kind` from JSON. Ints also accept booleans (toggle controls).
    fn from_json(kind: UniformKind, json: &serde_json::Value) -> Option<Self> {
        use serde_json::Value as Json;

        let float = |v: &Json| v.as_f64().map(|f| f as f32);
        let floats = |v: &Json, n: usize| -> Option<Vec<f32>> {
            let array = v.as_array()?;
            if array.len() != n {
                return None;
            }
            array.iter().map(float).collect()
        };

        match kind {
            UniformKind::Scalar => float(json).map(UniformValue::Scalar),
            UniformKind::Int => match json {
                Json::Bool(b) => Some(UniformValue::Int(*b as i32)),
                _ => json
                    .as_i64()
                    .and_then(|i| i32::try_from(i).ok())
                    .map(UniformValue::Int),
            },
            UniformKind::Vec2 => floats(json, 2).map(|v| UniformValue::Vec2(Vec2::new(v[0], v[1]))),
            UniformKind::Vec3 => {
                floats(json, 3).map(|v| UniformValue::Vec3(Vec3::new(v[0], v[1], v[2])))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawUniform {
    name: String,
    kind: UniformKind,
    value: serde_json::Value,
    #[serde(default)]
    default: Option<serde_json::Value>,
    #[serde(default)]
    readonly: bool,
}

/// One named shader input.
///
/// The kind is fixed at construction and every value stored afterwards has that kind.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawUniform")]
pub struct UniformDescriptor {
    name: String,
    kind: UniformKind,
    value: UniformValue,
    default_value: UniformValue,
    readonly: bool,
}

impl TryFrom<RawUniform> for UniformDescriptor {
    type Error = String;

    fn try_from(raw: RawUniform) -> std::result::Result<Self, Self::Error> {
        let value = UniformValue::from_json(raw.kind, &raw.value).ok_or_else(|| {
            format!(
                "value {} of uniform '{}' is not a {:?}",
                raw.value, raw.name, raw.kind
            )
        })?;
        let default_value = match &raw.default {
            Some(json) => UniformValue::from_json(raw.kind, json).ok_or_else(|| {
                format!(
                    "default {} of uniform '{}' is not a {:?}",
                    json, raw.name, raw.kind
                )
            })?,
            None => value,
        };
        Ok(Self {
            name: raw.name,
            kind: raw.kind,
            value,
            default_value,
            readonly: raw.readonly,
        })
    }
}

impl UniformDescriptor {
    /// Creates a writable descriptor whose default is `value`.
    pub fn new(name: impl Into<String>, value: UniformValue) -> Self {
        Self {
            name: name.into(),
            kind: value.kind(),
            value,
            default_value: value,
            readonly: false,
        }
    }

    /// Creates a descriptor the UI may not edit.
    pub fn readonly(name: impl Into<String>, value: UniformValue) -> Self {
        Self {
            readonly: true,
            ..Self::new(name, value)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> UniformKind {
        self.kind
    }

    pub fn value(&self) -> UniformValue {
        self.value
    }

    pub fn default_value(&self) -> UniformValue {
        self.default_value
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn is_reserved(&self) -> bool {
        RESERVED_UNIFORMS.contains(&self.name.as_str())
    }

    fn store(&mut self, value: UniformValue) -> Result<()> {
        if value.kind() != self.kind {
            return Err(RenderError::UniformKindMismatch {
                name: self.name.clone(),
                expected: self.kind,
                found: value.kind(),
            });
        }
        self.value = value;
        Ok(())
    }
}

/// Per-frame values for the reserved uniforms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInputs {
    pub elapsed: f32,
    pub resolution: Vec2,
    pub mouse: Vec2,
}

/// The descriptors of one scene, in declaration order, with unique names.
#[derive(Clone, Debug, Default)]
pub struct UniformSet {
    descriptors: IndexMap<String, UniformDescriptor>,
}

impl UniformSet {
    /// Builds a set, rejecting duplicate names.
    pub fn new(descriptors: impl IntoIterator<Item = UniformDescriptor>) -> Result<Self> {
        let mut map = IndexMap::new();
        for descriptor in descriptors {
            if map.contains_key(descriptor.name()) {
                return Err(RenderError::DuplicateUniform(descriptor.name));
            }
            map.insert(descriptor.name.clone(), descriptor);
        }
        Ok(Self { descriptors: map })
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UniformDescriptor> {
        self.descriptors.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&UniformDescriptor> {
        self.descriptors.get(name)
    }

    pub fn value(&self, name: &str) -> Option<UniformValue> {
        self.get(name).map(UniformDescriptor::value)
    }

    pub fn scalar(&self, name: &str) -> Option<f32> {
        match self.value(name)? {
            UniformValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn vec3(&self, name: &str) -> Option<Vec3> {
        match self.value(name)? {
            UniformValue::Vec3(v) => Some(v),
            _ => None,
        }
    }

    /// Sets a value from outside the engine (a UI control).
    ///
    /// Unknown names, read-only descriptors and values of the wrong kind are rejected.
    pub fn set(&mut self, name: &str, value: UniformValue) -> Result<()> {
        let descriptor = self
            .descriptors
            .get_mut(name)
            .ok_or_else(|| RenderError::UnknownUniform(name.to_string()))?;
        if descriptor.readonly {
            return Err(RenderError::ReadonlyUniform(name.to_string()));
        }
        descriptor.store(value)
    }

    /// Restores the default value of `name`.
    pub fn reset(&mut self, name: &str) -> Result<()> {
        let descriptor = self
            .descriptors
            .get_mut(name)
            .ok_or_else(|| RenderError::UnknownUniform(name.to_string()))?;
        descriptor.value = descriptor.default_value;
        Ok(())
    }

    pub fn reset_all(&mut self) {
        for descriptor in self.descriptors.values_mut() {
            descriptor.value = descriptor.default_value;
        }
    }

    /// Overwrites the reserved descriptors this set declares.
    pub fn apply_frame(&mut self, inputs: &FrameInputs) {
        let updates = [
            (TIME, UniformValue::Scalar(inputs.elapsed)),
            (RESOLUTION, UniformValue::Vec2(inputs.resolution)),
            (MOUSE, UniformValue::Vec2(inputs.mouse)),
        ];
        for (name, value) in updates {
            if let Some(descriptor) = self.descriptors.get_mut(name)
                && let Err(err) = descriptor.store(value)
            {
                log::error!("Reserved uniform declared with the wrong kind: {err}");
            }
        }
    }
}

/// Uniform locations of one [`UniformSet`] inside one linked program.
///
/// Only valid for the program it was resolved against. Recompiling means resolving again.
pub struct UniformBindings<G: Gpu> {
    program: ProgramKey,
    locations: FxHashMap<String, G::UniformLocation>,
}

impl<G: Gpu> UniformBindings<G> {
    /// Looks up every descriptor of `set` in `program`.
    ///
    /// Names the program does not use (optimized out by the compiler) are skipped.
    pub fn resolve(program: &CompiledProgram<G>, set: &UniformSet) -> Self {
        let mut locations = FxHashMap::default();
        for name in set.names() {
            match program.lookup(name) {
                Some(location) => {
                    locations.insert(name.to_string(), location);
                }
                None => log::debug!("Uniform '{name}' is not used by the program"),
            }
        }
        Self {
            program: program.key(),
            locations,
        }
    }

    pub fn program(&self) -> ProgramKey {
        self.program
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.locations.contains_key(name)
    }

    /// Writes every descriptor with a location. `program` must be the one in use.
    pub fn upload(&self, gpu: &G, program: &CompiledProgram<G>, set: &UniformSet) -> Result<()> {
        if program.key() != self.program {
            return Err(RenderError::StaleBindings);
        }
        for descriptor in set.iter() {
            let Some(location) = self.locations.get(descriptor.name()) else {
                continue;
            };
            let value = descriptor.value();
            if value.kind() != descriptor.kind() {
                debug_assert!(
                    false,
                    "uniform '{}' holds a {:?} value but is declared {:?}",
                    descriptor.name(),
                    value.kind(),
                    descriptor.kind()
                );
                log::error!(
                    "Skipping uniform '{}': {:?} value for a {:?} descriptor",
                    descriptor.name(),
                    value.kind(),
                    descriptor.kind()
                );
                continue;
            }
            value.set_uniform(gpu, location);
        }
        Ok(())
    }
}

/// Something that can be written to a uniform location.
pub trait Uniform {
    fn set_uniform<G: Gpu>(&self, gpu: &G, location: &G::UniformLocation);
}

impl Uniform for bool {
    fn set_uniform<G: Gpu>(&self, gpu: &G, location: &G::UniformLocation) {
        gpu.uniform_i32(location, *self as i32);
    }
}

impl Uniform for f32 {
    fn set_uniform<G: Gpu>(&self, gpu: &G, location: &G::UniformLocation) {
        gpu.uniform_f32(location, *self);
    }
}

impl Uniform for i32 {
    fn set_uniform<G: Gpu>(&self, gpu: &G, location: &G::UniformLocation) {
        gpu.uniform_i32(location, *self);
    }
}

impl Uniform for Vec2 {
    fn set_uniform<G: Gpu>(&self, gpu: &G, location: &G::UniformLocation) {
        gpu.uniform_vec2(location, *self);
    }
}

impl Uniform for Vec3 {
    fn set_uniform<G: Gpu>(&self, gpu: &G, location: &G::UniformLocation) {
        gpu.uniform_vec3(location, *self);
    }
}

impl Uniform for Mat4 {
    fn set_uniform<G: Gpu>(&self, gpu: &G, location: &G::UniformLocation) {
        gpu.uniform_mat4(location, self);
    }
}

impl Uniform for UniformValue {
    fn set_uniform<G: Gpu>(&self, gpu: &G, location: &G::UniformLocation) {
        match self {
            UniformValue::Scalar(v) => v.set_uniform(gpu, location),
            UniformValue::Int(v) => v.set_uniform(gpu, location),
            UniformValue::Vec2(v) => v.set_uniform(gpu, location),
            UniformValue::Vec3(v) => v.set_uniform(gpu, location),
        }
    }
}

impl<T: Uniform> Uniform for &T {
    fn set_uniform<G: Gpu>(&self, gpu: &G, location: &G::UniformLocation) {
        (*self).set_uniform(gpu, location);
    }
}
