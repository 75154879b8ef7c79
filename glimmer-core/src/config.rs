//! Scene configuration.
//!
//! A scene is described by a JSON document. Every section is optional and falls back to its
//! default, so `{}` is a valid scene (a single-pass program with no tweakable uniforms).
//!
//! ```json
//! {
//!     "name": "toon fox",
//!     "pipeline": "two_pass_outline",
//!     "uniforms": [
//!         { "name": "uScale", "kind": "scalar", "value": 0.05 },
//!         { "name": "uRotation", "kind": "vec3", "value": [0, 180, 0] }
//!     ],
//!     "camera": { "fov_degrees": 45 },
//!     "interaction": { "damping": 0.9 },
//!     "auto_rotate": [0, 0.01, 0]
//! }
//! ```

use std::path::Path;

use glam::{Vec2, Vec3};
use serde::Deserialize;

use crate::error::Result;
use crate::interaction::InteractionSettings;
use crate::math::{self, CameraSettings};
use crate::pipeline::PipelineKind;
use crate::uniform::{MOUSE, RESOLUTION, TIME, UniformDescriptor, UniformSet, UniformValue};

/// Model translation, a `vec3`.
pub const TRANSLATION: &str = "uTranslation";
/// Uniform model scale, a `scalar`.
pub const SCALE: &str = "uScale";
/// Model rotation in degrees, a `vec3`. Used while the camera follows the cursor.
pub const ROTATION: &str = "uRotation";

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub name: String,
    pub pipeline: PipelineKind,
    pub uniforms: Vec<UniformDescriptor>,
    pub camera: CameraSettings,
    pub interaction: InteractionSettings,
    /// Rotation added to the model every frame, in radians.
    pub auto_rotate: Vec3,
}

impl SceneConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Checks what deserialization alone cannot: unique uniform names and a usable camera.
    pub fn validate(&self) -> Result<()> {
        UniformSet::new(self.uniforms.iter().cloned())?;
        math::camera_view(&self.camera)?;
        Ok(())
    }

    /// The scene's uniforms plus any reserved uniform it did not declare.
    pub fn uniform_set(&self) -> Result<UniformSet> {
        let reserved = [
            (TIME, UniformValue::Scalar(0.0)),
            (RESOLUTION, UniformValue::Vec2(Vec2::ZERO)),
            (MOUSE, UniformValue::Vec2(Vec2::splat(0.5))),
        ];
        let missing = reserved
            .into_iter()
            .filter(|(name, _)| !self.uniforms.iter().any(|u| u.name() == *name))
            .map(|(name, value)| UniformDescriptor::readonly(name, value));
        UniformSet::new(self.uniforms.iter().cloned().chain(missing))
    }
}
