//! Matrix and vector helpers.
//!
//! Everything here is a pure function over [`glam`] types. Model matrices are composed as
//! `translate · rotate · scale`, so scale is applied to a vertex first and translation last.

use glam::{Mat4, Vec2, Vec3};
use serde::Deserialize;

use crate::error::{RenderError, Result};

/// Determinants with a smaller magnitude are treated as singular.
pub const SINGULAR_EPSILON: f32 = 1e-12;

/// Translation, rotation (radians, applied X then Y then Z) and per-axis scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Returns the model matrix for this transform.
    pub fn matrix(&self) -> Mat4 {
        compose(self.translation, self.rotation, self.scale)
    }
}

/// Where the camera sits and what it looks at.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub eye: Vec3,
    pub target: Vec3,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            near: 0.1,
            far: 100.0,
            eye: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
        }
    }
}

pub fn identity() -> Mat4 {
    Mat4::IDENTITY
}

/// Rotation about X, then Y, then Z.
pub fn rotation_xyz(rotation: Vec3) -> Mat4 {
    Mat4::from_rotation_x(rotation.x)
        * Mat4::from_rotation_y(rotation.y)
        * Mat4::from_rotation_z(rotation.z)
}

/// Builds `translate · rotate · scale`.
pub fn compose(translation: Vec3, rotation: Vec3, scale: Vec3) -> Mat4 {
    Mat4::from_translation(translation) * rotation_xyz(rotation) * Mat4::from_scale(scale)
}

/// Applies `transform` on top of an existing view matrix.
pub fn apply_transform(view: Mat4, transform: &Transform) -> Mat4 {
    view * transform.matrix()
}

/// Right-handed view matrix looking from `eye` at `target`.
///
/// Fails with [`RenderError::DegenerateLookAt`] when `eye` and `target` coincide or `up` is
/// parallel to the viewing direction; there is no sensible basis in either case.
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Result<Mat4> {
    let forward = target - eye;
    if forward.length_squared() <= f32::EPSILON {
        return Err(RenderError::DegenerateLookAt("eye and target are the same point"));
    }
    if forward.cross(up).length_squared() <= f32::EPSILON {
        return Err(RenderError::DegenerateLookAt("up is parallel to the view direction"));
    }
    Ok(Mat4::look_at_rh(eye, target, up))
}

/// Maps a cursor position in canvas pixels to `[-1, 1]` on both axes, with +y pointing up.
///
/// A zero-sized canvas maps every cursor to the center.
pub fn normalized_cursor(cursor: Vec2, canvas: Vec2) -> Vec2 {
    if canvas.x <= 0.0 || canvas.y <= 0.0 {
        return Vec2::ZERO;
    }
    let n = (cursor / canvas) * 2.0 - Vec2::ONE;
    Vec2::new(n.x, -n.y).clamp(Vec2::NEG_ONE, Vec2::ONE)
}

/// The camera's fixed view.
pub fn camera_view(camera: &CameraSettings) -> Result<Mat4> {
    look_at(camera.eye, camera.target, Vec3::Y)
}

/// View matrix with the camera turned by `yaw` (around Y) and `pitch` (around X), in radians.
///
/// The camera stays at `eye`; only its target moves.
pub fn look_at_angles(camera: &CameraSettings, yaw: f32, pitch: f32) -> Result<Mat4> {
    let forward = camera.target - camera.eye;
    let turned = Mat4::from_rotation_y(-yaw) * Mat4::from_rotation_x(pitch);
    look_at(camera.eye, camera.eye + turned.transform_vector3(forward), Vec3::Y)
}

/// General 4x4 inverse.
///
/// Returns [`RenderError::MatrixSingular`] instead of a garbage matrix when the determinant is
/// within [`SINGULAR_EPSILON`] of zero.
pub fn invert(matrix: &Mat4) -> Result<Mat4> {
    let determinant = matrix.determinant();
    if !determinant.is_finite() || determinant.abs() < SINGULAR_EPSILON {
        return Err(RenderError::MatrixSingular { determinant });
    }
    Ok(matrix.inverse())
}

pub fn transpose(matrix: &Mat4) -> Mat4 {
    matrix.transpose()
}

/// `transpose(invert(model_view))`, or identity if `model_view` is singular.
pub fn normal_matrix(model_view: &Mat4) -> Mat4 {
    match invert(model_view) {
        Ok(inverse) => transpose(&inverse),
        Err(err) => {
            log::warn!("Falling back to identity normal matrix: {err}");
            identity()
        }
    }
}

/// Converts every component of `degrees` to radians.
pub fn radians(degrees: Vec3) -> Vec3 {
    Vec3::new(
        degrees.x.to_radians(),
        degrees.y.to_radians(),
        degrees.z.to_radians(),
    )
}

/// OpenGL-style perspective projection.
pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let aspect = if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    };
    Mat4::perspective_rh_gl(fov_y_degrees.to_radians(), aspect, near, far)
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    fn random_matrix(rng: &mut StdRng) -> Mat4 {
        let translation = Vec3::new(
            rng.random_range(-10.0..10.0),
            rng.random_range(-10.0..10.0),
            rng.random_range(-10.0..10.0),
        );
        let rotation = Vec3::new(
            rng.random_range(-3.0..3.0),
            rng.random_range(-3.0..3.0),
            rng.random_range(-3.0..3.0),
        );
        let scale = Vec3::new(
            rng.random_range(0.2..4.0),
            rng.random_range(0.2..4.0),
            rng.random_range(0.2..4.0),
        );
        compose(translation, rotation, scale)
    }

    #[test]
    fn double_inverse_is_identity_operation() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let m = random_matrix(&mut rng);
            let back = invert(&invert(&m).unwrap()).unwrap();
            assert!(back.abs_diff_eq(m, 1e-3), "{m:?} != {back:?}");
        }
    }

    #[test]
    fn double_transpose_is_exact() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let m = random_matrix(&mut rng);
            assert_eq!(transpose(&transpose(&m)), m);
        }
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let flat = Mat4::from_scale(Vec3::new(1.0, 0.0, 1.0));
        assert!(matches!(
            invert(&flat),
            Err(RenderError::MatrixSingular { .. })
        ));
        assert_eq!(normal_matrix(&flat), identity());
    }

    #[test]
    fn look_at_rejects_coincident_eye_and_target() {
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert!(matches!(
            look_at(p, p, Vec3::Y),
            Err(RenderError::DegenerateLookAt(_))
        ));
        assert!(look_at(Vec3::ZERO, Vec3::Y, Vec3::Y).is_err());
        assert!(look_at(Vec3::Z, Vec3::ZERO, Vec3::Y).is_ok());
    }

    #[test]
    fn compose_applies_scale_then_rotation_then_translation() {
        let m = compose(
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, std::f32::consts::FRAC_PI_2),
            Vec3::new(2.0, 1.0, 1.0),
        );
        let p = m.transform_point3(Vec3::X);
        // (1,0,0) -> scaled (2,0,0) -> rotated (0,2,0) -> translated (10,2,0)
        assert!(p.abs_diff_eq(Vec3::new(10.0, 2.0, 0.0), 1e-5), "{p}");
    }

    #[test]
    fn normal_matrix_handles_non_uniform_scale() {
        let model_view = compose(Vec3::ZERO, Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0));
        let normal = normal_matrix(&model_view);
        let n = normal.transform_vector3(Vec3::X);
        assert!(n.abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-6));
    }

    #[test]
    fn cursor_is_normalized_with_y_up() {
        let canvas = Vec2::new(200.0, 100.0);
        assert_eq!(normalized_cursor(Vec2::new(100.0, 50.0), canvas), Vec2::ZERO);
        assert_eq!(normalized_cursor(Vec2::ZERO, canvas), Vec2::new(-1.0, 1.0));
        assert_eq!(normalized_cursor(Vec2::new(5.0, 5.0), Vec2::ZERO), Vec2::ZERO);
    }

    #[test]
    fn look_angles_turn_the_target() {
        let camera = CameraSettings::default();
        let straight = look_at_angles(&camera, 0.0, 0.0).unwrap();
        assert!(straight.abs_diff_eq(camera_view(&camera).unwrap(), 1e-6));

        // Yawing right moves the original target to the left of the view.
        let right = look_at_angles(&camera, 0.3, 0.0).unwrap();
        assert!(right.transform_point3(camera.target).x < 0.0);
        // Pitching up moves it below.
        let up = look_at_angles(&camera, 0.0, 0.3).unwrap();
        assert!(up.transform_point3(camera.target).y < 0.0);
    }

    #[test]
    fn radians_converts_each_axis() {
        let r = radians(Vec3::new(180.0, 90.0, 0.0));
        assert!(r.abs_diff_eq(
            Vec3::new(std::f32::consts::PI, std::f32::consts::FRAC_PI_2, 0.0),
            1e-6
        ));
    }
}
