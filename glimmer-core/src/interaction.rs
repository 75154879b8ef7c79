//! Fuses pointer, drag and device-orientation input into one camera signal.
//!
//! [`InteractionState`] is a small state machine. Events arrive through
//! [`InteractionState::handle_event`] at any time and only record what happened; the state
//! advances once per frame in [`InteractionState::update`]. The frame then asks for a
//! [`CameraPath`], which says how the model-view matrix should be built.

use glam::{Vec2, Vec3};
use serde::Deserialize;

use crate::math;

/// Which input currently drives the camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InteractionMode {
    /// The look-at target follows the cursor.
    #[default]
    MouseLook,
    /// Rotation follows the device orientation.
    Gyroscope,
    /// A pointer is held down and rotates the model.
    Drag,
}

/// Raw input, in canvas device pixels and degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InteractionEvent {
    PointerMoved { position: Vec2 },
    /// A mouse button or touch went down.
    PointerDown { position: Vec2 },
    PointerUp,
    /// The platform granted or revoked access to orientation data.
    OrientationPermission { granted: bool },
    /// Device orientation in degrees: `alpha` around Z, `beta` around X, `gamma` around Y.
    Orientation { alpha: f32, beta: f32, gamma: f32 },
}

/// Tuning for the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct InteractionSettings {
    /// Factor applied to residual angular velocity every frame.
    pub damping: f32,
    /// Below this magnitude residual velocity is zeroed.
    pub stop_threshold: f32,
    /// Radians of rotation per pixel of drag.
    pub drag_sensitivity: f32,
    /// Yaw at the left and right canvas edges, in degrees.
    pub yaw_range: f32,
    /// Pitch at the top and bottom canvas edges, in degrees.
    pub pitch_range: f32,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            damping: 0.95,
            stop_threshold: 1e-4,
            drag_sensitivity: 0.01,
            yaw_range: 25.0,
            pitch_range: 15.0,
        }
    }
}

/// How the camera is built this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CameraPath {
    /// Fixed look-at, model rotated by an explicit rotation (radians).
    FixedRotation(Vec3),
    /// Look-at target turned by yaw and pitch (radians); the model keeps its configured rotation.
    CursorLookAt { yaw: f32, pitch: f32 },
}

#[derive(Clone, Debug)]
pub struct InteractionState {
    settings: InteractionSettings,
    mode: InteractionMode,
    /// Mode to return to when a drag ends.
    resume: InteractionMode,
    rotation: Vec3,
    angular_velocity: Vec3,
    dragging: bool,
    cursor: Vec2,
    canvas: Vec2,
    last_pointer: Option<Vec2>,
    pending_drag: Vec2,
    permission: bool,
    orientation: Option<Vec3>,
}

impl InteractionState {
    /// Starts in [`InteractionMode::MouseLook`] with the given rotation (radians).
    pub fn new(settings: InteractionSettings, rotation: Vec3) -> Self {
        Self {
            settings,
            mode: InteractionMode::MouseLook,
            resume: InteractionMode::MouseLook,
            rotation,
            angular_velocity: Vec3::ZERO,
            dragging: false,
            cursor: Vec2::ZERO,
            canvas: Vec2::ZERO,
            last_pointer: None,
            pending_drag: Vec2::ZERO,
            permission: false,
            orientation: None,
        }
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    /// `true` while residual drag velocity is still turning the model.
    pub fn is_coasting(&self) -> bool {
        !self.dragging && self.angular_velocity != Vec3::ZERO
    }

    /// Sets the canvas size the cursor is measured against. Puts the cursor at the center.
    pub fn resize(&mut self, canvas: Vec2) {
        let recenter = self.canvas == Vec2::ZERO;
        self.canvas = canvas;
        if recenter {
            self.cursor = canvas * 0.5;
        }
    }

    /// Records an input event. Mode transitions happen here; motion is applied in `update`.
    pub fn handle_event(&mut self, event: InteractionEvent) {
        match event {
            InteractionEvent::PointerMoved { position } => {
                self.cursor = position;
                if self.dragging
                    && let Some(last) = self.last_pointer.replace(position)
                {
                    self.pending_drag += position - last;
                }
            }
            InteractionEvent::PointerDown { position } => {
                self.cursor = position;
                if self.mode != InteractionMode::Drag {
                    self.resume = self.mode;
                    self.set_mode(InteractionMode::Drag);
                }
                self.dragging = true;
                self.last_pointer = Some(position);
                self.pending_drag = Vec2::ZERO;
                self.angular_velocity = Vec3::ZERO;
            }
            InteractionEvent::PointerUp => {
                if self.mode == InteractionMode::Drag {
                    self.set_mode(self.resume);
                }
                self.dragging = false;
                self.last_pointer = None;
            }
            InteractionEvent::OrientationPermission { granted } => {
                self.permission = granted;
                if !granted {
                    self.orientation = None;
                    if self.resume == InteractionMode::Gyroscope {
                        self.resume = InteractionMode::MouseLook;
                    }
                    if self.mode == InteractionMode::Gyroscope {
                        log::warn!("Orientation permission revoked, falling back to mouse look");
                        self.set_mode(InteractionMode::MouseLook);
                    }
                }
            }
            InteractionEvent::Orientation { alpha, beta, gamma } => {
                if !self.permission {
                    log::trace!("Ignoring orientation event without permission");
                    return;
                }
                self.orientation = Some(Vec3::new(beta, gamma, alpha));
                match self.mode {
                    InteractionMode::MouseLook => self.set_mode(InteractionMode::Gyroscope),
                    InteractionMode::Drag if self.resume == InteractionMode::MouseLook => {
                        self.resume = InteractionMode::Gyroscope;
                    }
                    _ => {}
                }
            }
        }
    }

    fn set_mode(&mut self, mode: InteractionMode) {
        log::debug!("Interaction mode {:?} -> {:?}", self.mode, mode);
        self.mode = mode;
    }

    /// Advances one frame.
    pub fn update(&mut self) {
        match self.mode {
            InteractionMode::Drag => {
                let delta = std::mem::take(&mut self.pending_drag);
                self.angular_velocity =
                    Vec3::new(delta.y, delta.x, 0.0) * self.settings.drag_sensitivity;
                self.rotation += self.angular_velocity;
            }
            InteractionMode::Gyroscope => {
                if let Some(orientation) = self.orientation {
                    self.rotation = math::radians(orientation);
                }
                self.angular_velocity = Vec3::ZERO;
            }
            InteractionMode::MouseLook => {
                if self.angular_velocity != Vec3::ZERO {
                    self.rotation += self.angular_velocity;
                    self.angular_velocity *= self.settings.damping;
                    if self.angular_velocity.length() < self.settings.stop_threshold {
                        self.angular_velocity = Vec3::ZERO;
                    }
                }
            }
        }
    }

    /// Yaw and pitch (radians) for the current cursor, bounded by the configured ranges.
    pub fn look_angles(&self) -> (f32, f32) {
        let n = math::normalized_cursor(self.cursor, self.canvas);
        (
            n.x * self.settings.yaw_range.to_radians(),
            n.y * self.settings.pitch_range.to_radians(),
        )
    }

    /// Cursor in `[0, 1]` with the origin at the bottom left.
    pub fn mouse_uniform(&self) -> Vec2 {
        (math::normalized_cursor(self.cursor, self.canvas) + Vec2::ONE) * 0.5
    }

    pub fn camera_path(&self) -> CameraPath {
        match self.mode {
            InteractionMode::Gyroscope | InteractionMode::Drag => {
                CameraPath::FixedRotation(self.rotation)
            }
            InteractionMode::MouseLook if self.is_coasting() => {
                CameraPath::FixedRotation(self.rotation)
            }
            InteractionMode::MouseLook => {
                let (yaw, pitch) = self.look_angles();
                CameraPath::CursorLookAt { yaw, pitch }
            }
        }
    }
}
