//! SDL2 events to interaction events.
//!
//! Mouse positions arrive in window coordinates and touch positions normalized to the window;
//! both are converted to canvas pixels. Game controllers with a gyroscope stand in for device
//! orientation: enabling the sensor is the permission grant, and the angular rates it reports
//! are integrated into absolute angles.

use glam::{Vec2, Vec3};
use glimmer_core::InteractionEvent;
use sdl2::controller::GameController;
use sdl2::event::Event;
use sdl2::mouse::MouseButton;
use sdl2::sensor::SensorType;

/// `which` of mouse events SDL synthesizes from touches.
const TOUCH_MOUSE_ID: u32 = u32::MAX;

/// Integrates gyroscope rates into orientation angles, in degrees.
#[derive(Debug, Default)]
pub struct GyroIntegrator {
    angles: Vec3,
    last_timestamp: Option<u32>,
}

impl GyroIntegrator {
    /// Adds one sample of `rates` (radians per second around x, y and z) taken at `timestamp`
    /// milliseconds, and returns the resulting orientation event.
    pub fn integrate(&mut self, timestamp: u32, rates: [f32; 3]) -> InteractionEvent {
        let dt = match self.last_timestamp {
            Some(last) => timestamp.wrapping_sub(last) as f32 / 1000.0,
            None => 0.0,
        };
        self.last_timestamp = Some(timestamp);
        self.angles += Vec3::from(rates).map(f32::to_degrees) * dt;
        InteractionEvent::Orientation {
            alpha: self.angles.z,
            beta: self.angles.x,
            gamma: self.angles.y,
        }
    }
}

/// Turns SDL events into [`InteractionEvent`]s for one window.
#[derive(Default)]
pub struct InputMapper {
    device_pixel_ratio: f32,
    drawable: Vec2,
    gyro: GyroIntegrator,
    controllers: Vec<GameController>,
    /// Instance ids of controllers with an enabled gyroscope. The first one drives orientation.
    gyro_sources: Vec<u32>,
    /// The last permission reported, if any.
    permission: Option<bool>,
}

impl InputMapper {
    pub fn new(device_pixel_ratio: f32, drawable: Vec2) -> Self {
        Self {
            device_pixel_ratio,
            drawable,
            ..Default::default()
        }
    }

    pub fn resize(&mut self, device_pixel_ratio: f32, drawable: Vec2) {
        self.device_pixel_ratio = device_pixel_ratio;
        self.drawable = drawable;
    }

    fn window_point(&self, x: i32, y: i32) -> Vec2 {
        Vec2::new(x as f32, y as f32) * self.device_pixel_ratio
    }

    fn touch_point(&self, x: f32, y: f32) -> Vec2 {
        Vec2::new(x, y) * self.drawable
    }

    /// Keeps an opened controller and tries to enable its gyroscope.
    ///
    /// Returns a permission event the first time a gyroscope is enabled, and a refusal when the
    /// first controller has none.
    pub fn controller_added(&mut self, controller: GameController) -> Option<InteractionEvent> {
        let enabled = controller
            .sensor_set_enabled(SensorType::Gyroscope, true)
            .is_ok();
        log::info!(
            "Controller '{}' connected, gyroscope {}",
            controller.name(),
            if enabled { "enabled" } else { "unavailable" }
        );
        let instance_id = controller.instance_id();
        self.controllers.push(controller);
        self.track_gyro(instance_id, enabled)
    }

    fn track_gyro(&mut self, instance_id: u32, enabled: bool) -> Option<InteractionEvent> {
        if enabled {
            self.gyro_sources.push(instance_id);
            if self.permission == Some(true) {
                return None;
            }
            self.permission = Some(true);
            Some(InteractionEvent::OrientationPermission { granted: true })
        } else if self.permission.is_none() {
            self.permission = Some(false);
            Some(InteractionEvent::OrientationPermission { granted: false })
        } else {
            None
        }
    }

    /// Forgets a disconnected controller. Returns a revocation when it was the last one with a
    /// gyroscope.
    pub fn controller_removed(&mut self, instance_id: u32) -> Option<InteractionEvent> {
        self.controllers.retain(|c| c.instance_id() != instance_id);
        let position = self.gyro_sources.iter().position(|&id| id == instance_id)?;
        self.gyro_sources.remove(position);
        if position == 0 {
            self.gyro = GyroIntegrator::default();
        }
        if !self.gyro_sources.is_empty() || self.permission != Some(true) {
            return None;
        }
        log::info!("Last gyroscope disconnected");
        self.permission = Some(false);
        Some(InteractionEvent::OrientationPermission { granted: false })
    }

    /// Maps one event. Events that do not concern the renderer map to `None`.
    pub fn translate(&mut self, event: &Event) -> Option<InteractionEvent> {
        match *event {
            Event::MouseMotion { which, x, y, .. } if which != TOUCH_MOUSE_ID => {
                Some(InteractionEvent::PointerMoved {
                    position: self.window_point(x, y),
                })
            }
            Event::MouseButtonDown {
                which,
                mouse_btn: MouseButton::Left,
                x,
                y,
                ..
            } if which != TOUCH_MOUSE_ID => Some(InteractionEvent::PointerDown {
                position: self.window_point(x, y),
            }),
            Event::MouseButtonUp {
                which,
                mouse_btn: MouseButton::Left,
                ..
            } if which != TOUCH_MOUSE_ID => Some(InteractionEvent::PointerUp),
            Event::FingerDown { x, y, .. } => Some(InteractionEvent::PointerDown {
                position: self.touch_point(x, y),
            }),
            Event::FingerMotion { x, y, .. } => Some(InteractionEvent::PointerMoved {
                position: self.touch_point(x, y),
            }),
            Event::FingerUp { .. } => Some(InteractionEvent::PointerUp),
            Event::ControllerSensorUpdated {
                timestamp,
                sensor: SensorType::Gyroscope,
                which,
                data,
            } if self.gyro_sources.first() == Some(&which) => {
                Some(self.gyro.integrate(timestamp, data))
            }
            _ => None,
        }
    }
}
