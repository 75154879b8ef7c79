//! SDL2 and OpenGL application management.
//!
//! This module defines the [`App`] struct which encapsulates the SDL2
//! and OpenGL context necessary for creating a windowed application.

use std::sync::Arc;

use glam::{UVec2, Vec2};

/// The [`App`] struct encapsulates the SDL2 and OpenGL context.
pub struct App {
    pub sdl: sdl2::Sdl,
    pub video_subsystem: sdl2::VideoSubsystem,
    pub controller_subsystem: sdl2::GameControllerSubsystem,
    pub window: sdl2::video::Window,
    pub gl_context: sdl2::video::GLContext,
    pub gl: Arc<glow::Context>,
    pub event_pump: sdl2::EventPump,
}

impl App {
    /// Creates a new [`App`] instance with the specified title, width, and height.
    /// The window is resizable and high-DPI aware, so its drawable size may be
    /// larger than the requested size.
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self, String> {
        let sdl = sdl2::init()?;
        let video_subsystem = sdl.video()?;
        let controller_subsystem = sdl.game_controller()?;
        let gl_attr = video_subsystem.gl_attr();
        gl_attr.set_context_profile(sdl2::video::GLProfile::Core);
        gl_attr.set_context_version(3, 3);
        gl_attr.set_depth_size(24);
        gl_attr.set_double_buffer(true);
        gl_attr.set_context_flags().robust_access().set();
        let window = video_subsystem
            .window(title, width, height)
            .opengl()
            .resizable()
            .allow_highdpi()
            .build()
            .map_err(|e| e.to_string())?;
        let (gl_context, gl) = create_gl_context(&video_subsystem, &window)?;
        let event_pump = sdl.event_pump()?;

        Ok(Self {
            sdl,
            video_subsystem,
            controller_subsystem,
            window,
            gl_context,
            gl,
            event_pump,
        })
    }

    /// Replaces a lost OpenGL context with a new one on the same window.
    pub fn recreate_gl_context(&mut self) -> Result<Arc<glow::Context>, String> {
        let (gl_context, gl) = create_gl_context(&self.video_subsystem, &self.window)?;
        self.gl_context = gl_context;
        self.gl = Arc::clone(&gl);
        Ok(gl)
    }

    /// Size of the window in screen coordinates.
    pub fn logical_size(&self) -> Vec2 {
        let (width, height) = self.window.size();
        Vec2::new(width as f32, height as f32)
    }

    /// Size of the drawable in pixels.
    pub fn drawable_size(&self) -> UVec2 {
        let (width, height) = self.window.drawable_size();
        UVec2::new(width, height)
    }

    /// Pixels per screen coordinate.
    pub fn device_pixel_ratio(&self) -> f32 {
        let logical = self.logical_size();
        if logical.x <= 0.0 {
            return 1.0;
        }
        self.drawable_size().x as f32 / logical.x
    }
}

fn create_gl_context(
    video_subsystem: &sdl2::VideoSubsystem,
    window: &sdl2::video::Window,
) -> Result<(sdl2::video::GLContext, Arc<glow::Context>), String> {
    let gl_context = window.gl_create_context()?;
    window.gl_make_current(&gl_context)?;
    if let Err(err) = video_subsystem.gl_set_swap_interval(sdl2::video::SwapInterval::VSync) {
        log::warn!("VSync unavailable: {err}");
    }
    let gl = unsafe {
        glow::Context::from_loader_function(|s| video_subsystem.gl_get_proc_address(s) as *const _)
    };
    Ok((gl_context, Arc::new(gl)))
}
