use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use glimmer_core::{FrameStatus, RenderContext};
use sdl2::event::{Event, WindowEvent};
use sdl2::keyboard::Keycode;

use crate::{abs::*, config::DemoConfig, input::InputMapper};

mod abs;
mod config;
mod input;
mod logging;

fn main() {
    if let Err(err) = logging::init() {
        eprintln!("Failed to set up logging: {err}");
    }
    if let Err(err) = run() {
        log::error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let demo = match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => DemoConfig::from_path(&path)?,
        None => DemoConfig::embedded()?,
    };
    let title = if demo.scene.name.is_empty() {
        "Glimmer".to_string()
    } else {
        format!("Glimmer - {}", demo.scene.name)
    };

    let mut app = App::new(&title, 1280, 720)?;
    let gpu = Rc::new(GlowGpu::new(&app.gl));
    let mut context = RenderContext::new(
        Rc::clone(&gpu),
        &demo.scene,
        demo.sources()?,
        app.drawable_size(),
    )
    .map_err(|e| e.to_string())?;
    if let Some(request) = demo.mesh_request() {
        context.request_mesh(request).map_err(|e| e.to_string())?;
    }

    let mut input = InputMapper::new(app.device_pixel_ratio(), app.drawable_size().as_vec2());
    let start = Instant::now();
    let mut last_status = None;

    'running: loop {
        let events: Vec<Event> = app.event_pump.poll_iter().collect();
        for event in events {
            match event {
                Event::Quit { .. }
                | Event::KeyDown {
                    keycode: Some(Keycode::Escape),
                    ..
                } => break 'running,
                Event::Window {
                    win_event: WindowEvent::SizeChanged(..),
                    ..
                } => {
                    let ratio = app.device_pixel_ratio();
                    input.resize(ratio, app.drawable_size().as_vec2());
                    context.resize(app.logical_size(), ratio);
                }
                Event::KeyDown {
                    keycode: Some(Keycode::R),
                    repeat: false,
                    ..
                } if demo.is_reloadable() => match demo.sources() {
                    Ok(sources) => context.reload_sources(sources).map_err(|e| e.to_string())?,
                    Err(err) => log::error!("Reload failed: {err}"),
                },
                Event::KeyDown {
                    keycode: Some(Keycode::Backspace),
                    repeat: false,
                    ..
                } => context.uniforms_mut().reset_all(),
                Event::ControllerDeviceAdded { which, .. } => {
                    match app.controller_subsystem.open(which) {
                        Ok(controller) => {
                            if let Some(event) = input.controller_added(controller) {
                                context.handle_input(event);
                            }
                        }
                        Err(err) => log::warn!("Failed to open controller {which}: {err}"),
                    }
                }
                Event::ControllerDeviceRemoved { which, .. } => {
                    if let Some(event) = input.controller_removed(which) {
                        context.handle_input(event);
                    }
                }
                ref other => {
                    if let Some(event) = input.translate(other) {
                        context.handle_input(event);
                    }
                }
            }
        }

        let status = context
            .frame(start.elapsed().as_secs_f32())
            .map_err(|e| e.to_string())?;
        if last_status != Some(status) {
            match status {
                FrameStatus::Drawn => log::debug!("Drawing"),
                FrameStatus::WaitingForMesh => log::info!("Waiting for the mesh"),
                FrameStatus::ContextLost => log::warn!("Waiting for the graphics context"),
                FrameStatus::Failed => {
                    let reason = context.failure().map(ToString::to_string).unwrap_or_default();
                    log::error!("Scene cannot be drawn: {reason}");
                }
            }
            last_status = Some(status);
        }
        if status == FrameStatus::ContextLost {
            let gl = app.recreate_gl_context()?;
            gpu.replace_context(&gl);
        }
        app.window.gl_swap_window();
    }

    Ok(())
}
