//! This module contains the platform layer of the client,
//! including window and context setup and the OpenGL backend of the renderer.

pub mod app;
pub mod glow_gpu;

pub use app::*;
pub use glow_gpu::*;
