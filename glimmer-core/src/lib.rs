//! The core of the Glimmer renderer. This crate contains everything needed
//! to draw an interactive shader scene, such as transform math, the
//! interaction state machine, GPU resource ownership, uniform binding,
//! the draw pipelines and mesh loading.
//!
//! Nothing here talks to a graphics API directly. Every GPU call goes
//! through the [`gpu::Gpu`] trait, which the host implements for its
//! context.

pub mod config;
pub mod context;
pub mod error;
pub mod gpu;
pub mod interaction;
pub mod loader;
pub mod math;
pub mod obj;
pub mod pipeline;
pub mod resources;
pub mod uniform;

pub use config::SceneConfig;
pub use context::{FrameStatus, ProgramSources, RenderContext, SceneSources};
pub use error::{RenderError, Result};
pub use gpu::Gpu;
pub use interaction::{InteractionEvent, InteractionMode};
pub use loader::{LoadRequest, LoadToken, TextSource, TextureSource};
pub use pipeline::PipelineKind;
pub use uniform::{UniformDescriptor, UniformKind, UniformSet, UniformValue};
