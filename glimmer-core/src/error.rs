//! Error types shared by every part of the engine.
//!
//! All fallible operations return [`Result<T>`], an alias for
//! `std::result::Result<T, RenderError>`. How each variant is handled (fatal to one program,
//! recovered locally, surfaced to the requester) is decided by the caller, the variants only
//! describe what went wrong.

use thiserror::Error;

use crate::gpu::ShaderStage;
use crate::uniform::UniformKind;

/// Shorthand for results produced by the engine.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Everything that can go wrong while loading, building or drawing a scene.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A vertex or fragment stage failed to compile.
    #[error("{stage} shader failed to compile: {log}")]
    ShaderCompile {
        stage: ShaderStage,
        shader_source: String,
        log: String,
    },

    /// The compiled stages could not be linked into a program.
    #[error("shader program failed to link: {log}")]
    ShaderLink { log: String },

    /// The scene needs a program whose sources were not provided.
    #[error("scene needs a {0} program but no sources were given")]
    MissingProgram(&'static str),

    /// A matrix could not be inverted.
    #[error("matrix is singular (determinant {determinant})")]
    MatrixSingular { determinant: f32 },

    /// `look_at` was given an eye equal to its target, or an up vector parallel to the view.
    #[error("degenerate look-at: {0}")]
    DegenerateLookAt(&'static str),

    /// The OBJ or MTL text is malformed.
    #[error("mesh parse error on line {line}: {reason}")]
    MeshParse { line: usize, reason: String },

    /// Parsed geometry violates a buffer invariant (index range, attribute lengths).
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    /// A diffuse texture could not be read or decoded.
    #[error("texture for material '{material}' failed to load: {reason}")]
    TextureLoad { material: String, reason: String },

    /// The graphics API refused to create an object.
    #[error("GPU resource error: {0}")]
    Resource(String),

    #[error("unknown uniform '{0}'")]
    UnknownUniform(String),

    #[error("uniform '{name}' is {expected:?} but got a {found:?} value")]
    UniformKindMismatch {
        name: String,
        expected: UniformKind,
        found: UniformKind,
    },

    #[error("uniform '{0}' is read-only")]
    ReadonlyUniform(String),

    #[error("uniform '{0}' is declared more than once")]
    DuplicateUniform(String),

    /// Uniform locations were resolved against a different program than the one in use.
    #[error("uniform bindings belong to another program")]
    StaleBindings,

    /// A mesh load was requested while another one is still in flight.
    #[error("a mesh load is already in flight for this canvas")]
    LoadInFlight,

    #[error("invalid scene configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Returns `true` for errors that make a program unusable for the rest of its lifetime.
    pub fn is_fatal_to_program(&self) -> bool {
        matches!(
            self,
            RenderError::ShaderCompile { .. } | RenderError::ShaderLink { .. }
        )
    }
}
