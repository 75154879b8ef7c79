//! Demo files.
//!
//! A demo wraps a scene configuration with the files the client needs to run it: which program
//! draws the scene and, optionally, which mesh to load. Relative paths are resolved against the
//! directory of the demo file.
//!
//! ```json
//! {
//!     "scene": { "name": "toon cube", "pipeline": "two_pass_outline" },
//!     "program": "toon",
//!     "mesh": { "obj": "../assets/cube.obj", "mtl": "../assets/cube.mtl" }
//! }
//! ```

use std::path::{Path, PathBuf};

use glimmer_core::loader::TextureSource;
use glimmer_core::{LoadRequest, ProgramSources, SceneConfig, SceneSources};
use indexmap::IndexMap;
use serde::Deserialize;

/// Programs compiled into the binary.
macro_rules! builtin_program {
    ($name:literal) => {
        ProgramSources {
            vertex: include_str!(concat!("render/shaders/", $name, "/vert.glsl")).to_string(),
            fragment: include_str!(concat!("render/shaders/", $name, "/frag.glsl")).to_string(),
        }
    };
}

/// Names accepted by `"program"`.
pub const BUILTIN_PROGRAMS: [&str; 2] = ["toon", "fractal"];

fn builtin(name: &str) -> Option<ProgramSources> {
    match name {
        "toon" => Some(builtin_program!("toon")),
        "fractal" => Some(builtin_program!("fractal")),
        _ => None,
    }
}

/// The composite program of the outline pipeline.
fn outline_program() -> ProgramSources {
    builtin_program!("outline")
}

/// Demo used when no file is given on the command line.
pub const DEFAULT_DEMO: &str = include_str!("../demos/toon_cube.json");

/// Where the scene program comes from.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ProgramRef {
    Builtin(String),
    Files { vertex: PathBuf, fragment: PathBuf },
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct MeshFiles {
    pub obj: PathBuf,
    #[serde(default)]
    pub mtl: Option<PathBuf>,
    /// Diffuse textures by material name, overriding the MTL file's `map_Kd`.
    #[serde(default)]
    pub textures: IndexMap<String, PathBuf>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DemoConfig {
    #[serde(default)]
    pub scene: SceneConfig,
    pub program: ProgramRef,
    #[serde(default)]
    pub mesh: Option<MeshFiles>,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl DemoConfig {
    pub fn from_json(json: &str, base_dir: impl Into<PathBuf>) -> Result<Self, String> {
        let mut config: Self =
            serde_json::from_str(json).map_err(|e| format!("invalid demo file: {e}"))?;
        config.scene.validate().map_err(|e| e.to_string())?;
        if let ProgramRef::Builtin(name) = &config.program
            && builtin(name).is_none()
        {
            return Err(format!(
                "unknown program '{name}', expected one of {BUILTIN_PROGRAMS:?}"
            ));
        }
        config.base_dir = base_dir.into();
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, String> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        Self::from_json(&json, base_dir)
    }

    /// The demo bundled with the client.
    pub fn embedded() -> Result<Self, String> {
        Self::from_json(
            DEFAULT_DEMO,
            concat!(env!("CARGO_MANIFEST_DIR"), "/demos"),
        )
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }

    /// Reads the program sources. File programs are read from disk on every call.
    pub fn sources(&self) -> Result<SceneSources, String> {
        let scene = match &self.program {
            ProgramRef::Builtin(name) => {
                builtin(name).ok_or_else(|| format!("unknown program '{name}'"))?
            }
            ProgramRef::Files { vertex, fragment } => {
                let read = |path: &Path| {
                    let path = self.resolve(path);
                    std::fs::read_to_string(&path)
                        .map_err(|e| format!("failed to read {}: {e}", path.display()))
                };
                ProgramSources {
                    vertex: read(vertex)?,
                    fragment: read(fragment)?,
                }
            }
        };
        Ok(SceneSources {
            scene,
            outline: Some(outline_program()),
        })
    }

    /// Whether [`DemoConfig::sources`] can return something new after a file changes.
    pub fn is_reloadable(&self) -> bool {
        matches!(self.program, ProgramRef::Files { .. })
    }

    pub fn mesh_request(&self) -> Option<LoadRequest> {
        let mesh = self.mesh.as_ref()?;
        let mut request =
            LoadRequest::from_paths(self.resolve(&mesh.obj), mesh.mtl.as_deref().map(|p| self.resolve(p)));
        for (material, path) in &mesh.textures {
            request = request.with_texture(material.clone(), TextureSource::Path(self.resolve(path)));
        }
        Some(request)
    }
}
