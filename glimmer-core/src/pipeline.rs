//! Draw sequencing.
//!
//! A scene is drawn either straight to the screen ([`Pipeline::SinglePass`]) or with the toon
//! outline technique ([`Pipeline::TwoPassOutline`]): the mesh is drawn twice off-screen, once
//! as a silhouette and once shaded, and an outline program composites both textures onto the
//! screen with a full-screen quad. The kind is fixed when the pipeline is built.

use std::rc::Rc;

use glam::{Mat4, UVec2};
use serde::Deserialize;

use crate::context::ProgramSources;
use crate::error::{RenderError, Result};
use crate::gpu::Gpu;
use crate::loader::MeshAsset;
use crate::resources::{
    CompiledProgram, OutlineTargets, POSITION_ATTRIBUTE, QUAD_ATTRIBUTE, ScreenQuad,
};
use crate::uniform::{RESOLUTION, UniformBindings, UniformSet};

pub const PROJECTION_MATRIX: &str = "uProjectionMatrix";
pub const MODEL_VIEW_MATRIX: &str = "uModelViewMatrix";
pub const NORMAL_MATRIX: &str = "uNormalMatrix";
/// `1` while drawing the silhouette, `0` while drawing the shaded scene.
pub const OUTLINE_PASS: &str = "uOutlinePass";
/// Composite sampler reading the silhouette.
pub const OUTLINE_SAMPLER: &str = "uOutline";
/// Composite sampler reading the shaded scene.
pub const SOURCE_SAMPLER: &str = "uSource";

pub const OUTLINE_TEXTURE_UNIT: u32 = 4;
pub const SOURCE_TEXTURE_UNIT: u32 = 5;

/// Uniforms the engine sets on every scene program.
pub const ENGINE_UNIFORMS: [&str; 4] =
    [PROJECTION_MATRIX, MODEL_VIEW_MATRIX, NORMAL_MATRIX, OUTLINE_PASS];

/// Which pipeline a scene uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    #[default]
    SinglePass,
    TwoPassOutline,
}

/// Matrices computed once per frame and shared by every pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameMatrices {
    pub projection: Mat4,
    pub model_view: Mat4,
    pub normal: Mat4,
}

impl FrameMatrices {
    fn upload<G: Gpu>(&self, program: &CompiledProgram<G>) {
        program.set_uniform(PROJECTION_MATRIX, &self.projection);
        program.set_uniform(MODEL_VIEW_MATRIX, &self.model_view);
        program.set_uniform(NORMAL_MATRIX, &self.normal);
    }
}

/// Everything one scene draw needs, borrowed from the render context for one frame.
pub struct SceneDraw<'a, G: Gpu> {
    pub program: &'a CompiledProgram<G>,
    pub bindings: &'a UniformBindings<G>,
    pub uniforms: &'a UniformSet,
    pub matrices: &'a FrameMatrices,
    /// `None` draws the full-screen quad instead.
    pub mesh: Option<&'a MeshAsset<G>>,
    pub quad: &'a ScreenQuad<G>,
}

impl<G: Gpu> SceneDraw<'_, G> {
    fn draw(&self, gpu: &G, outline_pass: Option<bool>) -> Result<()> {
        self.program.use_program();
        self.matrices.upload(self.program);
        self.bindings.upload(gpu, self.program, self.uniforms)?;
        if let Some(pass) = outline_pass {
            self.program.set_uniform(OUTLINE_PASS, pass);
        }
        match self.mesh {
            Some(mesh) => {
                mesh.bind_textures(self.program);
                mesh.draw(self.program);
            }
            None => self.quad.draw(self.program),
        }
        Ok(())
    }
}

/// The composite program and the two off-screen targets.
pub struct OutlinePass<G: Gpu> {
    program: CompiledProgram<G>,
    targets: OutlineTargets<G>,
}

impl<G: Gpu> OutlinePass<G> {
    pub fn new(gpu: &Rc<G>, sources: &ProgramSources, size: UVec2) -> Result<Self> {
        let program = CompiledProgram::compile(
            gpu,
            &sources.vertex,
            &sources.fragment,
            &[OUTLINE_SAMPLER, SOURCE_SAMPLER, RESOLUTION],
            &[QUAD_ATTRIBUTE, POSITION_ATTRIBUTE],
        )?;
        Ok(Self {
            program,
            targets: OutlineTargets::new(gpu, size)?,
        })
    }

    pub fn targets(&self) -> &OutlineTargets<G> {
        &self.targets
    }

    fn render(&self, gpu: &G, canvas: UVec2, scene: &SceneDraw<G>) -> Result<()> {
        self.targets.silhouette.bind();
        gpu.clear();
        scene.draw(gpu, Some(true))?;

        self.targets.color.bind();
        gpu.clear();
        scene.draw(gpu, Some(false))?;

        gpu.bind_framebuffer(None);
        gpu.viewport(canvas.x, canvas.y);
        gpu.clear();
        self.program.use_program();
        self.targets.silhouette.texture().bind(OUTLINE_TEXTURE_UNIT);
        self.program.set_uniform(OUTLINE_SAMPLER, OUTLINE_TEXTURE_UNIT as i32);
        self.targets.color.texture().bind(SOURCE_TEXTURE_UNIT);
        self.program.set_uniform(SOURCE_SAMPLER, SOURCE_TEXTURE_UNIT as i32);
        self.program.set_uniform(RESOLUTION, canvas.as_vec2());
        scene.quad.draw(&self.program);
        Ok(())
    }
}

/// How frames are drawn.
pub enum Pipeline<G: Gpu> {
    SinglePass,
    TwoPassOutline(OutlinePass<G>),
}

impl<G: Gpu> Pipeline<G> {
    /// Builds the pipeline for `kind`. The outline kind needs the composite program's sources.
    pub fn new(
        kind: PipelineKind,
        gpu: &Rc<G>,
        outline: Option<&ProgramSources>,
        canvas: UVec2,
    ) -> Result<Self> {
        match kind {
            PipelineKind::SinglePass => Ok(Pipeline::SinglePass),
            PipelineKind::TwoPassOutline => {
                let sources = outline.ok_or(RenderError::MissingProgram("outline"))?;
                Ok(Pipeline::TwoPassOutline(OutlinePass::new(gpu, sources, canvas)?))
            }
        }
    }

    pub fn kind(&self) -> PipelineKind {
        match self {
            Pipeline::SinglePass => PipelineKind::SinglePass,
            Pipeline::TwoPassOutline(_) => PipelineKind::TwoPassOutline,
        }
    }

    /// Matches the off-screen targets to the canvas. Programs are kept.
    pub fn resize(&mut self, gpu: &Rc<G>, canvas: UVec2) -> Result<()> {
        match self {
            Pipeline::SinglePass => Ok(()),
            Pipeline::TwoPassOutline(pass) => pass.targets.resize(gpu, canvas),
        }
    }

    /// Draws one frame to the screen.
    pub fn render(&self, gpu: &G, canvas: UVec2, scene: &SceneDraw<G>) -> Result<()> {
        match self {
            Pipeline::SinglePass => {
                gpu.bind_framebuffer(None);
                gpu.viewport(canvas.x, canvas.y);
                gpu.clear();
                scene.draw(gpu, None)
            }
            Pipeline::TwoPassOutline(pass) => pass.render(gpu, canvas, scene),
        }
    }
}
