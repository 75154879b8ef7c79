//! The render context: all state of one canvas, driven one frame at a time.
//!
//! A host creates a [`RenderContext`] with a [`Gpu`], a [`SceneConfig`] and the shader sources,
//! then calls [`RenderContext::frame`] from its frame loop. Input, resizes and mesh requests may
//! arrive between frames; they are recorded and take effect at the start of the next frame.

use std::rc::Rc;

use glam::{UVec2, Vec2, Vec3};

use crate::config::{ROTATION, SCALE, SceneConfig, TRANSLATION};
use crate::error::{RenderError, Result};
use crate::gpu::Gpu;
use crate::interaction::{CameraPath, InteractionEvent, InteractionState};
use crate::loader::{DIFFUSE_UNIFORMS, LoadRequest, LoadToken, LoaderEvent, MeshAsset, MeshLoader};
use crate::math::{self, CameraSettings, Transform};
use crate::pipeline::{ENGINE_UNIFORMS, FrameMatrices, Pipeline, PipelineKind, SceneDraw};
use crate::resources::{CompiledProgram, MESH_ATTRIBUTES, QUAD_ATTRIBUTE, ScreenQuad};
use crate::uniform::{FrameInputs, UniformBindings, UniformSet};

/// Vertex and fragment source of one program.
#[derive(Clone, Debug)]
pub struct ProgramSources {
    pub vertex: String,
    pub fragment: String,
}

impl ProgramSources {
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }
}

/// The programs of a scene.
#[derive(Clone, Debug)]
pub struct SceneSources {
    pub scene: ProgramSources,
    /// Composite program, required by [`PipelineKind::TwoPassOutline`].
    pub outline: Option<ProgramSources>,
}

/// What a call to [`RenderContext::frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Drawn,
    /// A mesh was requested and is not ready yet. The screen was cleared.
    WaitingForMesh,
    /// The context is lost. Nothing is drawn until it comes back.
    ContextLost,
    /// A program failed to build. The scene draws nothing.
    Failed,
}

/// GPU objects that are rebuilt together after a context loss.
struct GpuState<G: Gpu> {
    program: CompiledProgram<G>,
    bindings: UniformBindings<G>,
    quad: ScreenQuad<G>,
    pipeline: Pipeline<G>,
}

/// Canvas ids handed to mesh loaders, so tokens from different canvases never compare equal.
static NEXT_CANVAS: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);

pub struct RenderContext<G: Gpu> {
    gpu: Rc<G>,
    kind: PipelineKind,
    camera: CameraSettings,
    auto_rotate: Vec3,
    spin: Vec3,
    sources: SceneSources,
    uniforms: UniformSet,
    interaction: InteractionState,
    loader: MeshLoader<G>,
    mesh_expected: bool,
    state: Option<GpuState<G>>,
    failure: Option<RenderError>,
    canvas: UVec2,
    pending_resize: Option<UVec2>,
}

impl<G: Gpu> RenderContext<G> {
    /// Builds every GPU object of the scene for a canvas of `canvas` device pixels.
    ///
    /// A program that fails to compile or link does not make this fail: the error is kept in
    /// [`RenderContext::failure`] and every frame reports [`FrameStatus::Failed`].
    pub fn new(gpu: Rc<G>, config: &SceneConfig, sources: SceneSources, canvas: UVec2) -> Result<Self> {
        let uniforms = config.uniform_set()?;
        let rotation = uniforms.vec3(ROTATION).map(math::radians).unwrap_or(Vec3::ZERO);
        let canvas = canvas.max(UVec2::ONE);
        let mut interaction = InteractionState::new(config.interaction, rotation);
        interaction.resize(canvas.as_vec2());
        let canvas_id = NEXT_CANVAS.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let mut context = Self {
            gpu,
            kind: config.pipeline,
            camera: config.camera,
            auto_rotate: config.auto_rotate,
            spin: Vec3::ZERO,
            sources,
            uniforms,
            interaction,
            loader: MeshLoader::new(canvas_id),
            mesh_expected: false,
            state: None,
            failure: None,
            canvas,
            pending_resize: None,
        };
        context.rebuild()?;
        log::info!(
            "Scene '{}' ready: {:?}, {}x{}",
            config.name,
            context.kind,
            canvas.x,
            canvas.y
        );
        Ok(context)
    }

    fn build_state(&self) -> Result<GpuState<G>> {
        self.gpu.init_state();
        let mut uniform_names: Vec<&str> = ENGINE_UNIFORMS.to_vec();
        uniform_names.extend(DIFFUSE_UNIFORMS);
        uniform_names.extend(self.uniforms.names());
        let mut attributes: Vec<&str> = MESH_ATTRIBUTES.to_vec();
        attributes.push(QUAD_ATTRIBUTE);

        let scene = &self.sources.scene;
        let program = CompiledProgram::compile(
            &self.gpu,
            &scene.vertex,
            &scene.fragment,
            &uniform_names,
            &attributes,
        )?;
        let bindings = UniformBindings::resolve(&program, &self.uniforms);
        let quad = ScreenQuad::new(&self.gpu)?;
        let pipeline = Pipeline::new(self.kind, &self.gpu, self.sources.outline.as_ref(), self.canvas)?;
        Ok(GpuState {
            program,
            bindings,
            quad,
            pipeline,
        })
    }

    /// Builds the GPU state from scratch. Program errors are recorded, not returned.
    fn rebuild(&mut self) -> Result<()> {
        self.state = None;
        self.failure = None;
        match self.build_state() {
            Ok(state) => self.state = Some(state),
            Err(err) if err.is_fatal_to_program() => {
                log::error!("Scene disabled: {err}");
                self.failure = Some(err);
                return Ok(());
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    pub fn gpu(&self) -> &Rc<G> {
        &self.gpu
    }

    pub fn canvas_size(&self) -> UVec2 {
        self.canvas
    }

    pub fn pipeline_kind(&self) -> PipelineKind {
        self.kind
    }

    /// The program error that disabled the scene, if any.
    pub fn failure(&self) -> Option<&RenderError> {
        self.failure.as_ref()
    }

    pub fn uniforms(&self) -> &UniformSet {
        &self.uniforms
    }

    /// Uniforms for UI controls to edit. Changes are uploaded with the next frame.
    pub fn uniforms_mut(&mut self) -> &mut UniformSet {
        &mut self.uniforms
    }

    pub fn interaction(&self) -> &InteractionState {
        &self.interaction
    }

    pub fn mesh_loader(&self) -> &MeshLoader<G> {
        &self.loader
    }

    pub fn handle_input(&mut self, event: InteractionEvent) {
        self.interaction.handle_event(event);
    }

    /// Queues a resize to `logical` size times `device_pixel_ratio`, applied at the next frame.
    pub fn resize(&mut self, logical: Vec2, device_pixel_ratio: f32) {
        let ratio = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        let size = (logical * ratio).round().max(Vec2::ONE).as_uvec2();
        self.pending_resize = Some(size);
    }

    /// Starts loading a mesh. Until it is ready, frames report [`FrameStatus::WaitingForMesh`].
    pub fn request_mesh(&mut self, request: LoadRequest) -> Result<LoadToken> {
        let token = self.loader.request(request)?;
        self.mesh_expected = true;
        Ok(token)
    }

    /// Abandons the mesh request in flight. A mesh that finished earlier stays on screen.
    pub fn cancel_mesh(&mut self) {
        self.loader.cancel();
        self.mesh_expected = self.loader.asset().is_some_and(MeshAsset::is_ready);
    }

    /// Replaces the scene programs, recompiling them and resolving the uniforms again.
    pub fn reload_sources(&mut self, sources: SceneSources) -> Result<()> {
        self.sources = sources;
        self.rebuild()?;
        log::info!("Reloaded scene programs");
        Ok(())
    }

    fn apply_resize(&mut self) -> Result<()> {
        let Some(size) = self.pending_resize.take() else {
            return Ok(());
        };
        if size == self.canvas {
            return Ok(());
        }
        if let Some(state) = self.state.as_mut() {
            state.pipeline.resize(&self.gpu, size)?;
        }
        self.canvas = size;
        self.interaction.resize(size.as_vec2());
        log::info!("Canvas resized to {}x{}", size.x, size.y);
        Ok(())
    }

    fn drain_loader(&mut self) {
        for event in self.loader.poll(&self.gpu) {
            match event {
                LoaderEvent::GeometryReady {
                    token,
                    vertices,
                    triangles,
                } => log::info!("Mesh {token:?}: {vertices} vertices, {triangles} triangles"),
                LoaderEvent::SlotResolved { token, slot, state } => {
                    log::debug!("Mesh {token:?}: material slot {slot} {state:?}")
                }
                LoaderEvent::MeshReady { .. } => {}
                LoaderEvent::Failed { token, error } => {
                    log::error!("Mesh {token:?} will not be drawn: {error}")
                }
            }
        }
    }

    fn release_gpu(&mut self) {
        if self.state.take().is_some() {
            log::warn!("Graphics context lost, releasing GPU resources");
        }
        self.loader.release_gpu();
    }

    fn matrices(&self) -> FrameMatrices {
        let aspect = self.canvas.x as f32 / self.canvas.y as f32;
        let projection = math::perspective(
            self.camera.fov_degrees,
            aspect,
            self.camera.near,
            self.camera.far,
        );

        let (view, rotation) = match self.interaction.camera_path() {
            CameraPath::FixedRotation(rotation) => (math::camera_view(&self.camera), rotation),
            CameraPath::CursorLookAt { yaw, pitch } => {
                let rotation = self
                    .uniforms
                    .vec3(ROTATION)
                    .map(math::radians)
                    .unwrap_or(Vec3::ZERO);
                let view = math::look_at_angles(&self.camera, yaw, pitch)
                    .or_else(|_| math::camera_view(&self.camera));
                (view, rotation)
            }
        };
        let view = view.unwrap_or_else(|err| {
            log::warn!("Using identity view: {err}");
            math::identity()
        });

        let transform = Transform {
            translation: self.uniforms.vec3(TRANSLATION).unwrap_or(Vec3::ZERO),
            rotation: rotation + self.spin,
            scale: Vec3::splat(self.uniforms.scalar(SCALE).unwrap_or(1.0)),
        };
        let model_view = math::apply_transform(view, &transform);
        FrameMatrices {
            projection,
            model_view,
            normal: math::normal_matrix(&model_view),
        }
    }

    /// Advances and draws one frame. `elapsed` is seconds since the scene started.
    pub fn frame(&mut self, elapsed: f32) -> Result<FrameStatus> {
        if self.gpu.is_context_lost() {
            self.release_gpu();
            return Ok(FrameStatus::ContextLost);
        }
        if self.state.is_none() && self.failure.is_none() {
            log::info!("Graphics context restored, rebuilding");
            self.rebuild()?;
            self.loader.restore_gpu(&self.gpu)?;
        }
        if self.failure.is_some() {
            return Ok(FrameStatus::Failed);
        }

        self.apply_resize()?;
        self.drain_loader();

        self.interaction.update();
        self.spin += self.auto_rotate;
        self.uniforms.apply_frame(&FrameInputs {
            elapsed,
            resolution: self.canvas.as_vec2(),
            mouse: self.interaction.mouse_uniform(),
        });
        let matrices = self.matrices();

        let Some(state) = self.state.as_ref() else {
            return Ok(FrameStatus::ContextLost);
        };
        let mesh = self.loader.asset().filter(|a| a.is_ready());
        if self.mesh_expected && mesh.is_none() {
            self.gpu.bind_framebuffer(None);
            self.gpu.viewport(self.canvas.x, self.canvas.y);
            self.gpu.clear();
            return Ok(FrameStatus::WaitingForMesh);
        }

        let scene = SceneDraw {
            program: &state.program,
            bindings: &state.bindings,
            uniforms: &self.uniforms,
            matrices: &matrices,
            mesh,
            quad: &state.quad,
        };
        state.pipeline.render(&self.gpu, self.canvas, &scene)?;
        Ok(FrameStatus::Drawn)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::thread;
    use std::time::{Duration, Instant};

    use image::{ImageFormat, Rgba, RgbaImage};

    use super::*;
    use crate::gpu::Topology;
    use crate::gpu::recording::{Call, RecordingGpu, Value};
    use crate::loader::{SlotState, TextSource, TextureSource};
    use crate::obj::tests::{TWO_MATERIAL_MTL, TWO_MATERIAL_OBJ, UNIT_CUBE};
    use crate::pipeline::{OUTLINE_PASS, OUTLINE_TEXTURE_UNIT, SOURCE_TEXTURE_UNIT};
    use crate::uniform::TIME;

    const PASS_THROUGH: &str = "void main() { gl_Position = vec4(aBaseVertexPosition, 0.0, 1.0); }";

    fn sources(outline: bool) -> SceneSources {
        SceneSources {
            scene: ProgramSources::new(PASS_THROUGH, "void main() {}"),
            outline: outline.then(|| ProgramSources::new(PASS_THROUGH, "void main() {}")),
        }
    }

    fn outline_config() -> SceneConfig {
        SceneConfig {
            pipeline: PipelineKind::TwoPassOutline,
            ..Default::default()
        }
    }

    fn png() -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        RgbaImage::from_pixel(4, 4, Rgba([200, 120, 40, 255]))
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    fn wait_for_mesh(context: &mut RenderContext<RecordingGpu>) {
        let start = Instant::now();
        while context.frame(0.0).unwrap() == FrameStatus::WaitingForMesh {
            assert!(start.elapsed() < Duration::from_secs(10), "mesh never loaded");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn fragment_only_scene_draws_one_quad() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut context = RenderContext::new(
            Rc::clone(&gpu),
            &SceneConfig::default(),
            sources(false),
            UVec2::new(256, 256),
        )
        .unwrap();
        gpu.take_calls();

        assert_eq!(context.frame(0.0).unwrap(), FrameStatus::Drawn);
        assert_eq!(
            gpu.draw_calls(),
            vec![Call::DrawArrays {
                topology: Topology::TriangleStrip,
                first: 0,
                count: 4
            }]
        );
        assert!(gpu.calls().contains(&Call::Viewport(256, 256)));
        assert_eq!(gpu.uniform_writes(TIME), vec![Value::F32(0.0)]);
        assert!(gpu.live_framebuffers().is_empty());
    }

    #[test]
    fn outline_cube_resize_recreates_targets_before_drawing() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut context =
            RenderContext::new(Rc::clone(&gpu), &outline_config(), sources(true), UVec2::new(256, 256))
                .unwrap();
        context
            .request_mesh(LoadRequest::new(TextSource::Inline(UNIT_CUBE.to_string())))
            .unwrap();
        wait_for_mesh(&mut context);

        context.resize(Vec2::new(256.0, 256.0), 2.0);
        let live = gpu.live_framebuffers();
        assert!(live.iter().all(|(_, size)| *size == (256, 256)));
        gpu.take_calls();

        assert_eq!(context.frame(0.5).unwrap(), FrameStatus::Drawn);
        let live = gpu.live_framebuffers();
        assert_eq!(live.len(), 2);
        assert!(live.iter().all(|(_, size)| *size == (512, 512)));

        let calls = gpu.calls();
        let first_draw = calls.iter().position(Call::is_draw).unwrap();
        let framebuffer_binds: Vec<_> = calls[..first_draw]
            .iter()
            .filter(|c| matches!(c, Call::BindFramebuffer(Some(_))))
            .collect();
        assert_eq!(framebuffer_binds.len(), 1);
        assert!(calls[..first_draw].contains(&Call::Viewport(512, 512)));

        assert_eq!(
            gpu.draw_calls(),
            vec![
                Call::DrawElements {
                    topology: Topology::Triangles,
                    count: 36
                },
                Call::DrawElements {
                    topology: Topology::Triangles,
                    count: 36
                },
                Call::DrawArrays {
                    topology: Topology::TriangleStrip,
                    first: 0,
                    count: 4
                },
            ]
        );
        assert_eq!(
            gpu.uniform_writes(OUTLINE_PASS),
            vec![Value::I32(1), Value::I32(0)]
        );

        let screen = calls
            .iter()
            .rposition(|c| *c == Call::BindFramebuffer(None))
            .unwrap();
        let composite_units: Vec<u32> = calls[screen..]
            .iter()
            .filter_map(|c| match c {
                Call::BindTexture {
                    unit,
                    texture: Some(_),
                } => Some(*unit),
                _ => None,
            })
            .collect();
        assert_eq!(composite_units, vec![OUTLINE_TEXTURE_UNIT, SOURCE_TEXTURE_UNIT]);
        assert!(calls[screen..].contains(&Call::Viewport(512, 512)));
    }

    #[test]
    fn repeated_resizes_leave_two_targets_at_the_last_size() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut context =
            RenderContext::new(Rc::clone(&gpu), &outline_config(), sources(true), UVec2::new(100, 100))
                .unwrap();
        for step in 1..=10u32 {
            context.resize(Vec2::new(100.0 + step as f32 * 10.0, 80.0), 1.0);
            if step % 3 == 0 {
                context.frame(step as f32).unwrap();
            }
        }
        context.frame(11.0).unwrap();
        let live = gpu.live_framebuffers();
        assert_eq!(live.len(), 2);
        assert!(live.iter().all(|(_, size)| *size == (200, 80)));
        assert_eq!(gpu.live_textures(), 2);
        assert_eq!(gpu.live_renderbuffers(), 2);
        assert_eq!(context.canvas_size(), UVec2::new(200, 80));
    }

    #[test]
    fn mesh_with_two_materials_waits_for_both_slots() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut context =
            RenderContext::new(Rc::clone(&gpu), &outline_config(), sources(true), UVec2::new(64, 64))
                .unwrap();
        context
            .request_mesh(
                LoadRequest::new(TextSource::Inline(TWO_MATERIAL_OBJ.to_string()))
                    .with_mtl(TextSource::Inline(TWO_MATERIAL_MTL.to_string()))
                    .with_texture("material_0.001", TextureSource::Bytes(png())),
            )
            .unwrap();
        gpu.take_calls();
        assert_eq!(context.frame(0.0).unwrap(), FrameStatus::WaitingForMesh);
        assert!(gpu.draw_calls().is_empty());

        wait_for_mesh(&mut context);
        let asset = context.mesh_loader().asset().unwrap();
        assert!(asset.is_ready());
        assert_eq!(asset.slot_states(), vec![SlotState::Bound, SlotState::Fallback]);
        assert_eq!(gpu.draw_calls().len(), 3);
    }

    #[test]
    fn cancelled_mesh_falls_back_to_the_quad() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut context =
            RenderContext::new(Rc::clone(&gpu), &SceneConfig::default(), sources(false), UVec2::new(32, 32))
                .unwrap();
        context
            .request_mesh(LoadRequest::new(TextSource::Inline(UNIT_CUBE.to_string())))
            .unwrap();
        context.cancel_mesh();
        assert!(!context.mesh_loader().is_in_flight());

        thread::sleep(Duration::from_millis(50));
        gpu.take_calls();
        assert_eq!(context.frame(0.0).unwrap(), FrameStatus::Drawn);
        assert!(context.mesh_loader().asset().is_none());
        assert_eq!(
            gpu.draw_calls(),
            vec![Call::DrawArrays {
                topology: Topology::TriangleStrip,
                first: 0,
                count: 4
            }]
        );
    }

    #[test]
    fn cancel_between_parse_and_decode_draws_the_quad() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut context =
            RenderContext::new(Rc::clone(&gpu), &SceneConfig::default(), sources(false), UVec2::new(32, 32))
                .unwrap();
        context
            .request_mesh(
                LoadRequest::new(TextSource::Inline(TWO_MATERIAL_OBJ.to_string()))
                    .with_mtl(TextSource::Inline(TWO_MATERIAL_MTL.to_string()))
                    .with_texture("material_0.001", TextureSource::Bytes(png())),
            )
            .unwrap();
        let start = Instant::now();
        while context.mesh_loader().pending_asset().is_none() {
            assert_eq!(context.frame(0.0).unwrap(), FrameStatus::WaitingForMesh);
            assert!(start.elapsed() < Duration::from_secs(10), "mesh never parsed");
            thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(
            context.mesh_loader().pending_asset().unwrap().slot_states(),
            vec![SlotState::Pending, SlotState::Fallback]
        );

        context.cancel_mesh();
        thread::sleep(Duration::from_millis(50));
        for step in 0..3 {
            gpu.take_calls();
            assert_eq!(context.frame(step as f32).unwrap(), FrameStatus::Drawn);
            assert_eq!(
                gpu.draw_calls(),
                vec![Call::DrawArrays {
                    topology: Topology::TriangleStrip,
                    first: 0,
                    count: 4
                }]
            );
        }
        assert!(context.mesh_loader().asset().is_none());
        // Only the screen quad is left.
        assert_eq!(gpu.live_buffers(), 1);
        assert_eq!(gpu.live_textures(), 0);
    }

    #[test]
    fn ready_mesh_keeps_drawing_while_the_next_one_loads() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut context =
            RenderContext::new(Rc::clone(&gpu), &SceneConfig::default(), sources(false), UVec2::new(32, 32))
                .unwrap();
        context
            .request_mesh(LoadRequest::new(TextSource::Inline(UNIT_CUBE.to_string())))
            .unwrap();
        wait_for_mesh(&mut context);

        let second = context
            .request_mesh(
                LoadRequest::new(TextSource::Inline(TWO_MATERIAL_OBJ.to_string()))
                    .with_mtl(TextSource::Inline(TWO_MATERIAL_MTL.to_string()))
                    .with_texture("material_0.001", TextureSource::Bytes(png())),
            )
            .unwrap();
        let start = Instant::now();
        while context.mesh_loader().asset().map(|a| a.token()) != Some(second) {
            gpu.take_calls();
            assert_eq!(context.frame(0.0).unwrap(), FrameStatus::Drawn);
            let draws = gpu.draw_calls();
            assert_eq!(draws.len(), 1);
            assert!(matches!(draws[0], Call::DrawElements { .. }));
            assert!(start.elapsed() < Duration::from_secs(10), "second mesh never loaded");
            thread::sleep(Duration::from_millis(2));
        }

        gpu.take_calls();
        assert_eq!(context.frame(1.0).unwrap(), FrameStatus::Drawn);
        assert_eq!(
            gpu.draw_calls(),
            vec![Call::DrawElements {
                topology: Topology::Triangles,
                count: 6
            }]
        );
    }

    #[test]
    fn compile_error_disables_the_scene() {
        let gpu = Rc::new(RecordingGpu::new());
        let broken = SceneSources {
            scene: ProgramSources::new(PASS_THROUGH, "#error broken"),
            outline: None,
        };
        let mut context =
            RenderContext::new(Rc::clone(&gpu), &SceneConfig::default(), broken, UVec2::new(32, 32))
                .unwrap();
        assert!(matches!(
            context.failure(),
            Some(RenderError::ShaderCompile { .. })
        ));
        gpu.take_calls();
        assert_eq!(context.frame(0.0).unwrap(), FrameStatus::Failed);
        assert!(gpu.draw_calls().is_empty());

        context.reload_sources(sources(false)).unwrap();
        assert!(context.failure().is_none());
        assert_eq!(context.frame(0.1).unwrap(), FrameStatus::Drawn);
    }

    #[test]
    fn outline_without_composite_program_is_rejected() {
        let gpu = Rc::new(RecordingGpu::new());
        let result = RenderContext::new(gpu, &outline_config(), sources(false), UVec2::new(8, 8));
        assert!(matches!(result, Err(RenderError::MissingProgram("outline"))));
    }

    #[test]
    fn context_loss_releases_and_rebuilds_everything() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut context =
            RenderContext::new(Rc::clone(&gpu), &outline_config(), sources(true), UVec2::new(64, 64))
                .unwrap();
        context
            .request_mesh(LoadRequest::new(TextSource::Inline(UNIT_CUBE.to_string())))
            .unwrap();
        wait_for_mesh(&mut context);
        assert_eq!(gpu.live_programs(), 2);

        gpu.set_context_lost(true);
        assert_eq!(context.frame(1.0).unwrap(), FrameStatus::ContextLost);
        assert_eq!(gpu.live_programs(), 0);
        assert_eq!(gpu.live_buffers(), 0);
        assert!(gpu.live_framebuffers().is_empty());

        gpu.set_context_lost(false);
        gpu.take_calls();
        assert_eq!(context.frame(2.0).unwrap(), FrameStatus::Drawn);
        assert_eq!(gpu.live_programs(), 2);
        // Quad plus six mesh buffers.
        assert_eq!(gpu.live_buffers(), 7);
        assert_eq!(gpu.live_framebuffers().len(), 2);
        assert_eq!(gpu.draw_calls().len(), 3);
        assert_eq!(gpu.calls()[0], Call::InitState);
        assert_eq!(gpu.invalid_deletes(), 0);
    }

    #[test]
    fn failed_resize_keeps_the_old_canvas() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut context =
            RenderContext::new(Rc::clone(&gpu), &outline_config(), sources(true), UVec2::new(64, 64))
                .unwrap();
        gpu.set_framebuffer_budget(Some(1));
        context.resize(Vec2::new(128.0, 128.0), 1.0);
        assert!(matches!(context.frame(0.0), Err(RenderError::Resource(_))));
        assert_eq!(context.canvas_size(), UVec2::new(64, 64));
        let live = gpu.live_framebuffers();
        assert_eq!(live.len(), 2);
        assert!(live.iter().all(|(_, size)| *size == (64, 64)));

        gpu.set_framebuffer_budget(None);
        assert_eq!(context.frame(0.1).unwrap(), FrameStatus::Drawn);
        assert_eq!(context.canvas_size(), UVec2::new(64, 64));

        context.resize(Vec2::new(128.0, 128.0), 1.0);
        assert_eq!(context.frame(0.2).unwrap(), FrameStatus::Drawn);
        assert!(gpu.live_framebuffers().iter().all(|(_, size)| *size == (128, 128)));
    }

    #[test]
    fn resize_uses_device_pixels() {
        let gpu = Rc::new(RecordingGpu::new());
        let mut context =
            RenderContext::new(gpu, &SceneConfig::default(), sources(false), UVec2::new(10, 10))
                .unwrap();
        context.resize(Vec2::new(300.5, 200.0), 1.5);
        assert_eq!(context.canvas_size(), UVec2::new(10, 10));
        context.frame(0.0).unwrap();
        assert_eq!(context.canvas_size(), UVec2::new(451, 300));
        assert_eq!(
            context.uniforms().value(crate::uniform::RESOLUTION),
            Some(crate::uniform::UniformValue::Vec2(Vec2::new(451.0, 300.0)))
        );
    }
}
