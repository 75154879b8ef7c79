//! Off-thread mesh loading.
//!
//! [`MeshLoader::request`] parses OBJ and MTL text on a worker thread. The render thread picks
//! the result up in [`MeshLoader::poll`], uploads the geometry, and decodes the diffuse textures
//! on the `rayon` pool. Every message carries the [`LoadToken`] of the request that produced it,
//! so results of cancelled or superseded requests are dropped on receipt.
//!
//! The mesh is ready to draw once every material slot has either a decoded texture or a
//! fallback color.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;

use glam::Vec3;
use image::{Rgba, RgbaImage};
use indexmap::IndexMap;

use crate::error::{RenderError, Result};
use crate::gpu::Gpu;
use crate::obj::{MaterialDescriptor, MeshData};
use crate::resources::{BoundTexture, CompiledProgram, GeometryBuffers};

/// Materials past this many get no texture.
pub const MAX_MATERIAL_SLOTS: usize = 2;

/// Sampler uniforms of the material slots, in slot order.
pub const DIFFUSE_UNIFORMS: [&str; MAX_MATERIAL_SLOTS] = ["uDiffuse0", "uDiffuse1"];

/// Text that is either already in memory or read by the worker.
#[derive(Clone, Debug)]
pub enum TextSource {
    Inline(String),
    Path(PathBuf),
}

impl TextSource {
    fn read(&self) -> Result<String> {
        match self {
            TextSource::Inline(text) => Ok(text.clone()),
            TextSource::Path(path) => Ok(std::fs::read_to_string(path)?),
        }
    }
}

/// Encoded image bytes, or a file to read them from.
#[derive(Clone, Debug)]
pub enum TextureSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// Everything needed to load one mesh.
#[derive(Clone, Debug)]
pub struct LoadRequest {
    pub obj: TextSource,
    pub mtl: Option<TextSource>,
    /// Diffuse textures keyed by material name. These win over `map_Kd` paths.
    pub textures: IndexMap<String, TextureSource>,
    /// Directory `map_Kd` paths are resolved against. Without it they are ignored.
    pub texture_dir: Option<PathBuf>,
}

impl LoadRequest {
    pub fn new(obj: TextSource) -> Self {
        Self {
            obj,
            mtl: None,
            textures: IndexMap::new(),
            texture_dir: None,
        }
    }

    /// Loads `obj` and, if given, `mtl` from disk, with textures next to the MTL file.
    pub fn from_paths(obj: impl Into<PathBuf>, mtl: Option<PathBuf>) -> Self {
        let texture_dir = mtl.as_deref().and_then(Path::parent).map(Path::to_path_buf);
        Self {
            obj: TextSource::Path(obj.into()),
            mtl: mtl.map(TextSource::Path),
            textures: IndexMap::new(),
            texture_dir,
        }
    }

    pub fn with_mtl(mut self, mtl: TextSource) -> Self {
        self.mtl = Some(mtl);
        self
    }

    pub fn with_texture(mut self, material: impl Into<String>, source: TextureSource) -> Self {
        self.textures.insert(material.into(), source);
        self
    }

    fn texture_for(&self, material: &MaterialDescriptor) -> Option<TextureSource> {
        if let Some(source) = self.textures.get(&material.name) {
            return Some(source.clone());
        }
        let dir = self.texture_dir.as_ref()?;
        let file = material.diffuse_map.as_ref()?;
        Some(TextureSource::Path(dir.join(file)))
    }
}

/// Identifies one request on one canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoadToken {
    pub canvas: u32,
    pub generation: u64,
}

/// Where a material slot is in its load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// The texture is still decoding.
    Pending,
    /// The decoded texture is bound.
    Bound,
    /// No texture, or it failed to load. The material's diffuse color is used instead.
    Fallback,
}

/// What the render thread learns from [`MeshLoader::poll`].
#[derive(Debug)]
pub enum LoaderEvent {
    /// Geometry was uploaded. Textures may still be pending.
    GeometryReady {
        token: LoadToken,
        vertices: usize,
        triangles: usize,
    },
    /// One material slot was resolved.
    SlotResolved {
        token: LoadToken,
        slot: usize,
        state: SlotState,
    },
    /// Every slot is resolved; the mesh can be drawn.
    MeshReady { token: LoadToken },
    /// Parsing or uploading failed. Nothing from this request will be drawn.
    Failed { token: LoadToken, error: RenderError },
}

enum LoaderMessage {
    Parsed {
        token: LoadToken,
        result: Result<MeshData>,
    },
    Decoded {
        token: LoadToken,
        slot: usize,
        result: Result<RgbaImage>,
    },
}

impl LoaderMessage {
    fn token(&self) -> LoadToken {
        match self {
            LoaderMessage::Parsed { token, .. } | LoaderMessage::Decoded { token, .. } => *token,
        }
    }
}

/// Reads and decodes one texture to RGBA.
pub fn decode_texture(material: &str, source: &TextureSource) -> Result<RgbaImage> {
    let failed = |reason: String| RenderError::TextureLoad {
        material: material.to_string(),
        reason,
    };
    let bytes = match source {
        TextureSource::Bytes(bytes) => std::borrow::Cow::Borrowed(bytes.as_slice()),
        TextureSource::Path(path) => std::borrow::Cow::Owned(
            std::fs::read(path).map_err(|e| failed(format!("{}: {e}", path.display())))?,
        ),
    };
    let image = image::load_from_memory(&bytes).map_err(|e| failed(e.to_string()))?;
    Ok(image.to_rgba8())
}

fn color_texel(color: Vec3) -> RgbaImage {
    let [r, g, b] = color.clamp(Vec3::ZERO, Vec3::ONE).to_array().map(|c| (c * 255.0) as u8);
    RgbaImage::from_pixel(1, 1, Rgba([r, g, b, 255]))
}

struct MaterialSlot {
    material: String,
    fallback: Vec3,
    state: SlotState,
    /// Kept after upload so the texture can be recreated.
    image: Option<RgbaImage>,
}

/// A loaded mesh: the CPU data it came from and the GPU objects built from it.
pub struct MeshAsset<G: Gpu> {
    token: LoadToken,
    mesh: MeshData,
    slots: Vec<MaterialSlot>,
    geometry: Option<GeometryBuffers<G>>,
    textures: Vec<Option<BoundTexture<G>>>,
}

impl<G: Gpu> MeshAsset<G> {
    pub fn token(&self) -> LoadToken {
        self.token
    }

    pub fn mesh(&self) -> &MeshData {
        &self.mesh
    }

    pub fn slot_states(&self) -> Vec<SlotState> {
        self.slots.iter().map(|s| s.state).collect()
    }

    /// `true` once geometry is on the GPU and no slot is pending.
    pub fn is_ready(&self) -> bool {
        self.geometry.is_some() && self.slots.iter().all(|s| s.state != SlotState::Pending)
    }

    /// Drops every GPU object, keeping what is needed to rebuild them.
    pub fn release_gpu(&mut self) {
        self.geometry = None;
        self.textures.iter_mut().for_each(|t| *t = None);
    }

    /// Recreates geometry and the textures of resolved slots.
    pub fn restore_gpu(&mut self, gpu: &Rc<G>) -> Result<()> {
        self.geometry = Some(GeometryBuffers::new(gpu, &self.mesh)?);
        for (slot, texture) in self.slots.iter().zip(self.textures.iter_mut()) {
            *texture = match &slot.image {
                Some(image) => Some(BoundTexture::new(gpu, image)?),
                None => None,
            };
        }
        Ok(())
    }

    fn resolve(&mut self, gpu: &Rc<G>, slot: usize, result: Result<RgbaImage>) -> SlotState {
        let Some(entry) = self.slots.get_mut(slot) else {
            return SlotState::Fallback;
        };
        let image = match result {
            Ok(image) => {
                entry.state = SlotState::Bound;
                image
            }
            Err(err) => {
                log::warn!("Using the diffuse color of '{}': {err}", entry.material);
                entry.state = SlotState::Fallback;
                color_texel(entry.fallback)
            }
        };
        match BoundTexture::new(gpu, &image) {
            Ok(texture) => self.textures[slot] = Some(texture),
            Err(err) => {
                log::warn!("Texture upload for '{}' failed: {err}", entry.material);
                entry.state = SlotState::Fallback;
            }
        }
        entry.image = Some(image);
        entry.state
    }

    /// Binds slot `i` to texture unit `i` and points `uDiffuse{i}` at it.
    pub fn bind_textures(&self, program: &CompiledProgram<G>) {
        for (unit, texture) in self.textures.iter().enumerate() {
            if let Some(texture) = texture {
                texture.bind(unit as u32);
                program.set_uniform(DIFFUSE_UNIFORMS[unit], unit as i32);
            }
        }
    }

    /// Draws the geometry if it is ready.
    pub fn draw(&self, program: &CompiledProgram<G>) {
        if let Some(geometry) = self.geometry.as_ref().filter(|_| self.is_ready()) {
            geometry.draw(program);
        }
    }
}

struct InFlight<G: Gpu> {
    token: LoadToken,
    request: LoadRequest,
    /// Set once the geometry is uploaded, while its textures decode.
    asset: Option<MeshAsset<G>>,
}

/// Runs mesh requests for one canvas and owns the resulting [`MeshAsset`].
///
/// A loaded asset stays in place until the next request is ready, so the previous mesh keeps
/// drawing while a new one loads.
pub struct MeshLoader<G: Gpu> {
    canvas: u32,
    generation: u64,
    sender: mpsc::Sender<LoaderMessage>,
    receiver: mpsc::Receiver<LoaderMessage>,
    in_flight: Option<InFlight<G>>,
    asset: Option<MeshAsset<G>>,
}

impl<G: Gpu> MeshLoader<G> {
    pub fn new(canvas: u32) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            canvas,
            generation: 0,
            sender,
            receiver,
            in_flight: None,
            asset: None,
        }
    }

    fn token(&self) -> LoadToken {
        LoadToken {
            canvas: self.canvas,
            generation: self.generation,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// The last request that finished loading.
    pub fn asset(&self) -> Option<&MeshAsset<G>> {
        self.asset.as_ref()
    }

    /// The request in flight, once its geometry is uploaded and while its textures decode.
    pub fn pending_asset(&self) -> Option<&MeshAsset<G>> {
        self.in_flight.as_ref().and_then(|f| f.asset.as_ref())
    }

    /// Drops the GPU objects of every asset, loaded or pending.
    pub fn release_gpu(&mut self) {
        let pending = self.in_flight.as_mut().and_then(|f| f.asset.as_mut());
        for asset in self.asset.iter_mut().chain(pending) {
            asset.release_gpu();
        }
    }

    /// Rebuilds what [`MeshLoader::release_gpu`] dropped.
    pub fn restore_gpu(&mut self, gpu: &Rc<G>) -> Result<()> {
        let pending = self.in_flight.as_mut().and_then(|f| f.asset.as_mut());
        for asset in self.asset.iter_mut().chain(pending) {
            asset.restore_gpu(gpu)?;
        }
        Ok(())
    }

    /// Starts parsing on a new worker thread.
    ///
    /// Fails with [`RenderError::LoadInFlight`] until the previous request has finished.
    pub fn request(&mut self, request: LoadRequest) -> Result<LoadToken> {
        if self.in_flight.is_some() {
            return Err(RenderError::LoadInFlight);
        }
        self.generation += 1;
        let token = self.token();

        let sender = self.sender.clone();
        let obj = request.obj.clone();
        let mtl = request.mtl.clone();
        thread::Builder::new()
            .name(format!("mesh-loader-{}", token.generation))
            .spawn(move || {
                let result = obj.read().and_then(|obj| {
                    let mtl = mtl.as_ref().map(TextSource::read).transpose()?;
                    MeshData::parse(&obj, mtl.as_deref())
                });
                if sender.send(LoaderMessage::Parsed { token, result }).is_err() {
                    log::debug!("Mesh loader dropped before parse of {token:?} finished");
                }
            })?;

        log::debug!("Requested mesh {token:?}");
        self.in_flight = Some(InFlight {
            token,
            request,
            asset: None,
        });
        Ok(token)
    }

    /// Abandons the current request, with whatever it already uploaded. Its remaining
    /// messages are dropped when they arrive. The last finished asset is kept.
    pub fn cancel(&mut self) {
        if let Some(cancelled) = self.in_flight.take() {
            log::debug!("Cancelled mesh {:?}", cancelled.token);
        }
        self.generation += 1;
    }

    /// Handles every message that arrived since the last call.
    ///
    /// Only messages present when the call starts are handled; decodes started here are picked
    /// up by the next call.
    pub fn poll(&mut self, gpu: &Rc<G>) -> Vec<LoaderEvent> {
        let messages: Vec<LoaderMessage> = self.receiver.try_iter().collect();
        let mut events = Vec::new();
        for message in messages {
            let current = self.in_flight.as_ref().map(|f| f.token);
            if current != Some(message.token()) {
                log::warn!("Dropping stale loader message for {:?}", message.token());
                continue;
            }
            match message {
                LoaderMessage::Parsed { token, result } => {
                    self.handle_parsed(gpu, token, result, &mut events)
                }
                LoaderMessage::Decoded {
                    token,
                    slot,
                    result,
                } => {
                    let pending = self.in_flight.as_mut().and_then(|f| f.asset.as_mut());
                    if let Some(asset) = pending {
                        let state = asset.resolve(gpu, slot, result);
                        events.push(LoaderEvent::SlotResolved { token, slot, state });
                        if asset.is_ready() {
                            self.finish(token, &mut events);
                        }
                    }
                }
            }
        }
        events
    }

    fn handle_parsed(
        &mut self,
        gpu: &Rc<G>,
        token: LoadToken,
        result: Result<MeshData>,
        events: &mut Vec<LoaderEvent>,
    ) {
        let built = result.and_then(|mesh| {
            let geometry = GeometryBuffers::new(gpu, &mesh)?;
            Ok((mesh, geometry))
        });
        let (mesh, geometry) = match built {
            Ok(built) => built,
            Err(error) => {
                log::error!("Mesh {token:?} failed to load: {error}");
                self.in_flight = None;
                events.push(LoaderEvent::Failed { token, error });
                return;
            }
        };
        events.push(LoaderEvent::GeometryReady {
            token,
            vertices: mesh.vertex_count(),
            triangles: mesh.triangle_count(),
        });
        if mesh.materials.len() > MAX_MATERIAL_SLOTS {
            log::warn!(
                "Mesh declares {} materials, only {MAX_MATERIAL_SLOTS} get textures",
                mesh.materials.len()
            );
        }

        let Some(in_flight) = self.in_flight.as_mut() else {
            return;
        };
        let mut slots = Vec::new();
        let mut decodes = Vec::new();
        for (index, material) in mesh.materials.iter().take(MAX_MATERIAL_SLOTS).enumerate() {
            slots.push(MaterialSlot {
                material: material.name.clone(),
                fallback: material.diffuse_color,
                state: SlotState::Pending,
                image: None,
            });
            decodes.push((index, material.name.clone(), in_flight.request.texture_for(material)));
        }

        let mut asset = MeshAsset {
            token,
            textures: slots.iter().map(|_| None).collect(),
            slots,
            mesh,
            geometry: Some(geometry),
        };
        for (slot, material, source) in decodes {
            let Some(source) = source else {
                let state = asset.resolve(
                    gpu,
                    slot,
                    Err(RenderError::TextureLoad {
                        material,
                        reason: "no diffuse texture".to_string(),
                    }),
                );
                events.push(LoaderEvent::SlotResolved { token, slot, state });
                continue;
            };
            let sender = self.sender.clone();
            rayon::spawn(move || {
                let result = decode_texture(&material, &source);
                if sender
                    .send(LoaderMessage::Decoded {
                        token,
                        slot,
                        result,
                    })
                    .is_err()
                {
                    log::debug!("Mesh loader dropped before texture '{material}' decoded");
                }
            });
        }

        let ready = asset.is_ready();
        in_flight.asset = Some(asset);
        if ready {
            self.finish(token, events);
        }
    }

    /// Replaces the loaded asset with the one in flight, which is ready.
    fn finish(&mut self, token: LoadToken, events: &mut Vec<LoaderEvent>) {
        let Some(asset) = self.in_flight.take().and_then(|f| f.asset) else {
            return;
        };
        log::info!("Mesh {token:?} is ready");
        self.asset = Some(asset);
        events.push(LoaderEvent::MeshReady { token });
    }
}
