//! Wavefront OBJ and MTL parsing.
//!
//! Produces a [`MeshData`]: flat attribute arrays deduplicated by (position, texture
//! coordinate, normal, material) and triangulated with a fan. [`MeshData::corners`] expands
//! them for upload. Only the
//! directives needed for static textured meshes are understood; `o`, `g`, `s` and `mtllib` are
//! accepted and ignored, anything else is skipped with a trace log.

use std::str::SplitWhitespace;

use fxhash::FxHashMap;
use glam::{Vec2, Vec3};

use crate::error::{RenderError, Result};

/// A material from an MTL file.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDescriptor {
    pub name: String,
    pub diffuse_color: Vec3,
    pub ambient_color: Vec3,
    pub specular_color: Vec3,
    pub shininess: f32,
    pub dissolve: f32,
    /// Texture path as written after `map_Kd`, relative to the MTL file.
    pub diffuse_map: Option<String>,
}

impl MaterialDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse_color: Vec3::splat(0.8),
            ambient_color: Vec3::ZERO,
            specular_color: Vec3::ZERO,
            shininess: 0.0,
            dissolve: 1.0,
            diffuse_map: None,
        }
    }
}

/// CPU-side geometry of one mesh.
///
/// Every attribute array holds one entry per vertex (positions and normals have 3 floats each,
/// texture coordinates 2, material slots 1). `indices` lists triangles.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub texcoords: Vec<f32>,
    /// Index into `materials` for each vertex, stored as a float attribute.
    pub material_slots: Vec<f32>,
    pub indices: Vec<u32>,
    /// Materials in declaration order. A material's position is its slot.
    pub materials: Vec<MaterialDescriptor>,
}

impl MeshData {
    /// Parses an OBJ file and, if given, its material library.
    pub fn parse(obj: &str, mtl: Option<&str>) -> Result<Self> {
        let materials = match mtl {
            Some(mtl) => parse_mtl(mtl)?,
            None => Vec::new(),
        };
        parse_obj(obj, materials)
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Checks the invariants the GPU upload relies on.
    pub fn validate(&self) -> Result<()> {
        if self.positions.len() % 3 != 0 {
            return Err(RenderError::InvalidGeometry(format!(
                "{} position floats is not a multiple of 3",
                self.positions.len()
            )));
        }
        let vertices = self.vertex_count();
        let attributes = [
            ("normals", self.normals.len(), 3),
            ("texcoords", self.texcoords.len(), 2),
            ("material slots", self.material_slots.len(), 1),
        ];
        for (name, len, components) in attributes {
            if len != vertices * components {
                return Err(RenderError::InvalidGeometry(format!(
                    "{name} hold {len} floats, expected {} for {vertices} vertices",
                    vertices * components
                )));
            }
        }
        if self.indices.is_empty() || self.indices.len() % 3 != 0 {
            return Err(RenderError::InvalidGeometry(format!(
                "{} indices do not form whole triangles",
                self.indices.len()
            )));
        }
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= vertices) {
            return Err(RenderError::InvalidGeometry(format!(
                "index {bad} out of range for {vertices} vertices"
            )));
        }
        Ok(())
    }

    /// Expands the mesh to one vertex per triangle corner.
    ///
    /// Shared vertices cannot carry barycentrics: a vertex used by several triangles would need
    /// a different corner in each. Call [`MeshData::validate`] first.
    pub fn corners(&self) -> CornerData {
        let mut corners = CornerData {
            indices: (0..self.indices.len() as u32).collect(),
            ..Default::default()
        };
        for (corner, &index) in self.indices.iter().enumerate() {
            let i = index as usize;
            corners.positions.extend_from_slice(&self.positions[i * 3..i * 3 + 3]);
            corners.normals.extend_from_slice(&self.normals[i * 3..i * 3 + 3]);
            corners.texcoords.extend_from_slice(&self.texcoords[i * 2..i * 2 + 2]);
            corners.material_slots.push(self.material_slots[i]);
            let mut barycentric = [0.0; 3];
            barycentric[corner % 3] = 1.0;
            corners.barycentrics.extend_from_slice(&barycentric);
        }
        corners
    }
}

/// Vertex data with no shared vertices, as uploaded to the GPU. `indices` counts up from zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CornerData {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub texcoords: Vec<f32>,
    pub barycentrics: Vec<f32>,
    pub material_slots: Vec<f32>,
    pub indices: Vec<u32>,
}

impl CornerData {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }
}

fn parse_error(line: usize, reason: impl Into<String>) -> RenderError {
    RenderError::MeshParse {
        line,
        reason: reason.into(),
    }
}

/// Reads `N` floats, ignoring any trailing components (`w`, vertex colors).
fn parse_floats<const N: usize>(
    tokens: &mut SplitWhitespace,
    line: usize,
    tag: &str,
) -> Result<[f32; N]> {
    let mut out = [0.0; N];
    for slot in out.iter_mut() {
        let token = tokens
            .next()
            .ok_or_else(|| parse_error(line, format!("'{tag}' needs {N} components")))?;
        *slot = token
            .parse()
            .map_err(|_| parse_error(line, format!("'{token}' is not a number")))?;
    }
    Ok(out)
}

/// Resolves a 1-based (or negative, relative) OBJ index against `count` known elements.
fn resolve_index(token: &str, count: usize, line: usize, what: &str) -> Result<usize> {
    let index: i64 = token
        .parse()
        .map_err(|_| parse_error(line, format!("'{token}' is not a {what} index")))?;
    let resolved = match index {
        0 => None,
        i if i > 0 => Some(i - 1),
        i => Some(count as i64 + i),
    };
    match resolved {
        Some(i) if i >= 0 && (i as usize) < count => Ok(i as usize),
        _ => Err(parse_error(
            line,
            format!("{what} index {index} out of range ({count} defined)"),
        )),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct VertexKey {
    position: usize,
    texcoord: Option<usize>,
    normal: Option<usize>,
    material: usize,
}

fn parse_face_vertex(
    token: &str,
    counts: (usize, usize, usize),
    material: usize,
    line: usize,
) -> Result<VertexKey> {
    let mut parts = token.split('/');
    let position = match parts.next() {
        Some(p) if !p.is_empty() => resolve_index(p, counts.0, line, "position")?,
        _ => return Err(parse_error(line, format!("face vertex '{token}' has no position"))),
    };
    let texcoord = match parts.next() {
        Some(t) if !t.is_empty() => Some(resolve_index(t, counts.1, line, "texcoord")?),
        _ => None,
    };
    let normal = match parts.next() {
        Some(n) if !n.is_empty() => Some(resolve_index(n, counts.2, line, "normal")?),
        _ => None,
    };
    if parts.next().is_some() {
        return Err(parse_error(line, format!("face vertex '{token}' has too many parts")));
    }
    Ok(VertexKey {
        position,
        texcoord,
        normal,
        material,
    })
}

/// Parses OBJ text. `materials` come from the MTL file; names used by `usemtl` that it does
/// not define are appended with default values.
pub fn parse_obj(source: &str, mut materials: Vec<MaterialDescriptor>) -> Result<MeshData> {
    let mut positions: Vec<Vec3> = Vec::new();
    let mut texcoords: Vec<Vec2> = Vec::new();
    let mut normals: Vec<Vec3> = Vec::new();

    let mut keys: Vec<VertexKey> = Vec::new();
    let mut lookup: FxHashMap<VertexKey, u32> = FxHashMap::default();
    let mut indices: Vec<u32> = Vec::new();
    let mut material = 0;

    for (number, raw) in source.lines().enumerate() {
        let line = number + 1;
        let text = raw.split('#').next().unwrap_or_default().trim();
        if text.is_empty() {
            continue;
        }
        let mut tokens = text.split_whitespace();
        let Some(tag) = tokens.next() else {
            continue;
        };
        match tag {
            "v" => positions.push(Vec3::from(parse_floats::<3>(&mut tokens, line, tag)?)),
            "vt" => texcoords.push(Vec2::from(parse_floats::<2>(&mut tokens, line, tag)?)),
            "vn" => normals.push(Vec3::from(parse_floats::<3>(&mut tokens, line, tag)?)),
            "usemtl" => {
                let name = tokens
                    .next()
                    .ok_or_else(|| parse_error(line, "'usemtl' needs a material name"))?;
                material = match materials.iter().position(|m| m.name == name) {
                    Some(slot) => slot,
                    None => {
                        log::warn!("Material '{name}' is not in the material library");
                        materials.push(MaterialDescriptor::new(name));
                        materials.len() - 1
                    }
                };
            }
            "f" => {
                let counts = (positions.len(), texcoords.len(), normals.len());
                let mut face = Vec::with_capacity(4);
                for token in tokens {
                    let key = parse_face_vertex(token, counts, material, line)?;
                    let index = *lookup.entry(key).or_insert_with(|| {
                        keys.push(key);
                        (keys.len() - 1) as u32
                    });
                    face.push(index);
                }
                if face.len() < 3 {
                    return Err(parse_error(
                        line,
                        format!("face has {} vertices, needs at least 3", face.len()),
                    ));
                }
                for i in 1..face.len() - 1 {
                    indices.extend_from_slice(&[face[0], face[i], face[i + 1]]);
                }
            }
            "o" | "g" | "s" | "mtllib" => {}
            other => log::trace!("Ignoring OBJ directive '{other}' on line {line}"),
        }
    }

    if indices.is_empty() {
        return Err(parse_error(source.lines().count(), "no faces"));
    }

    let smooth = if keys.iter().any(|k| k.normal.is_none()) {
        smooth_normals(&positions, &keys, &indices)
    } else {
        Vec::new()
    };

    let mut mesh = MeshData {
        materials,
        indices,
        ..Default::default()
    };
    for key in &keys {
        mesh.positions.extend_from_slice(&positions[key.position].to_array());
        let normal = match key.normal {
            Some(n) => normals[n],
            None => smooth[key.position],
        };
        mesh.normals.extend_from_slice(&normal.to_array());
        let uv = key.texcoord.map_or(Vec2::ZERO, |t| texcoords[t]);
        mesh.texcoords.extend_from_slice(&uv.to_array());
        mesh.material_slots.push(key.material as f32);
    }

    mesh.validate()?;
    log::debug!(
        "Parsed OBJ: {} vertices, {} triangles, {} materials",
        mesh.vertex_count(),
        mesh.triangle_count(),
        mesh.materials.len()
    );
    Ok(mesh)
}

/// Area-weighted vertex normals, accumulated per source position.
fn smooth_normals(positions: &[Vec3], keys: &[VertexKey], indices: &[u32]) -> Vec<Vec3> {
    let mut accumulated = vec![Vec3::ZERO; positions.len()];
    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [0, 1, 2].map(|i| keys[triangle[i] as usize].position);
        let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        for p in [a, b, c] {
            accumulated[p] += face;
        }
    }
    accumulated
        .into_iter()
        .map(|n| n.try_normalize().unwrap_or(Vec3::Y))
        .collect()
}

/// Parses MTL text into materials in declaration order.
pub fn parse_mtl(source: &str) -> Result<Vec<MaterialDescriptor>> {
    let mut materials: Vec<MaterialDescriptor> = Vec::new();

    for (number, raw) in source.lines().enumerate() {
        let line = number + 1;
        let text = raw.split('#').next().unwrap_or_default().trim();
        if text.is_empty() {
            continue;
        }
        let mut tokens = text.split_whitespace();
        let Some(tag) = tokens.next() else {
            continue;
        };
        if tag == "newmtl" {
            let name = tokens
                .next()
                .ok_or_else(|| parse_error(line, "'newmtl' needs a name"))?;
            if materials.iter().any(|m| m.name == name) {
                return Err(parse_error(line, format!("material '{name}' defined twice")));
            }
            materials.push(MaterialDescriptor::new(name));
            continue;
        }

        let current = materials
            .last_mut()
            .ok_or_else(|| parse_error(line, format!("'{tag}' before any 'newmtl'")))?;
        match tag {
            "Kd" => current.diffuse_color = Vec3::from(parse_floats::<3>(&mut tokens, line, tag)?),
            "Ka" => current.ambient_color = Vec3::from(parse_floats::<3>(&mut tokens, line, tag)?),
            "Ks" => {
                current.specular_color = Vec3::from(parse_floats::<3>(&mut tokens, line, tag)?)
            }
            "Ns" => current.shininess = parse_floats::<1>(&mut tokens, line, tag)?[0],
            "d" => current.dissolve = parse_floats::<1>(&mut tokens, line, tag)?[0],
            "map_Kd" => {
                // Options like `-s 1 1 1` may precede the file name, which comes last.
                let path = tokens
                    .last()
                    .ok_or_else(|| parse_error(line, "'map_Kd' needs a file name"))?;
                current.diffuse_map = Some(path.to_string());
            }
            other => log::trace!("Ignoring MTL directive '{other}' on line {line}"),
        }
    }

    Ok(materials)
}
