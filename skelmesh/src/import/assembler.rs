use crate::{
    Aabb, Error, ImportOptions, MaterialInfo, MaterialSubset, Mesh, MeshPolicy, SceneMaterial,
    Scene, SkeletalMeshVertex, Skeleton, SkinWeights, TextureLoader, VertexDedup, VertexKey,
};
use glam::{DMat3, DMat4, DVec3, Vec3};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Name of the material used when a polygon's slot cannot be resolved.
pub const FALLBACK_MATERIAL_NAME: &str = "None";

/// One corner of a triangle: its control point and running polygon-vertex index.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Corner {
    pub control_point: usize,
    pub polygon_vertex: usize,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Triangle {
    pub polygon: usize,
    pub corners: [Corner; 3],
}

/// Fan-triangulates every polygon of `mesh`.
///
/// Polygons with fewer than three corners or with out-of-range control points produce no
/// triangles; the second value counts them.
pub fn triangulate(mesh: &Mesh) -> (Vec<Triangle>, usize) {
    let mut triangles = Vec::with_capacity(mesh.polygon_vertex_count());
    let mut skipped = 0usize;
    let mut polygon_vertex = 0usize;
    for (polygon, cps) in mesh.polygons.iter().enumerate() {
        let base = polygon_vertex;
        polygon_vertex += cps.len();
        if cps.len() < 3 || cps.iter().any(|&cp| cp as usize >= mesh.control_points.len()) {
            skipped += 1;
            continue;
        }
        let corner = |k: usize| Corner {
            control_point: cps[k] as usize,
            polygon_vertex: base + k,
        };
        for k in 1..cps.len() - 1 {
            triangles.push(Triangle {
                polygon,
                corners: [corner(0), corner(k), corner(k + 1)],
            });
        }
    }
    (triangles, skipped)
}

/// Attribute source indices of one corner.
pub fn corner_key(mesh: &Mesh, corner: Corner, polygon: usize) -> VertexKey {
    let (cp, pv) = (corner.control_point, corner.polygon_vertex);
    VertexKey {
        position: cp,
        normal: mesh
            .normals
            .as_ref()
            .and_then(|l| l.direct_index(cp, pv, polygon)),
        tangent: mesh
            .tangents
            .as_ref()
            .and_then(|l| l.direct_index(cp, pv, polygon)),
        uv: mesh.uvs.as_ref().and_then(|l| l.direct_index(cp, pv, polygon)),
        color: mesh
            .colors
            .as_ref()
            .and_then(|l| l.direct_index(cp, pv, polygon)),
    }
}

/// Matrices carrying a mesh node's geometry into its parent frame.
#[derive(Copy, Clone, Debug)]
struct NodeFrame {
    point: DMat4,
    normal: DMat3,
    linear: DMat3,
}

impl NodeFrame {
    fn new(local: DMat4) -> Self {
        let linear = DMat3::from_mat4(local);
        let normal = if linear.determinant().abs() > 1e-12 {
            linear.inverse().transpose()
        } else {
            linear
        };
        Self {
            point: local,
            normal,
            linear,
        }
    }
}

fn build_vertex(
    mesh: &Mesh,
    key: VertexKey,
    frame: &NodeFrame,
    weights: &SkinWeights,
    flip_uv_v: bool,
) -> SkeletalMeshVertex {
    let mut v = SkeletalMeshVertex::default();
    if let Some(p) = mesh.control_points.get(key.position) {
        v.position = frame.point.transform_point3(*p).as_vec3().to_array();
    }
    if let Some(n) = key
        .normal
        .and_then(|i| mesh.normals.as_ref().and_then(|l| l.value(i)))
    {
        v.normal = (frame.normal * n).normalize_or_zero().as_vec3().to_array();
    }
    if let Some(t) = key
        .tangent
        .and_then(|i| mesh.tangents.as_ref().and_then(|l| l.value(i)))
    {
        let dir = (frame.linear * t.truncate()).normalize_or_zero().as_vec3();
        let sign = if t.w < 0.0 { -1.0 } else { 1.0 };
        v.tangent = [dir.x, dir.y, dir.z, sign];
    }
    if let Some(uv) = key
        .uv
        .and_then(|i| mesh.uvs.as_ref().and_then(|l| l.value(i)))
    {
        let y = if flip_uv_v { 1.0 - uv.y } else { uv.y };
        v.uv = [uv.x as f32, y as f32];
    }
    if let Some(c) = key
        .color
        .and_then(|i| mesh.colors.as_ref().and_then(|l| l.value(i)))
    {
        v.color = c.as_vec4().to_array();
    }
    (v.bone_indices, v.bone_weights) = weights.limited(key.position);
    v
}

fn color(c: DVec3) -> [f32; 3] {
    c.as_vec3().to_array()
}

/// Geometry gathered from every mesh node of one import.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssembledMesh {
    pub vertices: Vec<SkeletalMeshVertex>,
    pub indices: Vec<u32>,
    pub materials: Vec<MaterialInfo>,
    pub subsets: Vec<MaterialSubset>,
    pub bounds: Aabb,
    pub mesh_count: usize,
}

/// Turns mesh nodes into deduplicated vertex and index buffers split by material.
pub struct MeshAssembler<'a> {
    scene: &'a Scene,
    skeleton: &'a Skeleton,
    options: &'a ImportOptions,
    textures: &'a mut dyn TextureLoader,
    base_dir: Option<&'a Path>,
    out: AssembledMesh,
    material_lookup: HashMap<String, u32>,
}

impl<'a> MeshAssembler<'a> {
    pub fn new(
        scene: &'a Scene,
        skeleton: &'a Skeleton,
        options: &'a ImportOptions,
        textures: &'a mut dyn TextureLoader,
        base_dir: Option<&'a Path>,
    ) -> Self {
        Self {
            scene,
            skeleton,
            options,
            textures,
            base_dir,
            out: AssembledMesh::default(),
            material_lookup: HashMap::new(),
        }
    }

    /// Appends every mesh node in depth-first order.
    pub fn append_scene(&mut self) -> Result<(), Error> {
        for node in self.scene.depth_first() {
            self.append_node(node)?;
        }
        Ok(())
    }

    /// Appends the mesh carried by the node at `node_index`. Returns whether geometry was added.
    pub fn append_node(&mut self, node_index: usize) -> Result<bool, Error> {
        let scene = self.scene;
        let Some(node) = scene.node(node_index) else {
            return Ok(false);
        };
        let Some(mesh) = node.mesh() else {
            return Ok(false);
        };
        if self.options.mesh_policy == MeshPolicy::FirstOnly && !self.out.vertices.is_empty() {
            log::warn!(
                "mesh node '{}' skipped: '{}' already has geometry",
                node.name,
                scene.name
            );
            return Ok(false);
        }

        if mesh.normals.is_none() {
            log::debug!("mesh '{}' has no normals", node.name);
        }
        if mesh.uvs.is_none() {
            log::debug!("mesh '{}' has no uvs", node.name);
        }

        let (triangles, skipped) = triangulate(mesh);
        if skipped > 0 {
            log::warn!(
                "mesh '{}': skipped {skipped} degenerate or invalid polygons",
                node.name
            );
        }
        if triangles.is_empty() {
            log::warn!("mesh '{}' has no triangles", node.name);
            return Ok(false);
        }

        let weights = SkinWeights::resolve(scene, mesh, self.skeleton);
        if weights.is_empty() && !mesh.skins.is_empty() {
            log::warn!("mesh '{}': skin deformers resolved to no influences", node.name);
        }

        let slot_materials = node
            .materials
            .iter()
            .map(|&m| self.register_material(scene.materials.get(m)))
            .collect::<Vec<_>>();

        let frame = NodeFrame::new(node.local_matrix() * node.geometric_matrix());
        let flip_uv_v = self.options.flip_uv_v;
        let mut dedup = VertexDedup::with_capacity(mesh.control_points.len());
        let mut by_material = BTreeMap::<u32, Vec<u32>>::new();
        let mut bad_slots = 0usize;

        for triangle in &triangles {
            let slot = mesh
                .materials
                .as_ref()
                .and_then(|l| l.slot_for_polygon(triangle.polygon))
                .unwrap_or(0);
            let material = match slot_materials.get(slot) {
                Some(&m) => m,
                None => {
                    if !slot_materials.is_empty() {
                        bad_slots += 1;
                    }
                    self.register_material(None)
                }
            };

            let mut corners = triangle.corners;
            if scene.mirrored {
                corners.swap(1, 2);
            }
            let bucket = by_material.entry(material).or_default();
            for corner in corners {
                let key = corner_key(mesh, corner, triangle.polygon);
                let index = dedup.index_for(key, &mut self.out.vertices, || {
                    build_vertex(mesh, key, &frame, &weights, flip_uv_v)
                })?;
                bucket.push(index);
            }
        }
        if bad_slots > 0 {
            log::warn!(
                "mesh '{}': {bad_slots} triangles use material slots outside 0..{}",
                node.name,
                slot_materials.len()
            );
        }

        for (material, indices) in by_material {
            let start = self.out.indices.len();
            self.out.indices.extend_from_slice(&indices);
            let name = self
                .out
                .materials
                .get(material as usize)
                .map(|m| m.name.clone())
                .unwrap_or_else(|| FALLBACK_MATERIAL_NAME.to_string());
            self.out.subsets.push(MaterialSubset {
                material_index: material,
                index_start: index_u32(start)?,
                index_count: index_u32(indices.len())?,
                material_name: name,
            });
        }

        self.out.mesh_count += 1;
        log::debug!(
            "mesh '{}': {} triangles, {} unique vertices",
            node.name,
            triangles.len(),
            dedup.len()
        );
        Ok(true)
    }

    pub fn finish(mut self) -> AssembledMesh {
        self.out.bounds =
            Aabb::from_points(self.out.vertices.iter().map(|v| Vec3::from(v.position)));
        self.out
    }

    /// Index of the material for `source`, registering it on first use.
    /// `None` registers the fallback material.
    fn register_material(&mut self, source: Option<&SceneMaterial>) -> u32 {
        let name = source.map_or(FALLBACK_MATERIAL_NAME, |m| m.name.as_str());
        if let Some(&index) = self.material_lookup.get(name) {
            return index;
        }

        let mut info = MaterialInfo::new(name);
        if let Some(m) = source {
            info.diffuse_color = color(m.diffuse);
            info.specular_color = color(m.specular);
            info.emissive_color = color(m.emissive);
            info.ambient_color = color(m.ambient);
            info.shininess = m.shininess as f32;
            info.opacity = m.opacity as f32;
            for (slot, path) in &m.textures {
                let resolved = match self.base_dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path.clone(),
                };
                if self
                    .textures
                    .ensure_texture_loaded(&resolved, slot.default_srgb())
                {
                    info.set_texture(*slot, resolved);
                } else {
                    log::warn!(
                        "material '{name}': {} texture '{}' failed to load",
                        slot.name(),
                        resolved.display()
                    );
                }
            }
        }

        let index = self.out.materials.len() as u32;
        self.out.materials.push(info);
        self.material_lookup.insert(name.to_string(), index);
        index
    }
}

fn index_u32(value: usize) -> Result<u32, Error> {
    u32::try_from(value).map_err(|_| Error::InvalidValue {
        message: format!("index {value} exceeds u32 range"),
    })
}
