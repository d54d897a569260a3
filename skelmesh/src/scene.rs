//! Owned, mutable scene graph in the FBX object model.
//!
//! Everything here is double precision and expressed in the scene's own axis system until
//! [`crate::normalize_scene`] has run. The runtime never keeps references into a [`Scene`];
//! the importer reads it once and produces [`crate::RenderData`].

use crate::{AxisSystem, Error, TextureSlot};
use glam::{DMat4, DQuat, DVec2, DVec3, DVec4};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Object id of a node inside its source document.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeAttribute {
    Null,
    Skeleton,
    Mesh(Box<Mesh>),
    /// Cameras, lights and other attributes the importer ignores.
    Other(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    parent: Option<usize>,
    children: Vec<usize>,
    pub translation: DVec3,
    pub rotation: DQuat,
    pub scale: DVec3,
    /// Pivot offset of the node's attribute. Applies to its geometry and bind pose but is not
    /// inherited by children.
    pub geometric_translation: DVec3,
    pub geometric_rotation: DQuat,
    pub geometric_scale: DVec3,
    pub attribute: NodeAttribute,
    /// Material slots, as indices into [`Scene::materials`].
    pub materials: Vec<usize>,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
            children: Vec::new(),
            translation: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
            scale: DVec3::ONE,
            geometric_translation: DVec3::ZERO,
            geometric_rotation: DQuat::IDENTITY,
            geometric_scale: DVec3::ONE,
            attribute: NodeAttribute::Null,
            materials: Vec::new(),
        }
    }

    pub fn with_translation(mut self, translation: DVec3) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_rotation(mut self, rotation: DQuat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: DVec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_geometric(mut self, translation: DVec3, rotation: DQuat, scale: DVec3) -> Self {
        self.geometric_translation = translation;
        self.geometric_rotation = rotation;
        self.geometric_scale = scale;
        self
    }

    pub fn with_attribute(mut self, attribute: NodeAttribute) -> Self {
        self.attribute = attribute;
        self
    }

    pub fn with_materials(mut self, materials: Vec<usize>) -> Self {
        self.materials = materials;
        self
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn is_skeleton(&self) -> bool {
        matches!(self.attribute, NodeAttribute::Skeleton)
    }

    pub fn mesh(&self) -> Option<&Mesh> {
        match &self.attribute {
            NodeAttribute::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn mesh_mut(&mut self) -> Option<&mut Mesh> {
        match &mut self.attribute {
            NodeAttribute::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    /// Local-to-parent matrix.
    pub fn local_matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }

    /// Attribute-to-node matrix from the geometric pivot.
    pub fn geometric_matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(
            self.geometric_scale,
            self.geometric_rotation,
            self.geometric_translation,
        )
    }
}

/// Which element a layer value is attached to.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum MappingMode {
    ByControlPoint,
    #[default]
    ByPolygonVertex,
    ByPolygon,
    ByEdge,
    AllSame,
}

impl MappingMode {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "ByControlPoint" | "ByVertice" | "ByVertex" => Some(Self::ByControlPoint),
            "ByPolygonVertex" => Some(Self::ByPolygonVertex),
            "ByPolygon" => Some(Self::ByPolygon),
            "ByEdge" => Some(Self::ByEdge),
            "AllSame" => Some(Self::AllSame),
            _ => None,
        }
    }
}

/// How a layer's mapped index reaches its value array.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ReferenceMode {
    #[default]
    Direct,
    IndexToDirect,
}

impl ReferenceMode {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        match name {
            "Direct" => Some(Self::Direct),
            // `Index` is the legacy spelling of `IndexToDirect`.
            "IndexToDirect" | "Index" => Some(Self::IndexToDirect),
            _ => None,
        }
    }
}

/// One per-vertex attribute stream (normals, uvs, ...).
#[derive(Clone, Debug, PartialEq)]
pub struct LayerElement<T> {
    pub mapping: MappingMode,
    pub reference: ReferenceMode,
    pub direct: Vec<T>,
    pub index: Vec<i32>,
}

impl<T: Copy> LayerElement<T> {
    pub fn new(mapping: MappingMode, reference: ReferenceMode, direct: Vec<T>) -> Self {
        Self {
            mapping,
            reference,
            direct,
            index: Vec::new(),
        }
    }

    pub fn with_index(mut self, index: Vec<i32>) -> Self {
        self.index = index;
        self
    }

    /// Resolves the slot in `direct` holding the value of one polygon corner.
    ///
    /// `None` when the mapping is unsupported or any index is out of range.
    pub fn direct_index(
        &self,
        control_point: usize,
        polygon_vertex: usize,
        polygon: usize,
    ) -> Option<usize> {
        let mapped = match self.mapping {
            MappingMode::ByControlPoint => control_point,
            MappingMode::ByPolygonVertex => polygon_vertex,
            MappingMode::ByPolygon => polygon,
            MappingMode::AllSame => 0,
            MappingMode::ByEdge => return None,
        };
        let direct = match self.reference {
            ReferenceMode::Direct => mapped,
            ReferenceMode::IndexToDirect => usize::try_from(*self.index.get(mapped)?).ok()?,
        };
        (direct < self.direct.len()).then_some(direct)
    }

    pub fn value(&self, direct_index: usize) -> Option<T> {
        self.direct.get(direct_index).copied()
    }

    pub(crate) fn map_values(&mut self, mut f: impl FnMut(T) -> T) {
        for v in &mut self.direct {
            *v = f(*v);
        }
    }
}

/// Per-polygon material slot assignment.
#[derive(Clone, Debug, PartialEq)]
pub struct MaterialLayer {
    pub mapping: MappingMode,
    pub index: Vec<i32>,
}

impl MaterialLayer {
    /// Slot used by `polygon`. Mappings other than `ByPolygon` / `AllSame` are not meaningful
    /// for materials and resolve to `None`.
    pub fn slot_for_polygon(&self, polygon: usize) -> Option<usize> {
        let raw = match self.mapping {
            MappingMode::AllSame => self.index.first()?,
            MappingMode::ByPolygon => self.index.get(polygon)?,
            _ => return None,
        };
        usize::try_from(*raw).ok()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cluster {
    /// Node whose transform drives this influence set.
    pub link: Option<NodeId>,
    pub indices: Vec<u32>,
    pub weights: Vec<f64>,
    /// Global matrix of the link node at bind time, when the exporter wrote one.
    pub transform_link: Option<DMat4>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skin {
    pub name: String,
    pub clusters: Vec<Cluster>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    pub control_points: Vec<DVec3>,
    /// Control point indices per polygon, in winding order.
    pub polygons: Vec<Vec<u32>>,
    pub normals: Option<LayerElement<DVec3>>,
    pub tangents: Option<LayerElement<DVec4>>,
    pub uvs: Option<LayerElement<DVec2>>,
    pub colors: Option<LayerElement<DVec4>>,
    pub materials: Option<MaterialLayer>,
    pub skins: Vec<Skin>,
}

impl Mesh {
    pub fn polygon_vertex_count(&self) -> usize {
        self.polygons.iter().map(Vec::len).sum()
    }

    pub fn is_triangulated(&self) -> bool {
        self.polygons.iter().all(|p| p.len() == 3)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PoseEntry {
    pub node: NodeId,
    /// Global matrix of `node` in the pose.
    pub matrix: DMat4,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BindPose {
    pub name: String,
    pub is_bind_pose: bool,
    pub entries: Vec<PoseEntry>,
}

impl BindPose {
    pub fn matrix_for(&self, node: NodeId) -> Option<DMat4> {
        self.entries
            .iter()
            .find(|e| e.node == node)
            .map(|e| e.matrix)
    }

    /// Node id to matrix lookup. The first entry wins when a node is listed twice, as in
    /// [`Self::matrix_for`].
    pub fn matrix_table(&self) -> HashMap<NodeId, DMat4> {
        let mut table = HashMap::with_capacity(self.entries.len());
        for e in &self.entries {
            table.entry(e.node).or_insert(e.matrix);
        }
        table
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneMaterial {
    pub name: String,
    pub diffuse: DVec3,
    pub specular: DVec3,
    pub emissive: DVec3,
    pub ambient: DVec3,
    pub shininess: f64,
    pub opacity: f64,
    pub textures: Vec<(TextureSlot, PathBuf)>,
}

impl SceneMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse: DVec3::ONE,
            specular: DVec3::ZERO,
            emissive: DVec3::ZERO,
            ambient: DVec3::ZERO,
            shininess: 0.0,
            opacity: 1.0,
            textures: Vec::new(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Key<T> {
    pub time: f64,
    pub value: T,
}

/// Local transform curves of one node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeTrack {
    pub node: NodeId,
    pub translation: Vec<Key<DVec3>>,
    pub rotation: Vec<Key<DQuat>>,
    pub scale: Vec<Key<DVec3>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnimationStack {
    pub name: String,
    pub tracks: Vec<NodeTrack>,
}

#[derive(Clone, Debug)]
pub struct Scene {
    pub name: String,
    pub axis_system: AxisSystem,
    /// Centimeters per scene unit.
    pub unit_scale_factor: f64,
    /// Set when axis conversion mirrored the geometry; triangle winding must be reversed.
    pub mirrored: bool,
    nodes: Vec<Node>,
    id_index: HashMap<NodeId, usize>,
    pub materials: Vec<SceneMaterial>,
    pub poses: Vec<BindPose>,
    pub animations: Vec<AnimationStack>,
}

impl Scene {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            axis_system: AxisSystem::ENGINE,
            unit_scale_factor: 1.0,
            mirrored: false,
            nodes: Vec::new(),
            id_index: HashMap::new(),
            materials: Vec::new(),
            poses: Vec::new(),
            animations: Vec::new(),
        }
    }

    /// Appends `node` under `parent`. Parents must be added before their children.
    pub fn add_node(&mut self, mut node: Node, parent: Option<usize>) -> Result<usize, Error> {
        if self.id_index.contains_key(&node.id) {
            return Err(Error::InvalidValue {
                message: format!("duplicate node id {}", node.id),
            });
        }
        if let Some(p) = parent {
            if p >= self.nodes.len() {
                return Err(Error::InvalidValue {
                    message: format!("parent index {p} out of range for node '{}'", node.name),
                });
            }
        }
        let index = self.nodes.len();
        node.parent = parent;
        node.children.clear();
        self.id_index.insert(node.id, index);
        self.nodes.push(node);
        if let Some(p) = parent {
            self.nodes[p].children.push(index);
        }
        Ok(index)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.nodes.get_mut(index)
    }

    pub fn node_index(&self, id: NodeId) -> Option<usize> {
        self.id_index.get(&id).copied()
    }

    pub fn find_node(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    pub fn roots(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(i, _)| i)
    }

    /// Node indices in depth-first pre-order, siblings in their original order.
    pub fn depth_first(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<usize> = self.roots().collect();
        stack.reverse();
        while let Some(i) = stack.pop() {
            out.push(i);
            stack.extend(self.nodes[i].children.iter().rev().copied());
        }
        out
    }

    /// Global (scene-space) matrix of a node from its current local transforms.
    pub fn global_matrix(&self, index: usize) -> DMat4 {
        let mut m = DMat4::IDENTITY;
        let mut cursor = Some(index);
        while let Some(i) = cursor {
            let Some(node) = self.nodes.get(i) else {
                break;
            };
            m = node.local_matrix() * m;
            cursor = node.parent;
        }
        m
    }

    /// First bind pose whose entries all resolve to nodes of this scene.
    pub fn valid_bind_pose(&self) -> Option<&BindPose> {
        self.poses.iter().find(|pose| {
            pose.is_bind_pose
                && !pose.entries.is_empty()
                && pose.entries.iter().all(|e| self.id_index.contains_key(&e.node))
        })
    }

    /// Adds a bind pose built from the current node transforms when none is valid.
    ///
    /// Cluster link matrices take precedence over node globals for the nodes they cover.
    /// Node globals include the node's geometric pivot. Returns whether a pose was added.
    pub fn synthesize_bind_pose(&mut self) -> bool {
        if self.valid_bind_pose().is_some() {
            return false;
        }

        let mut link_matrices = HashMap::<NodeId, DMat4>::new();
        for node in &self.nodes {
            let Some(mesh) = node.mesh() else {
                continue;
            };
            for cluster in mesh.skins.iter().flat_map(|s| &s.clusters) {
                if let (Some(link), Some(m)) = (cluster.link, cluster.transform_link) {
                    link_matrices.entry(link).or_insert(m);
                }
            }
        }

        let entries = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_skeleton() || n.mesh().is_some())
            .map(|(i, n)| PoseEntry {
                node: n.id,
                matrix: link_matrices
                    .get(&n.id)
                    .copied()
                    .unwrap_or_else(|| self.global_matrix(i) * n.geometric_matrix()),
            })
            .collect::<Vec<_>>();
        if entries.is_empty() {
            return false;
        }

        log::info!(
            "scene '{}': synthesized bind pose for {} nodes",
            self.name,
            entries.len()
        );
        self.poses.push(BindPose {
            name: "BindPose".to_string(),
            is_bind_pose: true,
            entries,
        });
        true
    }
}
