//! Scene JSON loader.
//!
//! The document mirrors the FBX object model:
//!
//! ```json
//! {
//!   "version": 1,
//!   "name": "hero",
//!   "globalSettings": { "upAxis": 1, "upAxisSign": 1, "frontAxis": 2, "frontAxisSign": 1,
//!                       "coordAxis": 0, "coordAxisSign": 1, "unitScaleFactor": 1.0 },
//!   "materials": [ { "name": "Body", "diffuse": [1, 1, 1], "textures": { "diffuse": "body.png" } } ],
//!   "nodes": [
//!     { "id": 1, "name": "Hips", "attribute": "skeleton", "translation": [0, 90, 0] },
//!     { "id": 2, "name": "Body", "materials": ["Body"],
//!       "mesh": { "controlPoints": [[0, 0, 0], ...], "polygons": [[0, 1, 2]],
//!                 "normals": { "mapping": "ByPolygonVertex", "reference": "Direct", "direct": [...] },
//!                 "skins": [ { "clusters": [ { "link": 1, "indices": [0], "weights": [1.0] } ] } ] } }
//!   ],
//!   "poses": [ { "name": "BindPose", "entries": [ { "node": 1, "matrix": [16 numbers] } ] } ],
//!   "animations": [ { "name": "Idle", "curves": [ { "node": 1, "rotation": [[0.0, 0, 0, 0]] } ] } ]
//! }
//! ```
//!
//! Matrices are 16 numbers in column-major order for column vectors. Rotations are Euler angles
//! in degrees, applied X then Y then Z. Nodes may carry a geometric pivot
//! (`geometricTranslation`, `geometricRotation`, `geometricScaling`) that offsets their mesh
//! and bind pose without affecting children. Animation keys are `[time, x, y, z]`. Without
//! `globalSettings` a document is taken to be in the engine axis system already.

use crate::{
    AnimationStack, Axis, AxisSystem, BindPose, Cluster, Error, Key, LayerElement, MappingMode,
    MaterialLayer, Mesh, Node, NodeAttribute, NodeId, NodeTrack, PoseEntry, ReferenceMode,
    SCENE_FORMAT_VERSION, Scene, SceneMaterial, SignedAxis, Skin, TextureSlot,
};
use glam::{DMat4, DQuat, DVec2, DVec3, DVec4};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct Root {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "globalSettings")]
    global_settings: Option<GlobalSettingsDef>,
    #[serde(default)]
    materials: Vec<MaterialDef>,
    #[serde(default)]
    nodes: Vec<NodeDef>,
    #[serde(default)]
    poses: Vec<PoseDef>,
    #[serde(default)]
    animations: Vec<AnimationDef>,
}

fn default_one() -> f64 {
    1.0
}

fn default_sign() -> i8 {
    1
}

fn default_scaling() -> [f64; 3] {
    [1.0; 3]
}

fn default_white() -> [f64; 3] {
    [1.0; 3]
}

fn default_true() -> bool {
    true
}

// Field defaults describe the engine axis system.
#[derive(Debug, Deserialize)]
struct GlobalSettingsDef {
    #[serde(default = "default_up_axis", rename = "upAxis")]
    up_axis: u8,
    #[serde(default = "default_sign", rename = "upAxisSign")]
    up_axis_sign: i8,
    #[serde(default, rename = "frontAxis")]
    front_axis: u8,
    #[serde(default = "default_sign", rename = "frontAxisSign")]
    front_axis_sign: i8,
    #[serde(default = "default_coord_axis", rename = "coordAxis")]
    coord_axis: u8,
    #[serde(default = "default_coord_sign", rename = "coordAxisSign")]
    coord_axis_sign: i8,
    #[serde(default = "default_one", rename = "unitScaleFactor")]
    unit_scale_factor: f64,
}

fn default_up_axis() -> u8 {
    2
}

fn default_coord_axis() -> u8 {
    1
}

fn default_coord_sign() -> i8 {
    -1
}

#[derive(Debug, Deserialize)]
struct MaterialDef {
    name: String,
    #[serde(default = "default_white")]
    diffuse: [f64; 3],
    #[serde(default)]
    specular: [f64; 3],
    #[serde(default)]
    emissive: [f64; 3],
    #[serde(default)]
    ambient: [f64; 3],
    #[serde(default)]
    shininess: f64,
    #[serde(default = "default_one")]
    opacity: f64,
    #[serde(default)]
    textures: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct NodeDef {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parent: Option<u64>,
    #[serde(default)]
    translation: [f64; 3],
    #[serde(default)]
    rotation: [f64; 3],
    #[serde(default = "default_scaling")]
    scaling: [f64; 3],
    #[serde(default, rename = "geometricTranslation")]
    geometric_translation: [f64; 3],
    #[serde(default, rename = "geometricRotation")]
    geometric_rotation: [f64; 3],
    #[serde(default = "default_scaling", rename = "geometricScaling")]
    geometric_scaling: [f64; 3],
    #[serde(default)]
    attribute: Option<String>,
    #[serde(default)]
    mesh: Option<MeshDef>,
    #[serde(default)]
    materials: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct MeshDef {
    #[serde(default, rename = "controlPoints")]
    control_points: Vec<[f64; 3]>,
    #[serde(default)]
    polygons: Vec<Vec<u32>>,
    #[serde(default)]
    normals: Option<LayerDef<[f64; 3]>>,
    #[serde(default)]
    tangents: Option<LayerDef<[f64; 4]>>,
    #[serde(default)]
    uvs: Option<LayerDef<[f64; 2]>>,
    #[serde(default)]
    colors: Option<LayerDef<[f64; 4]>>,
    #[serde(default)]
    materials: Option<MaterialLayerDef>,
    #[serde(default)]
    skins: Vec<SkinDef>,
}

#[derive(Debug, Deserialize)]
struct LayerDef<T> {
    #[serde(default)]
    mapping: Option<String>,
    #[serde(default)]
    reference: Option<String>,
    #[serde(default = "Vec::new")]
    direct: Vec<T>,
    #[serde(default)]
    index: Vec<i32>,
}

#[derive(Debug, Deserialize)]
struct MaterialLayerDef {
    #[serde(default)]
    mapping: Option<String>,
    #[serde(default)]
    index: Vec<i32>,
}

#[derive(Debug, Deserialize)]
struct SkinDef {
    #[serde(default)]
    name: String,
    #[serde(default)]
    clusters: Vec<ClusterDef>,
}

#[derive(Debug, Deserialize)]
struct ClusterDef {
    #[serde(default)]
    link: Option<u64>,
    #[serde(default)]
    indices: Vec<u32>,
    #[serde(default)]
    weights: Vec<f64>,
    #[serde(default, rename = "transformLink")]
    transform_link: Option<[f64; 16]>,
}

#[derive(Debug, Deserialize)]
struct PoseDef {
    #[serde(default)]
    name: String,
    #[serde(default = "default_true", rename = "isBindPose")]
    is_bind_pose: bool,
    #[serde(default)]
    entries: Vec<PoseEntryDef>,
}

#[derive(Debug, Deserialize)]
struct PoseEntryDef {
    node: u64,
    matrix: [f64; 16],
}

#[derive(Debug, Deserialize)]
struct AnimationDef {
    name: String,
    #[serde(default)]
    curves: Vec<CurveDef>,
}

#[derive(Debug, Deserialize)]
struct CurveDef {
    node: u64,
    #[serde(default)]
    translation: Vec<[f64; 4]>,
    #[serde(default)]
    rotation: Vec<[f64; 4]>,
    #[serde(default)]
    scaling: Vec<[f64; 4]>,
}

pub(crate) fn euler_degrees_to_quat(r: [f64; 3]) -> DQuat {
    DQuat::from_rotation_z(r[2].to_radians())
        * DQuat::from_rotation_y(r[1].to_radians())
        * DQuat::from_rotation_x(r[0].to_radians())
}

fn parse_signed_axis(axis: u8, sign: i8, field: &str) -> Result<SignedAxis, Error> {
    let axis = Axis::from_index(axis).ok_or_else(|| Error::JsonUnsupportedMode {
        context: "globalSettings".to_string(),
        field: field.to_string(),
        value: axis.to_string(),
    })?;
    Ok(if sign < 0 {
        SignedAxis::negative(axis)
    } else {
        SignedAxis::positive(axis)
    })
}

fn parse_mapping(
    raw: Option<&str>,
    default: MappingMode,
    context: &str,
) -> Result<MappingMode, Error> {
    match raw {
        None => Ok(default),
        Some(name) => MappingMode::from_name(name).ok_or_else(|| Error::JsonUnsupportedMode {
            context: context.to_string(),
            field: "mapping".to_string(),
            value: name.to_string(),
        }),
    }
}

fn parse_layer<T, U>(
    def: LayerDef<T>,
    context: &str,
    convert: impl Fn(T) -> U,
) -> Result<LayerElement<U>, Error>
where
    U: Copy,
{
    let mapping = parse_mapping(def.mapping.as_deref(), MappingMode::ByPolygonVertex, context)?;
    let reference = match def.reference.as_deref() {
        None => ReferenceMode::Direct,
        Some(name) => ReferenceMode::from_name(name).ok_or_else(|| Error::JsonUnsupportedMode {
            context: context.to_string(),
            field: "reference".to_string(),
            value: name.to_string(),
        })?,
    };
    Ok(
        LayerElement::new(mapping, reference, def.direct.into_iter().map(convert).collect())
            .with_index(def.index),
    )
}

fn parse_mesh(def: MeshDef, node: &str) -> Result<Mesh, Error> {
    let control_points = def
        .control_points
        .into_iter()
        .map(DVec3::from_array)
        .collect::<Vec<_>>();

    for (polygon, cps) in def.polygons.iter().enumerate() {
        if let Some(bad) = cps.iter().find(|&&cp| cp as usize >= control_points.len()) {
            return Err(Error::JsonInvalidMesh {
                node: node.to_string(),
                message: format!(
                    "polygon {polygon} references control point {bad} (count {})",
                    control_points.len()
                ),
            });
        }
    }

    let normals = def
        .normals
        .map(|l| parse_layer(l, &format!("normals of '{node}'"), DVec3::from_array))
        .transpose()?;
    let tangents = def
        .tangents
        .map(|l| parse_layer(l, &format!("tangents of '{node}'"), DVec4::from_array))
        .transpose()?;
    let uvs = def
        .uvs
        .map(|l| parse_layer(l, &format!("uvs of '{node}'"), DVec2::from_array))
        .transpose()?;
    let colors = def
        .colors
        .map(|l| parse_layer(l, &format!("colors of '{node}'"), DVec4::from_array))
        .transpose()?;
    let materials = def
        .materials
        .map(|l| -> Result<MaterialLayer, Error> {
            Ok(MaterialLayer {
                mapping: parse_mapping(
                    l.mapping.as_deref(),
                    MappingMode::AllSame,
                    &format!("materials of '{node}'"),
                )?,
                index: l.index,
            })
        })
        .transpose()?;

    let mut skins = Vec::with_capacity(def.skins.len());
    for skin in def.skins {
        let mut clusters = Vec::with_capacity(skin.clusters.len());
        for (i, c) in skin.clusters.into_iter().enumerate() {
            if c.indices.len() != c.weights.len() {
                return Err(Error::JsonInvalidMesh {
                    node: node.to_string(),
                    message: format!(
                        "cluster {i} of skin '{}' has {} indices but {} weights",
                        skin.name,
                        c.indices.len(),
                        c.weights.len()
                    ),
                });
            }
            clusters.push(Cluster {
                link: c.link.map(NodeId),
                indices: c.indices,
                weights: c.weights,
                transform_link: c.transform_link.map(|m| DMat4::from_cols_array(&m)),
            });
        }
        skins.push(Skin {
            name: skin.name,
            clusters,
        });
    }

    Ok(Mesh {
        control_points,
        polygons: def.polygons,
        normals,
        tangents,
        uvs,
        colors,
        materials,
        skins,
    })
}

fn parse_material(def: MaterialDef) -> Result<SceneMaterial, Error> {
    let mut textures = Vec::with_capacity(def.textures.len());
    for (slot_name, path) in def.textures {
        let slot = TextureSlot::from_name(&slot_name).ok_or_else(|| Error::JsonUnsupportedMode {
            context: format!("material '{}'", def.name),
            field: "texture slot".to_string(),
            value: slot_name.clone(),
        })?;
        textures.push((slot, PathBuf::from(path)));
    }
    Ok(SceneMaterial {
        name: def.name,
        diffuse: DVec3::from_array(def.diffuse),
        specular: DVec3::from_array(def.specular),
        emissive: DVec3::from_array(def.emissive),
        ambient: DVec3::from_array(def.ambient),
        shininess: def.shininess,
        opacity: def.opacity,
        textures,
    })
}

fn parse_vec_keys(raw: &[[f64; 4]]) -> Vec<Key<DVec3>> {
    let mut keys = raw
        .iter()
        .map(|k| Key {
            time: k[0],
            value: DVec3::new(k[1], k[2], k[3]),
        })
        .collect::<Vec<_>>();
    keys.sort_by(|a, b| a.time.total_cmp(&b.time));
    keys
}

impl Scene {
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        let root: Root = serde_json::from_str(input).map_err(|e| Error::JsonParse {
            message: e.to_string(),
        })?;

        if let Some(version) = root.version {
            if version != SCENE_FORMAT_VERSION {
                return Err(Error::JsonSceneVersion { value: version });
            }
        }

        let mut scene = Scene::new(root.name.unwrap_or_default());
        if let Some(gs) = root.global_settings {
            scene.axis_system = AxisSystem {
                up: parse_signed_axis(gs.up_axis, gs.up_axis_sign, "upAxis")?,
                front: parse_signed_axis(gs.front_axis, gs.front_axis_sign, "frontAxis")?,
                coord: parse_signed_axis(gs.coord_axis, gs.coord_axis_sign, "coordAxis")?,
            };
            scene.unit_scale_factor = gs.unit_scale_factor;
        }

        let mut material_index = HashMap::<String, usize>::new();
        for def in root.materials {
            let material = parse_material(def)?;
            material_index
                .entry(material.name.clone())
                .or_insert(scene.materials.len());
            scene.materials.push(material);
        }

        // Nodes may appear in any order in the file; insert them parent-first.
        let mut def_index = HashMap::<u64, usize>::with_capacity(root.nodes.len());
        for (i, def) in root.nodes.iter().enumerate() {
            if def_index.insert(def.id, i).is_some() {
                return Err(Error::JsonDuplicateNode { id: def.id });
            }
        }
        let mut children = vec![Vec::<usize>::new(); root.nodes.len()];
        let mut roots = Vec::new();
        for (i, def) in root.nodes.iter().enumerate() {
            match def.parent {
                None => roots.push(i),
                Some(parent) => {
                    let p = def_index
                        .get(&parent)
                        .copied()
                        .ok_or_else(|| Error::JsonUnknownNode {
                            context: format!("parent of node {}", def.id),
                            id: parent,
                        })?;
                    children[p].push(i);
                }
            }
        }

        let mut order = Vec::with_capacity(root.nodes.len());
        let mut stack = roots
            .iter()
            .rev()
            .map(|&i| (i, None))
            .collect::<Vec<(usize, Option<usize>)>>();
        while let Some((i, parent)) = stack.pop() {
            order.push((i, parent));
            stack.extend(children[i].iter().rev().map(|&c| (c, Some(i))));
        }
        if order.len() != root.nodes.len() {
            let placed = order.iter().map(|(i, _)| *i).collect::<Vec<_>>();
            let orphan = (0..root.nodes.len())
                .find(|i| !placed.contains(i))
                .and_then(|i| root.nodes.get(i))
                .map(|d| d.name.clone().unwrap_or_else(|| d.id.to_string()))
                .unwrap_or_default();
            return Err(Error::JsonNodeCycle { node: orphan });
        }

        let mut defs = root.nodes.into_iter().map(Some).collect::<Vec<_>>();
        let mut scene_index = vec![0usize; defs.len()];
        for (i, parent) in order {
            let Some(def) = defs[i].take() else {
                continue;
            };
            let name = def.name.unwrap_or_else(|| format!("Node{}", def.id));

            let attribute = match (def.attribute.as_deref(), def.mesh) {
                (Some("mesh") | None, Some(mesh)) => {
                    NodeAttribute::Mesh(Box::new(parse_mesh(mesh, &name)?))
                }
                (Some("mesh"), None) => {
                    return Err(Error::JsonInvalidMesh {
                        node: name,
                        message: "mesh attribute without mesh data".to_string(),
                    });
                }
                (Some("skeleton"), _) => NodeAttribute::Skeleton,
                (Some("null") | None, _) => NodeAttribute::Null,
                (Some(other), _) => NodeAttribute::Other(other.to_string()),
            };

            let mut materials = Vec::with_capacity(def.materials.len());
            for m in &def.materials {
                let index = material_index.get(m).copied().ok_or_else(|| {
                    Error::JsonUnknownMaterial {
                        node: name.clone(),
                        material: m.clone(),
                    }
                })?;
                materials.push(index);
            }

            let node = Node::new(NodeId(def.id), name)
                .with_translation(DVec3::from_array(def.translation))
                .with_rotation(euler_degrees_to_quat(def.rotation))
                .with_scale(DVec3::from_array(def.scaling))
                .with_geometric(
                    DVec3::from_array(def.geometric_translation),
                    euler_degrees_to_quat(def.geometric_rotation),
                    DVec3::from_array(def.geometric_scaling),
                )
                .with_attribute(attribute)
                .with_materials(materials);
            scene_index[i] = scene.add_node(node, parent.map(|p| scene_index[p]))?;
        }

        for pose in root.poses {
            let mut entries = Vec::with_capacity(pose.entries.len());
            for e in pose.entries {
                if scene.node_index(NodeId(e.node)).is_none() {
                    log::warn!("pose '{}' references unknown node {}", pose.name, e.node);
                }
                entries.push(PoseEntry {
                    node: NodeId(e.node),
                    matrix: DMat4::from_cols_array(&e.matrix),
                });
            }
            scene.poses.push(BindPose {
                name: pose.name,
                is_bind_pose: pose.is_bind_pose,
                entries,
            });
        }

        for anim in root.animations {
            let mut tracks = Vec::with_capacity(anim.curves.len());
            for curve in anim.curves {
                let node = NodeId(curve.node);
                if scene.node_index(node).is_none() {
                    return Err(Error::JsonUnknownNode {
                        context: format!("animation '{}'", anim.name),
                        id: curve.node,
                    });
                }
                let mut rotation = curve
                    .rotation
                    .iter()
                    .map(|k| Key {
                        time: k[0],
                        value: euler_degrees_to_quat([k[1], k[2], k[3]]),
                    })
                    .collect::<Vec<_>>();
                rotation.sort_by(|a, b| a.time.total_cmp(&b.time));
                tracks.push(NodeTrack {
                    node,
                    translation: parse_vec_keys(&curve.translation),
                    rotation,
                    scale: parse_vec_keys(&curve.scaling),
                });
            }
            scene.animations.push(AnimationStack {
                name: anim.name,
                tracks,
            });
        }

        Ok(scene)
    }
}
