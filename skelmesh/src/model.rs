use crate::{Aabb, AnimationClip, Error, Transform};
use glam::Mat4;
use std::collections::HashMap;
use std::path::PathBuf;

/// Influences kept per vertex.
pub const MAX_BONE_INFLUENCES: usize = 4;

/// One vertex of a skinned mesh.
///
/// Unused influence slots hold bone 0 with weight 0; gate on the weight, never on the index.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SkeletalMeshVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
    pub normal: [f32; 3],
    /// xyz direction, w handedness sign.
    pub tangent: [f32; 4],
    pub uv: [f32; 2],
    pub bone_indices: [u32; MAX_BONE_INFLUENCES],
    pub bone_weights: [f32; MAX_BONE_INFLUENCES],
}

impl Default for SkeletalMeshVertex {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            color: [1.0; 4],
            normal: [0.0; 3],
            tangent: [0.0, 0.0, 0.0, 1.0],
            uv: [0.0; 2],
            bone_indices: [0; MAX_BONE_INFLUENCES],
            bone_weights: [0.0; MAX_BONE_INFLUENCES],
        }
    }
}

impl SkeletalMeshVertex {
    pub fn has_influences(&self) -> bool {
        self.bone_weights.iter().any(|w| *w > 0.0)
    }

    pub fn weight_sum(&self) -> f32 {
        self.bone_weights.iter().sum()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    pub name: String,
    pub index: usize,
    pub parent: Option<usize>,
    /// Current local transform. The only field animation may change.
    pub local: Transform,
    bind_pose: Mat4,
    inverse_bind_pose: Mat4,
}

impl Bone {
    pub fn new(
        name: impl Into<String>,
        index: usize,
        parent: Option<usize>,
        local: Transform,
        bind_pose: Mat4,
    ) -> Self {
        Self::with_inverse(name, index, parent, local, bind_pose, bind_pose.inverse())
    }

    pub(crate) fn with_inverse(
        name: impl Into<String>,
        index: usize,
        parent: Option<usize>,
        local: Transform,
        bind_pose: Mat4,
        inverse_bind_pose: Mat4,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            parent,
            local,
            bind_pose,
            inverse_bind_pose,
        }
    }

    /// Global (model-space) transform at bind time.
    pub fn bind_pose(&self) -> Mat4 {
        self.bind_pose
    }

    pub fn inverse_bind_pose(&self) -> Mat4 {
        self.inverse_bind_pose
    }
}

/// Bones in parent-before-child order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skeleton {
    bones: Vec<Bone>,
    name_index: HashMap<String, usize>,
}

impl Skeleton {
    pub fn new(bones: Vec<Bone>) -> Result<Self, Error> {
        let mut name_index = HashMap::with_capacity(bones.len());
        for (i, bone) in bones.iter().enumerate() {
            if bone.index != i {
                return Err(Error::InvalidSkeleton {
                    message: format!("bone '{}' stored at {i} claims index {}", bone.name, bone.index),
                });
            }
            if let Some(parent) = bone.parent {
                if parent >= i {
                    return Err(Error::InvalidSkeleton {
                        message: format!(
                            "bone '{}' ({i}) has parent {parent} that does not precede it",
                            bone.name
                        ),
                    });
                }
            }
            // First bone wins on duplicate names.
            name_index.entry(bone.name.clone()).or_insert(i);
        }
        Ok(Self { bones, name_index })
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn bone_mut(&mut self, index: usize) -> Option<&mut Bone> {
        self.bones.get_mut(index)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.name_index.get(name).copied()
    }

    pub fn roots(&self) -> impl Iterator<Item = &Bone> + '_ {
        self.bones.iter().filter(|b| b.parent.is_none())
    }

    /// Local transforms as currently stored on the bones.
    pub fn local_transforms(&self) -> Vec<Transform> {
        self.bones.iter().map(|b| b.local).collect()
    }
}

/// Texture roles a material can bind.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum TextureSlot {
    Diffuse,
    Specular,
    Normal,
    Emissive,
    Alpha,
    Ambient,
    Shininess,
    Metallic,
    Roughness,
}

impl TextureSlot {
    pub const ALL: [Self; 9] = [
        Self::Diffuse,
        Self::Specular,
        Self::Normal,
        Self::Emissive,
        Self::Alpha,
        Self::Ambient,
        Self::Shininess,
        Self::Metallic,
        Self::Roughness,
    ];

    /// Color data is sRGB, everything else is linear.
    pub fn default_srgb(self) -> bool {
        matches!(self, Self::Diffuse | Self::Emissive)
    }

    pub fn flag(self) -> u32 {
        1 << (self as u32)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Diffuse => "diffuse",
            Self::Specular => "specular",
            Self::Normal => "normal",
            Self::Emissive => "emissive",
            Self::Alpha => "alpha",
            Self::Ambient => "ambient",
            Self::Shininess => "shininess",
            Self::Metallic => "metallic",
            Self::Roughness => "roughness",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|slot| slot.name().eq_ignore_ascii_case(name))
    }

    #[cfg(feature = "binary")]
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(usize::from(value)).copied()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureInfo {
    pub slot: TextureSlot,
    pub path: PathBuf,
    pub srgb: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialInfo {
    pub name: String,
    pub diffuse_color: [f32; 3],
    pub specular_color: [f32; 3],
    pub emissive_color: [f32; 3],
    pub ambient_color: [f32; 3],
    pub shininess: f32,
    pub opacity: f32,
    /// Bitwise or of [`TextureSlot::flag`] for every bound texture.
    pub texture_flags: u32,
    pub textures: Vec<TextureInfo>,
}

impl MaterialInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse_color: [1.0; 3],
            specular_color: [0.0; 3],
            emissive_color: [0.0; 3],
            ambient_color: [0.0; 3],
            shininess: 0.0,
            opacity: 1.0,
            texture_flags: 0,
            textures: Vec::new(),
        }
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<&TextureInfo> {
        self.textures.iter().find(|t| t.slot == slot)
    }

    pub fn has_texture(&self, slot: TextureSlot) -> bool {
        self.texture_flags & slot.flag() != 0
    }

    /// Binds `path` to `slot` with the slot's default color space, replacing any previous binding.
    pub fn set_texture(&mut self, slot: TextureSlot, path: impl Into<PathBuf>) {
        self.textures.retain(|t| t.slot != slot);
        self.textures.push(TextureInfo {
            slot,
            path: path.into(),
            srgb: slot.default_srgb(),
        });
        self.texture_flags |= slot.flag();
    }
}

/// Contiguous run of the index buffer drawn with one material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialSubset {
    pub material_index: u32,
    pub index_start: u32,
    pub index_count: u32,
    pub material_name: String,
}

/// Import result: everything needed to draw and skin one mesh asset.
///
/// Immutable once built; per-instance skinning writes into its own buffer.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderData {
    pub object_name: String,
    pub display_name: String,
    pub vertices: Vec<SkeletalMeshVertex>,
    pub indices: Vec<u32>,
    pub skeleton: Skeleton,
    pub materials: Vec<MaterialInfo>,
    pub subsets: Vec<MaterialSubset>,
    pub bounds: Aabb,
    pub animations: Vec<AnimationClip>,
}

impl RenderData {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn animation(&self, name: &str) -> Option<&AnimationClip> {
        self.animations.iter().find(|a| a.name == name)
    }

    pub fn compute_bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|v| v.position.into()))
    }
}
