//! CPU linear blend skinning.
//!
//! Matrices follow glam's column-vector convention, so the skinning matrix of a bone is
//! `global * inverse_bind` and a vertex moves as `skin * p`.

use crate::{Aabb, RenderData, SkeletalMeshVertex, Skeleton, Transform};
use glam::{Mat4, Vec3};

/// Per-instance skinned copy of a mesh's vertices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkinnedBuffer {
    vertices: Vec<SkeletalMeshVertex>,
    bounds: Aabb,
}

impl SkinnedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer holding the bind-pose vertices of `data`.
    pub fn from_render_data(data: &RenderData) -> Self {
        Self {
            vertices: data.vertices.clone(),
            bounds: data.bounds,
        }
    }

    pub fn vertices(&self) -> &[SkeletalMeshVertex] {
        &self.vertices
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.bounds = Aabb::default();
    }

    /// Copies every canonical attribute of `data`; skinning then overwrites position, normal
    /// and tangent. The buffer may have last held a different mesh.
    fn prepare(&mut self, data: &RenderData) {
        self.vertices.clone_from(&data.vertices);
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SkinningStats {
    pub skinned_vertices: usize,
    pub rigid_vertices: usize,
    /// Influences skipped because their bone index is out of range.
    pub invalid_influences: usize,
}

/// Composes `locals` into model-space matrices, parents first.
///
/// Bones without an entry in `locals` use their stored local transform.
pub fn compose_global_transforms(skeleton: &Skeleton, locals: &[Transform], out: &mut Vec<Mat4>) {
    out.clear();
    out.reserve(skeleton.len());
    for bone in skeleton.bones() {
        let local = locals.get(bone.index).unwrap_or(&bone.local).to_matrix();
        let global = match bone.parent.and_then(|p| out.get(p)) {
            Some(parent) => *parent * local,
            None => local,
        };
        out.push(global);
    }
}

/// Reusable scratch state for [`SkinningEvaluator::evaluate`].
#[derive(Clone, Debug, Default)]
pub struct SkinningEvaluator {
    globals: Vec<Mat4>,
    skinning: Vec<Mat4>,
}

impl SkinningEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Model-space bone matrices from the last evaluation.
    pub fn global_transforms(&self) -> &[Mat4] {
        &self.globals
    }

    /// `global * inverse_bind` per bone from the last evaluation.
    pub fn skinning_matrices(&self) -> &[Mat4] {
        &self.skinning
    }

    /// Skins `data` with the local pose `locals` into `out`. `data` is never modified.
    pub fn evaluate(
        &mut self,
        data: &RenderData,
        locals: &[Transform],
        out: &mut SkinnedBuffer,
    ) -> SkinningStats {
        let skeleton = &data.skeleton;
        if !locals.is_empty() && locals.len() != skeleton.len() {
            log::debug!(
                "'{}': pose has {} transforms for {} bones",
                data.object_name,
                locals.len(),
                skeleton.len()
            );
        }

        compose_global_transforms(skeleton, locals, &mut self.globals);
        self.skinning.clear();
        self.skinning.extend(
            skeleton
                .bones()
                .iter()
                .zip(&self.globals)
                .map(|(bone, global)| *global * bone.inverse_bind_pose()),
        );

        out.prepare(data);
        let mut stats = SkinningStats::default();
        for (src, dst) in data.vertices.iter().zip(out.vertices.iter_mut()) {
            if skin_vertex(src, dst, &self.skinning, &mut stats.invalid_influences) {
                stats.skinned_vertices += 1;
            } else {
                stats.rigid_vertices += 1;
            }
        }
        if stats.invalid_influences > 0 {
            log::warn!(
                "'{}': skipped {} influences referencing bones outside the skeleton ({} bones)",
                data.object_name,
                stats.invalid_influences,
                skeleton.len()
            );
        }

        out.bounds = Aabb::from_points(out.vertices.iter().map(|v| Vec3::from(v.position)));
        stats
    }
}

/// Returns false when the vertex had no usable influence and was copied unchanged.
fn skin_vertex(
    src: &SkeletalMeshVertex,
    dst: &mut SkeletalMeshVertex,
    matrices: &[Mat4],
    invalid: &mut usize,
) -> bool {
    let position = Vec3::from(src.position);
    let normal = Vec3::from(src.normal);
    let tangent = Vec3::new(src.tangent[0], src.tangent[1], src.tangent[2]);

    let mut acc_position = Vec3::ZERO;
    let mut acc_normal = Vec3::ZERO;
    let mut acc_tangent = Vec3::ZERO;
    let mut total = 0.0_f32;
    for (&bone, &weight) in src.bone_indices.iter().zip(&src.bone_weights) {
        if weight.is_nan() || weight <= 0.0 {
            continue;
        }
        let Some(m) = matrices.get(bone as usize) else {
            *invalid += 1;
            continue;
        };
        acc_position += m.transform_point3(position) * weight;
        acc_normal += m.transform_vector3(normal) * weight;
        acc_tangent += m.transform_vector3(tangent) * weight;
        total += weight;
    }

    if total <= 0.0 {
        dst.position = src.position;
        dst.normal = src.normal;
        dst.tangent = src.tangent;
        return false;
    }

    // Weight missing from a partial set stays with the bind pose.
    if total < 1.0 {
        let rest = 1.0 - total;
        acc_position += position * rest;
        acc_normal += normal * rest;
        acc_tangent += tangent * rest;
    }

    dst.position = acc_position.to_array();
    dst.normal = acc_normal.normalize_or_zero().to_array();
    let t = acc_tangent.normalize_or_zero();
    dst.tangent = [t.x, t.y, t.z, src.tangent[3]];
    true
}
