use crate::{MAX_BONE_INFLUENCES, Mesh, Scene, Skeleton};

/// Influences at or below this weight are dropped.
pub const WEIGHT_EPSILON: f64 = 1e-5;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Influence {
    pub bone: u32,
    pub weight: f32,
}

/// Raw bone influences per control point of one mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkinWeights {
    per_control_point: Vec<Vec<Influence>>,
}

impl SkinWeights {
    /// Collects the influences of every skin deformer of `mesh`.
    ///
    /// Clusters whose link node is not a bone of `skeleton` are skipped.
    pub fn resolve(scene: &Scene, mesh: &Mesh, skeleton: &Skeleton) -> Self {
        let mut per_control_point = vec![Vec::new(); mesh.control_points.len()];

        for skin in &mesh.skins {
            for (cluster_index, cluster) in skin.clusters.iter().enumerate() {
                let Some(link) = cluster.link else {
                    log::warn!(
                        "skin '{}': cluster {cluster_index} has no link node; skipped",
                        skin.name
                    );
                    continue;
                };
                let Some(node) = scene.node_index(link).and_then(|i| scene.node(i)) else {
                    log::warn!(
                        "skin '{}': cluster {cluster_index} links unknown node {link}; skipped",
                        skin.name
                    );
                    continue;
                };
                let Some(bone) = skeleton.find_bone(&node.name) else {
                    log::warn!(
                        "skin '{}': cluster {cluster_index} links '{}', which is not a bone; skipped",
                        skin.name,
                        node.name
                    );
                    continue;
                };
                let bone = bone as u32;

                let mut out_of_range = 0usize;
                for (&cp, &weight) in cluster.indices.iter().zip(&cluster.weights) {
                    if weight <= WEIGHT_EPSILON {
                        continue;
                    }
                    let Some(list) = per_control_point.get_mut(cp as usize) else {
                        out_of_range += 1;
                        continue;
                    };
                    list.push(Influence {
                        bone,
                        weight: weight as f32,
                    });
                }
                if out_of_range > 0 {
                    log::warn!(
                        "skin '{}': cluster for '{}' has {out_of_range} indices past the control points",
                        skin.name,
                        node.name
                    );
                }
            }
        }

        Self { per_control_point }
    }

    pub fn influences(&self, control_point: usize) -> &[Influence] {
        self.per_control_point
            .get(control_point)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The four dominant influences of a control point, renormalized.
    pub fn limited(
        &self,
        control_point: usize,
    ) -> ([u32; MAX_BONE_INFLUENCES], [f32; MAX_BONE_INFLUENCES]) {
        limit_influences(self.influences(control_point))
    }

    pub fn is_empty(&self) -> bool {
        self.per_control_point.iter().all(Vec::is_empty)
    }
}

/// Keeps the heaviest [`MAX_BONE_INFLUENCES`] influences and rescales them to sum to one.
///
/// Ties keep their original order. Unused slots are bone 0 with weight 0.
pub fn limit_influences(
    influences: &[Influence],
) -> ([u32; MAX_BONE_INFLUENCES], [f32; MAX_BONE_INFLUENCES]) {
    let mut sorted = influences.to_vec();
    sorted.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    sorted.truncate(MAX_BONE_INFLUENCES);

    let sum: f32 = sorted.iter().map(|i| i.weight).sum();
    let mut bones = [0u32; MAX_BONE_INFLUENCES];
    let mut weights = [0.0f32; MAX_BONE_INFLUENCES];
    for (slot, influence) in sorted.iter().enumerate() {
        bones[slot] = influence.bone;
        weights[slot] = if sum > 0.0 {
            influence.weight / sum
        } else {
            influence.weight
        };
    }
    (bones, weights)
}
