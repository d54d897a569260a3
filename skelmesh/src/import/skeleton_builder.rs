use crate::{BindPose, Bone, Error, Node, Scene, Skeleton, Transform};
use glam::DMat4;

const MIN_DETERMINANT: f64 = 1e-12;

/// Builds the bone table of a normalized scene.
///
/// Bones are the nodes with a skeleton attribute, numbered in depth-first order. Non-bone nodes
/// between two bones pass the ancestor bone's index through as the parent. Bind poses come from
/// the scene's bind pose; when the scene has none, one is synthesized from the current node
/// transforms first. Bones still missing an entry get an identity bind pose and a warning.
pub fn build_skeleton(scene: &mut Scene) -> Result<Skeleton, Error> {
    let has_bones = scene.nodes().iter().any(Node::is_skeleton);
    if has_bones && scene.valid_bind_pose().is_none() {
        log::warn!("scene '{}' has no valid bind pose", scene.name);
        scene.synthesize_bind_pose();
    }
    let pose = scene
        .valid_bind_pose()
        .map(BindPose::matrix_table)
        .unwrap_or_default();

    let mut names = Vec::new();
    let mut parents = Vec::new();
    let mut bind = Vec::new();
    let mut inverse_bind = Vec::new();

    let mut stack = scene
        .roots()
        .map(|root| (root, None))
        .collect::<Vec<(usize, Option<usize>)>>();
    stack.reverse();
    while let Some((node_index, parent_bone)) = stack.pop() {
        let Some(node) = scene.node(node_index) else {
            continue;
        };

        let mut child_parent = parent_bone;
        if node.is_skeleton() {
            let index = names.len();
            let matrix = match pose.get(&node.id).copied() {
                Some(m) if m.determinant().abs() > MIN_DETERMINANT && m.is_finite() => m,
                Some(_) => {
                    log::warn!(
                        "bone '{}': bind pose matrix is singular; using identity",
                        node.name
                    );
                    DMat4::IDENTITY
                }
                None => {
                    log::warn!(
                        "bone '{}': no bind pose entry; using identity, skinning may be wrong",
                        node.name
                    );
                    DMat4::IDENTITY
                }
            };
            names.push(node.name.clone());
            parents.push(parent_bone);
            bind.push(matrix);
            inverse_bind.push(matrix.inverse());
            child_parent = Some(index);
        }

        stack.extend(node.children().iter().rev().map(|&c| (c, child_parent)));
    }

    let skeleton = skeleton_from_parts(names, parents, bind, inverse_bind)?;
    if !skeleton.is_empty() {
        log::info!(
            "scene '{}': built skeleton with {} bones",
            scene.name,
            skeleton.len()
        );
    }
    Ok(skeleton)
}

/// Assembles bones from parallel tables, deriving each rest local transform from the bind poses.
pub(crate) fn skeleton_from_parts(
    names: Vec<String>,
    parents: Vec<Option<usize>>,
    bind: Vec<DMat4>,
    inverse_bind: Vec<DMat4>,
) -> Result<Skeleton, Error> {
    let count = names.len();
    if parents.len() != count || bind.len() != count || inverse_bind.len() != count {
        return Err(Error::InvalidSkeleton {
            message: format!(
                "{count} bones but {} parents, {} bind poses and {} inverse bind poses",
                parents.len(),
                bind.len(),
                inverse_bind.len()
            ),
        });
    }

    let mut bones = Vec::with_capacity(count);
    for (index, name) in names.into_iter().enumerate() {
        let parent = parents[index];
        let local = match parent {
            Some(p) if p < index => inverse_bind[p] * bind[index],
            Some(p) => {
                return Err(Error::InvalidSkeleton {
                    message: format!("bone '{name}' ({index}) has forward parent {p}"),
                });
            }
            None => bind[index],
        };
        bones.push(Bone::with_inverse(
            name,
            index,
            parent,
            Transform::from_matrix(local.as_mat4()),
            bind[index].as_mat4(),
            inverse_bind[index].as_mat4(),
        ));
    }
    Skeleton::new(bones)
}
