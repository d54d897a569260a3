use crate::{
    ClipPlayer, RenderData, SkeletalMesh, SkeletalMeshVertex, Skeleton, SkinnedBuffer,
    SkinningEvaluator, SkinningStats, Transform,
};
use glam::Mat4;
use std::sync::Arc;

/// Capability of anything that exposes a skeleton.
pub trait HasSkeleton {
    fn skeleton(&self) -> Option<&Skeleton>;
}

/// Supplies current local bone transforms, typically an animation player.
pub trait BonePoseSource: Send {
    /// One transform per bone of `skeleton`, or `None` when no pose is available.
    fn local_bone_transforms(&self, skeleton: &Skeleton) -> Option<Vec<Transform>>;

    fn advance(&mut self, _dt: f32) {}
}

/// One placed instance of a skeletal mesh with its own skinned vertex buffer.
#[derive(Default)]
pub struct SkeletalMeshComponent {
    mesh: Option<Arc<SkeletalMesh>>,
    pose_source: Option<Box<dyn BonePoseSource>>,
    evaluator: SkinningEvaluator,
    skinned: SkinnedBuffer,
    last_stats: SkinningStats,
}

impl std::fmt::Debug for SkeletalMeshComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkeletalMeshComponent")
            .field("mesh", &self.mesh.as_ref().map(|m| m.name().to_string()))
            .field("has_pose_source", &self.pose_source.is_some())
            .field("last_stats", &self.last_stats)
            .finish()
    }
}

impl SkeletalMeshComponent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mesh(mesh: Arc<SkeletalMesh>) -> Self {
        let mut out = Self::default();
        out.set_mesh(Some(mesh));
        out
    }

    /// Replaces the mesh. The skinned buffer restarts from the new mesh's bind pose.
    pub fn set_mesh(&mut self, mesh: Option<Arc<SkeletalMesh>>) {
        self.skinned = match mesh.as_deref() {
            Some(m) => SkinnedBuffer::from_render_data(m.render_data()),
            None => SkinnedBuffer::new(),
        };
        self.mesh = mesh;
        self.last_stats = SkinningStats::default();
    }

    pub fn mesh(&self) -> Option<&Arc<SkeletalMesh>> {
        self.mesh.as_ref()
    }

    pub fn render_data(&self) -> Option<&RenderData> {
        self.mesh.as_deref().map(SkeletalMesh::render_data)
    }

    pub fn set_pose_source(&mut self, source: Box<dyn BonePoseSource>) {
        self.pose_source = Some(source);
    }

    pub fn clear_pose_source(&mut self) {
        self.pose_source = None;
    }

    /// Starts the mesh's clip `name`. Returns false when the mesh has no such clip.
    pub fn play_animation(&mut self, name: &str, looping: bool) -> bool {
        let Some(clip) = self
            .render_data()
            .and_then(|d| d.animation(name))
            .cloned()
        else {
            log::warn!("animation '{name}' not found");
            return false;
        };
        self.set_pose_source(Box::new(ClipPlayer::new(clip, looping)));
        true
    }

    /// Local bone transforms from the bound pose source.
    ///
    /// `None` when no mesh or no pose source is bound, or the source has no pose; skinning then
    /// uses the bind pose.
    pub fn current_local_bone_transforms(&self) -> Option<Vec<Transform>> {
        let skeleton = self.mesh.as_deref()?.skeleton();
        let pose = self.pose_source.as_ref()?.local_bone_transforms(skeleton)?;
        (pose.len() == skeleton.len()).then_some(pose)
    }

    /// Advances the pose source and re-skins.
    pub fn tick(&mut self, dt: f32) -> SkinningStats {
        if let Some(source) = self.pose_source.as_mut() {
            source.advance(dt);
        }
        self.update_skinning()
    }

    pub fn update_skinning(&mut self) -> SkinningStats {
        let Some(mesh) = self.mesh.clone() else {
            return SkinningStats::default();
        };
        let locals = self
            .current_local_bone_transforms()
            .unwrap_or_else(|| mesh.skeleton().local_transforms());
        self.last_stats = self
            .evaluator
            .evaluate(mesh.render_data(), &locals, &mut self.skinned);
        self.last_stats
    }

    pub fn skinned_vertices(&self) -> &[SkeletalMeshVertex] {
        self.skinned.vertices()
    }

    pub fn skinned_buffer(&self) -> &SkinnedBuffer {
        &self.skinned
    }

    pub fn bone_global_transforms(&self) -> &[Mat4] {
        self.evaluator.global_transforms()
    }

    pub fn last_stats(&self) -> SkinningStats {
        self.last_stats
    }
}

impl HasSkeleton for SkeletalMeshComponent {
    fn skeleton(&self) -> Option<&Skeleton> {
        self.mesh.as_deref().map(SkeletalMesh::skeleton)
    }
}
