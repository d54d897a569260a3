//! Scene to [`RenderData`] import pipeline.
//!
//! normalize axes -> build skeleton -> assemble meshes (with skin weights) -> render data.

mod assembler;
mod dedup;
mod skeleton_builder;
mod skin_weights;

pub use assembler::*;
pub use dedup::*;
pub use skeleton_builder::*;
pub use skin_weights::*;

use crate::{
    AnimationClip, BoneTrack, Error, Keyframe, RenderData, Scene, Skeleton, normalize_scene,
};
use std::path::{Path, PathBuf};

/// What happens to the second and later mesh nodes of one scene.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum MeshPolicy {
    /// One mesh per object: later mesh nodes are skipped with a warning.
    #[default]
    FirstOnly,
    /// Every mesh node is appended with offset vertex and index ranges.
    Merge,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportOptions {
    pub mesh_policy: MeshPolicy,
    /// Target centimeters per unit; `None` keeps the scene's units.
    pub target_unit_scale: Option<f64>,
    /// Flip V so texture origin is top-left.
    pub flip_uv_v: bool,
    pub import_animations: bool,
    /// Load `<source>.skmc` instead of parsing when it is at least as new as the source and was
    /// cooked with the same options.
    pub use_cooked_cache: bool,
    /// Write `<source>.skmc` after a successful import.
    pub write_cooked_cache: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            mesh_policy: MeshPolicy::FirstOnly,
            target_unit_scale: None,
            flip_uv_v: true,
            import_animations: true,
            use_cooked_cache: true,
            write_cooked_cache: false,
        }
    }
}

/// Loads and caches textures referenced by materials. The importer never owns texture memory.
pub trait TextureLoader {
    /// Returns whether the texture at `path` is available.
    fn ensure_texture_loaded(&mut self, path: &Path, srgb: bool) -> bool;
}

/// Accepts every texture without loading anything.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullTextureLoader;

impl TextureLoader for NullTextureLoader {
    fn ensure_texture_loaded(&mut self, _path: &Path, _srgb: bool) -> bool {
        true
    }
}

/// Cooked cache file next to `source`.
pub fn cooked_path(source: &Path) -> PathBuf {
    let mut s = source.as_os_str().to_owned();
    s.push(".skmc");
    PathBuf::from(s)
}

fn extension_lowercase(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

#[derive(Clone, Debug, Default)]
pub struct Importer {
    options: ImportOptions,
}

impl Importer {
    pub fn new(options: ImportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    /// Imports the scene file at `path`, going through the cooked cache when enabled.
    pub fn load(&self, path: &Path, textures: &mut dyn TextureLoader) -> Result<RenderData, Error> {
        #[cfg(feature = "binary")]
        {
            if extension_lowercase(path) == "skmc" {
                return crate::binary::read_cooked_file(path);
            }
            if self.options.use_cooked_cache {
                if let Some(data) = self.try_cooked(path) {
                    return Ok(data);
                }
            }
        }

        let mut scene = read_scene(path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        if scene.name.is_empty() {
            scene.name = stem.clone();
        }

        let mut data = self.import_scene(scene, path.parent(), textures)?;
        data.object_name = crate::normalize_asset_path(path);
        data.display_name = stem;

        #[cfg(feature = "binary")]
        if self.options.write_cooked_cache {
            let cooked = cooked_path(path);
            let cook = crate::binary::CookOptions::from(&self.options);
            match crate::binary::write_cooked_file(&cooked, &data, &cook) {
                Ok(()) => log::info!("wrote cooked mesh '{}'", cooked.display()),
                Err(e) => log::warn!("failed to write cooked mesh '{}': {e}", cooked.display()),
            }
        }
        Ok(data)
    }

    #[cfg(feature = "binary")]
    fn try_cooked(&self, path: &Path) -> Option<RenderData> {
        let cooked = cooked_path(path);
        let cooked_time = std::fs::metadata(&cooked).and_then(|m| m.modified()).ok()?;
        let source_time = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
        if cooked_time < source_time {
            log::debug!("cooked mesh '{}' is stale", cooked.display());
            return None;
        }
        let expected = crate::binary::CookOptions::from(&self.options);
        match crate::binary::read_cooked_file_if(&cooked, &expected) {
            Ok(Some(data)) => {
                log::info!("loaded cooked mesh '{}'", cooked.display());
                Some(data)
            }
            Ok(None) => None,
            Err(e) => {
                log::warn!("ignoring cooked mesh '{}': {e}", cooked.display());
                None
            }
        }
    }

    /// Runs the pipeline on an in-memory scene. Relative texture paths resolve against
    /// `base_dir`.
    ///
    /// A failed skeleton stage degrades to a bone-free mesh.
    pub fn import_scene(
        &self,
        mut scene: Scene,
        base_dir: Option<&Path>,
        textures: &mut dyn TextureLoader,
    ) -> Result<RenderData, Error> {
        if scene.roots().next().is_none() {
            return Err(Error::NoRootNode { scene: scene.name });
        }

        normalize_scene(&mut scene, self.options.target_unit_scale);

        let skeleton = match build_skeleton(&mut scene) {
            Ok(skeleton) => skeleton,
            Err(e) => {
                log::warn!("scene '{}': {e}; importing without bones", scene.name);
                Skeleton::default()
            }
        };

        let mut assembler =
            MeshAssembler::new(&scene, &skeleton, &self.options, textures, base_dir);
        assembler.append_scene()?;
        let mesh = assembler.finish();
        if mesh.mesh_count == 0 {
            log::warn!("scene '{}' contains no mesh geometry", scene.name);
        }

        let animations = if self.options.import_animations {
            extract_animation_clips(&scene, &skeleton)
        } else {
            Vec::new()
        };

        log::info!(
            "imported '{}': {} vertices, {} triangles, {} bones, {} materials, {} clips",
            scene.name,
            mesh.vertices.len(),
            mesh.indices.len() / 3,
            skeleton.len(),
            mesh.materials.len(),
            animations.len()
        );

        Ok(RenderData {
            object_name: scene.name.clone(),
            display_name: scene.name,
            vertices: mesh.vertices,
            indices: mesh.indices,
            skeleton,
            materials: mesh.materials,
            subsets: mesh.subsets,
            bounds: mesh.bounds,
            animations,
        })
    }
}

/// Imports the scene file at `path`.
pub fn load_skeletal_mesh(
    path: impl AsRef<Path>,
    options: &ImportOptions,
    textures: &mut dyn TextureLoader,
) -> Result<RenderData, Error> {
    Importer::new(options.clone()).load(path.as_ref(), textures)
}

fn read_scene(path: &Path) -> Result<Scene, Error> {
    match extension_lowercase(path).as_str() {
        #[cfg(feature = "json")]
        "json" => {
            let text = std::fs::read_to_string(path).map_err(|source| Error::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Scene::from_json_str(&text)
        }
        _ => Err(Error::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Converts node curves of bone nodes into per-bone clips. Curves on other nodes are dropped.
pub fn extract_animation_clips(scene: &Scene, skeleton: &Skeleton) -> Vec<AnimationClip> {
    let mut clips = Vec::with_capacity(scene.animations.len());
    for stack in &scene.animations {
        let mut tracks = Vec::with_capacity(stack.tracks.len());
        for track in &stack.tracks {
            let bone = scene
                .node_index(track.node)
                .and_then(|i| scene.node(i))
                .and_then(|n| skeleton.find_bone(&n.name));
            let Some(bone) = bone else {
                log::debug!(
                    "animation '{}': curve on non-bone node {} dropped",
                    stack.name,
                    track.node
                );
                continue;
            };
            tracks.push(BoneTrack {
                bone,
                translation: track
                    .translation
                    .iter()
                    .map(|k| Keyframe {
                        time: k.time as f32,
                        value: k.value.as_vec3(),
                    })
                    .collect(),
                rotation: track
                    .rotation
                    .iter()
                    .map(|k| Keyframe {
                        time: k.time as f32,
                        value: k.value.as_quat().normalize(),
                    })
                    .collect(),
                scale: track
                    .scale
                    .iter()
                    .map(|k| Keyframe {
                        time: k.time as f32,
                        value: k.value.as_vec3(),
                    })
                    .collect(),
            });
        }
        if tracks.is_empty() {
            log::debug!("animation '{}' animates no bones", stack.name);
            continue;
        }
        clips.push(AnimationClip::new(stack.name.clone(), tracks));
    }
    clips
}
