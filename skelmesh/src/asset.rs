//! Mesh assets and the cache that owns them.

use crate::{
    HasSkeleton, ImportOptions, Importer, MaterialInfo, RenderData, Skeleton, TextureLoader,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MaterialSlot {
    pub name: String,
    pub material_index: usize,
}

/// Imported skeletal mesh shared by every component that draws it.
#[derive(Clone, Debug, PartialEq)]
pub struct SkeletalMesh {
    render_data: RenderData,
    material_slots: Vec<MaterialSlot>,
}

impl SkeletalMesh {
    pub fn new(render_data: RenderData) -> Self {
        let material_slots = render_data
            .materials
            .iter()
            .enumerate()
            .map(|(material_index, m)| MaterialSlot {
                name: m.name.clone(),
                material_index,
            })
            .collect();
        Self {
            render_data,
            material_slots,
        }
    }

    pub fn name(&self) -> &str {
        &self.render_data.display_name
    }

    pub fn render_data(&self) -> &RenderData {
        &self.render_data
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.render_data.skeleton
    }

    pub fn material_slots(&self) -> &[MaterialSlot] {
        &self.material_slots
    }

    pub fn material_slot_names(&self) -> Vec<&str> {
        self.material_slots.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn material_index(&self, slot_name: &str) -> Option<usize> {
        self.material_slots
            .iter()
            .find(|s| s.name == slot_name)
            .map(|s| s.material_index)
    }

    /// Materials referenced by at least one subset, in first-use order.
    pub fn used_materials(&self) -> Vec<&MaterialInfo> {
        let mut seen = Vec::new();
        for subset in &self.render_data.subsets {
            let index = subset.material_index as usize;
            if !seen.contains(&index) {
                seen.push(index);
            }
        }
        seen.into_iter()
            .filter_map(|i| self.render_data.materials.get(i))
            .collect()
    }
}

impl HasSkeleton for SkeletalMesh {
    fn skeleton(&self) -> Option<&Skeleton> {
        Some(&self.render_data.skeleton)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetInfo {
    pub name: String,
    pub path: PathBuf,
    /// File size in bytes, 0 when unknown.
    pub size: u64,
}

#[derive(Clone, Debug)]
struct CacheEntry {
    info: AssetInfo,
    mesh: Arc<SkeletalMesh>,
}

/// Cache key for `path`: `/` separators, `.` and `..` collapsed, lowercase extension.
pub fn normalize_asset_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let absolute = raw.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            p => parts.push(p),
        }
    }

    let mut out = parts.join("/");
    if absolute {
        out.insert(0, '/');
    }
    let file_start = out.rfind('/').map_or(0, |i| i + 1);
    if let Some(dot) = out[file_start..].rfind('.') {
        let dot = file_start + dot;
        if dot > file_start {
            let ext = out[dot..].to_ascii_lowercase();
            out.truncate(dot);
            out.push_str(&ext);
        }
    }
    out
}

/// Path-keyed owner of imported meshes.
///
/// Created explicitly and passed to whoever needs meshes; [`AssetCache::clear`] is the teardown.
#[derive(Debug, Default)]
pub struct AssetCache {
    importer: Importer,
    entries: HashMap<String, CacheEntry>,
}

impl AssetCache {
    pub fn new(options: ImportOptions) -> Self {
        Self {
            importer: Importer::new(options),
            entries: HashMap::new(),
        }
    }

    pub fn options(&self) -> &ImportOptions {
        self.importer.options()
    }

    /// Cached mesh for `path`, importing it on a miss.
    ///
    /// A failed import is logged and yields `None`; nothing is cached for it.
    pub fn get_or_create(
        &mut self,
        path: impl AsRef<Path>,
        textures: &mut dyn TextureLoader,
    ) -> Option<Arc<SkeletalMesh>> {
        let path = path.as_ref();
        let key = normalize_asset_path(path);
        if let Some(entry) = self.entries.get(&key) {
            return Some(entry.mesh.clone());
        }

        let data = match self.importer.load(path, textures) {
            Ok(data) => data,
            Err(e) => {
                log::error!("failed to import '{}': {e}", path.display());
                return None;
            }
        };
        Some(self.insert_keyed(key, path, SkeletalMesh::new(data)))
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Arc<SkeletalMesh>> {
        self.entries
            .get(&normalize_asset_path(path.as_ref()))
            .map(|e| e.mesh.clone())
    }

    pub fn info(&self, path: impl AsRef<Path>) -> Option<&AssetInfo> {
        self.entries
            .get(&normalize_asset_path(path.as_ref()))
            .map(|e| &e.info)
    }

    pub fn infos(&self) -> impl Iterator<Item = &AssetInfo> + '_ {
        self.entries.values().map(|e| &e.info)
    }

    /// Registers an already built mesh under `path`, replacing any previous entry.
    pub fn insert(&mut self, path: impl AsRef<Path>, mesh: SkeletalMesh) -> Arc<SkeletalMesh> {
        let path = path.as_ref();
        self.insert_keyed(normalize_asset_path(path), path, mesh)
    }

    fn insert_keyed(&mut self, key: String, path: &Path, mesh: SkeletalMesh) -> Arc<SkeletalMesh> {
        let info = AssetInfo {
            name: path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string(),
            path: path.to_path_buf(),
            size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        };
        let mesh = Arc::new(mesh);
        self.entries.insert(
            key,
            CacheEntry {
                info,
                mesh: mesh.clone(),
            },
        );
        mesh
    }

    pub fn remove(&mut self, path: impl AsRef<Path>) -> Option<Arc<SkeletalMesh>> {
        self.entries
            .remove(&normalize_asset_path(path.as_ref()))
            .map(|e| e.mesh)
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entries
            .contains_key(&normalize_asset_path(path.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every cached mesh. Components holding an `Arc` keep theirs alive.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
