use crate::{
    AssetCache, HasSkeleton, ImportOptions, NullTextureLoader, RenderData, SkeletalMesh,
    SkeletalMeshComponent, normalize_asset_path,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("arm.json")
}

fn cache() -> AssetCache {
    AssetCache::new(ImportOptions {
        use_cooked_cache: false,
        ..Default::default()
    })
}

#[test]
fn asset_paths_are_normalized() {
    assert_eq!(
        normalize_asset_path(Path::new("Models\\Hero\\..\\Arm.JSON")),
        "Models/Arm.json"
    );
    assert_eq!(normalize_asset_path(Path::new("./a/./b.Fbx")), "a/b.fbx");
    assert_eq!(normalize_asset_path(Path::new("../shared/x.json")), "../shared/x.json");
    assert_eq!(normalize_asset_path(Path::new("/root/../mesh.json")), "/mesh.json");
    assert_eq!(normalize_asset_path(Path::new("dir/.hidden")), "dir/.hidden");
    assert_eq!(normalize_asset_path(Path::new("noext")), "noext");
}

#[test]
fn get_or_create_imports_once() {
    let mut cache = cache();
    let path = fixture_path();
    let first = cache
        .get_or_create(&path, &mut NullTextureLoader)
        .expect("import arm");
    assert_eq!(cache.len(), 1);
    assert_eq!(first.name(), "arm");

    // Same asset through a different spelling of the path.
    let dotted = path
        .parent()
        .expect("fixtures dir")
        .join(".")
        .join("arm.JSON");
    let second = cache
        .get_or_create(&dotted, &mut NullTextureLoader)
        .expect("cached arm");
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);

    let info = cache.info(&path).expect("info");
    assert_eq!(info.name, "arm");
    assert!(info.size > 0);
    assert_eq!(cache.infos().count(), 1);
}

#[test]
fn failed_imports_are_not_cached() {
    let mut cache = cache();
    assert!(
        cache
            .get_or_create("does/not/exist.json", &mut NullTextureLoader)
            .is_none()
    );
    assert!(cache.is_empty());
    assert!(!cache.contains("does/not/exist.json"));
}

#[test]
fn mesh_material_slots_follow_import_order() {
    let mut cache = cache();
    let mesh = cache
        .get_or_create(fixture_path(), &mut NullTextureLoader)
        .expect("import arm");
    assert_eq!(mesh.material_slot_names(), ["Skin", "Cloth"]);
    assert_eq!(mesh.material_index("Cloth"), Some(1));
    assert_eq!(mesh.material_index("Steel"), None);
    let used = mesh
        .used_materials()
        .iter()
        .map(|m| m.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(used, ["Skin", "Cloth"]);
    assert_eq!(HasSkeleton::skeleton(mesh.as_ref()).map(|s| s.len()), Some(2));
}

#[test]
fn clear_keeps_meshes_alive_for_their_users() {
    let mut cache = cache();
    let mesh = cache
        .get_or_create(fixture_path(), &mut NullTextureLoader)
        .expect("import arm");
    let mut component = SkeletalMeshComponent::with_mesh(mesh);
    cache.clear();
    assert!(cache.is_empty());
    assert!(cache.get(fixture_path()).is_none());

    assert!(component.play_animation("Bend", true));
    let stats = component.tick(0.25);
    assert_eq!(stats.skinned_vertices, 6);
}

#[test]
fn inserted_meshes_replace_and_remove() {
    let mut cache = cache();
    let data = RenderData {
        display_name: "manual".to_string(),
        ..Default::default()
    };
    let mesh = cache.insert("virtual/Manual.JSON", SkeletalMesh::new(data));
    assert!(!cache.contains("virtual/manual.json"));
    assert!(cache.contains("virtual/Manual.json"));
    assert_eq!(mesh.name(), "manual");

    let removed = cache.remove("virtual/Manual.json").expect("removed");
    assert!(Arc::ptr_eq(&mesh, &removed));
    assert!(cache.is_empty());
}
