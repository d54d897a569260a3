use crate::import::skeleton_from_parts;
use crate::{
    BonePoseSource, ClipPlayer, Error, FALLBACK_MATERIAL_NAME, ImportOptions, Importer, Influence,
    Mesh, MeshPolicy, NullTextureLoader, RenderData, Scene, SkeletalMeshVertex, SkinnedBuffer,
    SkinningEvaluator, TextureLoader, TextureSlot, build_skeleton, limit_influences,
    load_skeletal_mesh, triangulate,
};
use glam::{DMat4, DVec3, Mat4, Vec3};
use std::path::{Path, PathBuf};

fn assert_approx(label: &str, actual: f32, expected: f32) {
    let diff = (actual - expected).abs();
    assert!(
        diff <= 1.0e-4,
        "{label}: expected {expected}, got {actual} (diff {diff})"
    );
}

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
}

fn arm_scene() -> Scene {
    let path = fixtures_dir().join("arm.json");
    let text = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
    Scene::from_json_str(&text).expect("parse arm.json")
}

fn import_with(json: &str, options: ImportOptions) -> RenderData {
    let scene = Scene::from_json_str(json).expect("parse");
    Importer::new(options)
        .import_scene(scene, None, &mut NullTextureLoader)
        .expect("import")
}

fn import(json: &str) -> RenderData {
    import_with(json, ImportOptions::default())
}

fn vertex_at(data: &RenderData, position: [f32; 3]) -> &SkeletalMeshVertex {
    data.vertices
        .iter()
        .find(|v| Vec3::from(v.position).abs_diff_eq(Vec3::from(position), 1.0e-5))
        .unwrap_or_else(|| panic!("no vertex at {position:?}"))
}

#[derive(Default)]
struct RecordingLoader {
    calls: Vec<(PathBuf, bool)>,
    reject: bool,
}

impl TextureLoader for RecordingLoader {
    fn ensure_texture_loaded(&mut self, path: &Path, srgb: bool) -> bool {
        self.calls.push((path.to_path_buf(), srgb));
        !self.reject
    }
}

#[test]
fn arm_imports_deduplicated_geometry() {
    let data = Importer::default()
        .import_scene(arm_scene(), None, &mut NullTextureLoader)
        .expect("import");

    // Two quads sharing an edge: six control points, every attribute per control point.
    assert_eq!(data.vertices.len(), 6);
    assert_eq!(data.indices.len(), 12);
    assert_eq!(data.triangle_count(), 4);
    assert!(data.indices.iter().all(|&i| (i as usize) < data.vertices.len()));

    let v = vertex_at(&data, [0.0, 1.0, 0.0]);
    assert_eq!(v.normal, [0.0, 0.0, 1.0]);
    // V is flipped.
    assert_eq!(v.uv, [0.0, 0.0]);
    assert_eq!(vertex_at(&data, [10.0, -1.0, 0.0]).uv, [0.5, 1.0]);

    assert_eq!(data.bounds.min, Vec3::new(0.0, -1.0, 0.0));
    assert_eq!(data.bounds.max, Vec3::new(20.0, 1.0, 0.0));
}

#[test]
fn arm_skeleton_is_topologically_ordered() {
    let data = Importer::default()
        .import_scene(arm_scene(), None, &mut NullTextureLoader)
        .expect("import");
    let skeleton = &data.skeleton;
    let names = skeleton
        .bones()
        .iter()
        .map(|b| b.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, ["Shoulder", "Elbow"]);
    for bone in skeleton.bones() {
        if let Some(parent) = bone.parent {
            assert!(parent < bone.index);
        }
    }
    // The null "Armature" node above the shoulder is not a bone.
    assert_eq!(skeleton.bones()[0].parent, None);
    assert_eq!(skeleton.bones()[1].parent, Some(0));

    let elbow = &skeleton.bones()[1];
    assert!(
        elbow
            .local
            .translation
            .abs_diff_eq(Vec3::new(10.0, 0.0, 0.0), 1.0e-5)
    );
    assert!(
        (elbow.bind_pose() * elbow.inverse_bind_pose()).abs_diff_eq(Mat4::IDENTITY, 1.0e-5)
    );
}

#[test]
fn arm_weights_are_normalized_and_resolved_to_bones() {
    let data = Importer::default()
        .import_scene(arm_scene(), None, &mut NullTextureLoader)
        .expect("import");
    for (i, v) in data.vertices.iter().enumerate() {
        assert_approx(&format!("v{i} weight sum"), v.weight_sum(), 1.0);
    }
    let mid = vertex_at(&data, [10.0, -1.0, 0.0]);
    assert_eq!(mid.bone_indices, [0, 1, 0, 0]);
    assert_eq!(mid.bone_weights, [0.5, 0.5, 0.0, 0.0]);
    let tip = vertex_at(&data, [20.0, 1.0, 0.0]);
    assert_eq!(tip.bone_indices[0], 1);
    assert_eq!(tip.bone_weights, [1.0, 0.0, 0.0, 0.0]);
}

#[test]
fn arm_subsets_cover_every_triangle_once() {
    let data = Importer::default()
        .import_scene(arm_scene(), None, &mut NullTextureLoader)
        .expect("import");
    let names = data
        .materials
        .iter()
        .map(|m| m.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, ["Skin", "Cloth"]);

    assert_eq!(data.subsets.len(), 2);
    let mut next = 0;
    for subset in &data.subsets {
        assert_eq!(subset.index_start, next);
        assert_eq!(subset.index_count % 3, 0);
        next += subset.index_count;
    }
    assert_eq!(next as usize, data.indices.len());
    assert_eq!(data.subsets[0].material_name, "Skin");
    assert_eq!(data.subsets[1].material_index, 1);

    let cloth = &data.materials[1];
    assert_approx("opacity", cloth.opacity, 0.5);
    assert_approx("diffuse b", cloth.diffuse_color[2], 0.8);
}

#[test]
fn textures_resolve_against_the_scene_directory() {
    let mut loader = RecordingLoader::default();
    let dir = fixtures_dir();
    let data = Importer::default()
        .import_scene(arm_scene(), Some(dir.as_path()), &mut loader)
        .expect("import");

    assert_eq!(
        loader.calls,
        vec![(dir.join("skin.png"), true), (dir.join("skin_n.png"), false)]
    );
    let skin = &data.materials[0];
    assert!(skin.has_texture(TextureSlot::Diffuse));
    assert!(skin.has_texture(TextureSlot::Normal));
    assert!(!skin.has_texture(TextureSlot::Specular));
    let diffuse = skin.texture(TextureSlot::Diffuse).expect("diffuse");
    assert_eq!(diffuse.path, dir.join("skin.png"));
    assert!(diffuse.srgb);
}

#[test]
fn rejected_textures_are_left_unbound() {
    let mut loader = RecordingLoader {
        reject: true,
        ..Default::default()
    };
    let data = Importer::default()
        .import_scene(arm_scene(), None, &mut loader)
        .expect("import");
    assert_eq!(loader.calls.len(), 2);
    assert_eq!(data.materials[0].texture_flags, 0);
    assert!(data.materials[0].textures.is_empty());
}

#[test]
fn arm_bend_clip_rotates_the_forearm() {
    let data = Importer::default()
        .import_scene(arm_scene(), None, &mut NullTextureLoader)
        .expect("import");
    let clip = data.animation("Bend").expect("Bend clip").clone();
    assert_approx("duration", clip.duration, 1.0);

    let mut player = ClipPlayer::new(clip, false);
    player.set_time(1.0);
    let pose = player
        .local_bone_transforms(&data.skeleton)
        .expect("pose");

    let mut out = SkinnedBuffer::new();
    SkinningEvaluator::new().evaluate(&data, &pose, &mut out);

    let skinned = |p: [f32; 3]| {
        let index = data
            .vertices
            .iter()
            .position(|v| v.position == p)
            .unwrap_or_else(|| panic!("no vertex at {p:?}"));
        out.vertices()[index].position
    };
    let tip = skinned([20.0, -1.0, 0.0]);
    assert_approx("tip x", tip[0], 11.0);
    assert_approx("tip y", tip[1], 10.0);
    let elbow = skinned([10.0, -1.0, 0.0]);
    assert_approx("elbow x", elbow[0], 10.5);
    assert_approx("elbow y", elbow[1], -0.5);
    let shoulder = skinned([0.0, -1.0, 0.0]);
    assert_eq!(shoulder, [0.0, -1.0, 0.0]);
}

#[test]
fn importing_twice_gives_identical_bone_tables() {
    let a = Importer::default()
        .import_scene(arm_scene(), None, &mut NullTextureLoader)
        .expect("first import");
    let b = Importer::default()
        .import_scene(arm_scene(), None, &mut NullTextureLoader)
        .expect("second import");
    assert_eq!(a.skeleton, b.skeleton);
    assert_eq!(a.vertices, b.vertices);
    assert_eq!(a.indices, b.indices);
}

#[test]
fn load_skeletal_mesh_names_the_object_after_the_file() {
    let options = ImportOptions {
        use_cooked_cache: false,
        ..Default::default()
    };
    let path = fixtures_dir().join("arm.json");
    let data = load_skeletal_mesh(&path, &options, &mut NullTextureLoader).expect("load");
    assert_eq!(data.display_name, "arm");
    assert!(data.object_name.ends_with("tests/fixtures/arm.json"));
    assert_eq!(data.vertices.len(), 6);

    let options = ImportOptions {
        import_animations: false,
        use_cooked_cache: false,
        ..Default::default()
    };
    let data = load_skeletal_mesh(&path, &options, &mut NullTextureLoader).expect("load");
    assert!(data.animations.is_empty());
}

#[test]
fn load_errors_are_reported() {
    let options = ImportOptions::default();
    let missing = fixtures_dir().join("missing.json");
    assert!(matches!(
        load_skeletal_mesh(&missing, &options, &mut NullTextureLoader),
        Err(Error::Io { .. })
    ));
    assert!(matches!(
        load_skeletal_mesh("hero.fbx", &options, &mut NullTextureLoader),
        Err(Error::UnsupportedFormat { .. })
    ));
}

#[test]
fn empty_scene_has_no_root() {
    let scene = Scene::from_json_str(r#"{ "name": "void", "nodes": [] }"#).expect("parse");
    assert!(matches!(
        Importer::default().import_scene(scene, None, &mut NullTextureLoader),
        Err(Error::NoRootNode { scene }) if scene == "void"
    ));
}

#[test]
fn shared_corners_collapse_only_when_every_attribute_matches() {
    const SHARED: &str = r#"{ "nodes": [ { "id": 1, "mesh": {
        "controlPoints": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]],
        "polygons": [[0,1,2],[0,2,3]],
        "normals": { "mapping": "ByControlPoint", "direct": [[0,0,1],[0,0,1],[0,0,1],[0,0,1]] }
    } } ] }"#;
    let data = import(SHARED);
    assert_eq!(data.vertices.len(), 4);
    assert_eq!(data.indices, vec![0, 1, 2, 0, 2, 3]);

    const SPLIT: &str = r#"{ "nodes": [ { "id": 1, "mesh": {
        "controlPoints": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]],
        "polygons": [[0,1,2],[0,2,3]],
        "uvs": { "mapping": "ByPolygonVertex",
                 "direct": [[0,0],[1,0],[1,1],[0.5,0],[1,1],[0,1]] }
    } } ] }"#;
    let data = import(SPLIT);
    // Every corner has its own uv slot.
    assert_eq!(data.vertices.len(), 6);
}

#[test]
fn indexed_uvs_can_share_slots_across_polygons() {
    const JSON: &str = r#"{ "nodes": [ { "id": 1, "mesh": {
        "controlPoints": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]],
        "polygons": [[0,1,2],[0,2,3]],
        "uvs": { "mapping": "ByPolygonVertex", "reference": "IndexToDirect",
                 "direct": [[0,0],[1,0],[1,1],[0,1]], "index": [0,1,2,0,2,3] }
    } } ] }"#;
    let data = import(JSON);
    assert_eq!(data.vertices.len(), 4);
}

#[test]
fn every_mapping_mode_resolves() {
    const JSON: &str = r#"{ "nodes": [ { "id": 1, "mesh": {
        "controlPoints": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]],
        "polygons": [[0,1,2],[0,2,3]],
        "normals": { "mapping": "ByEdge", "direct": [[0,0,1]] },
        "uvs": { "mapping": "ByPolygon", "direct": [[0,0],[1,1]] },
        "colors": { "mapping": "AllSame", "direct": [[1,0,0,1]] },
        "tangents": { "mapping": "ByPolygonVertex", "reference": "IndexToDirect",
                      "direct": [[1,0,0,-1],[0,1,0,1]], "index": [0,0,0,1,1,1] }
    } } ] }"#;
    let data = import(JSON);
    assert_eq!(data.vertices.len(), 6);
    for v in &data.vertices {
        assert_eq!(v.color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(v.normal, [0.0, 0.0, 0.0]);
    }
    let first = &data.vertices[data.indices[0] as usize];
    assert_eq!(first.uv, [0.0, 1.0]);
    assert_eq!(first.tangent, [1.0, 0.0, 0.0, -1.0]);
    let last = &data.vertices[data.indices[5] as usize];
    assert_eq!(last.uv, [1.0, 0.0]);
    assert_eq!(last.tangent, [0.0, 1.0, 0.0, 1.0]);
}

#[test]
fn uv_flip_can_be_disabled() {
    const JSON: &str = r#"{ "nodes": [ { "id": 1, "mesh": {
        "controlPoints": [[0,0,0],[1,0,0],[0,1,0]],
        "polygons": [[0,1,2]],
        "uvs": { "mapping": "ByControlPoint", "direct": [[0,0.25],[1,0],[0,1]] }
    } } ] }"#;
    let options = ImportOptions {
        flip_uv_v: false,
        ..Default::default()
    };
    let data = import_with(JSON, options);
    assert_eq!(data.vertices[0].uv, [0.0, 0.25]);
}

#[test]
fn node_transform_is_baked_into_geometry() {
    const JSON: &str = r#"{ "nodes": [ { "id": 1, "translation": [0,0,5], "scaling": [2,1,1],
        "mesh": {
            "controlPoints": [[0,0,0],[1,0,0],[0,1,0]],
            "polygons": [[0,1,2]],
            "normals": { "mapping": "AllSame", "direct": [[1,1,0]] }
        } } ] }"#;
    let data = import(JSON);
    vertex_at(&data, [2.0, 0.0, 5.0]);
    // Inverse transpose of scale (2, 1, 1) on (1, 1, 0), renormalized.
    let n = Vec3::from(data.vertices[0].normal);
    assert!(n.abs_diff_eq(Vec3::new(0.5, 1.0, 0.0).normalize(), 1.0e-5), "{n}");
}

#[test]
fn geometric_pivot_offsets_geometry_but_not_children() {
    const JSON: &str = r#"{ "nodes": [
        { "id": 1, "translation": [0,0,5], "geometricTranslation": [1,0,0],
          "mesh": {
            "controlPoints": [[0,0,0],[1,0,0],[0,1,0]],
            "polygons": [[0,1,2]]
          } },
        { "id": 2, "parent": 1, "name": "Bone", "attribute": "skeleton", "translation": [0,0,1] }
    ] }"#;
    let data = import(JSON);
    vertex_at(&data, [1.0, 0.0, 5.0]);
    vertex_at(&data, [2.0, 0.0, 5.0]);
    vertex_at(&data, [1.0, 1.0, 5.0]);

    let bone = &data.skeleton.bones()[0];
    assert!(
        bone.bind_pose()
            .w_axis
            .truncate()
            .abs_diff_eq(Vec3::new(0.0, 0.0, 6.0), 1.0e-5)
    );
}

#[test]
fn duplicate_bind_pose_entries_use_the_first() {
    const JSON: &str = r#"{
        "nodes": [ { "id": 1, "name": "Root", "attribute": "skeleton" } ],
        "poses": [ { "name": "BindPose", "entries": [
            { "node": 1, "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 4,0,0,1] },
            { "node": 1, "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 9,0,0,1] }
        ] } ]
    }"#;
    let mut scene = Scene::from_json_str(JSON).expect("parse");
    let skeleton = build_skeleton(&mut scene).expect("skeleton");
    assert!(
        skeleton.bones()[0]
            .bind_pose()
            .w_axis
            .truncate()
            .abs_diff_eq(Vec3::new(4.0, 0.0, 0.0), 1.0e-5)
    );
}

#[test]
fn polygons_are_fan_triangulated() {
    let mesh = Mesh {
        control_points: vec![DVec3::ZERO; 5],
        polygons: vec![vec![0, 1, 2, 3, 4], vec![0, 1], vec![0, 1, 9]],
        ..Default::default()
    };
    let (triangles, skipped) = triangulate(&mesh);
    assert_eq!(skipped, 2);
    assert_eq!(triangles.len(), 3);
    let cps = triangles
        .iter()
        .map(|t| t.corners.map(|c| c.control_point))
        .collect::<Vec<_>>();
    assert_eq!(cps, vec![[0, 1, 2], [0, 2, 3], [0, 3, 4]]);
    assert_eq!(triangles[2].corners[2].polygon_vertex, 4);
}

#[test]
fn only_the_four_heaviest_influences_survive() {
    const JSON: &str = r#"{
        "nodes": [
            { "id": 10, "name": "b0", "attribute": "skeleton" },
            { "id": 11, "name": "b1", "attribute": "skeleton" },
            { "id": 12, "name": "b2", "attribute": "skeleton" },
            { "id": 13, "name": "b3", "attribute": "skeleton" },
            { "id": 14, "name": "b4", "attribute": "skeleton" },
            { "id": 1, "mesh": {
                "controlPoints": [[0,0,0],[1,0,0],[0,1,0]],
                "polygons": [[0,1,2]],
                "skins": [ { "clusters": [
                    { "link": 10, "indices": [0], "weights": [0.1] },
                    { "link": 11, "indices": [0], "weights": [0.4] },
                    { "link": 12, "indices": [0], "weights": [0.2] },
                    { "link": 13, "indices": [0], "weights": [0.25] },
                    { "link": 14, "indices": [0, 1], "weights": [0.05, 0.000001] }
                ] } ]
            } }
        ]
    }"#;
    let data = import(JSON);
    assert_eq!(data.skeleton.len(), 5);
    let v = &data.vertices[0];
    assert_eq!(v.bone_indices, [1, 3, 2, 0]);
    assert_approx("sum", v.weight_sum(), 1.0);
    assert_approx("w0", v.bone_weights[0], 0.4 / 0.95);
    assert_approx("w3", v.bone_weights[3], 0.1 / 0.95);
    // Below the weight epsilon: no influence at all.
    assert!(!data.vertices[1].has_influences());
}

#[test]
fn limit_influences_keeps_ties_in_order() {
    let influences = [
        Influence { bone: 4, weight: 0.2 },
        Influence { bone: 2, weight: 0.2 },
        Influence { bone: 7, weight: 0.6 },
    ];
    let (bones, weights) = limit_influences(&influences);
    assert_eq!(bones, [7, 4, 2, 0]);
    assert_approx("w0", weights[0], 0.6);
    assert_approx("w1", weights[1], 0.2);
    assert_eq!(weights[3], 0.0);

    assert_eq!(limit_influences(&[]), ([0; 4], [0.0; 4]));
}

#[test]
fn clusters_linked_to_non_bones_are_skipped() {
    const JSON: &str = r#"{
        "nodes": [
            { "id": 1, "name": "Helper" },
            { "id": 2, "name": "B", "attribute": "skeleton" },
            { "id": 3, "mesh": {
                "controlPoints": [[0,0,0],[1,0,0],[0,1,0]],
                "polygons": [[0,1,2]],
                "skins": [ { "clusters": [
                    { "link": 1, "indices": [0], "weights": [1.0] },
                    { "indices": [2], "weights": [1.0] },
                    { "link": 2, "indices": [1, 8], "weights": [1.0, 1.0] }
                ] } ]
            } }
        ]
    }"#;
    let data = import(JSON);
    assert_eq!(data.skeleton.len(), 1);
    let at = |p: [f32; 3]| vertex_at(&data, p).has_influences();
    assert!(!at([0.0, 0.0, 0.0]));
    assert!(at([1.0, 0.0, 0.0]));
    assert!(!at([0.0, 1.0, 0.0]));
}

#[test]
fn bones_below_non_bone_nodes_keep_their_bone_parent() {
    const JSON: &str = r#"{
        "nodes": [
            { "id": 1, "name": "Hips", "attribute": "skeleton" },
            { "id": 2, "name": "Offset", "parent": 1 },
            { "id": 3, "name": "Spine", "parent": 2, "attribute": "skeleton" },
            { "id": 4, "name": "Prop", "parent": 1, "attribute": "camera" },
            { "id": 5, "name": "Leg", "parent": 1, "attribute": "skeleton" }
        ]
    }"#;
    let mut scene = Scene::from_json_str(JSON).expect("parse");
    let skeleton = build_skeleton(&mut scene).expect("skeleton");
    let table = skeleton
        .bones()
        .iter()
        .map(|b| (b.name.as_str(), b.parent))
        .collect::<Vec<_>>();
    assert_eq!(
        table,
        vec![("Hips", None), ("Spine", Some(0)), ("Leg", Some(0))]
    );
}

#[test]
fn missing_bind_pose_is_synthesized_from_node_transforms() {
    const JSON: &str = r#"{
        "nodes": [
            { "id": 1, "name": "A", "attribute": "skeleton", "translation": [0,0,2] },
            { "id": 2, "name": "B", "parent": 1, "attribute": "skeleton", "translation": [0,0,3] }
        ]
    }"#;
    let mut scene = Scene::from_json_str(JSON).expect("parse");
    let skeleton = build_skeleton(&mut scene).expect("skeleton");
    assert_eq!(scene.poses.len(), 1);

    let b = &skeleton.bones()[1];
    assert!(
        b.bind_pose()
            .w_axis
            .truncate()
            .abs_diff_eq(Vec3::new(0.0, 0.0, 5.0), 1.0e-5)
    );
    assert!(
        b.local
            .translation
            .abs_diff_eq(Vec3::new(0.0, 0.0, 3.0), 1.0e-5)
    );
}

#[test]
fn bones_missing_from_the_bind_pose_get_identity() {
    const JSON: &str = r#"{
        "nodes": [
            { "id": 1, "name": "A", "attribute": "skeleton", "translation": [0,0,2] },
            { "id": 2, "name": "B", "parent": 1, "attribute": "skeleton", "translation": [0,0,3] }
        ],
        "poses": [ { "name": "bind", "entries": [
            { "node": 1, "matrix": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,2,1] }
        ] } ]
    }"#;
    let mut scene = Scene::from_json_str(JSON).expect("parse");
    let skeleton = build_skeleton(&mut scene).expect("skeleton");
    let b = &skeleton.bones()[1];
    assert_eq!(b.bind_pose(), Mat4::IDENTITY);
    assert!(
        b.local
            .translation
            .abs_diff_eq(Vec3::new(0.0, 0.0, -2.0), 1.0e-5)
    );
}

#[test]
fn skeleton_tables_must_be_parent_first() {
    let err = skeleton_from_parts(
        vec!["a".to_string(), "b".to_string()],
        vec![Some(1), None],
        vec![DMat4::IDENTITY; 2],
        vec![DMat4::IDENTITY; 2],
    )
    .expect_err("forward parent");
    assert!(matches!(err, Error::InvalidSkeleton { .. }));

    let err = skeleton_from_parts(
        vec!["a".to_string()],
        vec![None, None],
        vec![DMat4::IDENTITY],
        vec![DMat4::IDENTITY],
    )
    .expect_err("count mismatch");
    assert!(matches!(err, Error::InvalidSkeleton { .. }));
}

const TWO_MESHES: &str = r#"{ "nodes": [
    { "id": 1, "name": "first", "mesh": {
        "controlPoints": [[0,0,0],[1,0,0],[0,1,0]], "polygons": [[0,1,2]] } },
    { "id": 2, "name": "second", "translation": [0,0,10], "mesh": {
        "controlPoints": [[0,0,0],[1,0,0],[0,1,0]], "polygons": [[0,1,2]] } }
] }"#;

#[test]
fn first_only_policy_skips_later_meshes() {
    let data = import(TWO_MESHES);
    assert_eq!(data.vertices.len(), 3);
    assert_eq!(data.subsets.len(), 1);
    assert!(data.vertices.iter().all(|v| v.position[2] == 0.0));
}

#[test]
fn merge_policy_appends_every_mesh() {
    let options = ImportOptions {
        mesh_policy: MeshPolicy::Merge,
        ..Default::default()
    };
    let data = import_with(TWO_MESHES, options);
    assert_eq!(data.vertices.len(), 6);
    assert_eq!(&data.indices[3..], &[3, 4, 5]);
    assert_eq!(data.subsets.len(), 2);
    assert_eq!(data.subsets[1].index_start, 3);
    assert_eq!(data.materials.len(), 1);
    assert_eq!(data.materials[0].name, FALLBACK_MATERIAL_NAME);
    assert_approx("second z", data.vertices[3].position[2], 10.0);
}

#[test]
fn bad_material_slots_use_the_fallback_material() {
    const JSON: &str = r#"{
        "materials": [ { "name": "Only" } ],
        "nodes": [ { "id": 1, "materials": ["Only"], "mesh": {
            "controlPoints": [[0,0,0],[1,0,0],[1,1,0],[0,1,0]],
            "polygons": [[0,1,2],[0,2,3]],
            "materials": { "mapping": "ByPolygon", "index": [0, 5] }
        } } ]
    }"#;
    let data = import(JSON);
    let names = data
        .subsets
        .iter()
        .map(|s| (s.material_name.as_str(), s.index_count))
        .collect::<Vec<_>>();
    assert_eq!(names, vec![("Only", 3), (FALLBACK_MATERIAL_NAME, 3)]);
}

#[test]
fn mirrored_conversion_keeps_faces_pointing_along_their_normals() {
    const JSON: &str = r#"{
        "globalSettings": { "upAxis": 1, "frontAxis": 2, "coordAxis": 0, "coordAxisSign": 1 },
        "nodes": [ { "id": 1, "mesh": {
            "controlPoints": [[0,0,0],[1,0,0],[0,1,0]],
            "polygons": [[0,1,2]],
            "normals": { "mapping": "ByControlPoint", "direct": [[0,0,1],[0,0,1],[0,0,1]] }
        } } ]
    }"#;
    let data = import(JSON);
    let p = |i: usize| Vec3::from(data.vertices[data.indices[i] as usize].position);
    let face = (p(1) - p(0)).cross(p(2) - p(0));
    let normal = Vec3::from(data.vertices[0].normal);
    assert!(normal.abs_diff_eq(Vec3::X, 1.0e-5), "{normal}");
    assert!(face.dot(normal) > 0.0, "face {face} against normal {normal}");
}
