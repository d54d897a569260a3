use crate::{
    BindPose, Cluster, Error, LayerElement, MappingMode, MaterialLayer, Mesh, Node, NodeAttribute,
    NodeId, PoseEntry, ReferenceMode, Scene, Skin,
};
use glam::{DMat4, DVec3};

fn chain() -> Scene {
    // a
    // +- b
    // |  +- d
    // +- c
    let mut scene = Scene::new("chain");
    let a = scene
        .add_node(
            Node::new(NodeId(1), "a").with_translation(DVec3::new(1.0, 0.0, 0.0)),
            None,
        )
        .expect("a");
    let b = scene
        .add_node(
            Node::new(NodeId(2), "b").with_translation(DVec3::new(0.0, 2.0, 0.0)),
            Some(a),
        )
        .expect("b");
    scene.add_node(Node::new(NodeId(3), "c"), Some(a)).expect("c");
    scene
        .add_node(
            Node::new(NodeId(4), "d").with_scale(DVec3::splat(2.0)),
            Some(b),
        )
        .expect("d");
    scene
}

#[test]
fn depth_first_visits_children_in_sibling_order() {
    let scene = chain();
    let names = scene
        .depth_first()
        .into_iter()
        .map(|i| scene.nodes()[i].name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, ["a", "b", "d", "c"]);
    assert_eq!(scene.roots().collect::<Vec<_>>(), [0]);
}

#[test]
fn global_matrix_composes_parents_first() {
    let scene = chain();
    let d = scene.find_node("d").expect("d");
    let m = scene.global_matrix(d);
    assert!(
        m.w_axis
            .truncate()
            .abs_diff_eq(DVec3::new(1.0, 2.0, 0.0), 1e-12)
    );
    assert!(
        m.transform_vector3(DVec3::X)
            .abs_diff_eq(DVec3::new(2.0, 0.0, 0.0), 1e-12)
    );
}

#[test]
fn duplicate_ids_and_bad_parents_are_rejected() {
    let mut scene = chain();
    assert!(matches!(
        scene.add_node(Node::new(NodeId(2), "again"), None),
        Err(Error::InvalidValue { .. })
    ));
    assert!(matches!(
        scene.add_node(Node::new(NodeId(9), "orphan"), Some(42)),
        Err(Error::InvalidValue { .. })
    ));
    assert_eq!(scene.nodes().len(), 4);
}

#[test]
fn layer_mappings_resolve_direct_slots() {
    let by_cp = LayerElement::new(
        MappingMode::ByControlPoint,
        ReferenceMode::Direct,
        vec![10, 11, 12],
    );
    assert_eq!(by_cp.direct_index(2, 7, 0), Some(2));

    let by_pv = LayerElement::new(
        MappingMode::ByPolygonVertex,
        ReferenceMode::IndexToDirect,
        vec![10, 11],
    )
    .with_index(vec![1, 0, 1, 5, -1]);
    assert_eq!(by_pv.direct_index(0, 0, 0), Some(1));
    assert_eq!(by_pv.direct_index(0, 1, 0), Some(0));
    // Index past the value array, negative index, and index past the index array.
    assert_eq!(by_pv.direct_index(0, 3, 0), None);
    assert_eq!(by_pv.direct_index(0, 4, 0), None);
    assert_eq!(by_pv.direct_index(0, 5, 0), None);

    let by_polygon = LayerElement::new(MappingMode::ByPolygon, ReferenceMode::Direct, vec![1, 2]);
    assert_eq!(by_polygon.direct_index(9, 9, 1), Some(1));

    let all_same = LayerElement::new(MappingMode::AllSame, ReferenceMode::Direct, vec![4]);
    assert_eq!(all_same.direct_index(3, 8, 2), Some(0));

    let by_edge = LayerElement::new(MappingMode::ByEdge, ReferenceMode::Direct, vec![4]);
    assert_eq!(by_edge.direct_index(0, 0, 0), None);
}

#[test]
fn material_layer_slots() {
    let all_same = MaterialLayer {
        mapping: MappingMode::AllSame,
        index: vec![2],
    };
    assert_eq!(all_same.slot_for_polygon(5), Some(2));

    let by_polygon = MaterialLayer {
        mapping: MappingMode::ByPolygon,
        index: vec![0, 1, -1],
    };
    assert_eq!(by_polygon.slot_for_polygon(1), Some(1));
    assert_eq!(by_polygon.slot_for_polygon(2), None);
    assert_eq!(by_polygon.slot_for_polygon(3), None);
}

#[test]
fn bind_pose_with_unknown_nodes_is_not_valid() {
    let mut scene = chain();
    scene.poses.push(BindPose {
        name: "stale".to_string(),
        is_bind_pose: true,
        entries: vec![PoseEntry {
            node: NodeId(99),
            matrix: DMat4::IDENTITY,
        }],
    });
    scene.poses.push(BindPose {
        name: "rest".to_string(),
        is_bind_pose: false,
        entries: vec![PoseEntry {
            node: NodeId(1),
            matrix: DMat4::IDENTITY,
        }],
    });
    assert!(scene.valid_bind_pose().is_none());
}

#[test]
fn synthesized_bind_pose_prefers_cluster_link_matrices() {
    let mut scene = Scene::new("rig");
    let hip = scene
        .add_node(
            Node::new(NodeId(1), "hip")
                .with_translation(DVec3::new(0.0, 0.0, 3.0))
                .with_attribute(NodeAttribute::Skeleton),
            None,
        )
        .expect("hip");
    scene
        .add_node(
            Node::new(NodeId(2), "knee")
                .with_translation(DVec3::new(0.0, 0.0, -1.0))
                .with_attribute(NodeAttribute::Skeleton),
            Some(hip),
        )
        .expect("knee");
    let link = DMat4::from_translation(DVec3::new(5.0, 0.0, 0.0));
    let mesh = Mesh {
        control_points: vec![DVec3::ZERO],
        skins: vec![Skin {
            name: "skin".to_string(),
            clusters: vec![Cluster {
                link: Some(NodeId(1)),
                indices: vec![0],
                weights: vec![1.0],
                transform_link: Some(link),
            }],
        }],
        ..Default::default()
    };
    scene
        .add_node(
            Node::new(NodeId(3), "body").with_attribute(NodeAttribute::Mesh(Box::new(mesh))),
            None,
        )
        .expect("body");

    assert!(scene.synthesize_bind_pose());
    let pose = scene.valid_bind_pose().expect("synthesized pose is valid");
    assert_eq!(pose.entries.len(), 3);
    assert_eq!(pose.matrix_for(NodeId(1)), Some(link));
    let knee = pose.matrix_for(NodeId(2)).expect("knee entry");
    assert!(
        knee.w_axis
            .truncate()
            .abs_diff_eq(DVec3::new(0.0, 0.0, 2.0), 1e-12)
    );
}

#[test]
fn nothing_to_synthesize_without_bones_or_meshes() {
    let mut scene = chain();
    assert!(!scene.synthesize_bind_pose());
    assert!(scene.poses.is_empty());
}

#[test]
fn pose_table_matches_linear_lookup() {
    let first = DMat4::from_translation(DVec3::X);
    let pose = BindPose {
        name: "pose".to_string(),
        is_bind_pose: true,
        entries: vec![
            PoseEntry {
                node: NodeId(1),
                matrix: first,
            },
            PoseEntry {
                node: NodeId(2),
                matrix: DMat4::IDENTITY,
            },
            PoseEntry {
                node: NodeId(1),
                matrix: DMat4::from_translation(DVec3::Y),
            },
        ],
    };
    let table = pose.matrix_table();
    assert_eq!(table.len(), 2);
    for id in [NodeId(1), NodeId(2), NodeId(3)] {
        assert_eq!(table.get(&id).copied(), pose.matrix_for(id), "{id}");
    }
    assert_eq!(table[&NodeId(1)], first);
}

#[test]
fn synthesized_bind_pose_includes_the_geometric_pivot() {
    let mut scene = Scene::new("pivot");
    let root = scene
        .add_node(
            Node::new(NodeId(1), "root")
                .with_translation(DVec3::new(0.0, 0.0, 2.0))
                .with_geometric(DVec3::new(1.0, 0.0, 0.0), glam::DQuat::IDENTITY, DVec3::ONE)
                .with_attribute(NodeAttribute::Skeleton),
            None,
        )
        .expect("root");
    scene
        .add_node(
            Node::new(NodeId(2), "child")
                .with_translation(DVec3::new(0.0, 0.0, 3.0))
                .with_attribute(NodeAttribute::Skeleton),
            Some(root),
        )
        .expect("child");

    assert!(scene.synthesize_bind_pose());
    let pose = scene.valid_bind_pose().expect("pose");
    let root_bind = pose.matrix_for(NodeId(1)).expect("root entry");
    assert!(
        root_bind
            .w_axis
            .truncate()
            .abs_diff_eq(DVec3::new(1.0, 0.0, 2.0), 1e-12)
    );
    // The pivot is not inherited by children.
    let child_bind = pose.matrix_for(NodeId(2)).expect("child entry");
    assert!(
        child_bind
            .w_axis
            .truncate()
            .abs_diff_eq(DVec3::new(0.0, 0.0, 5.0), 1e-12)
    );
}
