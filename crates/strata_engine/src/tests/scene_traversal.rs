//! Scene traversal scenarios: transform propagation, recalculation
//! avoidance and enable/visibility handling

use std::sync::Arc;

use approx::assert_relative_eq;

use crate::config::SceneConfig;
use crate::foundation::math::{compose_trs, Mat4, Quat, Vec3};
use crate::render::api::RecordingBackend;
use crate::render::primitives::{Camera, Mesh};
use crate::scene::{MeshNode, NodeHandle, Scene};

struct Rig {
    scene: Scene,
    camera: Camera,
    backend: RecordingBackend,
    arm: NodeHandle,
    hand: NodeHandle,
    finger: NodeHandle,
    sibling: NodeHandle,
}

/// root -> arm -> hand -> finger, plus root -> sibling; every node draws a cube
fn rig() -> Rig {
    let cube = Arc::new(Mesh::cube());
    let mut scene = Scene::new(SceneConfig::new().with_cycle_check(true));
    let root = scene.root();
    let arm = scene.add_renderable(root, MeshNode::new(cube.clone())).unwrap();
    let hand = scene.add_renderable(arm, MeshNode::new(cube.clone())).unwrap();
    let finger = scene.add_renderable(hand, MeshNode::new(cube.clone())).unwrap();
    let sibling = scene.add_renderable(root, MeshNode::new(cube)).unwrap();

    let arm_t = scene.transform_mut(arm).unwrap();
    arm_t.set_position(Vec3::new(1.0, 0.0, 0.0));
    arm_t.set_rotation(Quat::from_axis_angle(&Vec3::z_axis(), 0.5));

    let hand_t = scene.transform_mut(hand).unwrap();
    hand_t.set_position(Vec3::new(0.0, 2.0, 0.0));
    hand_t.set_scale(Vec3::new(2.0, 2.0, 2.0));

    scene.transform_mut(finger).unwrap().set_position(Vec3::new(0.5, 0.5, 0.0));
    scene.transform_mut(sibling).unwrap().set_position(Vec3::new(-3.0, 0.0, 0.0));

    Rig {
        scene,
        camera: Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 60.0, 1.0, 0.1, 100.0),
        backend: RecordingBackend::new(),
        arm,
        hand,
        finger,
        sibling,
    }
}

fn local(scene: &Scene, node: NodeHandle) -> Mat4 {
    let t = scene.transform(node).unwrap();
    compose_trs(t.position(), t.rotation(), t.scale())
}

#[test]
fn test_world_matrix_is_product_of_ancestors() {
    let mut rig = rig();
    rig.scene.render(&mut rig.camera, &mut rig.backend);

    let s = &rig.scene;
    let arm = local(s, rig.arm);
    let hand = arm * local(s, rig.hand);
    let finger = hand * local(s, rig.finger);

    assert_relative_eq!(*s.transform(rig.arm).unwrap().world_matrix(), arm, epsilon = 1e-5);
    assert_relative_eq!(*s.transform(rig.hand).unwrap().world_matrix(), hand, epsilon = 1e-5);
    assert_relative_eq!(*s.transform(rig.finger).unwrap().world_matrix(), finger, epsilon = 1e-5);
}

#[test]
fn test_ancestor_move_applies_in_the_same_frame() {
    let mut rig = rig();
    rig.scene.render(&mut rig.camera, &mut rig.backend);

    rig.scene.transform_mut(rig.arm).unwrap().add_position(Vec3::new(0.0, 0.0, -4.0));
    rig.scene.render(&mut rig.camera, &mut rig.backend);

    let s = &rig.scene;
    let expected = local(s, rig.arm) * local(s, rig.hand) * local(s, rig.finger);
    assert_relative_eq!(*s.transform(rig.finger).unwrap().world_matrix(), expected, epsilon = 1e-5);
}

#[test]
fn test_clean_nodes_are_not_recalculated() {
    let mut rig = rig();
    let first = *rig.scene.render(&mut rig.camera, &mut rig.backend);
    assert_eq!(first.nodes_recalculated, 5);

    let finger_world = *rig.scene.transform(rig.finger).unwrap().world_matrix();
    let second = *rig.scene.render(&mut rig.camera, &mut rig.backend);
    assert_eq!(second.nodes_recalculated, 0);
    assert_eq!(second.nodes_traversed, 5);
    assert_eq!(*rig.scene.transform(rig.finger).unwrap().world_matrix(), finger_world);

    // Moving the hand refreshes the hand and finger only
    rig.scene.transform_mut(rig.hand).unwrap().set_position(Vec3::new(0.0, 3.0, 0.0));
    let third = *rig.scene.render(&mut rig.camera, &mut rig.backend);
    assert_eq!(third.nodes_recalculated, 2);
    assert!(rig.scene.transform(rig.finger).unwrap().changed_last_frame());
    assert!(!rig.scene.transform(rig.arm).unwrap().changed_last_frame());
    assert!(!rig.scene.transform(rig.sibling).unwrap().changed_last_frame());
}

#[test]
fn test_disabled_subtree_is_skipped() {
    let mut rig = rig();
    let cube_triangles = Mesh::cube().triangle_count();

    assert_eq!(rig.scene.triangle_count(), 4 * cube_triangles);
    let all = *rig.scene.render(&mut rig.camera, &mut rig.backend);
    assert_eq!(all.objects_rendered, 4);
    assert_eq!(all.triangles_rendered, 4 * cube_triangles);

    rig.scene.set_enabled(rig.hand, false).unwrap();
    rig.backend.clear();
    assert_eq!(rig.scene.triangle_count(), 2 * cube_triangles);
    let partial = *rig.scene.render(&mut rig.camera, &mut rig.backend);
    assert_eq!(partial.objects_rendered, 2);
    assert_eq!(partial.triangles_rendered, rig.scene.triangle_count());
    assert_eq!(partial.nodes_traversed, 3);
    assert_eq!(rig.backend.draws.len(), 2);

    // A disabled subtree is not recalculated either
    rig.scene.transform_mut(rig.finger).unwrap().set_position(Vec3::zeros());
    rig.scene.render(&mut rig.camera, &mut rig.backend);
    assert!(rig.scene.transform(rig.finger).unwrap().is_dirty());
}

#[test]
fn test_reenabled_subtree_follows_ancestor_moved_while_disabled() {
    let mut rig = rig();
    rig.scene.render(&mut rig.camera, &mut rig.backend);

    rig.scene.set_enabled(rig.hand, false).unwrap();
    rig.scene.transform_mut(rig.arm).unwrap().add_position(Vec3::new(0.0, 0.0, -4.0));
    rig.scene.render(&mut rig.camera, &mut rig.backend);

    rig.scene.set_enabled(rig.hand, true).unwrap();
    let stats = *rig.scene.render(&mut rig.camera, &mut rig.backend);
    assert_eq!(stats.nodes_recalculated, 2);
    assert_eq!(stats.objects_rendered, 4);

    let s = &rig.scene;
    let hand = local(s, rig.arm) * local(s, rig.hand);
    let finger = hand * local(s, rig.finger);
    assert_relative_eq!(*s.transform(rig.hand).unwrap().world_matrix(), hand, epsilon = 1e-5);
    assert_relative_eq!(*s.transform(rig.finger).unwrap().world_matrix(), finger, epsilon = 1e-5);
    assert_relative_eq!(s.transform(rig.finger).unwrap().world_position().z, -4.0, epsilon = 1e-5);

    // Enabling an already enabled node forces nothing
    rig.scene.set_enabled(rig.hand, true).unwrap();
    let steady = *rig.scene.render(&mut rig.camera, &mut rig.backend);
    assert_eq!(steady.nodes_recalculated, 0);
}

#[test]
fn test_invisible_node_still_carries_children() {
    let mut rig = rig();
    rig.scene.set_visible(rig.hand, false).unwrap();
    let expected_triangles = rig.scene.triangle_count();
    let stats = *rig.scene.render(&mut rig.camera, &mut rig.backend);
    assert_eq!(stats.triangles_rendered, expected_triangles);
    assert_eq!(stats.objects_rendered, 3);
    assert_eq!(stats.nodes_traversed, 5);
}

#[test]
fn test_draws_use_camera_relative_matrices() {
    let mut rig = rig();
    rig.scene.render(&mut rig.camera, &mut rig.backend);

    let view = *rig.camera.view_matrix();
    let sibling = rig.scene.transform(rig.sibling).unwrap();
    let expected = view * sibling.world_matrix();
    assert_relative_eq!(*sibling.model_view_matrix(), expected, epsilon = 1e-5);
    assert!(rig
        .backend
        .draws
        .iter()
        .any(|draw| approx::relative_eq!(draw.model_view, expected, epsilon = 1e-5)));
}

#[test]
fn test_children_draw_before_parent() {
    let mut rig = rig();
    rig.scene.render(&mut rig.camera, &mut rig.backend);

    let finger_mv = *rig.scene.transform(rig.finger).unwrap().model_view_matrix();
    let arm_mv = *rig.scene.transform(rig.arm).unwrap().model_view_matrix();
    let position = |mv: &Mat4| rig.backend.draws.iter().position(|d| d.model_view == *mv).unwrap();
    assert!(position(&finger_mv) < position(&arm_mv));
}

#[test]
fn test_stats_reset_every_frame() {
    let mut rig = rig();
    rig.scene.render(&mut rig.camera, &mut rig.backend);
    let second = *rig.scene.render(&mut rig.camera, &mut rig.backend);
    assert_eq!(second.frame, 2);
    assert_eq!(second.objects_rendered, 4);
    assert_eq!(second.batches_rendered, 4);
    assert_eq!(second.material_switches, 1);
}
