use super::*;
use crate::error::ErrorKind;

// ============================================================================
// Helpers
// ============================================================================

const EPS: f32 = 1e-4;

fn object_keys(count: usize) -> Vec<MovableObjectKey> {
    let mut map: SlotMap<MovableObjectKey, ()> = SlotMap::with_key();
    (0..count).map(|_| map.insert(())).collect()
}

fn unit_box(_: MovableObjectKey) -> AABB {
    AABB::new(Vec3::splat(-1.0), Vec3::splat(1.0))
}

fn approx(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < EPS
}

// ============================================================================
// Hierarchy
// ============================================================================

#[test]
fn test_new_graph_has_root() {
    let graph = SceneGraph::new();
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.node_by_name("Root"), Some(graph.root()));
    assert!(graph.node(graph.root()).unwrap().parent().is_none());
}

#[test]
fn test_create_child_links_parent() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let child = graph.create_child(root).unwrap();
    assert_eq!(graph.node(child).unwrap().parent(), Some(root));
    assert_eq!(graph.node(root).unwrap().children(), &[child]);
}

#[test]
fn test_named_child_must_be_unique() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let ship = graph.create_named_child(root, "ship").unwrap();
    assert_eq!(graph.node_by_name("ship"), Some(ship));
    let err = graph.create_named_child(root, "ship").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateItem);
}

#[test]
fn test_add_child_rejects_attached_node() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let a = graph.create_child(root).unwrap();
    let b = graph.create_child(root).unwrap();
    let err = graph.add_child(a, b).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_add_child_rejects_cycle() {
    let mut graph = SceneGraph::new();
    let top = graph.create_node();
    let middle = graph.create_child(top).unwrap();
    let bottom = graph.create_child(middle).unwrap();

    // top is detached; putting it under its own grandchild is a cycle
    let err = graph.add_child(bottom, top).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);

    let err = graph.add_child(top, top).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);
}

#[test]
fn test_remove_then_readd_child() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let a = graph.create_child(root).unwrap();
    let b = graph.create_child(a).unwrap();
    graph.remove_child(a, b).unwrap();
    assert!(graph.node(b).unwrap().parent().is_none());
    assert!(!graph.is_in_scene_and_visible(b));

    graph.add_child(root, b).unwrap();
    assert_eq!(graph.node(b).unwrap().parent(), Some(root));
}

#[test]
fn test_remove_unknown_child_fails() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let loose = graph.create_node();
    let err = graph.remove_child(root, loose).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ItemNotFound);
}

#[test]
fn test_destroy_node_removes_subtree_and_returns_objects() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let a = graph.create_named_child(root, "a").unwrap();
    let b = graph.create_child(a).unwrap();
    let objects = object_keys(2);
    graph.attach_object(a, objects[0]).unwrap();
    graph.attach_object(b, objects[1]).unwrap();

    let detached = graph.destroy_node(a).unwrap();
    assert_eq!(detached.len(), 2);
    assert!(!graph.contains(a));
    assert!(!graph.contains(b));
    assert!(graph.node_by_name("a").is_none());
    assert!(graph.object_parent(objects[0]).is_none());
    assert!(graph.node(root).unwrap().children().is_empty());
}

#[test]
fn test_root_cannot_be_destroyed() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    assert_eq!(graph.destroy_node(root).unwrap_err().kind(), ErrorKind::InvalidParams);
}

// ============================================================================
// Derived transforms
// ============================================================================

#[test]
fn test_derived_position_composes_parent() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let parent = graph.create_child(root).unwrap();
    let child = graph.create_child(parent).unwrap();
    graph.set_position(parent, Vec3::new(10.0, 0.0, 0.0)).unwrap();
    graph.set_orientation(parent, Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)).unwrap();
    graph.set_scale(parent, Vec3::splat(2.0)).unwrap();
    graph.set_position(child, Vec3::new(1.0, 0.0, 0.0)).unwrap();

    // rotating +X by 90 degrees around Y gives -Z
    let world = graph.derived_position(child).unwrap();
    assert!(approx(world, Vec3::new(10.0, 0.0, -2.0)), "{world:?}");
    assert!(approx(graph.derived_scale(child).unwrap(), Vec3::splat(2.0)));
}

#[test]
fn test_inherit_flags() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let parent = graph.create_child(root).unwrap();
    let child = graph.create_child(parent).unwrap();
    graph.set_scale(parent, Vec3::splat(3.0)).unwrap();
    graph.set_orientation(parent, Quat::from_rotation_z(1.0)).unwrap();
    graph.set_inherit_scale(child, false).unwrap();
    graph.set_inherit_orientation(child, false).unwrap();

    assert!(approx(graph.derived_scale(child).unwrap(), Vec3::ONE));
    let orientation = graph.derived_orientation(child).unwrap();
    assert!(orientation.angle_between(Quat::IDENTITY) < EPS);
}

#[test]
fn test_read_cleans_node_and_ancestors() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let a = graph.create_child(root).unwrap();
    let b = graph.create_child(a).unwrap();
    let c = graph.create_child(b).unwrap();
    graph.set_position(a, Vec3::X).unwrap();

    graph.derived_position(b).unwrap();
    assert!(graph.node(root).unwrap().is_clean());
    assert!(graph.node(a).unwrap().is_clean());
    assert!(graph.node(b).unwrap().is_clean());
    assert!(!graph.node(c).unwrap().is_clean());
}

#[test]
fn test_mutation_dirties_all_descendants() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let a = graph.create_child(root).unwrap();
    let b = graph.create_child(a).unwrap();
    let c = graph.create_child(b).unwrap();
    let sibling = graph.create_child(root).unwrap();
    graph.update(&unit_box);

    graph.translate(a, Vec3::Y).unwrap();
    assert!(!graph.node(a).unwrap().is_clean());
    assert!(!graph.node(b).unwrap().is_clean());
    assert!(!graph.node(c).unwrap().is_clean());
    assert!(graph.node(sibling).unwrap().is_clean());
}

#[test]
fn test_clean_node_matches_parent_composition() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let parent = graph.create_child(root).unwrap();
    let child = graph.create_child(parent).unwrap();
    graph.set_position(parent, Vec3::new(1.0, 2.0, 3.0)).unwrap();
    graph.rotate(parent, Quat::from_rotation_x(0.3)).unwrap();
    graph.set_position(child, Vec3::new(-4.0, 0.5, 2.0)).unwrap();
    graph.rotate(child, Quat::from_rotation_y(0.7)).unwrap();
    graph.update(&unit_box);

    let expected = graph.full_transform(parent).unwrap()
        * Mat4::from_rotation_translation(
            graph.node(child).unwrap().orientation(),
            graph.node(child).unwrap().position(),
        );
    let actual = graph.full_transform(child).unwrap();
    assert!(actual.abs_diff_eq(expected, EPS));
}

#[test]
fn test_reparent_updates_derived() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let left = graph.create_child(root).unwrap();
    let right = graph.create_child(root).unwrap();
    graph.set_position(left, Vec3::new(-5.0, 0.0, 0.0)).unwrap();
    graph.set_position(right, Vec3::new(5.0, 0.0, 0.0)).unwrap();
    let item = graph.create_child(left).unwrap();
    assert!(approx(graph.derived_position(item).unwrap(), Vec3::new(-5.0, 0.0, 0.0)));

    graph.remove_child(left, item).unwrap();
    graph.add_child(right, item).unwrap();
    assert!(approx(graph.derived_position(item).unwrap(), Vec3::new(5.0, 0.0, 0.0)));
}

#[test]
fn test_local_to_world_position() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let node = graph.create_child(root).unwrap();
    graph.set_position(node, Vec3::new(0.0, 0.0, -10.0)).unwrap();
    graph.set_scale(node, Vec3::splat(2.0)).unwrap();
    let world = graph.convert_local_to_world_position(node, Vec3::X).unwrap();
    assert!(approx(world, Vec3::new(2.0, 0.0, -10.0)));
}

// ============================================================================
// Deep trees
// ============================================================================

#[test]
fn test_deep_chain_is_stack_safe() {
    const DEPTH: usize = 12_000;
    let mut graph = SceneGraph::new();
    let mut tip = graph.root();
    let mut first = None;
    for _ in 0..DEPTH {
        tip = graph.create_child(tip).unwrap();
        graph.set_position(tip, Vec3::X).unwrap();
        first.get_or_insert(tip);
    }
    assert_eq!(graph.depth(tip), DEPTH);
    let position = graph.derived_position(tip).unwrap();
    assert!((position.x - DEPTH as f32).abs() < 1.0);

    // dirty the whole chain again, then update, bounds and destroy
    graph.translate(first.unwrap(), Vec3::Y).unwrap();
    graph.attach_object(tip, object_keys(1)[0]).unwrap();
    graph.update(&unit_box);
    let bounds = graph.node(graph.root()).unwrap().world_bounding_box();
    assert!(!bounds.is_null());
    assert!((bounds.center().y - 1.0).abs() < EPS);

    let detached = graph.destroy_node(first.unwrap()).unwrap();
    assert_eq!(detached.len(), 1);
    assert_eq!(graph.node_count(), 1);
}

// ============================================================================
// Objects and bounds
// ============================================================================

#[test]
fn test_attach_rejects_second_parent() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let a = graph.create_child(root).unwrap();
    let b = graph.create_child(root).unwrap();
    let object = object_keys(1)[0];
    graph.attach_object(a, object).unwrap();
    assert_eq!(graph.attach_object(b, object).unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(graph.object_parent(object), Some(a));

    assert!(graph.detach_object(object));
    assert!(!graph.detach_object(object));
    graph.attach_object(b, object).unwrap();
    assert_eq!(graph.node(b).unwrap().attached_objects(), &[object]);
    assert!(graph.node(a).unwrap().attached_objects().is_empty());
}

#[test]
fn test_detach_all_objects() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let node = graph.create_child(root).unwrap();
    let objects = object_keys(3);
    for object in &objects {
        graph.attach_object(node, *object).unwrap();
    }
    assert_eq!(graph.detach_all_objects(node).unwrap(), objects);
    assert!(objects.iter().all(|o| graph.object_parent(*o).is_none()));
}

#[test]
fn test_world_bounds_follow_transform() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let node = graph.create_child(root).unwrap();
    let object = object_keys(1)[0];
    graph.attach_object(node, object).unwrap();
    graph.set_position(node, Vec3::new(0.0, 0.0, -20.0)).unwrap();
    graph.set_scale(node, Vec3::splat(2.0)).unwrap();
    graph.update(&unit_box);

    let bounds = graph.object_world_bounds(object);
    assert!(approx(bounds.min, Vec3::new(-2.0, -2.0, -22.0)));
    assert!(approx(bounds.max, Vec3::new(2.0, 2.0, -18.0)));
    assert_eq!(graph.node(node).unwrap().world_bounding_box(), bounds);
}

#[test]
fn test_parent_bounds_enclose_children() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let group = graph.create_child(root).unwrap();
    let left = graph.create_child(group).unwrap();
    let right = graph.create_child(group).unwrap();
    graph.set_position(left, Vec3::new(-10.0, 0.0, 0.0)).unwrap();
    graph.set_position(right, Vec3::new(10.0, 0.0, 0.0)).unwrap();
    let objects = object_keys(2);
    graph.attach_object(left, objects[0]).unwrap();
    graph.attach_object(right, objects[1]).unwrap();
    graph.update(&unit_box);

    let bounds = graph.node(group).unwrap().world_bounding_box();
    assert!(approx(bounds.min, Vec3::new(-11.0, -1.0, -1.0)));
    assert!(approx(bounds.max, Vec3::new(11.0, 1.0, 1.0)));
}

#[test]
fn test_empty_node_has_null_bounds() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let node = graph.create_child(root).unwrap();
    graph.update(&unit_box);
    assert!(graph.node(node).unwrap().world_bounding_box().is_null());
}

#[test]
fn test_visibility_chain() {
    let mut graph = SceneGraph::new();
    let root = graph.root();
    let a = graph.create_child(root).unwrap();
    let b = graph.create_child(a).unwrap();
    assert!(graph.is_in_scene_and_visible(b));
    graph.set_visible(a, false).unwrap();
    assert!(!graph.is_in_scene_and_visible(b));
    graph.set_visible(a, true).unwrap();
    assert!(graph.is_in_scene_and_visible(b));
}
