/// Camera culling strategies.
///
/// A CameraCuller walks the scene graph and collects the movable objects
/// a camera may see. Object-level filtering (visibility flags, the object's
/// own visible flag) is left to the `accept` predicate supplied by the
/// scene manager, so cullers only deal with geometry and node visibility.

use crate::camera::{Frustum, FrustumTest};
use super::movable_object::MovableObjectKey;
use super::scene_graph::{SceneGraph, SceneNodeKey};

/// Strategy for determining the potentially visible objects of a frame.
///
/// Called once per camera per frame after [`SceneGraph::update`], so node
/// world bounds are current.
pub trait CameraCuller: Send + Sync {
    /// Push the keys of visible objects into `out`, in traversal order
    fn cull(
        &self,
        graph: &SceneGraph,
        frustum: &Frustum,
        accept: &dyn Fn(MovableObjectKey) -> bool,
        out: &mut Vec<MovableObjectKey>,
    );
}

/// Brute-force culler: every object under a visible node chain.
///
/// Suitable for tiny scenes and as a baseline.
#[derive(Debug, Default)]
pub struct BruteForceCuller;

impl BruteForceCuller {
    pub fn new() -> Self {
        Self
    }
}

impl CameraCuller for BruteForceCuller {
    fn cull(
        &self,
        graph: &SceneGraph,
        _frustum: &Frustum,
        accept: &dyn Fn(MovableObjectKey) -> bool,
        out: &mut Vec<MovableObjectKey>,
    ) {
        let mut stack = vec![graph.root()];
        while let Some(key) = stack.pop() {
            let Some(node) = graph.node(key) else { continue };
            if !node.is_visible() {
                continue;
            }
            out.extend(node.attached_objects().iter().copied().filter(|&o| accept(o)));
            stack.extend(node.children().iter().rev().copied());
        }
    }
}

/// Hierarchical frustum culler.
///
/// Node bounds enclose their whole subtree: a node fully outside prunes
/// the subtree, a node fully inside emits every descendant without further
/// tests, a straddling node tests each attached object and recurses.
/// The walk uses an explicit stack.
#[derive(Debug, Default)]
pub struct FrustumCuller;

impl FrustumCuller {
    pub fn new() -> Self {
        Self
    }
}

impl CameraCuller for FrustumCuller {
    fn cull(
        &self,
        graph: &SceneGraph,
        frustum: &Frustum,
        accept: &dyn Fn(MovableObjectKey) -> bool,
        out: &mut Vec<MovableObjectKey>,
    ) {
        // (node, ancestor already known to be fully inside)
        let mut stack: Vec<(SceneNodeKey, bool)> = vec![(graph.root(), false)];
        while let Some((key, inside)) = stack.pop() {
            let Some(node) = graph.node(key) else { continue };
            if !node.is_visible() {
                continue;
            }
            let inside = inside || match frustum.classify_aabb(&node.world_bounding_box()) {
                FrustumTest::Outside => continue,
                FrustumTest::Inside => true,
                FrustumTest::Partial => false,
            };

            for &object in node.attached_objects() {
                if !accept(object) {
                    continue;
                }
                if inside || frustum.intersects_aabb(&graph.object_world_bounds(object)) {
                    out.push(object);
                }
            }
            stack.extend(node.children().iter().rev().map(|&child| (child, inside)));
        }
    }
}

#[cfg(test)]
#[path = "culler_tests.rs"]
mod tests;
