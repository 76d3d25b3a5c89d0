/// Scene graph: an arena of transform nodes.
///
/// Nodes live in a SlotMap and refer to each other by `SceneNodeKey`, so the
/// tree has no owning pointers and no reference cycles. Every node caches
/// its derived (world) transform behind a dirty flag:
///
/// - changing a local transform marks the node and all its descendants dirty
/// - reading a derived value walks up to the first clean ancestor and
///   recomputes down to the node, leaving the whole chain clean
///
/// A dirty node always has dirty descendants, so propagation stops at the
/// first node that is already dirty. Every walk uses an explicit stack, so
/// arbitrarily deep trees are safe.

use std::cell::Cell;
use glam::{Mat4, Quat, Vec3};
use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SecondaryMap, SlotMap};

use crate::engine_bail;
use crate::error::Result;
use super::aabb::AABB;
use super::movable_object::MovableObjectKey;

const SOURCE: &str = "ogre::SceneGraph";

new_key_type! {
    /// Stable key of a scene node
    pub struct SceneNodeKey;
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Derived {
    position: Vec3,
    orientation: Quat,
    scale: Vec3,
}

impl Derived {
    const IDENTITY: Derived = Derived {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };
}

/// One node of the graph
pub struct SceneNode {
    name: Option<String>,
    parent: Option<SceneNodeKey>,
    children: Vec<SceneNodeKey>,
    position: Vec3,
    orientation: Quat,
    scale: Vec3,
    inherit_orientation: bool,
    inherit_scale: bool,
    visible: bool,
    objects: Vec<MovableObjectKey>,
    derived: Cell<Derived>,
    dirty: Cell<bool>,
    world_bounds: AABB,
}

impl SceneNode {
    fn new(name: Option<String>) -> Self {
        Self {
            name,
            parent: None,
            children: Vec::new(),
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            scale: Vec3::ONE,
            inherit_orientation: true,
            inherit_scale: true,
            visible: true,
            objects: Vec::new(),
            derived: Cell::new(Derived::IDENTITY),
            dirty: Cell::new(true),
            world_bounds: AABB::NULL,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<SceneNodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[SceneNodeKey] {
        &self.children
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn inherit_orientation(&self) -> bool {
        self.inherit_orientation
    }

    pub fn inherit_scale(&self) -> bool {
        self.inherit_scale
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Objects attached to this node, in attachment order
    pub fn attached_objects(&self) -> &[MovableObjectKey] {
        &self.objects
    }

    /// Derived values are current
    pub fn is_clean(&self) -> bool {
        !self.dirty.get()
    }

    /// Bounds of the attached objects and of every descendant, as of the
    /// last [`SceneGraph::update`]
    pub fn world_bounding_box(&self) -> AABB {
        self.world_bounds
    }

    fn derive_from(&self, parent: Option<Derived>) -> Derived {
        let Some(parent) = parent else {
            return Derived { position: self.position, orientation: self.orientation, scale: self.scale };
        };
        let orientation = if self.inherit_orientation {
            parent.orientation * self.orientation
        } else {
            self.orientation
        };
        let scale = if self.inherit_scale { parent.scale * self.scale } else { self.scale };
        let position = parent.orientation * (parent.scale * self.position) + parent.position;
        Derived { position, orientation, scale }
    }
}

/// Arena of scene nodes with a fixed root
pub struct SceneGraph {
    nodes: SlotMap<SceneNodeKey, SceneNode>,
    root: SceneNodeKey,
    names: FxHashMap<String, SceneNodeKey>,
    object_parents: SecondaryMap<MovableObjectKey, SceneNodeKey>,
    object_bounds: SecondaryMap<MovableObjectKey, AABB>,
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(SceneNode::new(Some("Root".to_string())));
        let mut names = FxHashMap::default();
        names.insert("Root".to_string(), root);
        Self {
            nodes,
            root,
            names,
            object_parents: SecondaryMap::new(),
            object_bounds: SecondaryMap::new(),
        }
    }

    pub fn root(&self) -> SceneNodeKey {
        self.root
    }

    pub fn node(&self, key: SceneNodeKey) -> Option<&SceneNode> {
        self.nodes.get(key)
    }

    pub fn node_by_name(&self, name: &str) -> Option<SceneNodeKey> {
        self.names.get(name).copied()
    }

    pub fn contains(&self, key: SceneNodeKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Number of nodes, the root included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn node_ref(&self, key: SceneNodeKey) -> Result<&SceneNode> {
        match self.nodes.get(key) {
            Some(node) => Ok(node),
            None => engine_bail!(SOURCE, ItemNotFound, "Scene node {:?} does not exist", key),
        }
    }

    fn node_mut(&mut self, key: SceneNodeKey) -> Result<&mut SceneNode> {
        match self.nodes.get_mut(key) {
            Some(node) => Ok(node),
            None => engine_bail!(SOURCE, ItemNotFound, "Scene node {:?} does not exist", key),
        }
    }

    // ===== HIERARCHY =====

    /// Create a node and attach it under `parent`
    pub fn create_child(&mut self, parent: SceneNodeKey) -> Result<SceneNodeKey> {
        self.insert_child(parent, None)
    }

    /// Create a named node under `parent`; names are unique in the graph
    pub fn create_named_child(&mut self, parent: SceneNodeKey, name: &str) -> Result<SceneNodeKey> {
        if self.names.contains_key(name) {
            engine_bail!(SOURCE, DuplicateItem, "Scene node '{}' already exists", name);
        }
        self.insert_child(parent, Some(name))
    }

    fn insert_child(&mut self, parent: SceneNodeKey, name: Option<&str>) -> Result<SceneNodeKey> {
        self.node_ref(parent)?;
        let mut node = SceneNode::new(name.map(str::to_string));
        node.parent = Some(parent);
        let key = self.nodes.insert(node);
        if let Some(name) = name {
            self.names.insert(name.to_string(), key);
        }
        self.node_mut(parent)?.children.push(key);
        Ok(key)
    }

    /// Create a detached node (attach it later with [`add_child`](Self::add_child))
    pub fn create_node(&mut self) -> SceneNodeKey {
        self.nodes.insert(SceneNode::new(None))
    }

    /// Attach a detached node under `parent`
    ///
    /// Fails when `child` already has a parent or when `parent` is `child`
    /// itself or one of its descendants.
    pub fn add_child(&mut self, parent: SceneNodeKey, child: SceneNodeKey) -> Result<()> {
        self.node_ref(parent)?;
        if let Some(current) = self.node_ref(child)?.parent {
            engine_bail!(SOURCE, InvalidState,
                "Scene node {:?} is already a child of {:?}", child, current);
        }
        if child == self.root {
            engine_bail!(SOURCE, InvalidParams, "The root node cannot become a child");
        }
        if self.is_ancestor_or_self(child, parent) {
            engine_bail!(SOURCE, InvalidParams,
                "Attaching {:?} under {:?} would create a cycle", child, parent);
        }
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        self.mark_dirty(child);
        Ok(())
    }

    /// Detach `child` from `parent`; the child and its subtree survive as a
    /// detached tree
    pub fn remove_child(&mut self, parent: SceneNodeKey, child: SceneNodeKey) -> Result<()> {
        let node = self.node_mut(parent)?;
        let Some(index) = node.children.iter().position(|c| *c == child) else {
            engine_bail!(SOURCE, ItemNotFound,
                "Scene node {:?} is not a child of {:?}", child, parent);
        };
        node.children.remove(index);
        self.node_mut(child)?.parent = None;
        self.mark_dirty(child);
        Ok(())
    }

    /// Destroy `key` and its whole subtree
    ///
    /// Returns the objects that were attached anywhere in the subtree; they
    /// are detached, not destroyed.
    pub fn destroy_node(&mut self, key: SceneNodeKey) -> Result<Vec<MovableObjectKey>> {
        if key == self.root {
            engine_bail!(SOURCE, InvalidParams, "The root node cannot be destroyed");
        }
        if let Some(parent) = self.node_ref(key)?.parent {
            self.remove_child(parent, key)?;
        }
        let mut detached = Vec::new();
        for node_key in self.subtree(key) {
            if let Some(node) = self.nodes.remove(node_key) {
                if let Some(name) = node.name {
                    self.names.remove(&name);
                }
                for object in node.objects {
                    self.object_parents.remove(object);
                    self.object_bounds.remove(object);
                    detached.push(object);
                }
            }
        }
        Ok(detached)
    }

    /// `ancestor` is `key` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: SceneNodeKey, key: SceneNodeKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.nodes.get(k).and_then(|n| n.parent);
        }
        false
    }

    /// `key` and its descendants in depth-first pre-order
    pub fn subtree(&self, key: SceneNodeKey) -> Vec<SceneNodeKey> {
        let mut order = Vec::new();
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            let Some(node) = self.nodes.get(k) else { continue };
            order.push(k);
            stack.extend(node.children.iter().rev());
        }
        order
    }

    /// Depth of a node (the root and detached tops are 0)
    pub fn depth(&self, key: SceneNodeKey) -> usize {
        let mut depth = 0;
        let mut current = self.nodes.get(key).and_then(|n| n.parent);
        while let Some(k) = current {
            depth += 1;
            current = self.nodes.get(k).and_then(|n| n.parent);
        }
        depth
    }

    // ===== LOCAL TRANSFORM =====

    pub fn set_position(&mut self, key: SceneNodeKey, position: Vec3) -> Result<()> {
        self.node_mut(key)?.position = position;
        self.mark_dirty(key);
        Ok(())
    }

    pub fn set_orientation(&mut self, key: SceneNodeKey, orientation: Quat) -> Result<()> {
        self.node_mut(key)?.orientation = orientation.normalize();
        self.mark_dirty(key);
        Ok(())
    }

    pub fn set_scale(&mut self, key: SceneNodeKey, scale: Vec3) -> Result<()> {
        self.node_mut(key)?.scale = scale;
        self.mark_dirty(key);
        Ok(())
    }

    /// Move in the parent's space
    pub fn translate(&mut self, key: SceneNodeKey, delta: Vec3) -> Result<()> {
        self.node_mut(key)?.position += delta;
        self.mark_dirty(key);
        Ok(())
    }

    /// Rotate in the node's local space
    pub fn rotate(&mut self, key: SceneNodeKey, rotation: Quat) -> Result<()> {
        let node = self.node_mut(key)?;
        node.orientation = (node.orientation * rotation).normalize();
        self.mark_dirty(key);
        Ok(())
    }

    pub fn set_inherit_orientation(&mut self, key: SceneNodeKey, inherit: bool) -> Result<()> {
        self.node_mut(key)?.inherit_orientation = inherit;
        self.mark_dirty(key);
        Ok(())
    }

    pub fn set_inherit_scale(&mut self, key: SceneNodeKey, inherit: bool) -> Result<()> {
        self.node_mut(key)?.inherit_scale = inherit;
        self.mark_dirty(key);
        Ok(())
    }

    /// Hide or show the node; hidden nodes hide their whole subtree
    pub fn set_visible(&mut self, key: SceneNodeKey, visible: bool) -> Result<()> {
        self.node_mut(key)?.visible = visible;
        Ok(())
    }

    /// Mark `key` and its descendants dirty
    fn mark_dirty(&mut self, key: SceneNodeKey) {
        let mut stack = vec![key];
        while let Some(k) = stack.pop() {
            let Some(node) = self.nodes.get(k) else { continue };
            if k != key && node.dirty.get() {
                continue;
            }
            node.dirty.set(true);
            stack.extend(node.children.iter().copied());
        }
    }

    // ===== DERIVED TRANSFORM =====

    /// Bring `key` and its ancestors up to date
    fn derived(&self, key: SceneNodeKey) -> Result<Derived> {
        let node = self.node_ref(key)?;
        if !node.dirty.get() {
            return Ok(node.derived.get());
        }
        // Collect the dirty chain up to the first clean ancestor
        let mut chain = vec![key];
        let mut base = None;
        let mut current = node.parent;
        while let Some(k) = current {
            let Some(ancestor) = self.nodes.get(k) else { break };
            if !ancestor.dirty.get() {
                base = Some(ancestor.derived.get());
                break;
            }
            chain.push(k);
            current = ancestor.parent;
        }
        for k in chain.into_iter().rev() {
            if let Some(node) = self.nodes.get(k) {
                let derived = node.derive_from(base);
                node.derived.set(derived);
                node.dirty.set(false);
                base = Some(derived);
            }
        }
        Ok(base.unwrap_or(Derived::IDENTITY))
    }

    pub fn derived_position(&self, key: SceneNodeKey) -> Result<Vec3> {
        Ok(self.derived(key)?.position)
    }

    pub fn derived_orientation(&self, key: SceneNodeKey) -> Result<Quat> {
        Ok(self.derived(key)?.orientation)
    }

    pub fn derived_scale(&self, key: SceneNodeKey) -> Result<Vec3> {
        Ok(self.derived(key)?.scale)
    }

    /// World transform (scale, then rotation, then translation)
    pub fn full_transform(&self, key: SceneNodeKey) -> Result<Mat4> {
        let d = self.derived(key)?;
        Ok(Mat4::from_scale_rotation_translation(d.scale, d.orientation, d.position))
    }

    /// Point from the node's local space to world space
    pub fn convert_local_to_world_position(&self, key: SceneNodeKey, local: Vec3) -> Result<Vec3> {
        let d = self.derived(key)?;
        Ok(d.orientation * (d.scale * local) + d.position)
    }

    // ===== OBJECTS =====

    /// Attach an object; an object belongs to at most one node
    pub fn attach_object(&mut self, key: SceneNodeKey, object: MovableObjectKey) -> Result<()> {
        if let Some(current) = self.object_parents.get(object) {
            engine_bail!(SOURCE, InvalidState,
                "Object {:?} is already attached to node {:?}", object, current);
        }
        self.node_mut(key)?.objects.push(object);
        self.object_parents.insert(object, key);
        Ok(())
    }

    /// Detach an object from its node; false when it was not attached
    pub fn detach_object(&mut self, object: MovableObjectKey) -> bool {
        let Some(parent) = self.object_parents.remove(object) else {
            return false;
        };
        self.object_bounds.remove(object);
        if let Some(node) = self.nodes.get_mut(parent) {
            node.objects.retain(|o| *o != object);
        }
        true
    }

    /// Detach every object of a node, returning them
    pub fn detach_all_objects(&mut self, key: SceneNodeKey) -> Result<Vec<MovableObjectKey>> {
        let objects = std::mem::take(&mut self.node_mut(key)?.objects);
        for object in &objects {
            self.object_parents.remove(*object);
            self.object_bounds.remove(*object);
        }
        Ok(objects)
    }

    pub fn object_parent(&self, object: MovableObjectKey) -> Option<SceneNodeKey> {
        self.object_parents.get(object).copied()
    }

    /// World bounds of an attached object, as of the last update
    pub fn object_world_bounds(&self, object: MovableObjectKey) -> AABB {
        self.object_bounds.get(object).copied().unwrap_or(AABB::NULL)
    }

    /// Node is attached (directly or not) under the root and every node on
    /// the way is visible
    pub fn is_in_scene_and_visible(&self, key: SceneNodeKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            let Some(node) = self.nodes.get(k) else { return false };
            if !node.visible {
                return false;
            }
            if k == self.root {
                return true;
            }
            current = node.parent;
        }
        false
    }

    // ===== UPDATE =====

    /// Refresh every transform under the root and recompute world bounds
    ///
    /// `local_bounds` gives the local bounding box of an attached object.
    /// Bounds are merged bottom-up so each node encloses its subtree.
    pub fn update(&mut self, local_bounds: &dyn Fn(MovableObjectKey) -> AABB) {
        let order = self.subtree(self.root);

        // Top-down: parents are refreshed before their children
        for &key in &order {
            let Some(node) = self.nodes.get(key) else { continue };
            if node.dirty.get() {
                let parent = node.parent.and_then(|p| self.nodes.get(p)).map(|p| p.derived.get());
                node.derived.set(node.derive_from(parent));
                node.dirty.set(false);
            }
        }

        // Bottom-up bounds
        for &key in order.iter().rev() {
            let Some(node) = self.nodes.get(key) else { continue };
            let d = node.derived.get();
            let transform = Mat4::from_scale_rotation_translation(d.scale, d.orientation, d.position);
            let mut bounds = AABB::NULL;
            let mut object_boxes = Vec::with_capacity(node.objects.len());
            for &object in &node.objects {
                let world = local_bounds(object).transformed(&transform);
                bounds.merge(&world);
                object_boxes.push((object, world));
            }
            for child in &node.children {
                if let Some(child) = self.nodes.get(*child) {
                    bounds.merge(&child.world_bounds);
                }
            }
            for (object, world) in object_boxes {
                self.object_bounds.insert(object, world);
            }
            if let Some(node) = self.nodes.get_mut(key) {
                node.world_bounds = bounds;
            }
        }
    }

    /// Keys of every node in the graph (detached trees included)
    pub fn node_keys(&self) -> impl Iterator<Item = SceneNodeKey> + '_ {
        self.nodes.keys()
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "scene_graph_tests.rs"]
mod tests;
