//! Scene manager: one scene graph with its movables, cameras and render
//! queue.
//!
//! Rendering a camera happens in two phases. The queue is filled first
//! (culling, LOD selection, technique resolution), without holding the
//! render system, because resolving a technique may compile materials
//! and programs. The filled queue is then sorted and drawn with the
//! render system locked.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use glam::Vec4;
use slotmap::SlotMap;
use rustc_hash::FxHashMap;

use crate::camera::Camera;
use crate::error::Result;
use crate::gpu_program::{AutoParamDataSource, LightParams};
use crate::hardware::HardwareBufferManager;
use crate::lod::LodStrategyManager;
use crate::material::{Material, MaterialManager};
use crate::render_queue::{QueuedRenderable, RenderQueue, RenderQueueVisitor, RENDER_QUEUE_MAX};
use crate::render_system::{lock_render_system, Rect2D, RenderOperation, SharedRenderSystem};
use crate::resource::mesh::{Mesh, MeshManager};
use crate::resource::{ResourceRef, AUTODETECT_RESOURCE_GROUP_NAME};
use crate::{engine_bail, engine_info, engine_trivial};
use super::aabb::AABB;
use super::culler::{CameraCuller, FrustumCuller};
use super::entity::Entity;
use super::light::{Light, LightType};
use super::movable_object::{
    MovableObject, MovableObjectKey, MovableRenderContext, ALL_VISIBILITY_FLAGS,
};
use super::pass_renderer::{CompositorTextureMap, PassRenderer};
use super::scene_graph::{SceneGraph, SceneNodeKey};
use super::simple_renderable::SimpleRenderable;

const SOURCE: &str = "ogre::SceneManager";

/// Managers a scene manager needs to build and queue its objects
#[derive(Clone)]
pub struct SceneContext {
    pub materials: Arc<MaterialManager>,
    pub meshes: Arc<MeshManager>,
    pub buffers: Arc<HardwareBufferManager>,
    pub lod_strategies: Arc<LodStrategyManager>,
}

/// How the special-case queue list filters queue groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpecialCaseRenderQueueMode {
    /// Render every group except the listed ones
    #[default]
    Exclude,
    /// Render only the listed groups
    Include,
}

impl SpecialCaseRenderQueueMode {
    fn allows(self, queues: &BTreeSet<u8>, group_id: u8) -> bool {
        match self {
            Self::Include => queues.contains(&group_id),
            Self::Exclude => !queues.contains(&group_id),
        }
    }
}

/// Per-call parameters of [`SceneManager::render_scene`]
#[derive(Debug, Clone)]
pub struct RenderSceneOptions {
    /// Viewport rectangle in pixels on the current render target
    pub viewport: Rect2D,
    pub first_render_queue: u8,
    pub last_render_queue: u8,
    /// Material scheme, `None` for the active scheme
    pub material_scheme: Option<String>,
    /// Combined with the camera and scene masks
    pub visibility_mask: u32,
}

impl RenderSceneOptions {
    pub fn new(viewport: Rect2D) -> Self {
        Self {
            viewport,
            first_render_queue: 0,
            last_render_queue: RENDER_QUEUE_MAX,
            material_scheme: None,
            visibility_mask: ALL_VISIBILITY_FLAGS,
        }
    }
}

pub struct SceneManager {
    name: String,
    ctx: SceneContext,
    graph: SceneGraph,
    objects: SlotMap<MovableObjectKey, Box<dyn MovableObject>>,
    object_names: FxHashMap<String, MovableObjectKey>,
    cameras: BTreeMap<String, Camera>,
    queue: RenderQueue,
    culler: Box<dyn CameraCuller>,
    ambient_light: Vec4,
    lod_bias: f32,
    visibility_mask: u32,
    special_case_mode: SpecialCaseRenderQueueMode,
    special_case_queues: BTreeSet<u8>,
    time: f32,
    auto_params: AutoParamDataSource,
}

impl SceneManager {
    pub fn new(name: &str, ctx: SceneContext) -> Self {
        let queue = RenderQueue::new(ctx.materials.clone());
        Self {
            name: name.to_string(),
            ctx,
            graph: SceneGraph::new(),
            objects: SlotMap::with_key(),
            object_names: FxHashMap::default(),
            cameras: BTreeMap::new(),
            queue,
            culler: Box::new(FrustumCuller::new()),
            ambient_light: Vec4::new(0.0, 0.0, 0.0, 1.0),
            lod_bias: 1.0,
            visibility_mask: ALL_VISIBILITY_FLAGS,
            special_case_mode: SpecialCaseRenderQueueMode::Exclude,
            special_case_queues: BTreeSet::new(),
            time: 0.0,
            auto_params: AutoParamDataSource::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &SceneContext {
        &self.ctx
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    pub fn root_node(&self) -> SceneNodeKey {
        self.graph.root()
    }

    pub fn set_culler(&mut self, culler: Box<dyn CameraCuller>) {
        self.culler = culler;
    }

    // ===== MOVABLE OBJECTS =====

    /// Take ownership of a movable; names are unique per scene manager
    pub fn add_movable_object(&mut self, object: Box<dyn MovableObject>) -> Result<MovableObjectKey> {
        let name = object.name().to_string();
        if self.object_names.contains_key(&name) {
            engine_bail!(SOURCE, DuplicateItem,
                "Scene manager '{}': a movable named '{}' already exists", self.name, name);
        }
        let key = self.objects.insert(object);
        self.object_names.insert(name, key);
        Ok(key)
    }

    /// Entity of the mesh `mesh_name`, searched in every group
    pub fn create_entity(&mut self, name: &str, mesh_name: &str) -> Result<MovableObjectKey> {
        let Some(mesh) = self.ctx.meshes.get_by_name(mesh_name, AUTODETECT_RESOURCE_GROUP_NAME) else {
            engine_bail!(SOURCE, ItemNotFound, "Entity '{}': mesh '{}' not found", name, mesh_name);
        };
        self.create_entity_from_mesh(name, mesh)
    }

    pub fn create_entity_from_mesh(&mut self, name: &str, mesh: ResourceRef<Mesh>) -> Result<MovableObjectKey> {
        let entity = Entity::new(name, mesh, &self.ctx.meshes, &self.ctx.materials)?;
        self.add_movable_object(Box::new(entity))
    }

    pub fn create_light(&mut self, name: &str, light_type: LightType) -> Result<MovableObjectKey> {
        self.add_movable_object(Box::new(Light::new(name, light_type)))
    }

    pub fn create_simple_renderable(
        &mut self,
        name: &str,
        operation: RenderOperation,
        material: ResourceRef<Material>,
        bounds: AABB,
    ) -> Result<MovableObjectKey> {
        self.add_movable_object(Box::new(SimpleRenderable::new(name, operation, material, bounds)))
    }

    pub fn object(&self, key: MovableObjectKey) -> Option<&dyn MovableObject> {
        self.objects.get(key).map(|o| o.as_ref())
    }

    pub fn object_mut(&mut self, key: MovableObjectKey) -> Option<&mut (dyn MovableObject + 'static)> {
        self.objects.get_mut(key).map(|o| o.as_mut())
    }

    pub fn object_by_name(&self, name: &str) -> Option<MovableObjectKey> {
        self.object_names.get(name).copied()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Detach and drop a movable
    pub fn destroy_object(&mut self, key: MovableObjectKey) -> Result<()> {
        let Some(object) = self.objects.remove(key) else {
            engine_bail!(SOURCE, ItemNotFound, "Scene manager '{}': unknown movable", self.name);
        };
        self.graph.detach_object(key);
        self.object_names.remove(object.name());
        Ok(())
    }

    /// Attach a movable owned by this manager to a node
    pub fn attach_object(&mut self, node: SceneNodeKey, key: MovableObjectKey) -> Result<()> {
        if !self.objects.contains_key(key) {
            engine_bail!(SOURCE, ItemNotFound, "Scene manager '{}': unknown movable", self.name);
        }
        self.graph.attach_object(node, key)
    }

    /// Destroy a node and its subtree; attached objects stay alive, detached
    pub fn destroy_node(&mut self, node: SceneNodeKey) -> Result<Vec<MovableObjectKey>> {
        self.graph.destroy_node(node)
    }

    // ===== CAMERAS =====

    pub fn create_camera(&mut self, name: &str) -> Result<&mut Camera> {
        if self.cameras.contains_key(name) {
            engine_bail!(SOURCE, DuplicateItem,
                "Scene manager '{}': camera '{}' already exists", self.name, name);
        }
        Ok(self.cameras.entry(name.to_string()).or_insert_with(|| Camera::new(name)))
    }

    pub fn camera(&self, name: &str) -> Option<&Camera> {
        self.cameras.get(name)
    }

    pub fn camera_mut(&mut self, name: &str) -> Option<&mut Camera> {
        self.cameras.get_mut(name)
    }

    pub fn destroy_camera(&mut self, name: &str) -> bool {
        self.cameras.remove(name).is_some()
    }

    // ===== SCENE SETTINGS =====

    pub fn ambient_light(&self) -> Vec4 {
        self.ambient_light
    }

    pub fn set_ambient_light(&mut self, colour: Vec4) {
        self.ambient_light = colour;
    }

    pub fn lod_bias(&self) -> f32 {
        self.lod_bias
    }

    /// Values above 1 raise detail for every object of the scene
    pub fn set_lod_bias(&mut self, bias: f32) -> Result<()> {
        if bias <= 0.0 {
            engine_bail!(SOURCE, InvalidParams, "Scene LOD bias must be positive, got {}", bias);
        }
        self.lod_bias = bias;
        Ok(())
    }

    pub fn visibility_mask(&self) -> u32 {
        self.visibility_mask
    }

    pub fn set_visibility_mask(&mut self, mask: u32) {
        self.visibility_mask = mask;
    }

    pub fn set_special_case_render_queue_mode(&mut self, mode: SpecialCaseRenderQueueMode) {
        self.special_case_mode = mode;
    }

    pub fn add_special_case_render_queue(&mut self, group_id: u8) {
        self.special_case_queues.insert(group_id);
    }

    pub fn remove_special_case_render_queue(&mut self, group_id: u8) {
        self.special_case_queues.remove(&group_id);
    }

    pub fn clear_special_case_render_queues(&mut self) {
        self.special_case_queues.clear();
    }

    /// Queue group passes the special-case filter
    pub fn is_render_queue_to_be_processed(&self, group_id: u8) -> bool {
        self.special_case_mode.allows(&self.special_case_queues, group_id)
    }

    /// Seconds fed to the time auto-constant
    pub fn set_time(&mut self, seconds: f32) {
        self.time = seconds;
    }

    pub fn render_queue(&self) -> &RenderQueue {
        &self.queue
    }

    // ===== VISIBILITY =====

    /// Refresh transforms and world bounds of the whole graph
    pub fn update_scene_graph(&mut self) {
        let objects = &self.objects;
        self.graph.update(&|key| objects.get(key).map_or(AABB::NULL, |o| o.bounding_box()));
    }

    /// Objects `camera` may see, in traversal order
    ///
    /// An object is visible when it and every node up to the root are
    /// visible, it passes the frustum test, and its visibility flags
    /// intersect the camera, scene and `extra_mask` masks.
    pub fn find_visible_objects(&mut self, camera: &str, extra_mask: u32) -> Result<Vec<MovableObjectKey>> {
        self.update_scene_graph();
        let Some(cam) = self.cameras.get(camera) else {
            engine_bail!(SOURCE, ItemNotFound, "Scene manager '{}': camera '{}' not found", self.name, camera);
        };
        let mask = cam.visibility_mask() & self.visibility_mask & extra_mask;
        let objects = &self.objects;
        let accept = |key: MovableObjectKey| {
            objects
                .get(key)
                .is_some_and(|o| o.is_visible() && o.visibility_flags() & mask != 0)
        };
        let mut visible = Vec::new();
        self.culler.cull(&self.graph, &cam.frustum(), &accept, &mut visible);
        Ok(visible)
    }

    /// Lights attached under a visible node chain, in creation order
    fn active_lights(&self) -> Result<Vec<LightParams>> {
        let mut lights = Vec::new();
        for (key, object) in &self.objects {
            let Some(light) = object.as_light() else { continue };
            let Some(node) = self.graph.object_parent(key) else { continue };
            if !light.is_visible() || !self.graph.is_in_scene_and_visible(node) {
                continue;
            }
            lights.push(light.world_params(&self.graph.full_transform(node)?));
        }
        Ok(lights)
    }

    // ===== RENDERING =====

    /// Cull, select LODs and fill the render queue for `camera`
    ///
    /// Returns the number of queued renderables.
    pub fn fill_render_queue(&mut self, camera: &str, options: &RenderSceneOptions) -> Result<usize> {
        self.queue.clear();
        let scheme = match &options.material_scheme {
            Some(scheme) => self.ctx.materials.scheme_index(scheme),
            None => self.ctx.materials.schemes().active_scheme_index(),
        };
        self.queue.set_scheme_index(scheme);

        if let Some(cam) = self.cameras.get_mut(camera) {
            if cam.auto_aspect_ratio() && options.viewport.height > 0 {
                cam.set_aspect_ratio(options.viewport.width as f32 / options.viewport.height as f32);
            }
        }
        let visible = self.find_visible_objects(camera, options.visibility_mask)?;

        let Some(cam) = self.cameras.get(camera) else {
            engine_bail!(SOURCE, ItemNotFound, "Scene manager '{}': camera '{}' not found", self.name, camera);
        };
        let lod_camera = cam.lod_camera().and_then(|name| self.cameras.get(name)).unwrap_or(cam);

        for key in visible {
            let Some(node) = self.graph.object_parent(key) else { continue };
            let world_transform = self.graph.full_transform(node)?;
            let world_bounds = self.graph.object_world_bounds(key);
            let Some(object) = self.objects.get_mut(key) else { continue };
            let ctx = MovableRenderContext {
                camera: cam,
                lod_camera,
                world_transform,
                world_bounds,
                lod_strategies: &self.ctx.lod_strategies,
                viewport_height: options.viewport.height as f32,
                scene_lod_bias: self.lod_bias,
            };
            object.update_render_queue(&ctx, &mut self.queue);
        }
        Ok(self.queue.len())
    }

    /// Render `camera` into the viewport of the current render target
    ///
    /// The caller has selected the render target and cleared it as needed.
    /// Returns the number of draw calls issued.
    pub fn render_scene(
        &mut self,
        camera: &str,
        render_system: &SharedRenderSystem,
        options: &RenderSceneOptions,
    ) -> Result<usize> {
        self.render_scene_with_textures(camera, render_system, options, None)
    }

    /// [`render_scene`](Self::render_scene) with compositor textures
    /// available to the materials' compositor texture units
    pub fn render_scene_with_textures(
        &mut self,
        camera: &str,
        render_system: &SharedRenderSystem,
        options: &RenderSceneOptions,
        textures: Option<&CompositorTextureMap>,
    ) -> Result<usize> {
        let queued = self.fill_render_queue(camera, options)?;
        let lights = self.active_lights()?;
        let Some(cam) = self.cameras.get(camera) else {
            engine_bail!(SOURCE, ItemNotFound, "Scene manager '{}': camera '{}' not found", self.name, camera);
        };
        self.queue.sort(cam);
        engine_trivial!(SOURCE, "Scene '{}', camera '{}': {} renderables queued, {} lights",
            self.name, camera, queued, lights.len());

        let view = cam.view_matrix();
        let projection = cam.projection_matrix();
        let source = &mut self.auto_params;
        source.set_camera_position(cam.position());
        source.set_view_matrix(view);
        source.set_projection_matrix(projection);
        source.set_lights(lights);
        source.set_ambient_light(self.ambient_light);
        source.set_time(self.time);
        source.set_viewport_size(options.viewport.width as f32, options.viewport.height as f32);

        let mut rs = lock_render_system(render_system)?;
        rs.set_viewport(options.viewport);
        let renderer = PassRenderer::new(&mut *rs, source, view, projection);
        let mut renderer = match textures {
            Some(textures) => renderer.with_compositor_textures(textures),
            None => renderer,
        };
        let mut filter = SpecialCaseFilter {
            inner: &mut renderer,
            mode: self.special_case_mode,
            queues: &self.special_case_queues,
        };
        self.queue.render_range(options.first_render_queue, options.last_render_queue, &mut filter);
        renderer.finish()
    }

    /// Camera names, sorted
    pub fn camera_names(&self) -> Vec<&str> {
        self.cameras.keys().map(String::as_str).collect()
    }

    /// Drop every object and node; cameras are kept
    pub fn clear_scene(&mut self) {
        self.objects.clear();
        self.object_names.clear();
        self.graph = SceneGraph::new();
        self.queue.clear();
        engine_info!(SOURCE, "Scene '{}' cleared", self.name);
    }
}

/// Applies the special-case queue list on top of another visitor
struct SpecialCaseFilter<'a, 'v> {
    inner: &'a mut dyn RenderQueueVisitor,
    mode: SpecialCaseRenderQueueMode,
    queues: &'v BTreeSet<u8>,
}

impl RenderQueueVisitor for SpecialCaseFilter<'_, '_> {
    fn group_started(&mut self, group_id: u8) -> bool {
        self.mode.allows(self.queues, group_id) && self.inner.group_started(group_id)
    }

    fn group_ended(&mut self, group_id: u8) {
        self.inner.group_ended(group_id);
    }

    fn visit(&mut self, queued: &QueuedRenderable, pass_index: usize) {
        self.inner.visit(queued, pass_index);
    }
}

#[cfg(test)]
#[path = "scene_manager_tests.rs"]
mod tests;
