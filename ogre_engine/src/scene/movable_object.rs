/// Movable objects: things attached to scene nodes.
///
/// The set of movable types is open, so movables are trait objects owned
/// by the scene manager and referenced by key everywhere else. Nodes only
/// record which keys are attached to them.

use glam::{Mat4, Vec3};
use slotmap::new_key_type;

use crate::camera::Camera;
use crate::lod::{LodStrategyManager, LodSubject, LodView};
use crate::render_queue::{RenderQueue, RENDER_QUEUE_MAIN};
use super::aabb::AABB;
use super::entity::Entity;
use super::light::Light;

new_key_type! {
    /// Stable key of a movable object owned by a scene manager
    pub struct MovableObjectKey;
}

/// Visible to every camera mask
pub const ALL_VISIBILITY_FLAGS: u32 = 0xFFFF_FFFF;

/// State shared by every movable type
#[derive(Debug, Clone)]
pub struct MovableObjectBase {
    pub name: String,
    pub visible: bool,
    pub visibility_flags: u32,
    pub query_flags: u32,
    pub render_queue_group: u8,
    pub render_queue_priority: u16,
    /// User LOD factor, transformed by the active strategy before use
    pub mesh_lod_factor: f32,
    pub material_lod_factor: f32,
    pub cast_shadows: bool,
}

impl MovableObjectBase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            visible: true,
            visibility_flags: ALL_VISIBILITY_FLAGS,
            query_flags: ALL_VISIBILITY_FLAGS,
            render_queue_group: RENDER_QUEUE_MAIN,
            render_queue_priority: 100,
            mesh_lod_factor: 1.0,
            material_lod_factor: 1.0,
            cast_shadows: true,
        }
    }
}

/// What a movable sees while it fills the render queue
pub struct MovableRenderContext<'a> {
    pub camera: &'a Camera,
    /// Camera driving LOD decisions (the rendering camera unless it
    /// delegates LOD)
    pub lod_camera: &'a Camera,
    pub world_transform: Mat4,
    pub world_bounds: AABB,
    pub lod_strategies: &'a LodStrategyManager,
    pub viewport_height: f32,
    pub scene_lod_bias: f32,
}

impl<'a> MovableRenderContext<'a> {
    pub fn world_position(&self) -> Vec3 {
        self.world_transform.w_axis.truncate()
    }

    /// LOD subject of the object seen through this context
    pub fn lod_subject(&self, bounding_radius: f32, lod_factor: f32) -> LodSubject {
        LodSubject {
            world_position: self.world_position(),
            world_bounds: self.world_bounds,
            bounding_radius,
            lod_factor,
        }
    }

    pub fn lod_view(&self) -> LodView<'a> {
        LodView {
            camera: self.lod_camera,
            viewport_height: self.viewport_height,
            scene_lod_bias: self.scene_lod_bias,
        }
    }
}

/// Scene-attached entity that emits renderables
pub trait MovableObject: Send {
    fn base(&self) -> &MovableObjectBase;

    fn base_mut(&mut self) -> &mut MovableObjectBase;

    /// Type name ("Entity", "Light", ...)
    fn movable_type(&self) -> &'static str;

    /// Bounds in the local space of the parent node
    fn bounding_box(&self) -> AABB;

    fn bounding_radius(&self) -> f32;

    /// Push this object's renderables into `queue`
    fn update_render_queue(&mut self, ctx: &MovableRenderContext, queue: &mut RenderQueue);

    fn name(&self) -> &str {
        &self.base().name
    }

    fn is_visible(&self) -> bool {
        self.base().visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.base_mut().visible = visible;
    }

    fn visibility_flags(&self) -> u32 {
        self.base().visibility_flags
    }

    fn set_visibility_flags(&mut self, flags: u32) {
        self.base_mut().visibility_flags = flags;
    }

    fn query_flags(&self) -> u32 {
        self.base().query_flags
    }

    fn set_query_flags(&mut self, flags: u32) {
        self.base_mut().query_flags = flags;
    }

    fn render_queue_group(&self) -> u8 {
        self.base().render_queue_group
    }

    fn set_render_queue_group(&mut self, group: u8) {
        self.base_mut().render_queue_group = group;
    }

    fn set_render_queue_group_and_priority(&mut self, group: u8, priority: u16) {
        let base = self.base_mut();
        base.render_queue_group = group;
        base.render_queue_priority = priority;
    }

    /// Lights feed the auto-parameter source instead of the queue
    fn as_light(&self) -> Option<&Light> {
        None
    }

    fn as_entity(&self) -> Option<&Entity> {
        None
    }

    fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        None
    }
}
