/// Lights: movables that feed the light auto-constants.

use glam::{Mat4, Vec3, Vec4};

use crate::gpu_program::LightParams;
use crate::render_queue::RenderQueue;
use super::aabb::AABB;
use super::movable_object::{MovableObject, MovableObjectBase, MovableRenderContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LightType {
    #[default]
    Point,
    /// Infinitely far; only the direction matters
    Directional,
    Spotlight,
}

pub struct Light {
    base: MovableObjectBase,
    light_type: LightType,
    /// Local position relative to the parent node
    pub position: Vec3,
    /// Local direction relative to the parent node
    pub direction: Vec3,
    pub diffuse: Vec4,
    pub specular: Vec4,
    /// Distance beyond which the light has no effect
    pub range: f32,
    /// Inner and outer cone angles in radians
    pub spot_angles: (f32, f32),
    pub power: f32,
}

impl Light {
    pub fn new(name: &str, light_type: LightType) -> Self {
        Self {
            base: MovableObjectBase::new(name),
            light_type,
            position: Vec3::ZERO,
            direction: Vec3::NEG_Z,
            diffuse: Vec4::ONE,
            specular: Vec4::ZERO,
            range: 100_000.0,
            spot_angles: (30f32.to_radians(), 40f32.to_radians()),
            power: 1.0,
        }
    }

    pub fn light_type(&self) -> LightType {
        self.light_type
    }

    pub fn set_light_type(&mut self, light_type: LightType) {
        self.light_type = light_type;
    }

    /// World position (point and spot lights) or direction towards the
    /// light (`w = 0`, directional lights)
    pub fn world_params(&self, world: &Mat4) -> LightParams {
        let position = match self.light_type {
            LightType::Directional => {
                let direction = world.transform_vector3(self.direction).normalize_or_zero();
                (-direction).extend(0.0)
            }
            _ => world.transform_point3(self.position).extend(1.0),
        };
        LightParams { position, diffuse: self.diffuse * self.power }
    }
}

impl MovableObject for Light {
    fn base(&self) -> &MovableObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut MovableObjectBase {
        &mut self.base
    }

    fn movable_type(&self) -> &'static str {
        "Light"
    }

    /// Point and spot lights are bounded by their range
    fn bounding_box(&self) -> AABB {
        match self.light_type {
            LightType::Directional => AABB::INFINITE,
            _ => AABB::from_center_half_size(self.position, Vec3::splat(self.range)),
        }
    }

    fn bounding_radius(&self) -> f32 {
        self.range
    }

    fn update_render_queue(&mut self, _ctx: &MovableRenderContext, _queue: &mut RenderQueue) {}

    fn as_light(&self) -> Option<&Light> {
        Some(self)
    }
}
