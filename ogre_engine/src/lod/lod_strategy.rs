/// LOD strategies.
///
/// A strategy turns "how far / how big is this object for this camera" into
/// a single value and picks a LOD level by comparing it with a sorted list
/// of thresholds. Ascending strategies (distance) move to coarser levels as
/// the value grows; descending ones (pixel count) as it shrinks.

use glam::Vec3;
use crate::camera::Camera;
use crate::scene::AABB;

/// What a strategy needs to know about an object
#[derive(Debug, Clone, Copy)]
pub struct LodSubject {
    pub world_position: Vec3,
    pub world_bounds: AABB,
    pub bounding_radius: f32,
    /// Per-object bias, already transformed by [`LodStrategy::transform_bias`]
    pub lod_factor: f32,
}

/// The viewpoint of a LOD evaluation
///
/// `camera` is the LOD camera when the rendering camera delegates LOD.
#[derive(Debug, Clone, Copy)]
pub struct LodView<'a> {
    pub camera: &'a Camera,
    pub viewport_height: f32,
    pub scene_lod_bias: f32,
}

pub trait LodStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Value of the most detailed level
    fn base_value(&self) -> f32;

    /// Convert a user-supplied threshold (distance, pixels) to a strategy value
    fn transform_user_value(&self, user_value: f32) -> f32;

    /// Convert a user-supplied per-object bias to a value multiplier
    fn transform_bias(&self, factor: f32) -> f32;

    /// Larger values mean coarser levels
    fn is_ascending(&self) -> bool;

    /// Unbiased value of `subject` seen from `view`
    fn raw_value(&self, subject: &LodSubject, view: &LodView) -> f32;

    /// Biased value used for level selection
    fn value(&self, subject: &LodSubject, view: &LodView) -> f32 {
        let raw = self.raw_value(subject, view);
        let camera_bias = view.camera.lod_bias();
        let scene_bias = if view.scene_lod_bias > 0.0 { view.scene_lod_bias } else { 1.0 };
        if self.is_ascending() {
            raw * (1.0 / camera_bias) * subject.lod_factor * (1.0 / scene_bias)
        } else {
            raw * camera_bias * subject.lod_factor * scene_bias
        }
    }

    /// Level for `value` given thresholds sorted from finest to coarsest
    ///
    /// Reaching a threshold exactly selects that (coarser) level.
    fn lod_index(&self, value: f32, values: &[f32]) -> usize {
        let reached = |threshold: f32| {
            if self.is_ascending() { value >= threshold } else { value <= threshold }
        };
        values
            .iter()
            .rposition(|&threshold| reached(threshold))
            .unwrap_or(0)
    }

    /// Thresholds are ordered from finest to coarsest
    fn is_sorted(&self, values: &[f32]) -> bool {
        values.windows(2).all(|w| {
            if self.is_ascending() { w[0] <= w[1] } else { w[0] >= w[1] }
        })
    }
}

// ============================================================================
// Distance
// ============================================================================

/// Squared distance from the camera to the object's centre
///
/// User values are distances; they are squared on registration.
#[derive(Debug, Default, Clone, Copy)]
pub struct DistanceLodStrategy;

impl DistanceLodStrategy {
    pub const NAME: &'static str = "distance";
}

impl LodStrategy for DistanceLodStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn base_value(&self) -> f32 {
        0.0
    }

    fn transform_user_value(&self, user_value: f32) -> f32 {
        user_value * user_value
    }

    fn transform_bias(&self, factor: f32) -> f32 {
        squared_distance_bias(factor)
    }

    fn is_ascending(&self) -> bool {
        true
    }

    fn raw_value(&self, subject: &LodSubject, view: &LodView) -> f32 {
        view.camera.position().distance_squared(subject_center(subject))
    }
}

/// Squared distance from the camera to the nearest point of the object's
/// world bounds
///
/// Large objects switch to coarser levels later than with the centre
/// distance. Zero while the camera is inside the bounds.
#[derive(Debug, Default, Clone, Copy)]
pub struct DistanceBoxLodStrategy;

impl DistanceBoxLodStrategy {
    pub const NAME: &'static str = "distance_box";
}

impl LodStrategy for DistanceBoxLodStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn base_value(&self) -> f32 {
        0.0
    }

    fn transform_user_value(&self, user_value: f32) -> f32 {
        user_value * user_value
    }

    fn transform_bias(&self, factor: f32) -> f32 {
        squared_distance_bias(factor)
    }

    fn is_ascending(&self) -> bool {
        true
    }

    fn raw_value(&self, subject: &LodSubject, view: &LodView) -> f32 {
        let position = view.camera.position();
        if subject.world_bounds.is_finite() {
            subject.world_bounds.squared_distance(position)
        } else {
            let distance = (position.distance(subject.world_position) - subject.bounding_radius).max(0.0);
            distance * distance
        }
    }
}

fn squared_distance_bias(factor: f32) -> f32 {
    if factor > 0.0 { 1.0 / (factor * factor) } else { 1.0 }
}

fn subject_center(subject: &LodSubject) -> Vec3 {
    if subject.world_bounds.is_finite() {
        subject.world_bounds.center()
    } else {
        subject.world_position
    }
}

// ============================================================================
// Pixel count
// ============================================================================

/// Projected screen area of the object's bounding sphere, in pixels
#[derive(Debug, Default, Clone, Copy)]
pub struct PixelCountLodStrategy;

impl PixelCountLodStrategy {
    pub const NAME: &'static str = "pixel_count";
}

impl LodStrategy for PixelCountLodStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn base_value(&self) -> f32 {
        f32::MAX
    }

    fn transform_user_value(&self, user_value: f32) -> f32 {
        user_value
    }

    fn transform_bias(&self, factor: f32) -> f32 {
        if factor > 0.0 { factor } else { 1.0 }
    }

    fn is_ascending(&self) -> bool {
        false
    }

    fn raw_value(&self, subject: &LodSubject, view: &LodView) -> f32 {
        view.camera.projected_pixel_count(subject_center(subject), subject.bounding_radius, view.viewport_height)
    }
}
